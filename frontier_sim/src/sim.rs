// Core simulation state and tick loop.
//
// `SimState` is the single source of truth for the world. It owns the seed
// and RNG, the config, the chunk generator, the spatial index (and through it
// every structure), the agent arena and the players. The sim is a pure
// function: `(state, commands, duration) -> (new_state, events)`.
//
// ## Tick order
//
// `step(commands, duration)` advances exactly one tick:
//
//   1. Apply the commands in order. A rejected command changes nothing and is
//      reported in `StepResult::rejected`.
//   2. Update every building's construction progress with the workers
//      stationed on it.
//   3. Give every agent exactly one `controller::advance` call with the same
//      duration, in chunk-bucket order. The bucket order is snapshotted
//      before the pass, and chunk membership changes are applied only after
//      it completes.
//   4. Remove the agents killed during the pass, then generate any chunk a
//      surviving agent has walked into for the first time.
//   5. Stamp the collected events with the tick number, keeping at most one
//      `ResourcesChanged` per player.
//
// Agents are advanced checked-out of the arena (`Arena::take`) so the
// controller can borrow the agent mutably while still reading the others,
// e.g. the target of a fight.
//
// ## Boundary operations
//
// `place_building` and `purchase` are the economy entry points. Both check
// the full precondition (ownership, state, affordability, free cells) before
// touching anything, so a failure leaves the state unchanged. Agent commands
// (`set_target_location`, `attack`, `stop_agents`) validate every listed
// agent before redirecting any of them.
//
// ## Save/load
//
// `SimState` derives `Serialize`/`Deserialize`. The noise tables, cached
// biome grids and every spatial lookup table are transient and rebuilt by
// `rebuild_transient_state()` from the seed, the structure arena and the
// agent positions. `to_json()`/`from_json()` wrap the full cycle.
//
// See also: `controller.rs` for agent behaviour, `worldgen.rs` for chunk
// generation, `spatial.rs` for the index, `command.rs` and `event.rs` for
// the boundary types, `view.rs` for renderer queries.
//
// **Critical constraint: determinism.** All state mutations flow through
// `SimCommand` or the tick loop. No external input (system time, thread
// state, etc.) may influence the simulation; the only parallelism (noise
// evaluation) produces bitwise-identical results regardless of scheduling.

use crate::agent::Agent;
use crate::arena::Arena;
use crate::building::{Building, available_actions};
use crate::command::{SimAction, SimCommand};
use crate::config::GameConfig;
use crate::controller::{self, TickContext};
use crate::error::SimError;
use crate::event::{SimEvent, SimEventKind};
use crate::player::Player;
use crate::prng::GameRng;
use crate::spatial::SpatialIndex;
use crate::structure::Structure;
use crate::types::*;
use crate::worldgen::{BiomeGrid, WorldGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Where `new_game` puts the starting colonists, relative to the camp.
const STARTING_COLONS: [Point; 5] = [
    Point::new(-3, 1),
    Point::new(-3, 2),
    Point::new(-3, 3),
    Point::new(-2, 3),
    Point::new(-1, 3),
];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimState {
    /// Number of completed `step` calls.
    pub tick: u64,
    /// Summed tick durations, in seconds.
    pub elapsed: f64,
    pub seed: u64,
    pub rng: GameRng,
    pub config: GameConfig,
    pub generator: WorldGenerator,
    pub spatial: SpatialIndex,
    pub agents: Arena<AgentId, Agent>,
    pub players: Vec<Player>,

    /// Events raised since the last `step` returned.
    #[serde(skip)]
    pending: Vec<SimEventKind>,
}

/// The result of applying commands and advancing one tick.
#[derive(Debug, Default)]
pub struct StepResult {
    pub events: Vec<SimEvent>,
    /// Agents whose position changed this tick.
    pub moved: Vec<AgentId>,
    pub rejected: Vec<SimError>,
}

impl SimState {
    /// Create an empty world with default config and the given seed.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, GameConfig::default())
    }

    /// Create an empty world: no players, no structures, no chunks yet.
    pub fn with_config(seed: u64, config: GameConfig) -> Self {
        let generator = WorldGenerator::new(seed, &config.noise);
        Self {
            tick: 0,
            elapsed: 0.0,
            seed,
            rng: GameRng::new(seed),
            config,
            generator,
            spatial: SpatialIndex::new(),
            agents: Arena::new(),
            players: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// The standard opening: one player with a prebuilt camp at the origin,
    /// five colonists beside it, and the chunks around the origin generated
    /// after the camp so that seeding never overlaps it.
    pub fn new_game(seed: u64, config: GameConfig) -> Result<Self, SimError> {
        config.validate()?;
        let mut state = Self::with_config(seed, config);
        let player = state.add_player();
        state.place_building(player, BuildingType::BaseCamp, Point::ORIGIN, Orientation::North)?;
        let cell_size = state.config.cell_size;
        for cell in STARTING_COLONS {
            state.spawn_agent(player, AgentType::Colon, Vec2::cell_center(cell, cell_size))?;
        }
        let r = state.config.starting_chunk_radius;
        for x in -r..=r {
            for y in -r..=r {
                state.chunk(Point::new(x, y));
            }
        }
        info!(seed, structures = state.spatial.structure_count(), "new_game");
        Ok(state)
    }

    // -----------------------------------------------------------------------
    // Players
    // -----------------------------------------------------------------------

    /// Add a player with the configured starting stockpile.
    pub fn add_player(&mut self) -> PlayerId {
        let id = PlayerId(self.players.len() as u32);
        self.players
            .push(Player::new(id, &self.config.starting_resources));
        id
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id.0 as usize)
    }

    fn player_or_err(&self, id: PlayerId) -> Result<&Player, SimError> {
        self.player(id).ok_or(SimError::UnknownPlayer(id))
    }

    // -----------------------------------------------------------------------
    // Terrain
    // -----------------------------------------------------------------------

    /// Biome grid for `chunk`, generating it on first access.
    pub fn chunk(&mut self, chunk: Point) -> &BiomeGrid {
        let generated =
            self.generator
                .get_chunk(chunk, &mut self.spatial, &mut self.rng, &self.config);
        if generated.fresh {
            self.pending.push(SimEventKind::ChunkGenerated {
                chunk,
                deposits: generated.placed.len(),
            });
        }
        generated.grid
    }

    // -----------------------------------------------------------------------
    // Structures and agents
    // -----------------------------------------------------------------------

    /// Pay for and place a building. Nothing changes on failure.
    pub fn place_building(
        &mut self,
        player: PlayerId,
        building_type: BuildingType,
        anchor: Point,
        orientation: Orientation,
    ) -> Result<StructureId, SimError> {
        let def = self.config.building(building_type)?;
        let owner = self.player_or_err(player)?;
        owner.can_afford(&def.cost)?;
        let building = Building::new(
            building_type,
            player,
            def,
            owner.upgrades.building_health_multiplier(),
        );
        let cost = def.cost.clone();
        let structure = Structure::building(anchor, orientation, def.half_extent, building);
        let id = self.spatial.place_structure(structure)?;

        let changed = match self.players.get_mut(player.0 as usize) {
            Some(owner) => owner.debit(&cost)?,
            None => false,
        };
        self.pending.push(SimEventKind::StructurePlaced {
            structure: id,
            anchor,
        });
        if changed {
            self.pending
                .push(SimEventKind::ResourcesChanged { player });
        }
        debug!(structure = %id, ?building_type, %anchor, %player, "building_placed");
        Ok(id)
    }

    /// Create an idle agent with its type's configured stats.
    pub fn spawn_agent(
        &mut self,
        owner: PlayerId,
        agent_type: AgentType,
        position: Vec2,
    ) -> Result<AgentId, SimError> {
        self.player_or_err(owner)?;
        let stats = self.config.agent_stats(agent_type)?.clone();
        let id = self
            .agents
            .insert_with(|id| Agent::new(id, agent_type, owner, stats, position));
        self.spatial
            .place_agent(id, position.cell(self.config.cell_size).chunk());
        self.pending.push(SimEventKind::AgentSpawned {
            agent: id,
            agent_type,
            owner,
        });
        Ok(id)
    }

    /// Buy one of a completed building's actions. Returns the spawned agent
    /// for `SpawnUnit`.
    pub fn purchase(
        &mut self,
        player: PlayerId,
        building_id: StructureId,
        action: BuildingAction,
    ) -> Result<Option<AgentId>, SimError> {
        let structure = self
            .spatial
            .structure(building_id)
            .ok_or(SimError::UnknownStructure(building_id))?;
        let building = structure
            .as_building()
            .ok_or_else(|| SimError::InvalidTarget(format!("structure {building_id} is not a building")))?;
        if building.owner != player {
            return Err(SimError::NotOwner {
                player,
                subject: format!("structure {building_id}"),
            });
        }
        if !building.is_built() {
            return Err(SimError::BuildingNotReady(building_id));
        }
        let building_type = building.building_type;
        let owner = self.player_or_err(player)?;
        let def = self.config.building(building_type)?;
        let offer = available_actions(def, &owner.upgrades)
            .find(|offer| offer.action == action)
            .ok_or(SimError::ActionUnavailable {
                building: building_type,
                action,
            })?;
        owner.can_afford(&offer.cost)?;
        let cost = offer.cost.clone();
        if let BuildingAction::SpawnUnit(agent_type) = action {
            self.config.agent_stats(agent_type)?;
        }
        let cells: Vec<Point> = structure.cells().collect();

        // Everything is checked; from here on nothing fails.
        let Some(owner) = self.players.get_mut(player.0 as usize) else {
            return Err(SimError::UnknownPlayer(player));
        };
        if owner.debit(&cost)? {
            self.pending
                .push(SimEventKind::ResourcesChanged { player });
        }

        match action {
            BuildingAction::SpawnUnit(agent_type) => {
                let cell = cells[self.rng.range_usize(0, cells.len())];
                let position = Vec2::cell_center(cell, self.config.cell_size);
                let agent = self.spawn_agent(player, agent_type, position)?;
                info!(agent = %agent, ?agent_type, %player, "unit_spawned");
                Ok(Some(agent))
            }
            BuildingAction::Research(technology) => {
                owner.upgrades.research(technology);
                if technology == Technology::BuildingHealth {
                    let factor = owner.upgrades.building_health_multiplier();
                    for id in self.spatial.buildings().to_vec() {
                        if let Some(b) = self
                            .spatial
                            .structure_mut(id)
                            .and_then(|s| s.as_building_mut())
                            && b.owner == player
                        {
                            b.scale_health(factor);
                        }
                    }
                }
                info!(?technology, %player, "technology_researched");
                self.pending.push(SimEventKind::TechnologyResearched {
                    player,
                    technology,
                });
                Ok(None)
            }
        }
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Check every agent exists and belongs to `player`.
    fn check_agents(&self, player: PlayerId, agents: &[AgentId]) -> Result<(), SimError> {
        self.player_or_err(player)?;
        for &id in agents {
            let agent = self.agents.get(id).ok_or(SimError::UnknownAgent(id))?;
            if agent.owner != player {
                return Err(SimError::NotOwner {
                    player,
                    subject: format!("agent {id}"),
                });
            }
        }
        Ok(())
    }

    /// Run `f` on a checked-out agent with the world context.
    fn with_agent<R>(
        &mut self,
        id: AgentId,
        f: impl FnOnce(&mut Agent, &mut TickContext<'_>) -> R,
    ) -> Result<R, SimError> {
        let mut agent = self.agents.take(id).ok_or(SimError::UnknownAgent(id))?;
        let mut slain = Vec::new();
        let result = {
            let mut ctx = TickContext {
                config: &self.config,
                spatial: &mut self.spatial,
                agents: &mut self.agents,
                players: &mut self.players,
                rng: &mut self.rng,
                events: &mut self.pending,
                slain: &mut slain,
            };
            f(&mut agent, &mut ctx)
        };
        if self.agents.restore(id, agent).is_err() {
            warn!(agent = %id, "agent_restore_failed");
        }
        self.bury(slain);
        Ok(result)
    }

    /// Send agents to `cell`; the occupant decides what they do there.
    pub fn set_target_location(
        &mut self,
        player: PlayerId,
        agents: &[AgentId],
        cell: Point,
    ) -> Result<(), SimError> {
        self.check_agents(player, agents)?;
        for &id in agents {
            self.with_agent(id, |agent, ctx| controller::go_to_location(agent, cell, ctx))?;
        }
        Ok(())
    }

    /// Order agents to chase and attack another player's agent.
    pub fn attack(
        &mut self,
        player: PlayerId,
        agents: &[AgentId],
        target: AgentId,
    ) -> Result<(), SimError> {
        self.check_agents(player, agents)?;
        let victim = self
            .agents
            .get(target)
            .ok_or(SimError::UnknownAgent(target))?;
        if victim.owner == player {
            return Err(SimError::InvalidTarget(format!(
                "agent {target} belongs to the attacker"
            )));
        }
        for &id in agents {
            self.with_agent(id, |agent, ctx| controller::engage(agent, target, ctx))?;
        }
        Ok(())
    }

    pub fn stop_agents(&mut self, player: PlayerId, agents: &[AgentId]) -> Result<(), SimError> {
        self.check_agents(player, agents)?;
        for &id in agents {
            self.with_agent(id, |agent, ctx| controller::stop_task(agent, ctx.spatial))?;
        }
        Ok(())
    }

    /// Remove dead agents from every index.
    fn bury(&mut self, slain: Vec<AgentId>) {
        for id in slain {
            let Some(mut agent) = self.agents.remove(id) else {
                continue;
            };
            controller::leave_site(&mut agent, &mut self.spatial);
            self.spatial.remove_agent(id);
            info!(agent = %id, agent_type = ?agent.agent_type, owner = %agent.owner, "agent_died");
            self.pending.push(SimEventKind::AgentDied {
                agent: id,
                agent_type: agent.agent_type,
                owner: agent.owner,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Apply a single command.
    pub fn apply_command(&mut self, cmd: &SimCommand) -> Result<(), SimError> {
        let player = cmd.player_id;
        match &cmd.action {
            SimAction::SetTargetLocation { agents, cell } => {
                self.set_target_location(player, agents, *cell)
            }
            SimAction::AttackAgent { agents, target } => self.attack(player, agents, *target),
            SimAction::StopAgents { agents } => self.stop_agents(player, agents),
            SimAction::PlaceBuilding {
                building_type,
                anchor,
                orientation,
            } => self
                .place_building(player, *building_type, *anchor, *orientation)
                .map(|_| ()),
            SimAction::Purchase { building, action } => {
                self.purchase(player, *building, *action).map(|_| ())
            }
        }
    }

    /// Apply `commands`, then advance the world by `duration` seconds.
    pub fn step(&mut self, commands: &[SimCommand], duration: f64) -> StepResult {
        self.tick += 1;
        let mut rejected = Vec::new();
        for cmd in commands {
            if let Err(err) = self.apply_command(cmd) {
                debug!(tick = self.tick, player = %cmd.player_id, %err, "command_rejected");
                rejected.push(err);
            }
        }
        let moved = self.advance_world(duration.max(0.0));
        StepResult {
            events: self.drain_events(),
            moved,
            rejected,
        }
    }

    fn advance_world(&mut self, dt: f64) -> Vec<AgentId> {
        self.elapsed += dt;
        self.update_buildings(dt);

        let mut slain = Vec::new();
        let mut moved = Vec::new();
        for id in self.spatial.agent_buckets() {
            let Some(mut agent) = self.agents.take(id) else {
                continue;
            };
            if agent.is_alive() {
                let mut ctx = TickContext {
                    config: &self.config,
                    spatial: &mut self.spatial,
                    agents: &mut self.agents,
                    players: &mut self.players,
                    rng: &mut self.rng,
                    events: &mut self.pending,
                    slain: &mut slain,
                };
                if controller::advance(&mut agent, dt, &mut ctx) {
                    moved.push(id);
                }
            }
            if self.agents.restore(id, agent).is_err() {
                warn!(agent = %id, "agent_restore_failed");
            }
        }

        // Chunk membership is only touched once the pass is over.
        let cell_size = self.config.cell_size;
        let locations: Vec<(AgentId, Point)> = self
            .agents
            .iter()
            .map(|(id, agent)| (id, agent.chunk(cell_size)))
            .collect();
        for &(id, chunk) in &locations {
            self.spatial.relocate_agent(id, chunk);
        }

        slain.sort();
        slain.dedup();
        moved.retain(|id| slain.binary_search(id).is_err());
        self.bury(slain);

        if self.config.generate_visited_chunks {
            let visited: BTreeSet<Point> = locations
                .into_iter()
                .map(|(_, chunk)| chunk)
                .filter(|&chunk| !self.generator.is_generated(chunk))
                .collect();
            for chunk in visited {
                self.chunk(chunk);
            }
        }
        moved
    }

    /// Accrue construction progress; completions are reported once.
    fn update_buildings(&mut self, dt: f64) {
        for id in self.spatial.buildings().to_vec() {
            let Some(building) = self
                .spatial
                .structure_mut(id)
                .and_then(|s| s.as_building_mut())
            else {
                continue;
            };
            let time_multiplier = self
                .players
                .get(building.owner.0 as usize)
                .map_or(1.0, |p| p.upgrades.building_time_multiplier());
            if building.update(dt, time_multiplier) {
                info!(structure = %id, building = ?building.building_type, "building_completed");
                self.pending.push(SimEventKind::BuildingCompleted {
                    structure: id,
                    building_type: building.building_type,
                });
            }
        }
    }

    /// Stamp pending events, keeping one `ResourcesChanged` per player.
    fn drain_events(&mut self) -> Vec<SimEvent> {
        let tick = self.tick;
        let mut notified = BTreeSet::new();
        self.pending
            .drain(..)
            .filter(|kind| match kind {
                SimEventKind::ResourcesChanged { player } => notified.insert(*player),
                _ => true,
            })
            .map(|kind| SimEvent { tick, kind })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Rebuild all transient (`#[serde(skip)]`) state after deserialization:
    /// noise tables, the spatial lookup tables and agent chunk buckets.
    pub fn rebuild_transient_state(&mut self) -> Result<(), SimError> {
        self.generator.rebuild(&self.config.noise);
        let cell_size = self.config.cell_size;
        let agents: Vec<(AgentId, Point)> = self
            .agents
            .iter()
            .map(|(id, agent)| (id, agent.chunk(cell_size)))
            .collect();
        self.spatial.rebuild(agents)?;
        self.pending.clear();
        Ok(())
    }

    /// Serialize the simulation state to a JSON string.
    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a snapshot and rebuild transient state.
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let mut state: SimState = serde_json::from_str(json)?;
        state.config.validate()?;
        state.rebuild_transient_state()?;
        Ok(state)
    }

    /// Count living agents of a given type.
    pub fn agent_count(&self, agent_type: AgentType) -> usize {
        self.agents
            .iter()
            .filter(|(_, a)| a.agent_type == agent_type)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentState, WorkMode};
    use crate::building::BuildingState;

    /// Empty world with one player and no chunk generation, so tests
    /// control every structure.
    fn bare() -> (SimState, PlayerId) {
        let config = GameConfig {
            generate_visited_chunks: false,
            ..GameConfig::default()
        };
        let mut sim = SimState::with_config(7, config);
        let player = sim.add_player();
        (sim, player)
    }

    fn rich(sim: &mut SimState, player: PlayerId) {
        for resource in ResourceType::ALL {
            sim.players[player.0 as usize].add_resource(resource, 5000.0);
        }
    }

    #[test]
    fn new_game_opening() {
        let sim = SimState::new_game(42, GameConfig::default()).unwrap();
        assert_eq!(sim.players.len(), 1);
        assert_eq!(sim.agent_count(AgentType::Colon), 5);
        let camp = sim.spatial.buildings_of(BuildingType::BaseCamp);
        assert_eq!(camp.len(), 1);
        let (id, structure) = sim.spatial.structure_at(Point::ORIGIN).unwrap();
        assert_eq!(id, camp[0]);
        assert!(structure.as_building().unwrap().is_built());
        // Starting chunks exist and none of their deposits overlap the camp.
        assert_eq!(sim.generator.generated_chunks().count(), 9);
        for cell in structure.cells() {
            assert_eq!(sim.spatial.occupant(cell), Some(id));
        }
        assert_eq!(sim.player(PlayerId(0)).unwrap().resource(ResourceType::Food), 200.0);
    }

    #[test]
    fn placement_debits_and_reports() {
        let (mut sim, player) = bare();
        let wood = sim.player(player).unwrap().resource(ResourceType::Wood);
        let id = sim
            .place_building(player, BuildingType::Farm, Point::new(4, 4), Orientation::North)
            .unwrap();
        assert_eq!(sim.player(player).unwrap().resource(ResourceType::Wood), wood - 50.0);
        let events = sim.step(&[], 0.1).events;
        assert!(events.iter().any(|e| e.kind
            == SimEventKind::StructurePlaced {
                structure: id,
                anchor: Point::new(4, 4)
            }));
        assert!(events.iter().all(|e| e.tick == 1));
    }

    #[test]
    fn unaffordable_placement_changes_nothing() {
        let (mut sim, player) = bare();
        let before = *sim.player(player).unwrap().resources();
        let err = sim
            .place_building(player, BuildingType::MinerCamp, Point::new(4, 4), Orientation::North)
            .unwrap_err();
        assert!(matches!(err, SimError::InsufficientResources { resource: ResourceType::Stone, .. }));
        assert_eq!(*sim.player(player).unwrap().resources(), before);
        assert_eq!(sim.spatial.structure_count(), 0);
    }

    #[test]
    fn conflicting_placement_is_not_charged() {
        let (mut sim, player) = bare();
        sim.place_building(player, BuildingType::Farm, Point::new(2, 2), Orientation::North)
            .unwrap();
        let wood = sim.player(player).unwrap().resource(ResourceType::Wood);
        let err = sim
            .place_building(player, BuildingType::Farm, Point::new(3, 3), Orientation::North)
            .unwrap_err();
        assert!(matches!(err, SimError::CellOccupied { .. }));
        assert_eq!(sim.player(player).unwrap().resource(ResourceType::Wood), wood);
    }

    #[test]
    fn builders_complete_a_farm() {
        let (mut sim, player) = bare();
        let farm = sim
            .place_building(player, BuildingType::Farm, Point::new(5, 0), Orientation::North)
            .unwrap();
        let a = sim
            .spawn_agent(player, AgentType::Colon, Vec2::cell_center(Point::new(2, 0), 30.0))
            .unwrap();
        let b = sim
            .spawn_agent(player, AgentType::Colon, Vec2::cell_center(Point::new(2, 1), 30.0))
            .unwrap();
        sim.set_target_location(player, &[a, b], Point::new(5, 0)).unwrap();

        let mut completed = false;
        for _ in 0..400 {
            let result = sim.step(&[], 0.1);
            completed |= result.events.iter().any(|e| {
                matches!(e.kind, SimEventKind::BuildingCompleted { structure, .. } if structure == farm)
            });
        }
        assert!(completed);
        let building = sim.spatial.structure(farm).unwrap().as_building().unwrap();
        assert_eq!(building.state, BuildingState::Built);
        assert_eq!(building.workers, 0);
        assert_eq!(sim.agent(a).unwrap().state, AgentState::Idle);
    }

    #[test]
    fn purchase_spawns_on_footprint() {
        let (mut sim, player) = bare();
        let camp = sim
            .place_building(player, BuildingType::BaseCamp, Point::ORIGIN, Orientation::North)
            .unwrap();
        let food = sim.player(player).unwrap().resource(ResourceType::Food);
        let agent = sim
            .purchase(player, camp, BuildingAction::SpawnUnit(AgentType::Colon))
            .unwrap()
            .unwrap();
        assert_eq!(sim.player(player).unwrap().resource(ResourceType::Food), food - 150.0);
        let cell = sim.agent(agent).unwrap().cell(30.0);
        assert_eq!(sim.spatial.occupant(cell), Some(camp));

        // 50 food left: the second purchase is refused without a debit.
        let err = sim
            .purchase(player, camp, BuildingAction::SpawnUnit(AgentType::Colon))
            .unwrap_err();
        assert!(matches!(err, SimError::InsufficientResources { .. }));
        assert_eq!(sim.player(player).unwrap().resource(ResourceType::Food), food - 150.0);
    }

    #[test]
    fn purchase_preconditions() {
        let (mut sim, player) = bare();
        rich(&mut sim, player);
        let other = sim.add_player();
        let pantry = sim
            .place_building(player, BuildingType::Pantry, Point::new(10, 10), Orientation::North)
            .unwrap();
        let spawn = BuildingAction::SpawnUnit(AgentType::Farmer);
        assert!(matches!(
            sim.purchase(player, pantry, spawn),
            Err(SimError::BuildingNotReady(_))
        ));
        assert!(matches!(
            sim.purchase(other, pantry, spawn),
            Err(SimError::NotOwner { .. })
        ));

        let building = sim
            .spatial
            .structure_mut(pantry)
            .and_then(|s| s.as_building_mut())
            .unwrap();
        building.add_worker();
        assert!(building.update(200.0, 1.0));
        building.remove_worker();
        assert!(matches!(
            sim.purchase(player, pantry, BuildingAction::SpawnUnit(AgentType::Soldier)),
            Err(SimError::ActionUnavailable { building: BuildingType::Pantry, .. })
        ));
        assert!(sim.purchase(player, pantry, spawn).unwrap().is_some());
        assert_eq!(sim.agent_count(AgentType::Farmer), 1);
    }

    #[test]
    fn research_is_offered_once_and_boosts_health() {
        let (mut sim, player) = bare();
        rich(&mut sim, player);
        let camp = sim
            .place_building(player, BuildingType::BaseCamp, Point::ORIGIN, Orientation::North)
            .unwrap();
        let tech = BuildingAction::Research(Technology::BuildingHealth);
        assert_eq!(sim.purchase(player, camp, tech).unwrap(), None);
        assert!(sim.player(player).unwrap().upgrades.has(Technology::BuildingHealth));
        let camp_health = sim.spatial.structure(camp).unwrap().health();
        assert_eq!(camp_health, 4000.0);
        assert!(matches!(
            sim.purchase(player, camp, tech),
            Err(SimError::ActionUnavailable { .. })
        ));

        // New buildings start with the boosted health.
        let farm = sim
            .place_building(player, BuildingType::Farm, Point::new(6, 0), Orientation::North)
            .unwrap();
        assert_eq!(sim.spatial.structure(farm).unwrap().health(), 600.0);
        let events = sim.step(&[], 0.1).events;
        assert!(events.iter().any(|e| e.kind
            == SimEventKind::TechnologyResearched {
                player,
                technology: Technology::BuildingHealth
            }));
    }

    #[test]
    fn commands_for_foreign_agents_are_rejected() {
        let (mut sim, player) = bare();
        let other = sim.add_player();
        let mine = sim
            .spawn_agent(player, AgentType::Colon, Vec2::new(15.0, 15.0))
            .unwrap();
        let theirs = sim
            .spawn_agent(other, AgentType::Colon, Vec2::new(105.0, 15.0))
            .unwrap();
        let cmd = SimCommand {
            player_id: player,
            action: SimAction::SetTargetLocation {
                agents: vec![mine, theirs],
                cell: Point::new(8, 8),
            },
        };
        let result = sim.step(&[cmd], 0.1);
        assert_eq!(result.rejected.len(), 1);
        // Validation runs before any agent is redirected.
        assert_eq!(sim.agent(mine).unwrap().state, AgentState::Idle);

        let own_goal = SimCommand {
            player_id: player,
            action: SimAction::AttackAgent {
                agents: vec![mine],
                target: mine,
            },
        };
        assert!(matches!(
            sim.step(&[own_goal], 0.1).rejected.as_slice(),
            [SimError::InvalidTarget(_)]
        ));
    }

    #[test]
    fn fights_end_with_a_burial() {
        let (mut sim, player) = bare();
        let other = sim.add_player();
        let soldier = sim
            .spawn_agent(player, AgentType::Soldier, Vec2::cell_center(Point::ORIGIN, 30.0))
            .unwrap();
        let victim = sim
            .spawn_agent(other, AgentType::Colon, Vec2::cell_center(Point::new(1, 0), 30.0))
            .unwrap();
        sim.attack(player, &[soldier], victim).unwrap();
        assert_eq!(sim.agent(soldier).unwrap().work, WorkMode::Fighting);

        let mut died = false;
        for _ in 0..80 {
            let events = sim.step(&[], 0.1).events;
            died |= events
                .iter()
                .any(|e| matches!(e.kind, SimEventKind::AgentDied { agent, .. } if agent == victim));
        }
        assert!(died);
        assert!(sim.agent(victim).is_none());
        assert_eq!(sim.spatial.agent_count(), 1);
        assert_eq!(sim.agent(soldier).unwrap().state, AgentState::Idle);
    }

    #[test]
    fn stop_releases_the_agent() {
        let (mut sim, player) = bare();
        let a = sim
            .spawn_agent(player, AgentType::Colon, Vec2::new(15.0, 15.0))
            .unwrap();
        sim.set_target_location(player, &[a], Point::new(20, 0)).unwrap();
        sim.step(&[], 0.5);
        sim.stop_agents(player, &[a]).unwrap();
        let agent = sim.agent(a).unwrap();
        assert_eq!(agent.state, AgentState::Idle);
        assert_eq!(agent.path, vec![agent.position]);
    }

    #[test]
    fn walking_agents_change_buckets_and_generate_chunks() {
        let mut sim = SimState::new(3);
        let player = sim.add_player();
        let a = sim
            .spawn_agent(player, AgentType::Soldier, Vec2::cell_center(Point::new(30, 0), 30.0))
            .unwrap();
        assert_eq!(sim.spatial.agent_chunk(a), Some(Point::ORIGIN));
        sim.set_target_location(player, &[a], Point::new(34, 0)).unwrap();
        let mut moved = false;
        for _ in 0..10 {
            moved |= sim.step(&[], 0.5).moved.contains(&a);
        }
        assert!(moved);
        assert_eq!(sim.spatial.agent_chunk(a), Some(Point::new(1, 0)));
        assert!(sim.generator.is_generated(Point::new(1, 0)));
    }

    #[test]
    fn resources_changed_once_per_player_per_tick() {
        let (mut sim, player) = bare();
        sim.place_building(player, BuildingType::Farm, Point::new(4, 4), Orientation::North)
            .unwrap();
        sim.place_building(player, BuildingType::Farm, Point::new(10, 4), Orientation::North)
            .unwrap();
        let events = sim.step(&[], 0.1).events;
        let notices = events
            .iter()
            .filter(|e| matches!(e.kind, SimEventKind::ResourcesChanged { .. }))
            .count();
        assert_eq!(notices, 1);
    }

    #[test]
    fn json_roundtrip_rebuilds_indices() {
        let mut sim = SimState::new_game(11, GameConfig::default()).unwrap();
        for _ in 0..5 {
            sim.step(&[], 0.1);
        }
        let json = sim.to_json().unwrap();
        let mut restored = SimState::from_json(&json).unwrap();
        assert_eq!(restored.tick, sim.tick);
        assert_eq!(restored.rng, sim.rng);
        assert_eq!(restored.spatial.occupied_count(), sim.spatial.occupied_count());
        assert_eq!(restored.spatial.agent_count(), 5);
        assert_eq!(
            restored.spatial.buildings_of(BuildingType::BaseCamp),
            sim.spatial.buildings_of(BuildingType::BaseCamp)
        );

        // Generated chunks come back with identical biomes and no reseeding.
        let original = sim.chunk(Point::ORIGIN).clone();
        let structures = restored.spatial.structure_count();
        assert_eq!(restored.chunk(Point::ORIGIN), &original);
        assert_eq!(restored.spatial.structure_count(), structures);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        assert!(matches!(SimState::from_json("{"), Err(SimError::Json(_))));
    }
}
