// Per-agent task state machine with leftover-time chaining.
//
// `advance(agent, dt, ctx)` spends one tick's duration on an agent. The
// duration is handed to whichever phase is active; each phase returns the
// part it did not use (0 when it consumed everything, >0 when it finished
// early), and the loop hands that remainder to the next phase. A single tick
// can therefore finish a walk, fill up at a tree, and start walking back to
// the depot, provided each phase completes with time to spare.
//
// Phases, chosen from the agent's state fields:
//
//   Walk       plain move order; the agent goes idle on arrival
//   Travel     walking to a work site or depot (`en_route`)
//   Gather     fill up at the source, up to capacity
//   Deposit    empty the inventory into the owner's ledger
//   Construct  stand on a building site until it is built
//   Demolish   damage a hostile building
//   Fight      hit the target agent when in range, otherwise chase it
//
// Phases that wait on the world (Construct, Demolish, Fight) always consume
// the whole remainder. A phase that ends the task returns what it did not
// use, which becomes the tick's idle remainder. The loop is also capped at
// `max_phases_per_tick` switches.
//
// Transitions are `go_to_location` (classify the target cell's occupant and
// path there), `engage` (chase an agent) and `stop_task`. Pathing failure
// never surfaces as an error: the agent stalls in place with a single-point
// path and its task dropped, and the failure is logged at debug.
//
// Sources, depots and sites are re-checked by identity before each use, so a
// structure removed while an agent is walking to it (or replaced by another
// in the same cell) is detected instead of being gathered from.
//
// See also: `agent.rs` for the fields driven here, `pathfinding.rs` for
// routes, `sim.rs` which calls `advance` once per agent per tick.
//
// **Critical constraint: determinism.** Everything here is a function of the
// agent, the world state passed in `TickContext` and the shared RNG, which is
// only drawn from for final-waypoint jitter.

use crate::agent::{Agent, AgentState, GatherState, WorkMode};
use crate::arena::Arena;
use crate::config::GameConfig;
use crate::event::SimEventKind;
use crate::pathfinding::{self, PathError};
use crate::player::Player;
use crate::prng::GameRng;
use crate::spatial::SpatialIndex;
use crate::structure::{Depletion, Interaction, depot_types};
use crate::types::*;
use smallvec::SmallVec;
use tracing::debug;

/// Durations below this are treated as fully spent.
pub const TIME_EPSILON: f64 = 1e-9;

/// Mutable world state an agent may touch while it advances. The agent being
/// advanced is checked out of `agents`.
pub struct TickContext<'a> {
    pub config: &'a GameConfig,
    pub spatial: &'a mut SpatialIndex,
    pub agents: &'a mut Arena<AgentId, Agent>,
    pub players: &'a mut [Player],
    pub rng: &'a mut GameRng,
    pub events: &'a mut Vec<SimEventKind>,
    /// Agents killed this tick, removed by the caller after the agent pass.
    pub slain: &'a mut Vec<AgentId>,
}

impl TickContext<'_> {
    fn cell_size(&self) -> f64 {
        self.config.cell_size
    }

    fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id.0 as usize)
    }

    fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id.0 as usize)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskPhase {
    Walk,
    Travel,
    Gather,
    Deposit,
    Construct,
    Demolish,
    Fight,
}

/// How one `advance` call spent its duration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickTrace {
    pub spans: SmallVec<[(TaskPhase, f64); 8]>,
    /// Duration left over when the agent went idle or hit the phase cap.
    pub remainder: f64,
}

impl TickTrace {
    /// Total duration handed to phases.
    pub fn applied(&self) -> f64 {
        self.spans.iter().map(|&(_, d)| d).sum()
    }

    pub fn phases(&self) -> impl Iterator<Item = TaskPhase> + '_ {
        self.spans.iter().map(|&(p, _)| p)
    }
}

// ---------------------------------------------------------------------------
// Tick entry points
// ---------------------------------------------------------------------------

/// Spend `dt` seconds on `agent`. Returns true if its position changed.
pub fn advance(agent: &mut Agent, dt: f64, ctx: &mut TickContext<'_>) -> bool {
    advance_traced(agent, dt, ctx, None)
}

/// `advance`, optionally recording each phase's share of `dt`.
pub fn advance_traced(
    agent: &mut Agent,
    dt: f64,
    ctx: &mut TickContext<'_>,
    mut trace: Option<&mut TickTrace>,
) -> bool {
    let start = agent.position;
    let mut remaining = dt.max(0.0);
    let mut switches = 0;

    while remaining > TIME_EPSILON
        && agent.state != AgentState::Idle
        && switches < ctx.config.max_phases_per_tick
    {
        switches += 1;
        let Some(phase) = current_phase(agent) else {
            stop_task(agent, ctx.spatial);
            break;
        };
        let before = remaining;
        remaining = match phase {
            TaskPhase::Walk => walk(agent, remaining),
            TaskPhase::Travel => travel(agent, remaining, ctx),
            TaskPhase::Gather => gather(agent, remaining, ctx),
            TaskPhase::Deposit => deposit(agent, remaining, ctx),
            TaskPhase::Construct => construct(agent, remaining, ctx),
            TaskPhase::Demolish => demolish(agent, remaining, ctx),
            TaskPhase::Fight => fight(agent, remaining, ctx),
        }
        .clamp(0.0, before);
        if let Some(trace) = trace.as_deref_mut() {
            trace.spans.push((phase, before - remaining));
        }
    }

    if let Some(trace) = trace {
        trace.remainder = remaining;
    }
    agent.position != start
}

fn current_phase(agent: &Agent) -> Option<TaskPhase> {
    match agent.state {
        AgentState::Idle => None,
        AgentState::Moving => Some(TaskPhase::Walk),
        AgentState::Working if agent.en_route => Some(TaskPhase::Travel),
        AgentState::Working => match agent.work {
            WorkMode::Gathering => Some(match agent.gather {
                GatherState::Gathering => TaskPhase::Gather,
                GatherState::Depositing => TaskPhase::Deposit,
            }),
            WorkMode::Building => Some(TaskPhase::Construct),
            WorkMode::Destroying => Some(TaskPhase::Demolish),
            WorkMode::Hunting | WorkMode::Fighting => Some(TaskPhase::Fight),
            WorkMode::Idle => None,
        },
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Advance along the path by `dt * speed` waypoints. Returns the time left
/// after reaching the final waypoint (0 while still underway).
pub fn move_along_path(agent: &mut Agent, dt: f64) -> f64 {
    let Some(&end) = agent.path.last() else {
        return dt;
    };
    let last = (agent.path.len() - 1) as f64;
    let old = agent.progress.min(last);
    let speed = agent.stats.speed;
    agent.progress = old + dt * speed;

    if agent.progress < last {
        let i = agent.progress.floor() as usize;
        let from = agent.path[i];
        let to = agent.path[i + 1];
        agent.position = from.lerp(to, agent.progress - i as f64);
        if let Some(facing) = Facing::from_delta(to - from) {
            agent.facing = facing;
        }
        return 0.0;
    }

    agent.progress = last;
    agent.position = end;
    if let [.., from, to] = agent.path.as_slice()
        && let Some(facing) = Facing::from_delta(*to - *from)
    {
        agent.facing = facing;
    }
    (dt - (last - old) / speed).max(0.0)
}

fn walk(agent: &mut Agent, dt: f64) -> f64 {
    let left = move_along_path(agent, dt);
    if agent.path_complete() {
        agent.state = AgentState::Idle;
    }
    left
}

fn travel(agent: &mut Agent, dt: f64, ctx: &mut TickContext<'_>) -> f64 {
    let left = move_along_path(agent, dt);
    if !agent.path_complete() {
        return left;
    }
    agent.en_route = false;
    if agent.work == WorkMode::Building
        && let Some(site) = agent.target_structure
        && let Some(building) = ctx
            .spatial
            .structure_mut(site)
            .and_then(|s| s.as_building_mut())
    {
        building.add_worker();
        agent.on_site = Some(site);
    }
    left
}

/// Source is still the structure the agent was sent to.
fn source_intact(agent: &Agent, spatial: &SpatialIndex) -> bool {
    match (agent.target_cell, agent.target_structure) {
        (Some(cell), Some(id)) => spatial.occupant(cell) == Some(id),
        _ => false,
    }
}

fn gather(agent: &mut Agent, dt: f64, ctx: &mut TickContext<'_>) -> f64 {
    let (Some(source), Some(resource)) = (agent.target_structure, agent.resource) else {
        stop_task(agent, ctx.spatial);
        return dt;
    };
    if !source_intact(agent, ctx.spatial) {
        if agent.held.is_empty() {
            stop_task(agent, ctx.spatial);
        } else {
            begin_depositing(agent, ctx);
        }
        return dt;
    }

    let category = resource.category();
    let mut speed = agent.stats.gather_speed
        * ctx
            .player(agent.owner)
            .map_or(1.0, |p| p.upgrades.gather_multiplier(category));
    if agent.agent_type.specialty() == Some(category) {
        speed *= 2.0;
    }

    let room = agent.room();
    let amount = (dt * speed).min(room);
    agent.held[resource] += amount;
    let full = agent.room() <= QUANTITY_EPSILON;
    let left = if full {
        (dt - room / speed).max(0.0)
    } else {
        0.0
    };

    // Source wear uses the base rate; multipliers only speed up the agent.
    let worked = dt - left;
    let depletion = ctx
        .spatial
        .structure_mut(source)
        .and_then(|s| s.extract(worked * agent.stats.gather_speed));
    if let Some(depletion) = depletion {
        remove_depleted(source, depletion, ctx);
    }

    if full || depletion.is_some() {
        begin_depositing(agent, ctx);
    }
    left
}

fn deposit(agent: &mut Agent, dt: f64, ctx: &mut TickContext<'_>) -> f64 {
    let valid = agent
        .depot
        .zip(agent.resource)
        .is_some_and(|(depot, resource)| is_depot(ctx.spatial, depot, agent.owner, resource));
    if !valid {
        // The depot vanished while we stood in it: look for another.
        begin_depositing(agent, ctx);
        return dt;
    }

    let rate = ctx.config.deposit_speed;
    let mut remaining = dt;
    let mut changed = false;
    for resource in ResourceType::ALL {
        let held = agent.held[resource];
        if held <= QUANTITY_EPSILON {
            agent.held[resource] = 0.0;
            continue;
        }
        let amount = (remaining * rate).min(held);
        if let Some(player) = ctx.player_mut(agent.owner) {
            changed |= player.add_resource(resource, amount);
        }
        remaining -= amount / rate;
        if held - amount > QUANTITY_EPSILON {
            agent.held[resource] = held - amount;
            remaining = 0.0;
            break;
        }
        agent.held[resource] = 0.0;
    }
    if changed {
        ctx.events.push(SimEventKind::ResourcesChanged {
            player: agent.owner,
        });
    }
    if !agent.held.is_empty() {
        return 0.0;
    }

    resume_gathering(agent, ctx);
    remaining.max(0.0)
}

fn construct(agent: &mut Agent, dt: f64, ctx: &mut TickContext<'_>) -> f64 {
    let finished = agent
        .target_structure
        .and_then(|id| ctx.spatial.structure(id))
        .and_then(|s| s.as_building())
        .is_none_or(|b| b.is_built());
    if finished {
        stop_task(agent, ctx.spatial);
        return dt;
    }
    0.0
}

fn demolish(agent: &mut Agent, dt: f64, ctx: &mut TickContext<'_>) -> f64 {
    let hostile = source_intact(agent, ctx.spatial)
        && agent
            .target_structure
            .and_then(|id| ctx.spatial.structure(id))
            .and_then(|s| s.as_building())
            .is_some_and(|b| b.owner != agent.owner);
    let Some(site) = agent.target_structure.filter(|_| hostile) else {
        stop_task(agent, ctx.spatial);
        return dt;
    };
    let depletion = ctx
        .spatial
        .structure_mut(site)
        .and_then(|s| s.damage(dt * agent.stats.gather_speed));
    if let Some(depletion) = depletion {
        remove_depleted(site, depletion, ctx);
        stop_task(agent, ctx.spatial);
    }
    0.0
}

fn fight(agent: &mut Agent, dt: f64, ctx: &mut TickContext<'_>) -> f64 {
    let Some(target_id) = agent.target_agent else {
        stop_task(agent, ctx.spatial);
        return dt;
    };
    let Some(target) = ctx.agents.get(target_id).filter(|t| t.is_alive()) else {
        stop_task(agent, ctx.spatial);
        return dt;
    };

    if target.position.distance(agent.position) <= ctx.config.engagement_range() {
        let multiplier = ctx.player(agent.owner).map_or(1.0, |p| {
            if agent.work == WorkMode::Hunting {
                p.upgrades.hunt_multiplier()
            } else {
                p.upgrades.combat_multiplier()
            }
        });
        let damage = agent.stats.damage * multiplier * dt;
        let killed = ctx
            .agents
            .get_mut(target_id)
            .is_some_and(|t| t.take_damage(damage));
        if killed {
            ctx.slain.push(target_id);
            stop_task(agent, ctx.spatial);
        }
        return 0.0;
    }

    // Chase the target's current cell; no lead.
    let goal = target.cell(ctx.cell_size());
    match route_to(agent, goal, ctx) {
        Ok(()) => {
            move_along_path(agent, dt);
        }
        Err(err) => {
            debug!(agent = %agent.id, %err, "chase_path_failed");
            agent.path = vec![agent.position];
            agent.progress = 0.0;
        }
    }
    0.0
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Send the agent to `cell`, choosing its work from whatever occupies it.
pub fn go_to_location(agent: &mut Agent, cell: Point, ctx: &mut TickContext<'_>) {
    stop_task(agent, ctx.spatial);
    agent.target_cell = Some(cell);

    let interaction = ctx.spatial.structure_at(cell).map(|(id, structure)| {
        let interaction = match ctx.player(agent.owner) {
            Some(player) => structure.interaction(agent.owner, &player.upgrades),
            None => Interaction::Visit,
        };
        (id, interaction)
    });

    match interaction {
        None | Some((_, Interaction::Visit)) => {
            agent.state = AgentState::Moving;
        }
        Some((id, Interaction::Construct)) => {
            agent.state = AgentState::Working;
            agent.work = WorkMode::Building;
            agent.target_structure = Some(id);
            agent.en_route = true;
        }
        Some((id, Interaction::Demolish)) => {
            agent.state = AgentState::Working;
            agent.work = WorkMode::Destroying;
            agent.target_structure = Some(id);
            agent.en_route = true;
        }
        Some((id, Interaction::Harvest { resource })) => {
            agent.state = AgentState::Working;
            agent.work = WorkMode::Gathering;
            agent.gather = GatherState::Gathering;
            agent.target_structure = Some(id);
            agent.resource = Some(resource);
            agent.en_route = true;
            agent.depot = nearest_depot(agent, resource, ctx).map(|(depot, _)| depot);
        }
    }

    if let Err(err) = route_to(agent, cell, ctx) {
        debug!(agent = %agent.id, %cell, %err, "path_failed");
        stop_task(agent, ctx.spatial);
    }
}

/// Chase and attack `target`. Hunters hunt; everyone else fights.
pub fn engage(agent: &mut Agent, target: AgentId, ctx: &mut TickContext<'_>) {
    stop_task(agent, ctx.spatial);
    if !ctx.agents.get(target).is_some_and(|t| t.is_alive()) {
        return;
    }
    agent.state = AgentState::Working;
    agent.work = if agent.agent_type == AgentType::Hunter {
        WorkMode::Hunting
    } else {
        WorkMode::Fighting
    };
    agent.target_agent = Some(target);
}

/// Release the worker slot and drop the task.
pub fn stop_task(agent: &mut Agent, spatial: &mut SpatialIndex) {
    leave_site(agent, spatial);
    agent.clear_task();
}

/// Release the building worker slot this agent holds, if any.
pub fn leave_site(agent: &mut Agent, spatial: &mut SpatialIndex) {
    if let Some(site) = agent.on_site.take()
        && let Some(building) = spatial.structure_mut(site).and_then(|s| s.as_building_mut())
    {
        building.remove_worker();
    }
}

/// Switch to hauling. Keeps the current depot if it still qualifies.
fn begin_depositing(agent: &mut Agent, ctx: &mut TickContext<'_>) {
    let Some(resource) = agent.resource else {
        stop_task(agent, ctx.spatial);
        return;
    };
    agent.gather = GatherState::Depositing;

    let current = agent
        .depot
        .filter(|&d| is_depot(ctx.spatial, d, agent.owner, resource));
    let routed = match current {
        Some(depot) => ctx
            .spatial
            .structure(depot)
            .map(|s| s.anchor)
            .map(|anchor| (depot, route_to(agent, anchor, ctx))),
        None => nearest_depot(agent, resource, ctx).map(|(depot, cells)| {
            set_path(agent, &cells, ctx);
            (depot, Ok(()))
        }),
    };

    match routed {
        Some((depot, Ok(()))) => {
            agent.depot = Some(depot);
            agent.en_route = true;
        }
        Some((_, Err(err))) => {
            debug!(agent = %agent.id, %err, "depot_path_failed");
            stop_task(agent, ctx.spatial);
        }
        None => {
            debug!(agent = %agent.id, ?resource, "no_depot");
            stop_task(agent, ctx.spatial);
        }
    }
}

/// After unloading, head back to the source if it still stands.
fn resume_gathering(agent: &mut Agent, ctx: &mut TickContext<'_>) {
    let Some(cell) = agent.target_cell.filter(|_| source_intact(agent, ctx.spatial)) else {
        stop_task(agent, ctx.spatial);
        return;
    };
    agent.gather = GatherState::Gathering;
    match route_to(agent, cell, ctx) {
        Ok(()) => agent.en_route = true,
        Err(err) => {
            debug!(agent = %agent.id, %err, "path_failed");
            stop_task(agent, ctx.spatial);
        }
    }
}

/// Remove a used-up structure and report it.
fn remove_depleted(id: StructureId, depletion: Depletion, ctx: &mut TickContext<'_>) {
    let Some(structure) = ctx.spatial.remove_structure(id) else {
        return;
    };
    let anchor = structure.anchor;
    let kind = match depletion {
        Depletion::TreeFelled => SimEventKind::TreeFelled {
            structure: id,
            anchor,
        },
        Depletion::OreExhausted(ore) => SimEventKind::OreExhausted {
            structure: id,
            ore,
            anchor,
        },
        Depletion::BuildingDestroyed(building_type) => {
            let owner = structure.as_building().map_or(PlayerId(0), |b| b.owner);
            debug!(structure = %id, ?building_type, %owner, "building_destroyed");
            SimEventKind::BuildingDestroyed {
                structure: id,
                building_type,
                owner,
            }
        }
    };
    ctx.events.push(kind);
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Own, completed building that accepts `resource`.
fn is_depot(spatial: &SpatialIndex, id: StructureId, owner: PlayerId, resource: ResourceType) -> bool {
    spatial
        .structure(id)
        .and_then(|s| s.as_building())
        .is_some_and(|b| {
            b.owner == owner && b.is_built() && depot_types(resource).contains(&b.building_type)
        })
}

/// Closest qualifying depot by path length, with its cell path. Ties go to
/// the first candidate in scan order; unreachable candidates are skipped.
pub fn nearest_depot(
    agent: &Agent,
    resource: ResourceType,
    ctx: &TickContext<'_>,
) -> Option<(StructureId, Vec<Point>)> {
    let start = agent.cell(ctx.cell_size());
    let mut best: Option<(StructureId, Vec<Point>)> = None;
    for &building_type in depot_types(resource) {
        for &id in ctx.spatial.buildings_of(building_type) {
            if !is_depot(ctx.spatial, id, agent.owner, resource) {
                continue;
            }
            let Some(anchor) = ctx.spatial.structure(id).map(|s| s.anchor) else {
                continue;
            };
            let Ok(cells) = pathfinding::find_path(&*ctx.spatial, start, anchor, &ctx.config.pathing)
            else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, b)| cells.len() < b.len()) {
                best = Some((id, cells));
            }
        }
    }
    best
}

/// Path from the agent's cell to `goal`; on success replaces the agent's path.
pub fn route_to(agent: &mut Agent, goal: Point, ctx: &mut TickContext<'_>) -> Result<(), PathError> {
    let start = agent.cell(ctx.cell_size());
    let cells = pathfinding::find_path(&*ctx.spatial, start, goal, &ctx.config.pathing)?;
    set_path(agent, &cells, ctx);
    Ok(())
}

fn set_path(agent: &mut Agent, cells: &[Point], ctx: &mut TickContext<'_>) {
    agent.path = waypoints(
        agent.position,
        cells,
        ctx.config.cell_size,
        ctx.config.waypoint_jitter_cells,
        ctx.rng,
    );
    agent.progress = 0.0;
}

/// Convert a cell path to world waypoints: cell centres, with the first
/// replaced by the current position and the last jittered.
pub fn waypoints(
    position: Vec2,
    cells: &[Point],
    cell_size: f64,
    jitter_cells: f64,
    rng: &mut GameRng,
) -> Vec<Vec2> {
    if cells.len() <= 1 {
        return vec![position];
    }
    let mut path: Vec<Vec2> = cells
        .iter()
        .map(|&c| Vec2::cell_center(c, cell_size))
        .collect();
    path[0] = position;
    let spread = jitter_cells * cell_size;
    if let Some(end) = path.last_mut() {
        *end = *end + Vec2::new(rng.symmetric(spread), rng.symmetric(spread));
    }
    path
}
