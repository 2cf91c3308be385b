// Read-only queries for the renderer and UI.
//
// Everything a frontend needs to draw a frame, flattened into plain view
// structs so it never has to reach into sim internals:
//
// - **Terrain:** `chunk_biomes(chunk)` and `area_around_chunk(chunk, r)`.
//   These take `&mut self` because a chunk that has never been requested is
//   generated on demand.
// - **Structures:** `structures_in_chunk(chunk)` with each structure's cells,
//   health and, for buildings, owner and construction progress.
// - **Agents:** `agents_in_chunk(chunk)` with position, facing and task.
// - **Economy:** `building_progress(id)`, `building_actions(player, id)` with
//   affordability, `resources(player)`.
//
// See also: `sim.rs` for `SimState`, `spatial.rs` for the chunk lookups these
// are built on.

use crate::agent::{AgentState, WorkMode};
use crate::building::{BuildingState, available_actions};
use crate::config::Cost;
use crate::error::SimError;
use crate::sim::SimState;
use crate::structure::StructureKind;
use crate::types::*;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StructureClass {
    Tree,
    Ore(OreType),
    Building(BuildingType),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StructureView {
    pub id: StructureId,
    pub class: StructureClass,
    pub anchor: Point,
    pub orientation: Orientation,
    pub cells: Vec<Point>,
    pub health: f64,
    pub owner: Option<PlayerId>,
    pub state: Option<BuildingState>,
    /// Construction completion in `[0, 1]`; `None` for trees and ores.
    pub progress: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentView {
    pub id: AgentId,
    pub agent_type: AgentType,
    pub owner: PlayerId,
    pub position: Vec2,
    pub facing: Facing,
    pub state: AgentState,
    pub work: WorkMode,
    pub health: f64,
    /// Summed held resources.
    pub carrying: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionOffer {
    pub action: BuildingAction,
    pub cost: Cost,
    pub affordable: bool,
}

impl SimState {
    /// `(absolute cell, biome)` for every cell of `chunk`.
    pub fn chunk_biomes(&mut self, chunk: Point) -> Vec<(Point, Biome)> {
        let origin = chunk.chunk_origin();
        self.chunk(chunk)
            .iter()
            .map(|(local, biome)| (origin + local, biome))
            .collect()
    }

    /// Chunk coordinates of the square of half-width `radius` around
    /// `center`, x-major, each generated if needed.
    pub fn area_around_chunk(&mut self, center: Point, radius: i32) -> Vec<Point> {
        let r = radius.max(0);
        let mut area = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for x in -r..=r {
            for y in -r..=r {
                let chunk = center + Point::new(x, y);
                self.chunk(chunk);
                area.push(chunk);
            }
        }
        area
    }

    pub fn structures_in_chunk(&self, chunk: Point) -> Vec<StructureView> {
        self.spatial
            .structures_in_chunk(chunk)
            .into_iter()
            .filter_map(|id| {
                let s = self.spatial.structure(id)?;
                let (class, owner, state, progress) = match &s.kind {
                    StructureKind::Tree(_) => (StructureClass::Tree, None, None, None),
                    StructureKind::Ore { ore, .. } => (StructureClass::Ore(*ore), None, None, None),
                    StructureKind::Building(b) => (
                        StructureClass::Building(b.building_type),
                        Some(b.owner),
                        Some(b.state),
                        Some(b.progress_ratio()),
                    ),
                };
                Some(StructureView {
                    id,
                    class,
                    anchor: s.anchor,
                    orientation: s.orientation,
                    cells: s.cells().collect(),
                    health: s.health(),
                    owner,
                    state,
                    progress,
                })
            })
            .collect()
    }

    pub fn agents_in_chunk(&self, chunk: Point) -> Vec<AgentView> {
        self.spatial
            .agents_in_chunk(chunk)
            .iter()
            .filter_map(|&id| self.agents.get(id))
            .map(|a| AgentView {
                id: a.id,
                agent_type: a.agent_type,
                owner: a.owner,
                position: a.position,
                facing: a.facing,
                state: a.state,
                work: a.work,
                health: a.health,
                carrying: a.held.total(),
            })
            .collect()
    }

    /// Construction progress ratio of a building, for progress bars.
    pub fn building_progress(&self, id: StructureId) -> Option<f64> {
        self.spatial
            .structure(id)
            .and_then(|s| s.as_building())
            .map(|b| b.progress_ratio())
    }

    /// What `player` may buy at building `id` right now. Empty until the
    /// building is complete.
    pub fn building_actions(
        &self,
        player: PlayerId,
        id: StructureId,
    ) -> Result<Vec<ActionOffer>, SimError> {
        let building = self
            .spatial
            .structure(id)
            .ok_or(SimError::UnknownStructure(id))?
            .as_building()
            .ok_or_else(|| SimError::InvalidTarget(format!("structure {id} is not a building")))?;
        let owner = self.player(player).ok_or(SimError::UnknownPlayer(player))?;
        if building.owner != player {
            return Err(SimError::NotOwner {
                player,
                subject: format!("structure {id}"),
            });
        }
        if !building.is_built() {
            return Ok(Vec::new());
        }
        let def = self.config.building(building.building_type)?;
        Ok(available_actions(def, &owner.upgrades)
            .map(|offer| ActionOffer {
                action: offer.action,
                cost: offer.cost.clone(),
                affordable: owner.can_afford(&offer.cost).is_ok(),
            })
            .collect())
    }

    /// Snapshot of a player's ledger.
    pub fn resources(&self, player: PlayerId) -> Option<ResourceLedger> {
        self.player(player).map(|p| *p.resources())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    #[test]
    fn chunk_biomes_cover_the_chunk() {
        let mut sim = SimState::new(5);
        let biomes = sim.chunk_biomes(Point::new(-1, 2));
        assert_eq!(biomes.len(), (CHUNK_SIZE * CHUNK_SIZE) as usize);
        assert!(biomes.iter().all(|(cell, _)| cell.chunk() == Point::new(-1, 2)));
        assert!(sim.generator.is_generated(Point::new(-1, 2)));
    }

    #[test]
    fn area_generates_every_chunk() {
        let mut sim = SimState::new(5);
        let area = sim.area_around_chunk(Point::new(3, 3), 1);
        assert_eq!(area.len(), 9);
        assert_eq!(area[0], Point::new(2, 2));
        assert!(area.iter().all(|&c| sim.generator.is_generated(c)));
    }

    #[test]
    fn opening_is_visible() {
        let sim = SimState::new_game(8, GameConfig::default()).unwrap();
        let structures = sim.structures_in_chunk(Point::ORIGIN);
        let camp = structures
            .iter()
            .find(|s| s.class == StructureClass::Building(BuildingType::BaseCamp))
            .unwrap();
        assert_eq!(camp.cells.len(), 25);
        assert_eq!(camp.progress, Some(1.0));
        assert_eq!(camp.owner, Some(PlayerId(0)));

        // The colonists stand just west of the camp.
        assert_eq!(sim.agents_in_chunk(Point::new(-1, 0)).len(), 5);
        assert!(sim.agents_in_chunk(Point::ORIGIN).is_empty());
        assert_eq!(sim.resources(PlayerId(0)).unwrap()[ResourceType::Wood], 150.0);
        assert!(sim.resources(PlayerId(3)).is_none());
    }

    #[test]
    fn offers_reflect_affordability() {
        let sim = SimState::new_game(8, GameConfig::default()).unwrap();
        let camp = sim.spatial.buildings_of(BuildingType::BaseCamp)[0];
        let offers = sim.building_actions(PlayerId(0), camp).unwrap();
        assert_eq!(offers.len(), 4);
        let colon = offers
            .iter()
            .find(|o| o.action == BuildingAction::SpawnUnit(AgentType::Colon))
            .unwrap();
        assert!(colon.affordable);
        assert_eq!(offers.iter().filter(|o| !o.affordable).count(), 3);
    }

    #[test]
    fn unfinished_building_offers_nothing() {
        let mut sim = SimState::new(1);
        let player = sim.add_player();
        // Starting stock lacks stone for a pantry.
        let err = sim
            .place_building(player, BuildingType::Pantry, Point::new(4, 4), Orientation::East)
            .unwrap_err();
        assert!(matches!(err, SimError::InsufficientResources { .. }));
        let farm = sim
            .place_building(player, BuildingType::Farm, Point::new(4, 4), Orientation::East)
            .unwrap();
        assert_eq!(sim.building_actions(player, farm).unwrap(), Vec::new());
        assert_eq!(sim.building_progress(farm), Some(0.0));
    }
}
