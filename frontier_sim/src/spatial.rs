// Chunk-indexed occupancy for structures and agents.
//
// `SpatialIndex` owns every placed `Structure` in a generational arena and
// keeps the lookup tables that the rest of the sim queries:
//
// - `occupied`: absolute cell -> structure (unique; the A* obstruction test).
// - `chunk_cells`: chunk -> occupied cells in that chunk (renderer queries).
// - `trees` / `ores`: anchor chunk -> deposits, for worldgen density caps.
// - `buildings` / `buildings_by_type`: flat and per-type lists for the
//   nearest-depot scan.
// - `chunk_agents` / `agent_chunks`: chunk membership of every agent.
//
// Only the structure arena is serialized. Every table above is derived and
// rebuilt by `rebuild()` after a snapshot load.
//
// `place_structure` checks the whole footprint before touching anything, so a
// conflict leaves every table unchanged. `remove_structure` clears exactly the
// cells recorded at placement.
//
// See also: `worldgen.rs` which seeds deposits through `place_structure`,
// `pathfinding.rs` for the `Occupancy` trait, `sim.rs` which defers agent
// relocation until after the agent pass.
//
// **Critical constraint: determinism.** Everything iterated for simulation
// decisions is a `BTreeMap` or an insertion-ordered `Vec`. The `FxHashMap`s
// are lookup-only.

use crate::arena::Arena;
use crate::config::DepositKind;
use crate::error::SimError;
use crate::pathfinding::Occupancy;
use crate::structure::{Structure, StructureKind};
use crate::types::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Chunk offsets searched for a density count of width `radius`.
///
/// Offsets are drawn from `[0, -1, 1, -2, 2, ..]`, so width 1 is the chunk
/// itself, width 2 adds the chunks to the negative side, and odd widths give
/// a centred square.
pub fn neighborhood(radius: i32) -> Vec<Point> {
    let r = radius.max(1);
    let mut values = vec![0];
    for i in 1..=r / 2 {
        values.push(-i);
        values.push(i);
    }
    let r = r as usize;
    (0..r * r)
        .map(|i| Point::new(values[i / r], values[i % r]))
        .collect()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SpatialIndex {
    structures: Arena<StructureId, Structure>,
    #[serde(skip)]
    occupied: FxHashMap<Point, StructureId>,
    #[serde(skip)]
    chunk_cells: BTreeMap<Point, BTreeSet<Point>>,
    #[serde(skip)]
    trees: BTreeMap<Point, Vec<StructureId>>,
    #[serde(skip)]
    ores: BTreeMap<Point, BTreeMap<OreType, Vec<StructureId>>>,
    #[serde(skip)]
    buildings: Vec<StructureId>,
    #[serde(skip)]
    buildings_by_type: BTreeMap<BuildingType, Vec<StructureId>>,
    #[serde(skip)]
    chunk_agents: BTreeMap<Point, Vec<AgentId>>,
    #[serde(skip)]
    agent_chunks: FxHashMap<AgentId, Point>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Structures
    // -----------------------------------------------------------------------

    /// First footprint cell that is already taken, if any.
    pub fn conflict(&self, structure: &Structure) -> Option<Point> {
        structure
            .cells()
            .find(|cell| self.occupied.contains_key(cell))
    }

    /// Register a structure. Fails without mutation if any footprint cell is
    /// occupied.
    pub fn place_structure(&mut self, structure: Structure) -> Result<StructureId, SimError> {
        if let Some(cell) = self.conflict(&structure) {
            return Err(SimError::CellOccupied { cell });
        }
        let id = self.structures.insert(structure);
        self.index_structure(id);
        Ok(id)
    }

    fn index_structure(&mut self, id: StructureId) {
        let Some(structure) = self.structures.get(id) else {
            return;
        };
        for cell in structure.cells() {
            self.occupied.insert(cell, id);
            self.chunk_cells.entry(cell.chunk()).or_default().insert(cell);
        }
        let anchor_chunk = structure.anchor.chunk();
        match &structure.kind {
            StructureKind::Tree(_) => self.trees.entry(anchor_chunk).or_default().push(id),
            StructureKind::Ore { ore, .. } => self
                .ores
                .entry(anchor_chunk)
                .or_default()
                .entry(*ore)
                .or_default()
                .push(id),
            StructureKind::Building(b) => {
                self.buildings.push(id);
                self.buildings_by_type
                    .entry(b.building_type)
                    .or_default()
                    .push(id);
            }
        }
    }

    /// Unregister and return a structure. Stale ids return `None`.
    pub fn remove_structure(&mut self, id: StructureId) -> Option<Structure> {
        let structure = self.structures.remove(id)?;
        for cell in structure.cells() {
            if self.occupied.get(&cell) == Some(&id) {
                self.occupied.remove(&cell);
            }
            let chunk = cell.chunk();
            if let Some(cells) = self.chunk_cells.get_mut(&chunk) {
                cells.remove(&cell);
                if cells.is_empty() {
                    self.chunk_cells.remove(&chunk);
                }
            }
        }
        let anchor_chunk = structure.anchor.chunk();
        match &structure.kind {
            StructureKind::Tree(_) => {
                if let Some(list) = self.trees.get_mut(&anchor_chunk) {
                    list.retain(|&t| t != id);
                }
            }
            StructureKind::Ore { ore, .. } => {
                if let Some(list) = self
                    .ores
                    .get_mut(&anchor_chunk)
                    .and_then(|by_type| by_type.get_mut(ore))
                {
                    list.retain(|&o| o != id);
                }
            }
            StructureKind::Building(b) => {
                self.buildings.retain(|&x| x != id);
                if let Some(list) = self.buildings_by_type.get_mut(&b.building_type) {
                    list.retain(|&x| x != id);
                }
            }
        }
        Some(structure)
    }

    pub fn structure(&self, id: StructureId) -> Option<&Structure> {
        self.structures.get(id)
    }

    pub fn structure_mut(&mut self, id: StructureId) -> Option<&mut Structure> {
        self.structures.get_mut(id)
    }

    pub fn structures(&self) -> impl Iterator<Item = (StructureId, &Structure)> {
        self.structures.iter()
    }

    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }

    pub fn occupant(&self, cell: Point) -> Option<StructureId> {
        self.occupied.get(&cell).copied()
    }

    pub fn structure_at(&self, cell: Point) -> Option<(StructureId, &Structure)> {
        let id = self.occupant(cell)?;
        self.structures.get(id).map(|s| (id, s))
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied.len()
    }

    /// Occupied cells inside `chunk`, in cell order.
    pub fn cells_in_chunk(&self, chunk: Point) -> impl Iterator<Item = Point> + '_ {
        self.chunk_cells
            .get(&chunk)
            .into_iter()
            .flat_map(|cells| cells.iter().copied())
    }

    /// Structures with at least one cell in `chunk`, each listed once, in
    /// first-cell order.
    pub fn structures_in_chunk(&self, chunk: Point) -> Vec<StructureId> {
        let mut seen = Vec::new();
        for cell in self.cells_in_chunk(chunk) {
            if let Some(id) = self.occupant(cell)
                && !seen.contains(&id)
            {
                seen.push(id);
            }
        }
        seen
    }

    pub fn buildings(&self) -> &[StructureId] {
        &self.buildings
    }

    pub fn buildings_of(&self, building_type: BuildingType) -> &[StructureId] {
        self.buildings_by_type
            .get(&building_type)
            .map_or(&[], Vec::as_slice)
    }

    pub fn trees_in_chunk(&self, chunk: Point) -> &[StructureId] {
        self.trees.get(&chunk).map_or(&[], Vec::as_slice)
    }

    pub fn ores_in_chunk(&self, chunk: Point, ore: OreType) -> &[StructureId] {
        self.ores
            .get(&chunk)
            .and_then(|by_type| by_type.get(&ore))
            .map_or(&[], Vec::as_slice)
    }

    /// Deposits anchored in the `radius`-wide neighbourhood of `center`.
    /// For ores, only the `counted` types contribute.
    pub fn count_deposits(
        &self,
        center: Point,
        radius: i32,
        kind: DepositKind,
        counted: &[OreType],
    ) -> usize {
        neighborhood(radius)
            .into_iter()
            .map(|offset| {
                let chunk = center + offset;
                match kind {
                    DepositKind::Tree => self.trees_in_chunk(chunk).len(),
                    DepositKind::Ore(_) => counted
                        .iter()
                        .map(|&ore| self.ores_in_chunk(chunk, ore).len())
                        .sum(),
                }
            })
            .sum()
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Add an agent to a chunk bucket. An agent already registered is moved.
    pub fn place_agent(&mut self, agent: AgentId, chunk: Point) {
        if self.agent_chunks.contains_key(&agent) {
            self.relocate_agent(agent, chunk);
            return;
        }
        self.agent_chunks.insert(agent, chunk);
        self.chunk_agents.entry(chunk).or_default().push(agent);
    }

    /// Move an agent between buckets. Returns true if its chunk changed.
    pub fn relocate_agent(&mut self, agent: AgentId, new_chunk: Point) -> bool {
        let Some(&old_chunk) = self.agent_chunks.get(&agent) else {
            self.place_agent(agent, new_chunk);
            return true;
        };
        if old_chunk == new_chunk {
            return false;
        }
        self.detach_agent(agent, old_chunk);
        self.agent_chunks.insert(agent, new_chunk);
        self.chunk_agents.entry(new_chunk).or_default().push(agent);
        true
    }

    /// Drop an agent from its bucket. Returns the chunk it was in.
    pub fn remove_agent(&mut self, agent: AgentId) -> Option<Point> {
        let chunk = self.agent_chunks.remove(&agent)?;
        self.detach_agent(agent, chunk);
        Some(chunk)
    }

    fn detach_agent(&mut self, agent: AgentId, chunk: Point) {
        if let Some(bucket) = self.chunk_agents.get_mut(&chunk) {
            bucket.retain(|&a| a != agent);
            if bucket.is_empty() {
                self.chunk_agents.remove(&chunk);
            }
        }
    }

    pub fn agent_chunk(&self, agent: AgentId) -> Option<Point> {
        self.agent_chunks.get(&agent).copied()
    }

    pub fn agents_in_chunk(&self, chunk: Point) -> &[AgentId] {
        self.chunk_agents.get(&chunk).map_or(&[], Vec::as_slice)
    }

    /// Every agent, bucket by bucket in chunk order. A snapshot: later
    /// relocations do not affect it.
    pub fn agent_buckets(&self) -> Vec<AgentId> {
        self.chunk_agents.values().flatten().copied().collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agent_chunks.len()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Rebuild every derived table from the structure arena and the given
    /// agent locations. Fails if two stored structures overlap.
    pub fn rebuild(
        &mut self,
        agents: impl IntoIterator<Item = (AgentId, Point)>,
    ) -> Result<(), SimError> {
        self.occupied.clear();
        self.chunk_cells.clear();
        self.trees.clear();
        self.ores.clear();
        self.buildings.clear();
        self.buildings_by_type.clear();
        self.chunk_agents.clear();
        self.agent_chunks.clear();

        for id in self.structures.ids() {
            if let Some(structure) = self.structures.get(id)
                && let Some(cell) = self.conflict(structure)
            {
                return Err(SimError::CellOccupied { cell });
            }
            self.index_structure(id);
        }
        for (agent, chunk) in agents {
            self.place_agent(agent, chunk);
        }
        Ok(())
    }
}

impl Occupancy for SpatialIndex {
    fn occupant(&self, cell: Point) -> Option<StructureId> {
        SpatialIndex::occupant(self, cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaId;
    use crate::building::Building;
    use crate::config::GameConfig;

    fn tree_at(x: i32, y: i32) -> Structure {
        Structure::tree(Point::new(x, y), Orientation::North, 200.0)
    }

    fn agent(index: u32) -> AgentId {
        AgentId::from_parts(index, 0)
    }

    #[test]
    fn neighborhood_shapes() {
        assert_eq!(neighborhood(1), vec![Point::ORIGIN]);
        assert_eq!(
            neighborhood(2),
            vec![
                Point::new(0, 0),
                Point::new(0, -1),
                Point::new(-1, 0),
                Point::new(-1, -1)
            ]
        );
        let three = neighborhood(3);
        assert_eq!(three.len(), 9);
        assert!(three.contains(&Point::new(1, 1)));
        assert!(three.contains(&Point::new(-1, 1)));
        assert_eq!(neighborhood(5).len(), 25);
    }

    #[test]
    fn place_and_remove_keeps_tables_consistent() {
        let mut index = SpatialIndex::new();
        let id = index.place_structure(tree_at(31, 0)).unwrap();
        // A 3x3 tree on a chunk seam spans chunks (0,0), (1,0), (0,-1), (1,-1).
        assert_eq!(index.occupied_count(), 9);
        assert_eq!(index.cells_in_chunk(Point::new(1, 0)).count(), 2);
        assert_eq!(index.cells_in_chunk(Point::new(0, -1)).count(), 2);
        assert_eq!(index.trees_in_chunk(Point::ORIGIN), &[id]);
        assert_eq!(index.structures_in_chunk(Point::new(1, -1)), vec![id]);

        let removed = index.remove_structure(id).unwrap();
        assert_eq!(removed.anchor, Point::new(31, 0));
        assert_eq!(index.occupied_count(), 0);
        assert_eq!(index.cells_in_chunk(Point::new(1, 0)).count(), 0);
        assert!(index.trees_in_chunk(Point::ORIGIN).is_empty());
        assert!(index.remove_structure(id).is_none());
    }

    #[test]
    fn conflicting_placement_changes_nothing() {
        let mut index = SpatialIndex::new();
        let first = index.place_structure(tree_at(2, 2)).unwrap();
        let err = index.place_structure(tree_at(4, 4)).unwrap_err();
        assert!(matches!(err, SimError::CellOccupied { cell } if cell == Point::new(3, 3)));
        assert_eq!(index.occupant(Point::new(2, 2)), Some(first));
        assert_eq!(index.occupied_count(), 9);
        assert_eq!(index.structure_count(), 1);
        assert_eq!(index.trees_in_chunk(Point::ORIGIN).len(), 1);
    }

    #[test]
    fn buildings_are_listed_by_type() {
        let config = GameConfig::default();
        let def = &config.buildings[&BuildingType::LumberCamp];
        let mut index = SpatialIndex::new();
        let camp = index
            .place_structure(Structure::building(
                Point::new(10, 10),
                Orientation::North,
                def.half_extent,
                Building::new(BuildingType::LumberCamp, PlayerId(0), def, 1.0),
            ))
            .unwrap();
        assert_eq!(index.buildings(), &[camp]);
        assert_eq!(index.buildings_of(BuildingType::LumberCamp), &[camp]);
        assert!(index.buildings_of(BuildingType::Pantry).is_empty());
        index.remove_structure(camp);
        assert!(index.buildings().is_empty());
        assert!(index.buildings_of(BuildingType::LumberCamp).is_empty());
    }

    #[test]
    fn deposit_counts_respect_neighbourhood_and_types() {
        let mut index = SpatialIndex::new();
        index
            .place_structure(Structure::ore(Point::new(5, 5), OreType::Iron, Orientation::North, 1.0))
            .unwrap();
        index
            .place_structure(Structure::ore(Point::new(-20, 5), OreType::Stone, Orientation::North, 1.0))
            .unwrap();
        index.place_structure(tree_at(40, 40)).unwrap();

        let iron = DepositKind::Ore(OreType::Iron);
        assert_eq!(index.count_deposits(Point::ORIGIN, 1, iron, &[OreType::Iron]), 1);
        assert_eq!(index.count_deposits(Point::ORIGIN, 1, iron, &[OreType::Iron, OreType::Stone]), 1);
        // Width 2 reaches chunk (-1, 0) where the stone sits.
        assert_eq!(index.count_deposits(Point::ORIGIN, 2, iron, &[OreType::Iron, OreType::Stone]), 2);
        assert_eq!(index.count_deposits(Point::ORIGIN, 1, DepositKind::Tree, &[]), 0);
        assert_eq!(index.count_deposits(Point::ORIGIN, 3, DepositKind::Tree, &[]), 1);
    }

    #[test]
    fn agents_belong_to_exactly_one_bucket() {
        let mut index = SpatialIndex::new();
        index.place_agent(agent(0), Point::ORIGIN);
        index.place_agent(agent(1), Point::ORIGIN);
        assert!(index.relocate_agent(agent(0), Point::new(1, 0)));
        assert!(!index.relocate_agent(agent(0), Point::new(1, 0)));
        assert_eq!(index.agents_in_chunk(Point::ORIGIN), &[agent(1)]);
        assert_eq!(index.agents_in_chunk(Point::new(1, 0)), &[agent(0)]);

        // Re-placing moves instead of duplicating.
        index.place_agent(agent(1), Point::new(1, 0));
        assert!(index.agents_in_chunk(Point::ORIGIN).is_empty());
        assert_eq!(index.agent_buckets(), vec![agent(0), agent(1)]);

        assert_eq!(index.remove_agent(agent(0)), Some(Point::new(1, 0)));
        assert_eq!(index.remove_agent(agent(0)), None);
        assert_eq!(index.agent_count(), 1);
    }

    #[test]
    fn rebuild_after_round_trip() {
        let mut index = SpatialIndex::new();
        let tree = index.place_structure(tree_at(3, 3)).unwrap();
        index.place_agent(agent(4), Point::new(-1, 2));

        let json = serde_json::to_string(&index).unwrap();
        let mut restored: SpatialIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.occupied_count(), 0);
        restored.rebuild([(agent(4), Point::new(-1, 2))]).unwrap();
        assert_eq!(restored.occupant(Point::new(4, 4)), Some(tree));
        assert_eq!(restored.trees_in_chunk(Point::ORIGIN), &[tree]);
        assert_eq!(restored.agent_chunk(agent(4)), Some(Point::new(-1, 2)));
    }
}
