// Placed structures: trees, ore deposits and buildings.
//
// A `Structure` is an anchor cell, an orientation, an immutable footprint
// (already rotated when the structure is built) and a tagged payload
// (`StructureKind`). Type-specific behaviour goes through three entry points
// instead of per-type dispatch:
//
// - `cells()`: absolute occupied cells, for the occupancy index.
// - `interaction()`: what an agent ordered onto this structure will do.
// - `extract()` / `damage()`: apply gathering yield or demolition and return
//   a `Depletion` value when the structure is used up. The owning loop turns
//   that into removal plus a `SimEvent`; structures never remove themselves.
//
// See also: `spatial.rs` which owns every `Structure` in its arena,
// `building.rs` for the construction lifecycle, `controller.rs` which
// interprets `Interaction` and `Depletion`.

use crate::building::Building;
use crate::error::SimError;
use crate::player::Upgrades;
use crate::types::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Irregular ore deposit shape, in north orientation.
const ORE_TEMPLATE: [(i32, i32); 11] = [
    (-1, -1),
    (0, -1),
    (-2, 0),
    (-1, 0),
    (0, 0),
    (1, 0),
    (-2, 1),
    (-1, 1),
    (0, 1),
    (1, 1),
    (-1, 2),
];

// ---------------------------------------------------------------------------
// Footprint
// ---------------------------------------------------------------------------

/// Cell offsets occupied relative to an anchor. Never empty, no duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    offsets: SmallVec<[Point; 25]>,
}

impl Footprint {
    pub fn new(offsets: impl IntoIterator<Item = Point>) -> Result<Self, SimError> {
        let offsets: SmallVec<[Point; 25]> = offsets.into_iter().collect();
        if offsets.is_empty() {
            return Err(SimError::InvalidFootprint("no cells".into()));
        }
        for (i, offset) in offsets.iter().enumerate() {
            if offsets[..i].contains(offset) {
                return Err(SimError::InvalidFootprint(format!(
                    "offset {offset} listed twice"
                )));
            }
        }
        Ok(Self { offsets })
    }

    /// Square of side `2 * half_extent + 1` centred on the anchor.
    /// Negative extents are treated as zero.
    pub fn square(half_extent: i32) -> Self {
        let r = half_extent.max(0);
        let offsets = (-r..=r)
            .flat_map(|x| (-r..=r).map(move |y| Point::new(x, y)))
            .collect();
        Self { offsets }
    }

    pub fn tree() -> Self {
        Self::square(1)
    }

    pub fn ore() -> Self {
        Self {
            offsets: ORE_TEMPLATE
                .iter()
                .map(|&(x, y)| Point::new(x, y))
                .collect(),
        }
    }

    /// A copy turned clockwise by the orientation's quarter turns.
    pub fn rotated(&self, orientation: Orientation) -> Self {
        let turn = |p: Point| match orientation {
            Orientation::North => p,
            Orientation::East => Point::new(-p.y, p.x),
            Orientation::South => Point::new(-p.x, -p.y),
            Orientation::West => Point::new(p.y, -p.x),
        };
        Self {
            offsets: self.offsets.iter().map(|&p| turn(p)).collect(),
        }
    }

    pub fn offsets(&self) -> &[Point] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn cells(&self, anchor: Point) -> impl Iterator<Item = Point> + '_ {
        self.offsets.iter().map(move |&o| anchor + o)
    }
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// Remaining yield of a tree or ore deposit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub health: f64,
    pub max_health: f64,
}

impl Deposit {
    pub fn new(health: f64) -> Self {
        Self {
            health,
            max_health: health,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StructureKind {
    Tree(Deposit),
    Ore { ore: OreType, deposit: Deposit },
    Building(Building),
}

/// What an agent does when sent to a structure's cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interaction {
    /// Walk there and stand idle.
    Visit,
    /// Help construct an own building.
    Construct,
    /// Gather and haul to a depot.
    Harvest { resource: ResourceType },
    /// Tear down a hostile building.
    Demolish,
}

/// A structure has been used up and must be removed by its owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Depletion {
    TreeFelled,
    OreExhausted(OreType),
    BuildingDestroyed(BuildingType),
}

/// Building types that accept deliveries of `resource`, in search order.
pub fn depot_types(resource: ResourceType) -> &'static [BuildingType] {
    match resource.category() {
        ResourceCategory::Food => &[BuildingType::BaseCamp, BuildingType::Pantry],
        ResourceCategory::Wood => &[BuildingType::BaseCamp, BuildingType::LumberCamp],
        ResourceCategory::Mineral => &[BuildingType::BaseCamp, BuildingType::MinerCamp],
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub anchor: Point,
    pub orientation: Orientation,
    footprint: Footprint,
    pub kind: StructureKind,
}

impl Structure {
    /// `footprint` is in north orientation; it is rotated here, once.
    pub fn new(
        anchor: Point,
        orientation: Orientation,
        footprint: &Footprint,
        kind: StructureKind,
    ) -> Self {
        Self {
            anchor,
            orientation,
            footprint: footprint.rotated(orientation),
            kind,
        }
    }

    pub fn tree(anchor: Point, orientation: Orientation, health: f64) -> Self {
        Self::new(
            anchor,
            orientation,
            &Footprint::tree(),
            StructureKind::Tree(Deposit::new(health)),
        )
    }

    pub fn ore(anchor: Point, ore: OreType, orientation: Orientation, health: f64) -> Self {
        Self::new(
            anchor,
            orientation,
            &Footprint::ore(),
            StructureKind::Ore {
                ore,
                deposit: Deposit::new(health),
            },
        )
    }

    pub fn building(
        anchor: Point,
        orientation: Orientation,
        half_extent: i32,
        building: Building,
    ) -> Self {
        Self::new(
            anchor,
            orientation,
            &Footprint::square(half_extent),
            StructureKind::Building(building),
        )
    }

    pub fn footprint(&self) -> &Footprint {
        &self.footprint
    }

    pub fn cells(&self) -> impl Iterator<Item = Point> + '_ {
        self.footprint.cells(self.anchor)
    }

    pub fn health(&self) -> f64 {
        match &self.kind {
            StructureKind::Tree(d) | StructureKind::Ore { deposit: d, .. } => d.health,
            StructureKind::Building(b) => b.health,
        }
    }

    pub fn as_building(&self) -> Option<&Building> {
        match &self.kind {
            StructureKind::Building(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_building_mut(&mut self) -> Option<&mut Building> {
        match &mut self.kind {
            StructureKind::Building(b) => Some(b),
            _ => None,
        }
    }

    /// What an agent of `player` does here. Rare ores need the
    /// `ExtraMaterials` research before they count as harvestable.
    pub fn interaction(&self, player: PlayerId, upgrades: &Upgrades) -> Interaction {
        match &self.kind {
            StructureKind::Tree(_) => Interaction::Harvest {
                resource: ResourceType::Wood,
            },
            StructureKind::Ore { ore, .. } => {
                if ore.is_rare() && !upgrades.has(Technology::ExtraMaterials) {
                    Interaction::Visit
                } else {
                    Interaction::Harvest {
                        resource: ore.resource(),
                    }
                }
            }
            StructureKind::Building(b) if b.owner != player => Interaction::Demolish,
            StructureKind::Building(b) if !b.is_built() => Interaction::Construct,
            StructureKind::Building(b) if b.building_type == BuildingType::Farm => {
                Interaction::Harvest {
                    resource: ResourceType::Food,
                }
            }
            StructureKind::Building(_) => Interaction::Visit,
        }
    }

    /// Remove `amount` of yield. Buildings (farms) are inexhaustible.
    pub fn extract(&mut self, amount: f64) -> Option<Depletion> {
        match &mut self.kind {
            StructureKind::Tree(d) => {
                d.health -= amount;
                (d.health <= 0.0).then_some(Depletion::TreeFelled)
            }
            StructureKind::Ore { ore, deposit } => {
                deposit.health -= amount;
                (deposit.health <= 0.0).then_some(Depletion::OreExhausted(*ore))
            }
            StructureKind::Building(_) => None,
        }
    }

    /// Demolition damage. Only buildings can be demolished.
    pub fn damage(&mut self, amount: f64) -> Option<Depletion> {
        match &mut self.kind {
            StructureKind::Building(b) => b
                .take_damage(amount)
                .then_some(Depletion::BuildingDestroyed(b.building_type)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    #[test]
    fn footprint_rejects_empty_and_duplicates() {
        assert!(matches!(
            Footprint::new([]),
            Err(SimError::InvalidFootprint(_))
        ));
        assert!(matches!(
            Footprint::new([Point::new(0, 0), Point::new(1, 0), Point::new(0, 0)]),
            Err(SimError::InvalidFootprint(_))
        ));
        assert_eq!(Footprint::new([Point::new(2, 3)]).unwrap().len(), 1);
    }

    #[test]
    fn square_footprints() {
        assert_eq!(Footprint::square(0).offsets(), &[Point::ORIGIN]);
        assert_eq!(Footprint::tree().len(), 9);
        assert_eq!(Footprint::square(2).len(), 25);
        assert_eq!(Footprint::square(-3).len(), 1);
    }

    #[test]
    fn rotation_is_a_quarter_turn() {
        let arm = Footprint::new([Point::new(0, 0), Point::new(0, -1), Point::new(0, -2)]).unwrap();
        let east = arm.rotated(Orientation::East);
        assert_eq!(east.offsets(), &[Point::new(0, 0), Point::new(1, 0), Point::new(2, 0)]);
        let south = arm.rotated(Orientation::South);
        assert_eq!(south.offsets(), &[Point::new(0, 0), Point::new(0, 1), Point::new(0, 2)]);
        let west = arm.rotated(Orientation::West);
        assert_eq!(west.offsets(), &[Point::new(0, 0), Point::new(-1, 0), Point::new(-2, 0)]);
    }

    #[test]
    fn rotated_ore_keeps_distinct_cells() {
        for orientation in Orientation::ALL {
            let rotated = Footprint::ore().rotated(orientation);
            let rebuilt = Footprint::new(rotated.offsets().iter().copied()).unwrap();
            assert_eq!(rebuilt.len(), 11);
        }
    }

    #[test]
    fn structure_rotates_once_at_construction() {
        let ore = Structure::ore(Point::new(10, 10), OreType::Iron, Orientation::South, 100.0);
        let expected: Vec<Point> = Footprint::ore()
            .rotated(Orientation::South)
            .cells(Point::new(10, 10))
            .collect();
        assert_eq!(ore.cells().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn tree_depletes_with_event() {
        let mut tree = Structure::tree(Point::ORIGIN, Orientation::North, 10.0);
        assert_eq!(tree.extract(4.0), None);
        assert!((tree.health() - 6.0).abs() < 1e-12);
        assert_eq!(tree.extract(6.0), Some(Depletion::TreeFelled));
        // Demolishing a tree is meaningless.
        assert_eq!(tree.damage(100.0), None);
    }

    #[test]
    fn ore_interaction_respects_rare_unlock() {
        let crystal = Structure::ore(Point::ORIGIN, OreType::Crystal, Orientation::North, 300.0);
        let iron = Structure::ore(Point::ORIGIN, OreType::Iron, Orientation::North, 300.0);
        let mut upgrades = Upgrades::default();
        assert_eq!(crystal.interaction(PlayerId(0), &upgrades), Interaction::Visit);
        assert_eq!(
            iron.interaction(PlayerId(0), &upgrades),
            Interaction::Harvest {
                resource: ResourceType::Iron
            }
        );
        upgrades.research(Technology::ExtraMaterials);
        assert_eq!(
            crystal.interaction(PlayerId(0), &upgrades),
            Interaction::Harvest {
                resource: ResourceType::Crystal
            }
        );
    }

    #[test]
    fn building_interactions() {
        let config = GameConfig::default();
        let def = &config.buildings[&BuildingType::Farm];
        let mut farm = Structure::building(
            Point::ORIGIN,
            Orientation::North,
            def.half_extent,
            Building::new(BuildingType::Farm, PlayerId(0), def, 1.0),
        );
        let upgrades = Upgrades::default();
        assert_eq!(farm.interaction(PlayerId(0), &upgrades), Interaction::Construct);
        assert_eq!(farm.interaction(PlayerId(1), &upgrades), Interaction::Demolish);
        farm.as_building_mut().unwrap().add_worker();
        farm.as_building_mut().unwrap().update(def.build_duration + 1.0, 1.0);
        assert_eq!(
            farm.interaction(PlayerId(0), &upgrades),
            Interaction::Harvest {
                resource: ResourceType::Food
            }
        );
        // Farms never run dry.
        assert_eq!(farm.extract(1e9), None);
    }

    #[test]
    fn depots_by_category() {
        assert_eq!(
            depot_types(ResourceType::Gold),
            &[BuildingType::BaseCamp, BuildingType::MinerCamp]
        );
        assert_eq!(
            depot_types(ResourceType::Wood),
            &[BuildingType::BaseCamp, BuildingType::LumberCamp]
        );
    }
}
