// Core types shared across the simulation.
//
// Defines grid coordinates (`Point`), continuous world positions (`Vec2`),
// arena handles for structures and agents, and the small closed enums the
// rest of the crate matches on (resources, ores, buildings, agent types,
// biomes, technologies, orientations).
//
// A `Point` is used at two scales: world cells and chunk coordinates. The
// conversion helpers (`chunk()`, `chunk_origin()`, `local_in_chunk()`) are the
// only places that move between them; callers keep track of which scale they
// hold. Positive y points "down" the screen, matching the renderer.
//
// See also: `arena.rs` for the slot allocator behind `StructureId`/`AgentId`,
// `config.rs` for the per-type data tables keyed by these enums.
//
// **Critical constraint: determinism.** All types here are plain data with
// total orderings where they are used as map keys. IDs are handed out by the
// arena in insertion order, never from OS entropy.

use crate::arena::ArenaId;
use crate::error::SimError;
use crate::prng::GameRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Index, IndexMut, Mul, Neg, Sub};

/// Width and height of a terrain chunk, in cells.
pub const CHUNK_SIZE: i32 = 32;

/// Quantities below this are treated as zero by ledgers and inventories.
pub const QUANTITY_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Grid coordinates
// ---------------------------------------------------------------------------

/// Integer 2D coordinate, in cells or in chunks depending on context.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Point = Point::new(0, 0);

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Component-wise floor division (rounds toward negative infinity).
    pub fn div_floor(self, divisor: i32) -> Self {
        Self::new(self.x.div_euclid(divisor), self.y.div_euclid(divisor))
    }

    /// Component-wise floor modulo; always in `[0, divisor)`.
    pub fn rem_floor(self, divisor: i32) -> Self {
        Self::new(self.x.rem_euclid(divisor), self.y.rem_euclid(divisor))
    }

    /// Chunk coordinate containing this cell.
    pub fn chunk(self) -> Self {
        self.div_floor(CHUNK_SIZE)
    }

    /// First (minimum) cell of this chunk coordinate.
    pub fn chunk_origin(self) -> Self {
        self * CHUNK_SIZE
    }

    /// Position of this cell inside its chunk.
    pub fn local_in_chunk(self) -> Self {
        self.rem_floor(CHUNK_SIZE)
    }

    /// Number of 8-connected steps between two cells.
    pub fn chebyshev_distance(self, other: Self) -> u32 {
        (self.x - other.x)
            .unsigned_abs()
            .max((self.y - other.y).unsigned_abs())
    }

    pub fn manhattan_distance(self, other: Self) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    /// Euclidean distance.
    pub fn distance(self, other: Self) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        dx.hypot(dy)
    }

    /// True if the two cells are distinct and touch, diagonals included.
    pub fn is_adjacent8(self, other: Self) -> bool {
        self != other && self.chebyshev_distance(other) == 1
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Point) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<i32> for Point {
    type Output = Point;
    fn mul(self, rhs: i32) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Continuous positions
// ---------------------------------------------------------------------------

/// Continuous 2D position in world units (`cell_size` units per cell).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// World position of the centre of `cell`.
    pub fn cell_center(cell: Point, cell_size: f64) -> Self {
        Self::new(
            (f64::from(cell.x) + 0.5) * cell_size,
            (f64::from(cell.y) + 0.5) * cell_size,
        )
    }

    /// Cell containing this position.
    pub fn cell(self, cell_size: f64) -> Point {
        Point::new(
            (self.x / cell_size).floor() as i32,
            (self.y / cell_size).floor() as i32,
        )
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Linear interpolation; `t = 0` is `self`, `t = 1` is `other`.
    pub fn lerp(self, other: Self, t: f64) -> Self {
        self + (other - self) * t
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Display direction of an agent, derived from its last movement delta.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    Up,
    Right,
    #[default]
    Down,
    Left,
}

impl Facing {
    /// Horizontal movement decides; vertical only when there is none.
    /// Returns `None` for a zero delta so callers keep the previous facing.
    pub fn from_delta(delta: Vec2) -> Option<Self> {
        if delta.x > 0.0 {
            Some(Facing::Right)
        } else if delta.x < 0.0 {
            Some(Facing::Left)
        } else if delta.y > 0.0 {
            Some(Facing::Down)
        } else if delta.y < 0.0 {
            Some(Facing::Up)
        } else {
            None
        }
    }
}

/// Quarter-turn orientation of a placed structure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    North,
    East,
    South,
    West,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [
        Orientation::North,
        Orientation::East,
        Orientation::South,
        Orientation::West,
    ];

    pub fn random(rng: &mut GameRng) -> Self {
        Self::ALL[rng.range_usize(0, Self::ALL.len())]
    }

    /// Number of clockwise quarter turns from north.
    pub fn quarter_turns(self) -> u8 {
        match self {
            Orientation::North => 0,
            Orientation::East => 1,
            Orientation::South => 2,
            Orientation::West => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// The eight stockpiled resources.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ResourceType {
    Food,
    Wood,
    Stone,
    Iron,
    Copper,
    Gold,
    Vulcan,
    Crystal,
}

/// Which upgrade multiplier and which specialist apply to a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceCategory {
    Food,
    Wood,
    Mineral,
}

impl ResourceType {
    pub const COUNT: usize = 8;

    /// Ledger order. Deposits drain held resources in this order.
    pub const ALL: [ResourceType; Self::COUNT] = [
        ResourceType::Food,
        ResourceType::Wood,
        ResourceType::Stone,
        ResourceType::Iron,
        ResourceType::Copper,
        ResourceType::Gold,
        ResourceType::Vulcan,
        ResourceType::Crystal,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Result<Self, SimError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(SimError::InvalidResourceIndex(index))
    }

    pub fn category(self) -> ResourceCategory {
        match self {
            ResourceType::Food => ResourceCategory::Food,
            ResourceType::Wood => ResourceCategory::Wood,
            _ => ResourceCategory::Mineral,
        }
    }
}

/// Fixed-size table of fractional resource quantities, one slot per
/// `ResourceType`. Used for both player stockpiles and agent inventories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLedger([f64; ResourceType::COUNT]);

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum across all resource types.
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() <= QUANTITY_EPSILON
    }

    /// Non-zero entries in ledger order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceType, f64)> + '_ {
        ResourceType::ALL
            .iter()
            .map(|&r| (r, self.0[r.index()]))
            .filter(|&(_, q)| q > QUANTITY_EPSILON)
    }
}

impl Index<ResourceType> for ResourceLedger {
    type Output = f64;
    fn index(&self, resource: ResourceType) -> &f64 {
        &self.0[resource.index()]
    }
}

impl IndexMut<ResourceType> for ResourceLedger {
    fn index_mut(&mut self, resource: ResourceType) -> &mut f64 {
        &mut self.0[resource.index()]
    }
}

/// Kinds of ore deposit.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum OreType {
    Stone,
    Iron,
    Copper,
    Gold,
    Vulcan,
    Crystal,
}

impl OreType {
    pub const ALL: [OreType; 6] = [
        OreType::Stone,
        OreType::Iron,
        OreType::Copper,
        OreType::Gold,
        OreType::Vulcan,
        OreType::Crystal,
    ];

    /// Resource yielded when mined.
    pub fn resource(self) -> ResourceType {
        match self {
            OreType::Stone => ResourceType::Stone,
            OreType::Iron => ResourceType::Iron,
            OreType::Copper => ResourceType::Copper,
            OreType::Gold => ResourceType::Gold,
            OreType::Vulcan => ResourceType::Vulcan,
            OreType::Crystal => ResourceType::Crystal,
        }
    }

    /// Rare ores are gatherable only after `Technology::ExtraMaterials`.
    pub fn is_rare(self) -> bool {
        matches!(self, OreType::Vulcan | OreType::Crystal)
    }
}

// ---------------------------------------------------------------------------
// Buildings, agents, technologies
// ---------------------------------------------------------------------------

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum BuildingType {
    BaseCamp,
    Pantry,
    Farm,
    MinerCamp,
    LumberCamp,
    HunterCamp,
    SoldierCamp,
}

impl BuildingType {
    pub const ALL: [BuildingType; 7] = [
        BuildingType::BaseCamp,
        BuildingType::Pantry,
        BuildingType::Farm,
        BuildingType::MinerCamp,
        BuildingType::LumberCamp,
        BuildingType::HunterCamp,
        BuildingType::SoldierCamp,
    ];
}

/// The six unit types. Stats come from `GameConfig::agents`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum AgentType {
    Colon,
    Miner,
    Lumberjack,
    Farmer,
    Hunter,
    Soldier,
}

impl AgentType {
    pub const ALL: [AgentType; 6] = [
        AgentType::Colon,
        AgentType::Miner,
        AgentType::Lumberjack,
        AgentType::Farmer,
        AgentType::Hunter,
        AgentType::Soldier,
    ];

    /// Resource category this type gathers at double speed.
    pub fn specialty(self) -> Option<ResourceCategory> {
        match self {
            AgentType::Lumberjack => Some(ResourceCategory::Wood),
            AgentType::Farmer => Some(ResourceCategory::Food),
            AgentType::Miner => Some(ResourceCategory::Mineral),
            _ => None,
        }
    }
}

/// Purchasable research. Each doubles one multiplier or unlocks rare ores.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Technology {
    Forestry,
    Agriculture,
    Mining,
    Hunt,
    Combat,
    BuildingHealth,
    BuildingTime,
    ExtraMaterials,
}

/// Something a completed building sells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingAction {
    SpawnUnit(AgentType),
    Research(Technology),
}

/// Terrain classification, from lowest to highest elevation band.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Biome {
    #[default]
    Lava,
    Volcano,
    Plain,
    Forest,
    Mountain,
    SnowyPeak,
}

// ---------------------------------------------------------------------------
// Entity IDs
// ---------------------------------------------------------------------------

/// Generate a generational arena handle type.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl ArenaId for $name {
            fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            fn index(self) -> u32 {
                self.index
            }

            fn generation(self) -> u32 {
                self.generation
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}v{}", self.index, self.generation)
            }
        }
    };
}

entity_id!(
    /// Handle to a placed tree, ore deposit or building.
    StructureId
);
entity_id!(
    /// Handle to a living agent.
    AgentId
);

/// Index into `SimState::players`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}
