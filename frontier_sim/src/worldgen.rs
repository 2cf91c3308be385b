// Lazy chunk generation: biome classification and deposit seeding.
//
// A chunk is generated on first access. Every cell's height sample is mapped
// to the first `BiomeBand` whose threshold it exceeds, and each of that
// band's `SeedRule`s makes one placement attempt at the cell
// (`try_generate_deposit`):
//
// 1. Draw one uniform sample; continue only if it is below `probability`.
// 2. Count deposits already anchored in the `search_radius`-wide chunk
//    neighbourhood (trees, or the rule's `counted_ores`); continue only if
//    the count is below `count_cap`.
// 3. Draw a random orientation and place the footprint. A collision aborts
//    the attempt for this cell; it is never retried.
//
// Cells are visited column by column (x outer, y inner), and rules in band
// order, so the RNG stream consumed by a chunk is fixed.
//
// Which chunks have been seeded is persistent state (`generated`). After a
// snapshot load the noise tables and biome grids are rebuilt, and a
// previously generated chunk is re-classified without seeding again, since
// its surviving deposits are already in the restored structure arena.
//
// See also: `noise.rs` for the height field, `spatial.rs` for placement
// and density counts, `config.rs` for the band table.
//
// **Critical constraint: determinism.** Grids and deposits are a pure
// function of the seed, the config, the RNG stream and the order in which
// chunks are first requested.

use crate::config::{DepositKind, GameConfig, NoiseParams, SeedRule};
use crate::noise::NoiseField;
use crate::prng::GameRng;
use crate::spatial::SpatialIndex;
use crate::structure::Structure;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Classified biomes of one chunk, column-major (`x * 32 + y`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BiomeGrid {
    cells: Vec<Biome>,
}

impl BiomeGrid {
    pub fn get(&self, local: Point) -> Option<Biome> {
        if !(0..CHUNK_SIZE).contains(&local.x) || !(0..CHUNK_SIZE).contains(&local.y) {
            return None;
        }
        self.cells.get((local.x * CHUNK_SIZE + local.y) as usize).copied()
    }

    /// `(local cell, biome)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (Point, Biome)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, &b)| (local_of(i), b))
    }

    pub fn cells(&self) -> &[Biome] {
        &self.cells
    }
}

fn local_of(index: usize) -> Point {
    let i = index as i32;
    Point::new(i / CHUNK_SIZE, i % CHUNK_SIZE)
}

/// Result of `WorldGenerator::get_chunk`.
#[derive(Debug)]
pub struct GeneratedChunk<'a> {
    pub grid: &'a BiomeGrid,
    /// True when this call seeded the chunk's deposits.
    pub fresh: bool,
    pub placed: Vec<StructureId>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorldGenerator {
    seed: u64,
    generated: BTreeSet<Point>,
    #[serde(skip)]
    noise: NoiseField,
    #[serde(skip)]
    grids: BTreeMap<Point, BiomeGrid>,
}

impl WorldGenerator {
    pub fn new(seed: u64, params: &NoiseParams) -> Self {
        Self {
            seed,
            generated: BTreeSet::new(),
            noise: NoiseField::new(seed, params.clone()),
            grids: BTreeMap::new(),
        }
    }

    /// Recreate the noise tables and drop cached grids (after deserialization).
    pub fn rebuild(&mut self, params: &NoiseParams) {
        self.noise = NoiseField::new(self.seed, params.clone());
        self.grids.clear();
    }

    /// Whether `chunk` has had its deposits seeded.
    pub fn is_generated(&self, chunk: Point) -> bool {
        self.generated.contains(&chunk)
    }

    pub fn generated_chunks(&self) -> impl Iterator<Item = Point> + '_ {
        self.generated.iter().copied()
    }

    /// Cached grid, without generating.
    pub fn cached(&self, chunk: Point) -> Option<&BiomeGrid> {
        self.grids.get(&chunk)
    }

    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    /// The chunk's biome grid, classifying (and on first ever access,
    /// seeding) it if needed.
    pub fn get_chunk(
        &mut self,
        chunk: Point,
        spatial: &mut SpatialIndex,
        rng: &mut GameRng,
        config: &GameConfig,
    ) -> GeneratedChunk<'_> {
        let mut placed = Vec::new();
        let mut fresh = false;
        let grid = match self.grids.entry(chunk) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                fresh = self.generated.insert(chunk);
                let grid = classify_chunk(
                    &mut self.noise,
                    chunk,
                    fresh,
                    spatial,
                    rng,
                    config,
                    &mut placed,
                );
                entry.insert(grid)
            }
        };
        GeneratedChunk {
            grid,
            fresh,
            placed,
        }
    }
}

fn classify_chunk(
    noise: &mut NoiseField,
    chunk: Point,
    seed_deposits: bool,
    spatial: &mut SpatialIndex,
    rng: &mut GameRng,
    config: &GameConfig,
    placed: &mut Vec<StructureId>,
) -> BiomeGrid {
    let heights = noise.chunk(chunk);
    let mut cells = Vec::with_capacity(heights.values().len());
    let mut trees = 0usize;
    let mut ores = 0usize;

    for (i, &height) in heights.values().iter().enumerate() {
        let Some(band) = config.classify(height) else {
            cells.push(Biome::default());
            continue;
        };
        cells.push(band.biome);
        if !seed_deposits {
            continue;
        }
        let local = local_of(i);
        for rule in &band.seeding {
            if let Some(id) = try_generate_deposit(chunk, local, rule, spatial, rng, config) {
                match rule.deposit {
                    DepositKind::Tree => trees += 1,
                    DepositKind::Ore(_) => ores += 1,
                }
                placed.push(id);
            }
        }
    }

    if seed_deposits {
        debug!(
            chunk = %chunk,
            trees,
            ores,
            min = heights.min,
            max = heights.max,
            "chunk_generated"
        );
    }
    BiomeGrid { cells }
}

/// One probabilistic placement attempt at `local` inside `chunk`.
pub fn try_generate_deposit(
    chunk: Point,
    local: Point,
    rule: &SeedRule,
    spatial: &mut SpatialIndex,
    rng: &mut GameRng,
    config: &GameConfig,
) -> Option<StructureId> {
    if !rng.random_bool(rule.probability) {
        return None;
    }
    let nearby = spatial.count_deposits(chunk, rule.search_radius, rule.deposit, &rule.counted_ores);
    if nearby >= rule.count_cap {
        return None;
    }
    let anchor = chunk.chunk_origin() + local;
    let orientation = Orientation::random(rng);
    let structure = match rule.deposit {
        DepositKind::Tree => Structure::tree(anchor, orientation, config.tree_health),
        DepositKind::Ore(ore) => Structure::ore(anchor, ore, orientation, config.ore_health(ore)?),
    };
    spatial.place_structure(structure).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BiomeBand;
    use crate::structure::StructureKind;

    fn world(seed: u64) -> (WorldGenerator, SpatialIndex, GameRng, GameConfig) {
        let config = GameConfig::default();
        (
            WorldGenerator::new(seed, &config.noise),
            SpatialIndex::new(),
            GameRng::new(seed),
            config,
        )
    }

    fn anchors(spatial: &SpatialIndex) -> Vec<(Point, Orientation)> {
        spatial
            .structures()
            .map(|(_, s)| (s.anchor, s.orientation))
            .collect()
    }

    /// A config where every cell is forest with a single tree rule.
    fn forest_only(probability: f64, cap: usize) -> GameConfig {
        GameConfig {
            biome_bands: vec![BiomeBand {
                biome: Biome::Forest,
                above: None,
                seeding: vec![SeedRule::tree(probability, 1, cap)],
            }],
            ..GameConfig::default()
        }
    }

    #[test]
    fn same_seed_same_chunks_and_deposits() {
        let (mut gen_a, mut spatial_a, mut rng_a, config) = world(42);
        let (mut gen_b, mut spatial_b, mut rng_b, _) = world(42);
        for chunk in [Point::new(0, 0), Point::new(1, 0), Point::new(-2, 3)] {
            let a = gen_a.get_chunk(chunk, &mut spatial_a, &mut rng_a, &config).grid.clone();
            let b = gen_b.get_chunk(chunk, &mut spatial_b, &mut rng_b, &config).grid.clone();
            assert_eq!(a, b);
        }
        assert_eq!(anchors(&spatial_a), anchors(&spatial_b));
    }

    #[test]
    fn repeat_access_is_cached() {
        let (mut generator, mut spatial, mut rng, config) = world(7);
        let first = generator.get_chunk(Point::ORIGIN, &mut spatial, &mut rng, &config);
        assert!(first.fresh);
        let grid = first.grid.clone();
        let structures = spatial.structure_count();
        let rng_before = rng.clone();

        let again = generator.get_chunk(Point::ORIGIN, &mut spatial, &mut rng, &config);
        assert!(!again.fresh);
        assert!(again.placed.is_empty());
        assert_eq!(again.grid, &grid);
        assert_eq!(spatial.structure_count(), structures);
        assert_eq!(rng.next_u64(), rng_before.clone().next_u64());
        assert!(generator.is_generated(Point::ORIGIN));
    }

    #[test]
    fn grid_matches_band_classification() {
        let (mut generator, mut spatial, mut rng, config) = world(3);
        let chunk = Point::new(2, -1);
        let grid = generator.get_chunk(chunk, &mut spatial, &mut rng, &config).grid.clone();
        let origin = chunk.chunk_origin();
        for (local, biome) in grid.iter() {
            let height = generator.noise().sample(origin.x + local.x, origin.y + local.y);
            assert_eq!(config.classify(height).map(|b| b.biome), Some(biome));
        }
    }

    #[test]
    fn deposits_never_overlap() {
        let (mut generator, mut spatial, mut rng, config) = world(11);
        for x in -1..=1 {
            for y in -1..=1 {
                generator.get_chunk(Point::new(x, y), &mut spatial, &mut rng, &config);
            }
        }
        let footprint_cells: usize = spatial.structures().map(|(_, s)| s.footprint().len()).sum();
        assert_eq!(footprint_cells, spatial.occupied_count());
    }

    #[test]
    fn density_cap_limits_seeding() {
        let config = forest_only(1.0, 3);
        let mut generator = WorldGenerator::new(5, &config.noise);
        let mut spatial = SpatialIndex::new();
        let mut rng = GameRng::new(5);
        let chunk = generator.get_chunk(Point::ORIGIN, &mut spatial, &mut rng, &config);
        assert_eq!(chunk.placed.len(), 3);
        assert_eq!(spatial.trees_in_chunk(Point::ORIGIN).len(), 3);
        assert!(
            spatial
                .structures()
                .all(|(_, s)| matches!(s.kind, StructureKind::Tree(_)))
        );
    }

    #[test]
    fn zero_probability_places_nothing() {
        let config = forest_only(0.0, 100);
        let mut generator = WorldGenerator::new(5, &config.noise);
        let mut spatial = SpatialIndex::new();
        let mut rng = GameRng::new(5);
        let chunk = generator.get_chunk(Point::ORIGIN, &mut spatial, &mut rng, &config);
        assert!(chunk.placed.is_empty());
        assert!(chunk.grid.cells().iter().all(|&b| b == Biome::Forest));
    }

    #[test]
    fn collision_aborts_attempt() {
        let config = GameConfig::default();
        let mut spatial = SpatialIndex::new();
        let mut rng = GameRng::new(1);
        spatial
            .place_structure(Structure::tree(Point::new(4, 4), Orientation::North, 1.0))
            .unwrap();
        let rule = SeedRule::tree(1.0, 1, 100);
        let placed = try_generate_deposit(Point::ORIGIN, Point::new(5, 5), &rule, &mut spatial, &mut rng, &config);
        assert!(placed.is_none());
        assert_eq!(spatial.structure_count(), 1);
        let placed = try_generate_deposit(Point::ORIGIN, Point::new(8, 8), &rule, &mut spatial, &mut rng, &config);
        assert!(placed.is_some());
    }

    #[test]
    fn reload_reclassifies_without_reseeding() {
        let (mut generator, mut spatial, mut rng, config) = world(21);
        let grid = generator
            .get_chunk(Point::ORIGIN, &mut spatial, &mut rng, &config)
            .grid
            .clone();

        let json = serde_json::to_string(&generator).unwrap();
        let mut restored: WorldGenerator = serde_json::from_str(&json).unwrap();
        restored.rebuild(&config.noise);
        assert!(restored.cached(Point::ORIGIN).is_none());
        let again = restored.get_chunk(Point::ORIGIN, &mut spatial, &mut rng, &config);
        assert!(!again.fresh);
        assert!(again.placed.is_empty());
        assert_eq!(again.grid, &grid);
    }
}
