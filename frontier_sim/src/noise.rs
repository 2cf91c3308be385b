// Seeded 2D gradient noise, sampled per chunk.
//
// Classic Perlin construction: a shuffled 256-entry permutation table
// (doubled to 512 so corner hashing never needs a bounds wrap), 256 unit
// gradient vectors, the `6t^5 - 15t^4 + 10t^3` fade curve on both axes, and
// bilinear blending of the four corner dot products. A height sample sums
// `octaves` layers, scaling amplitude by `persistence` and frequency by
// `lacunarity` per layer. Each field also draws a random integer offset in
// [-100, 100) per axis so that neighbouring seeds don't share an origin.
//
// Gradients come from rejection sampling in the unit square followed by
// normalisation (only `sqrt`, which IEEE 754 specifies exactly), so the
// tables are bit-identical across platforms.
//
// A chunk's 32x32 grid is computed once and memoised. Columns are evaluated
// in parallel with rayon; each sample is a pure function of the tables, and
// `collect` preserves column order, so the result is independent of thread
// scheduling.
//
// See also: `worldgen.rs` which classifies samples into biomes.
//
// **Critical constraint: determinism.** Tables are a pure function of
// `(seed, stream)`; chunk values are a pure function of the tables.

use crate::config::NoiseParams;
use crate::prng::GameRng;
use crate::types::{CHUNK_SIZE, Point};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

const TABLE_SIZE: usize = 256;

/// Fade curve with zero first and second derivatives at 0 and 1.
pub fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + t * (b - a)
}

/// Memoised noise samples for one chunk, column-major (`x * 32 + y`).
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkNoise {
    values: Vec<f64>,
    pub min: f64,
    pub max: f64,
}

impl ChunkNoise {
    /// Sample at a local cell; `None` outside the chunk.
    pub fn get(&self, local: Point) -> Option<f64> {
        if !(0..CHUNK_SIZE).contains(&local.x) || !(0..CHUNK_SIZE).contains(&local.y) {
            return None;
        }
        self.values
            .get((local.x * CHUNK_SIZE + local.y) as usize)
            .copied()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Immutable lookup tables plus octave parameters.
#[derive(Clone, Debug)]
struct Lattice {
    params: NoiseParams,
    x_offset: f64,
    y_offset: f64,
    permutation: Vec<usize>,
    gradients: Vec<[f64; 2]>,
}

impl Lattice {
    fn new(seed: u64, stream: u64, params: NoiseParams) -> Self {
        let mut rng = GameRng::from_stream(seed, stream);
        let x_offset = f64::from(rng.range_i32(-100, 100));
        let y_offset = f64::from(rng.range_i32(-100, 100));

        let mut table: Vec<usize> = (0..TABLE_SIZE).collect();
        rng.shuffle(&mut table);
        let permutation = table.iter().chain(table.iter()).copied().collect();

        let gradients = (0..TABLE_SIZE).map(|_| unit_gradient(&mut rng)).collect();

        Self {
            params,
            x_offset,
            y_offset,
            permutation,
            gradients,
        }
    }

    fn dot(&self, hash: usize, dx: f64, dy: f64) -> f64 {
        let [gx, gy] = self.gradients[hash % TABLE_SIZE];
        gx * dx + gy * dy
    }

    /// Single-octave noise at a continuous point. Zero on lattice points.
    fn noise(&self, x: f64, y: f64) -> f64 {
        let xf = x.floor();
        let yf = y.floor();
        let xi = (xf as i64 & 255) as usize;
        let yi = (yf as i64 & 255) as usize;
        let dx = x - xf;
        let dy = y - yf;
        let u = fade(dx);
        let v = fade(dy);

        let p = &self.permutation;
        let aa = p[p[xi] + yi];
        let ab = p[p[xi] + yi + 1];
        let ba = p[p[xi + 1] + yi];
        let bb = p[p[xi + 1] + yi + 1];

        let bottom = lerp(self.dot(aa, dx, dy), self.dot(ba, dx - 1.0, dy), u);
        let top = lerp(
            self.dot(ab, dx, dy - 1.0),
            self.dot(bb, dx - 1.0, dy - 1.0),
            u,
        );
        lerp(bottom, top, v)
    }

    /// Octave sum at a world cell.
    fn sample(&self, cell_x: i32, cell_y: i32) -> f64 {
        let params = &self.params;
        let mut total = 0.0;
        let mut amplitude = params.amplitude;
        let mut frequency = 1.0;
        for _ in 0..params.octaves {
            let px = (f64::from(cell_x) + self.x_offset) / params.scale * frequency + self.x_offset;
            let py = (f64::from(cell_y) + self.y_offset) / params.scale * frequency + self.y_offset;
            total += self.noise(px, py) * amplitude;
            amplitude *= params.persistence;
            frequency *= params.lacunarity;
        }
        total
    }

    fn chunk(&self, chunk: Point) -> ChunkNoise {
        let origin = chunk.chunk_origin();
        let columns: Vec<Vec<f64>> = (0..CHUNK_SIZE)
            .into_par_iter()
            .map(|x| {
                (0..CHUNK_SIZE)
                    .map(|y| self.sample(origin.x + x, origin.y + y))
                    .collect()
            })
            .collect();
        let values: Vec<f64> = columns.into_iter().flatten().collect();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        ChunkNoise { values, min, max }
    }
}

fn unit_gradient(rng: &mut GameRng) -> [f64; 2] {
    loop {
        let x = rng.symmetric(1.0);
        let y = rng.symmetric(1.0);
        let len_sq = x * x + y * y;
        if len_sq > 1e-6 && len_sq <= 1.0 {
            let len = len_sq.sqrt();
            return [x / len, y / len];
        }
    }
}

/// A seeded height field with a per-chunk cache.
#[derive(Clone, Debug)]
pub struct NoiseField {
    lattice: Lattice,
    chunks: BTreeMap<Point, ChunkNoise>,
}

impl Default for NoiseField {
    fn default() -> Self {
        Self::new(0, NoiseParams::default())
    }
}

impl NoiseField {
    pub fn new(seed: u64, params: NoiseParams) -> Self {
        Self::with_stream(seed, 0, params)
    }

    /// An independent field from the same seed family (e.g. a humidity layer
    /// next to the height layer).
    pub fn with_stream(seed: u64, stream: u64, params: NoiseParams) -> Self {
        Self {
            lattice: Lattice::new(seed, stream, params),
            chunks: BTreeMap::new(),
        }
    }

    pub fn params(&self) -> &NoiseParams {
        &self.lattice.params
    }

    /// Single-octave value at a continuous point.
    pub fn noise(&self, x: f64, y: f64) -> f64 {
        self.lattice.noise(x, y)
    }

    /// Octave-summed height at a world cell. Uncached.
    pub fn sample(&self, cell_x: i32, cell_y: i32) -> f64 {
        self.lattice.sample(cell_x, cell_y)
    }

    /// The chunk's sample grid, computed on first request.
    pub fn chunk(&mut self, chunk: Point) -> &ChunkNoise {
        match self.chunks.entry(chunk) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.lattice.chunk(chunk)),
        }
    }

    pub fn cached_chunks(&self) -> usize {
        self.chunks.len()
    }
}
