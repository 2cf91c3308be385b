// Deterministic, portable pseudo-random number generator.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding.
// The generator is hand-rolled so that output is identical on every platform
// and across compiler versions; nothing here depends on an external RNG crate.
//
// The simulation owns one `GameRng` for world seeding, spawn placement and
// waypoint jitter. Noise fields build their own generator from the world seed
// plus a stream number (`GameRng::from_stream`) so their permutation tables do
// not depend on how much of the world stream has already been consumed.
//
// **Critical constraint: determinism.** Every method on `GameRng` must produce
// identical output given the same prior state. The core generator uses integer
// arithmetic only; float helpers derive their values from the integer stream
// with exact conversions.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ PRNG, the simulation's sole source of randomness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRng {
    s: [u64; 4],
}

impl GameRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Create a generator for an independent stream of the same seed family.
    ///
    /// `from_stream(seed, 0)` is not the same sequence as `new(seed)`; every
    /// stream number (including 0) is mixed into the seed first.
    pub fn from_stream(seed: u64, stream: u64) -> Self {
        let mut sm = stream.wrapping_mul(0xd1b5_4a32_d192_ed03);
        let mixed = seed ^ splitmix64(&mut sm);
        Self::new(mixed)
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Upper 32 bits of the next `u64`.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Generate a uniform `f64` in [0, 1) from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform value in `[low, high)`.
    ///
    /// Panics if `low >= high`.
    pub fn range_f64(&mut self, low: f64, high: f64) -> f64 {
        assert!(low < high, "range_f64: low must be less than high");
        low + self.next_f64() * (high - low)
    }

    /// Generate a uniform value in `[-magnitude, magnitude)`.
    ///
    /// A zero magnitude returns 0.0 but still draws one value, so the stream
    /// position never depends on the argument.
    pub fn symmetric(&mut self, magnitude: f64) -> f64 {
        let unit = self.next_f64() * 2.0 - 1.0;
        unit * magnitude
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `i32` in `[low, high)`.
    ///
    /// Panics if `low >= high`.
    pub fn range_i32(&mut self, low: i32, high: i32) -> i32 {
        assert!(low < high, "range_i32: low must be less than high");
        let span = (i64::from(high) - i64::from(low)) as u64;
        (i64::from(low) + self.range_u64(0, span) as i64) as i32
    }

    /// Generate a uniform random `usize` in `[low, high)`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Return `true` with probability `p`.
    ///
    /// `p <= 0.0` always returns false, `p >= 1.0` always returns true.
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Fisher–Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.range_usize(0, i + 1);
            items.swap(i, j);
        }
    }

    /// Pick one element uniformly, or `None` for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.range_usize(0, items.len());
        items.get(idx)
    }
}

/// SplitMix64, used only for seeding xoshiro256++ from a single `u64`.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
