// frontier_sim: pure Rust simulation library.
//
// This crate contains all simulation logic for the frontier colony game:
// procedural terrain, placed structures, the agent task machine, the player
// economy and the command interface. It has no rendering or windowing
// dependencies and can be tested, benchmarked and run headless.
//
// Module overview:
// - `sim.rs`:         Top-level SimState, tick loop, command processing, save/load.
// - `controller.rs`:  Per-agent task state machine with leftover-time chaining.
// - `agent.rs`:       Agent data and its state enums.
// - `noise.rs`:       Octave gradient noise with memoized 32×32 chunk grids.
// - `worldgen.rs`:    Lazy biome classification and deposit seeding per chunk.
// - `spatial.rs`:     Cell occupancy, chunk buckets for structures and agents.
// - `pathfinding.rs`: Bounded A* over the 8-connected cell grid.
// - `structure.rs`:   Trees, ores and buildings with their footprints.
// - `building.rs`:    Construction lifecycle and purchasable actions.
// - `player.rs`:      Resource ledger and researched upgrades.
// - `arena.rs`:       Generational arena handing out recyclable entity IDs.
// - `command.rs`:     SimCommand / SimAction: all external sim mutations.
// - `event.rs`:       SimEvent / SimEventKind reported per tick.
// - `view.rs`:        Read-only renderer queries.
// - `config.rs`:      GameConfig: every tunable parameter.
// - `error.rs`:       SimError for boundary operations.
// - `prng`:           Re-exported from `frontier_prng`: xoshiro256++ PRNG with SplitMix64 seeding.
// - `types.rs`:       Point, Vec2, resource/building/agent enums, entity IDs.
//
// **Critical constraint: determinism.** The simulation is a pure function:
// `(state, commands, duration) -> (new_state, events)`. All randomness comes
// from the seeded PRNG. Ordered collections are `BTreeMap`/`BTreeSet`; the
// Fx hash maps are lookup-only and never iterated for simulation decisions.
// No system time, no OS entropy.

pub mod agent;
pub mod arena;
pub mod building;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod noise;
pub mod pathfinding;
pub mod player;
pub use frontier_prng as prng;
pub mod sim;
pub mod spatial;
pub mod structure;
pub mod types;
pub mod view;
pub mod worldgen;
