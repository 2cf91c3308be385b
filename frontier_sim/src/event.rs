// Player-visible simulation events.
//
// The tick loop and the boundary operations (placement, purchases) push
// `SimEventKind` values as things happen; `SimState::step` stamps them with
// the tick number and returns them in `StepResult`. The renderer uses them to
// decide what to redraw (a chunk appeared, a structure vanished, a ledger
// crossed an integer) instead of diffing the whole world.
//
// Removal notification for depleted trees and ores also arrives here: the
// structure reports a `Depletion`, the owning loop removes it from the
// spatial index and emits the matching event.
//
// See also: `sim.rs` for `StepResult`, `controller.rs` which emits most
// in-tick events.
//
// **Critical constraint: determinism.** Events are emitted in processing
// order, which is itself deterministic.

use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    /// A chunk was classified and seeded for the first time.
    ChunkGenerated { chunk: Point, deposits: usize },
    StructurePlaced { structure: StructureId, anchor: Point },
    TreeFelled { structure: StructureId, anchor: Point },
    OreExhausted {
        structure: StructureId,
        ore: OreType,
        anchor: Point,
    },
    BuildingCompleted {
        structure: StructureId,
        building_type: BuildingType,
    },
    BuildingDestroyed {
        structure: StructureId,
        building_type: BuildingType,
        owner: PlayerId,
    },
    AgentSpawned {
        agent: AgentId,
        agent_type: AgentType,
        owner: PlayerId,
    },
    AgentDied {
        agent: AgentId,
        agent_type: AgentType,
        owner: PlayerId,
    },
    /// The integer part of at least one of the player's resources changed.
    ResourcesChanged { player: PlayerId },
    TechnologyResearched {
        player: PlayerId,
        technology: Technology,
    },
}

impl SimEventKind {
    /// Events after which the world's structure layer must be redrawn.
    pub fn touches_structures(&self) -> bool {
        matches!(
            self,
            SimEventKind::ChunkGenerated { .. }
                | SimEventKind::StructurePlaced { .. }
                | SimEventKind::TreeFelled { .. }
                | SimEventKind::OreExhausted { .. }
                | SimEventKind::BuildingCompleted { .. }
                | SimEventKind::BuildingDestroyed { .. }
        )
    }
}
