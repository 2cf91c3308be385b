// Error types for fallible simulation operations.
//
// The tick loop itself never fails: unreachable targets, depleted sources and
// vanished buildings degrade to "the agent stalls" and are logged. Errors are
// for the boundary operations the UI and loaders call (placement, purchases,
// commands, config and snapshot loading) and always mean "nothing changed".
//
// Pathfinding has its own `PathError` in `pathfinding.rs`.

use crate::types::{
    AgentId, BuildingAction, BuildingType, PlayerId, Point, ResourceType, StructureId,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("cell {cell} is already occupied")]
    CellOccupied { cell: Point },

    #[error("invalid footprint: {0}")]
    InvalidFootprint(String),

    #[error("insufficient {resource:?}: need {needed:.2}, have {available:.2}")]
    InsufficientResources {
        resource: ResourceType,
        needed: f64,
        available: f64,
    },

    #[error("unknown structure {0}")]
    UnknownStructure(StructureId),

    #[error("unknown agent {0}")]
    UnknownAgent(AgentId),

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("player {player} does not own {subject}")]
    NotOwner { player: PlayerId, subject: String },

    #[error("structure {0} is not a completed building")]
    BuildingNotReady(StructureId),

    #[error("{action:?} is not offered by {building:?}")]
    ActionUnavailable {
        building: BuildingType,
        action: BuildingAction,
    },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("resource index {0} is out of range")]
    InvalidResourceIndex(usize),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
