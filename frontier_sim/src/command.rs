// Commands that mutate simulation state from outside the tick loop.
//
// Every UI action reaches the sim as a `SimCommand`: a `player_id` plus a
// `SimAction`. `SimState::step` applies the tick's commands in order before
// advancing the world, so the sim stays a function of
// `(state, commands, duration)`. Current actions:
//
// - `SetTargetLocation`: send agents to a cell. What they do when they get
//   there depends on the occupant (gather, build, demolish, or just stand).
// - `AttackAgent`: engage another player's agent.
// - `StopAgents`: drop the current task.
// - `PlaceBuilding`: pay for and place a building footprint.
// - `Purchase`: buy a building's spawn or research action.
//
// Rejected commands (wrong owner, unaffordable, occupied cells) leave the
// state unchanged and are reported in `StepResult::rejected`.
//
// See also: `sim.rs` for `apply_command()`, `controller.rs` for the
// transitions the agent commands trigger.

use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimCommand {
    pub player_id: PlayerId,
    pub action: SimAction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimAction {
    SetTargetLocation { agents: Vec<AgentId>, cell: Point },
    AttackAgent { agents: Vec<AgentId>, target: AgentId },
    StopAgents { agents: Vec<AgentId> },
    PlaceBuilding {
        building_type: BuildingType,
        anchor: Point,
        orientation: Orientation,
    },
    Purchase {
        building: StructureId,
        action: BuildingAction,
    },
}
