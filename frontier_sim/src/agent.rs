// Mobile worker agents.
//
// An `Agent` is plain data: identity, copied stats, continuous position, the
// current path, held resources and the task fields the controller drives.
// All behaviour lives in `controller.rs`; this module only provides the
// state enums and a few self-contained helpers.
//
// Task fields, by work mode:
//
// - Gathering: `target_structure` / `target_cell` is the source, `depot` the
//   building resources are hauled to, `resource` what is being carried.
// - Building / Destroying: `target_structure` is the site.
// - Hunting / Fighting: `target_agent` is the victim.
//
// `en_route` is set while the agent walks to its work site or depot; the
// work phase starts once the path is complete. `on_site` records the
// building whose worker count includes this agent, so the count can be
// released exactly once.
//
// See also: `controller.rs` for the state machine, `sim.rs` which owns the
// agent arena.

use crate::config::AgentStats;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    #[default]
    Idle,
    Moving,
    Working,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkMode {
    #[default]
    Idle,
    Gathering,
    Hunting,
    Building,
    Destroying,
    Fighting,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatherState {
    #[default]
    Gathering,
    Depositing,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub agent_type: AgentType,
    pub owner: PlayerId,
    pub stats: AgentStats,
    pub health: f64,

    pub position: Vec2,
    pub facing: Facing,
    /// Waypoints in world units. `path[0]` is where the current leg started.
    pub path: Vec<Vec2>,
    /// Fractional waypoint index along `path`.
    pub progress: f64,

    pub state: AgentState,
    pub work: WorkMode,
    pub gather: GatherState,
    pub en_route: bool,
    pub on_site: Option<StructureId>,

    pub target_cell: Option<Point>,
    pub target_structure: Option<StructureId>,
    pub target_agent: Option<AgentId>,
    pub depot: Option<StructureId>,
    pub resource: Option<ResourceType>,
    pub held: ResourceLedger,
}

impl Agent {
    pub fn new(
        id: AgentId,
        agent_type: AgentType,
        owner: PlayerId,
        stats: AgentStats,
        position: Vec2,
    ) -> Self {
        Self {
            id,
            agent_type,
            owner,
            health: stats.max_health,
            stats,
            position,
            facing: Facing::default(),
            path: vec![position],
            progress: 0.0,
            state: AgentState::Idle,
            work: WorkMode::Idle,
            gather: GatherState::Gathering,
            en_route: false,
            on_site: None,
            target_cell: None,
            target_structure: None,
            target_agent: None,
            depot: None,
            resource: None,
            held: ResourceLedger::new(),
        }
    }

    pub fn cell(&self, cell_size: f64) -> Point {
        self.position.cell(cell_size)
    }

    pub fn chunk(&self, cell_size: f64) -> Point {
        self.cell(cell_size).chunk()
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    /// Returns true only on the hit that kills.
    pub fn take_damage(&mut self, amount: f64) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.health -= amount;
        !self.is_alive()
    }

    /// Remaining carrying room.
    pub fn room(&self) -> f64 {
        (self.stats.capacity - self.held.total()).max(0.0)
    }

    pub fn path_complete(&self) -> bool {
        self.progress + 1.0 >= self.path.len() as f64
    }

    /// Drop the current task and path, keeping held resources. Worker-count
    /// bookkeeping (`on_site`) is the controller's job and must be released
    /// first.
    pub fn clear_task(&mut self) {
        self.state = AgentState::Idle;
        self.work = WorkMode::Idle;
        self.gather = GatherState::Gathering;
        self.en_route = false;
        self.target_cell = None;
        self.target_structure = None;
        self.target_agent = None;
        self.depot = None;
        self.resource = None;
        self.path = vec![self.position];
        self.progress = 0.0;
    }
}
