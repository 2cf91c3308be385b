// Building construction lifecycle and purchasable actions.
//
// A building is created in `Placed` state (or `Built`, for prebuilt camps),
// moves to `Building` once any construction progress has accrued, and becomes
// `Built` when progress exceeds its build duration. Progress accrues in the
// world tick, before agents move:
//
//   progress += duration * workers * time_multiplier
//
// where `workers` is the number of agents currently stationed on the site
// (maintained by `controller.rs` as agents arrive and leave) and
// `time_multiplier` comes from the owner's `BuildingTime` research.
//
// Completed buildings sell actions (spawn a unit, research a technology)
// listed in their `BuildingDef`; `available_actions` hides research the owner
// already has.
//
// See also: `structure.rs` for the `StructureKind::Building` wrapper,
// `sim.rs` for `place_building` / `purchase`, `config.rs` for `BuildingDef`.

use crate::config::{ActionDef, BuildingDef};
use crate::player::Upgrades;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildingState {
    Placed,
    Building,
    Built,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub building_type: BuildingType,
    pub owner: PlayerId,
    pub state: BuildingState,
    pub health: f64,
    pub max_health: f64,
    /// Seconds of single-worker construction.
    pub build_duration: f64,
    pub progress: f64,
    /// Agents currently stationed on the construction site.
    pub workers: u32,
}

impl Building {
    pub fn new(
        building_type: BuildingType,
        owner: PlayerId,
        def: &BuildingDef,
        health_multiplier: f64,
    ) -> Self {
        let max_health = def.health * health_multiplier;
        let (state, progress) = if def.prebuilt {
            (BuildingState::Built, def.build_duration)
        } else {
            (BuildingState::Placed, 0.0)
        };
        Self {
            building_type,
            owner,
            state,
            health: max_health,
            max_health,
            build_duration: def.build_duration,
            progress,
            workers: 0,
        }
    }

    pub fn is_built(&self) -> bool {
        self.state == BuildingState::Built
    }

    /// Accrue construction progress. Returns true on the call that completes
    /// the building.
    pub fn update(&mut self, duration: f64, time_multiplier: f64) -> bool {
        if self.is_built() {
            return false;
        }
        self.progress += duration * f64::from(self.workers) * time_multiplier;
        if self.state == BuildingState::Placed && self.progress > 0.0 {
            self.state = BuildingState::Building;
        }
        if self.progress > self.build_duration {
            self.state = BuildingState::Built;
            return true;
        }
        false
    }

    /// Construction completion in `[0, 1]`, for progress bars.
    pub fn progress_ratio(&self) -> f64 {
        if self.is_built() || self.build_duration <= 0.0 {
            return 1.0;
        }
        (self.progress / self.build_duration).clamp(0.0, 1.0)
    }

    pub fn add_worker(&mut self) {
        self.workers += 1;
    }

    pub fn remove_worker(&mut self) {
        self.workers = self.workers.saturating_sub(1);
    }

    /// Returns true when this damage destroys the building.
    pub fn take_damage(&mut self, amount: f64) -> bool {
        self.health -= amount;
        self.health <= 0.0
    }

    /// Scale current and maximum health (the `BuildingHealth` research).
    pub fn scale_health(&mut self, factor: f64) {
        self.health *= factor;
        self.max_health *= factor;
    }
}

/// Actions `def` currently offers to a player with `upgrades`.
pub fn available_actions<'a>(
    def: &'a BuildingDef,
    upgrades: &'a Upgrades,
) -> impl Iterator<Item = &'a ActionDef> + 'a {
    def.actions.iter().filter(|offer| match offer.action {
        BuildingAction::SpawnUnit(_) => true,
        BuildingAction::Research(tech) => !upgrades.has(tech),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    fn pantry() -> (Building, BuildingDef) {
        let config = GameConfig::default();
        let def = config.buildings[&BuildingType::Pantry].clone();
        (Building::new(BuildingType::Pantry, PlayerId(0), &def, 1.0), def)
    }

    #[test]
    fn no_workers_no_progress() {
        let (mut b, _) = pantry();
        assert!(!b.update(1000.0, 1.0));
        assert_eq!(b.state, BuildingState::Placed);
        assert_eq!(b.progress_ratio(), 0.0);
    }

    #[test]
    fn lifecycle_placed_building_built() {
        let (mut b, def) = pantry();
        b.add_worker();
        b.add_worker();
        assert!(!b.update(10.0, 1.0));
        assert_eq!(b.state, BuildingState::Building);
        assert!((b.progress - 20.0).abs() < 1e-12);
        assert!((b.progress_ratio() - 20.0 / def.build_duration).abs() < 1e-12);

        // Doubled build speed finishes the remaining 130 seconds of work in 33.
        assert!(b.update(33.0, 2.0));
        assert_eq!(b.state, BuildingState::Built);
        assert_eq!(b.progress_ratio(), 1.0);
        // Completion fires once.
        assert!(!b.update(10.0, 1.0));
    }

    #[test]
    fn prebuilt_starts_built() {
        let config = GameConfig::default();
        let def = &config.buildings[&BuildingType::BaseCamp];
        let camp = Building::new(BuildingType::BaseCamp, PlayerId(0), def, 2.0);
        assert!(camp.is_built());
        assert_eq!(camp.max_health, 4000.0);
        assert_eq!(camp.progress_ratio(), 1.0);
    }

    #[test]
    fn worker_count_never_underflows() {
        let (mut b, _) = pantry();
        b.remove_worker();
        assert_eq!(b.workers, 0);
    }

    #[test]
    fn damage_destroys_at_zero() {
        let (mut b, _) = pantry();
        assert!(!b.take_damage(549.0));
        assert!(b.take_damage(1.0));
    }

    #[test]
    fn researched_technology_is_no_longer_offered() {
        let (_, def) = pantry();
        let mut upgrades = Upgrades::default();
        assert_eq!(available_actions(&def, &upgrades).count(), 2);
        upgrades.research(Technology::Agriculture);
        let offers: Vec<_> = available_actions(&def, &upgrades).map(|a| a.action).collect();
        assert_eq!(offers, vec![BuildingAction::SpawnUnit(AgentType::Farmer)]);
    }
}
