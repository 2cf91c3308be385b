// Player resource ledger and researched upgrades.
//
// The ledger only changes through `add_resource` and `debit`. Both report
// whether the integer part of any quantity changed, which is the signal the
// sim turns into a `ResourcesChanged` event for the UI (fractional trickles
// from deposits don't need a redraw).
//
// Upgrades are a set of researched `Technology` values; each multiplier is
// derived from membership rather than stored separately, so a snapshot can
// never hold a multiplier that disagrees with the research list.

use crate::config::Cost;
use crate::error::SimError;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Factor applied by every multiplier technology.
pub const UPGRADE_FACTOR: f64 = 2.0;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgrades {
    researched: BTreeSet<Technology>,
}

impl Upgrades {
    pub fn has(&self, tech: Technology) -> bool {
        self.researched.contains(&tech)
    }

    /// Returns false if already researched.
    pub fn research(&mut self, tech: Technology) -> bool {
        self.researched.insert(tech)
    }

    pub fn researched(&self) -> impl Iterator<Item = Technology> + '_ {
        self.researched.iter().copied()
    }

    fn factor(&self, tech: Technology) -> f64 {
        if self.has(tech) { UPGRADE_FACTOR } else { 1.0 }
    }

    pub fn gather_multiplier(&self, category: ResourceCategory) -> f64 {
        match category {
            ResourceCategory::Food => self.factor(Technology::Agriculture),
            ResourceCategory::Wood => self.factor(Technology::Forestry),
            ResourceCategory::Mineral => self.factor(Technology::Mining),
        }
    }

    pub fn building_health_multiplier(&self) -> f64 {
        self.factor(Technology::BuildingHealth)
    }

    pub fn building_time_multiplier(&self) -> f64 {
        self.factor(Technology::BuildingTime)
    }

    pub fn hunt_multiplier(&self) -> f64 {
        self.factor(Technology::Hunt)
    }

    pub fn combat_multiplier(&self) -> f64 {
        self.factor(Technology::Combat)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    resources: ResourceLedger,
    pub upgrades: Upgrades,
}

impl Player {
    pub fn new(id: PlayerId, starting: &Cost) -> Self {
        let mut resources = ResourceLedger::new();
        for (&resource, &amount) in starting {
            resources[resource] = amount.max(0.0);
        }
        Self {
            id,
            resources,
            upgrades: Upgrades::default(),
        }
    }

    pub fn resources(&self) -> &ResourceLedger {
        &self.resources
    }

    pub fn resource(&self, resource: ResourceType) -> f64 {
        self.resources[resource]
    }

    /// Add `quantity` (may be fractional). Returns true when the integer
    /// part changed.
    pub fn add_resource(&mut self, resource: ResourceType, quantity: f64) -> bool {
        let before = self.resources[resource];
        let after = (before + quantity).max(0.0);
        self.resources[resource] = after;
        before.floor() != after.floor()
    }

    /// First shortfall in ledger order, if any.
    pub fn can_afford(&self, cost: &Cost) -> Result<(), SimError> {
        for (&resource, &needed) in cost {
            let available = self.resources[resource];
            if available + QUANTITY_EPSILON < needed {
                return Err(SimError::InsufficientResources {
                    resource,
                    needed,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Subtract `cost` if affordable; leaves the ledger untouched otherwise.
    /// Returns true when any integer part changed.
    pub fn debit(&mut self, cost: &Cost) -> Result<bool, SimError> {
        self.can_afford(cost)?;
        let mut changed = false;
        for (&resource, &amount) in cost {
            changed |= self.add_resource(resource, -amount);
        }
        Ok(changed)
    }
}
