// Data-driven game configuration.
//
// All tunable parameters live in `GameConfig`, loaded from JSON (any field may
// be omitted and falls back to the `Default` balance values). The sim reads
// constants from here rather than hard-coding them: noise parameters, the
// biome band table with its deposit seeding rules, structure health, per-type
// agent stats, building definitions with their purchasable actions, and the
// pathfinding limits.
//
// `from_json` validates after parsing so that every lookup the tick loop
// performs later (agent stats, building definitions, ore health) is known to
// succeed for every enum variant.
//
// See also: `worldgen.rs` which consumes `biome_bands`, `building.rs` and
// `structure.rs` for the definitions they instantiate, `pathfinding.rs` for
// `PathLimits`.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic; the same seed with a different config is a different
// world.

use crate::error::SimError;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource amounts keyed by type: building costs, action costs, starting
/// stockpiles.
pub type Cost = BTreeMap<ResourceType, f64>;

fn cost(entries: &[(ResourceType, f64)]) -> Cost {
    entries.iter().copied().collect()
}

// ---------------------------------------------------------------------------
// Terrain
// ---------------------------------------------------------------------------

/// Octave layering for the height field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    pub octaves: u32,
    /// Amplitude factor applied per octave.
    pub persistence: f64,
    /// Frequency factor applied per octave.
    pub lacunarity: f64,
    /// Cells per noise unit at the base octave.
    pub scale: f64,
    pub amplitude: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            octaves: 4,
            persistence: 2.0,
            lacunarity: 1.0,
            scale: 50.0,
            amplitude: 1.0,
        }
    }
}

/// What a seeding rule places.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositKind {
    Tree,
    Ore(OreType),
}

/// One probabilistic placement attempt made for every cell of a band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeedRule {
    pub deposit: DepositKind,
    pub probability: f64,
    /// Neighbourhood width in chunks used for the density count.
    pub search_radius: i32,
    /// Placement is skipped once the neighbourhood holds this many.
    pub count_cap: usize,
    /// Ore types that count toward the cap. Ignored for trees.
    #[serde(default)]
    pub counted_ores: Vec<OreType>,
}

impl SeedRule {
    pub fn tree(probability: f64, search_radius: i32, count_cap: usize) -> Self {
        Self {
            deposit: DepositKind::Tree,
            probability,
            search_radius,
            count_cap,
            counted_ores: Vec::new(),
        }
    }

    pub fn ore(
        ore: OreType,
        probability: f64,
        search_radius: i32,
        count_cap: usize,
        counted_ores: &[OreType],
    ) -> Self {
        Self {
            deposit: DepositKind::Ore(ore),
            probability,
            search_radius,
            count_cap,
            counted_ores: counted_ores.to_vec(),
        }
    }
}

/// A height band. Bands are checked in order; the first whose threshold the
/// sample exceeds wins, and a band without a threshold catches everything.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiomeBand {
    pub biome: Biome,
    pub above: Option<f64>,
    #[serde(default)]
    pub seeding: Vec<SeedRule>,
}

fn default_biome_bands() -> Vec<BiomeBand> {
    use OreType::*;
    vec![
        BiomeBand {
            biome: Biome::SnowyPeak,
            above: Some(4.5),
            seeding: vec![SeedRule::ore(Crystal, 0.005, 3, 3, &[Crystal])],
        },
        BiomeBand {
            biome: Biome::Mountain,
            above: Some(2.5),
            seeding: vec![SeedRule::ore(Copper, 0.01, 1, 2, &[Copper])],
        },
        BiomeBand {
            biome: Biome::Forest,
            above: Some(0.0),
            seeding: vec![
                SeedRule::ore(Iron, 0.015, 1, 2, &[Iron, Stone]),
                SeedRule::ore(Gold, 0.010, 2, 2, &[Copper, Iron, Stone]),
                SeedRule::tree(0.015, 1, 15),
            ],
        },
        BiomeBand {
            biome: Biome::Plain,
            above: Some(-2.75),
            seeding: vec![
                SeedRule::ore(Stone, 0.015, 1, 2, &[Stone]),
                SeedRule::tree(0.01, 2, 5),
            ],
        },
        BiomeBand {
            biome: Biome::Volcano,
            above: Some(-4.0),
            seeding: vec![SeedRule::ore(Vulcan, 0.005, 5, 1, &[Vulcan])],
        },
        BiomeBand {
            biome: Biome::Lava,
            above: None,
            seeding: Vec::new(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Agents and buildings
// ---------------------------------------------------------------------------

/// Per-type unit stats. Copied into each agent at spawn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub max_health: f64,
    /// Maximum summed held resources.
    pub capacity: f64,
    /// Resource units per second before multipliers.
    pub gather_speed: f64,
    /// Damage per second while engaged.
    pub damage: f64,
    /// Waypoints per second.
    pub speed: f64,
}

fn stats(max_health: f64, capacity: f64, gather_speed: f64, damage: f64, speed: f64) -> AgentStats {
    AgentStats {
        max_health,
        capacity,
        gather_speed,
        damage,
        speed,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
    pub action: BuildingAction,
    pub cost: Cost,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildingDef {
    pub cost: Cost,
    pub health: f64,
    /// Seconds of single-worker construction.
    pub build_duration: f64,
    /// Footprint is the square `-half_extent..=half_extent` around the anchor.
    pub half_extent: i32,
    /// Placed already `Built` (the starting camp).
    #[serde(default)]
    pub prebuilt: bool,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

fn default_buildings() -> BTreeMap<BuildingType, BuildingDef> {
    use ResourceType::*;
    let spawn = |agent, c: &[(ResourceType, f64)]| ActionDef {
        action: BuildingAction::SpawnUnit(agent),
        cost: cost(c),
    };
    let research = |tech, c: &[(ResourceType, f64)]| ActionDef {
        action: BuildingAction::Research(tech),
        cost: cost(c),
    };
    let camp = |c: &[(ResourceType, f64)], health, actions| BuildingDef {
        cost: cost(c),
        health,
        build_duration: 60.0,
        half_extent: 1,
        prebuilt: false,
        actions,
    };

    let mut buildings = BTreeMap::new();
    buildings.insert(
        BuildingType::BaseCamp,
        BuildingDef {
            cost: Cost::new(),
            health: 2000.0,
            build_duration: 0.0,
            half_extent: 2,
            prebuilt: true,
            actions: vec![
                spawn(AgentType::Colon, &[(Food, 150.0)]),
                research(
                    Technology::BuildingTime,
                    &[(Food, 400.0), (Wood, 300.0), (Stone, 300.0)],
                ),
                research(
                    Technology::BuildingHealth,
                    &[(Wood, 500.0), (Stone, 600.0), (Crystal, 500.0)],
                ),
                research(
                    Technology::ExtraMaterials,
                    &[(Stone, 400.0), (Iron, 400.0), (Gold, 300.0)],
                ),
            ],
        },
    );
    buildings.insert(
        BuildingType::Pantry,
        BuildingDef {
            build_duration: 150.0,
            ..camp(
                &[(Wood, 75.0), (Stone, 25.0)],
                550.0,
                vec![
                    spawn(AgentType::Farmer, &[(Food, 200.0)]),
                    research(
                        Technology::Agriculture,
                        &[(Food, 600.0), (Wood, 300.0), (Iron, 300.0)],
                    ),
                ],
            )
        },
    );
    buildings.insert(
        BuildingType::Farm,
        camp(&[(Wood, 50.0)], 300.0, Vec::new()),
    );
    buildings.insert(
        BuildingType::MinerCamp,
        camp(
            &[(Wood, 75.0), (Stone, 25.0), (Iron, 25.0)],
            550.0,
            vec![
                spawn(AgentType::Miner, &[(Food, 150.0), (Copper, 50.0)]),
                research(
                    Technology::Mining,
                    &[(Iron, 600.0), (Copper, 400.0), (Vulcan, 200.0)],
                ),
            ],
        ),
    );
    buildings.insert(
        BuildingType::LumberCamp,
        camp(
            &[(Wood, 100.0), (Stone, 25.0)],
            550.0,
            vec![
                spawn(AgentType::Lumberjack, &[(Food, 150.0), (Wood, 50.0)]),
                research(
                    Technology::Forestry,
                    &[(Wood, 600.0), (Iron, 300.0), (Food, 200.0)],
                ),
            ],
        ),
    );
    buildings.insert(
        BuildingType::HunterCamp,
        camp(
            &[(Wood, 50.0), (Stone, 25.0), (Food, 25.0)],
            550.0,
            vec![
                spawn(AgentType::Hunter, &[(Food, 200.0)]),
                research(
                    Technology::Hunt,
                    &[(Wood, 400.0), (Copper, 400.0), (Food, 200.0)],
                ),
            ],
        ),
    );
    buildings.insert(
        BuildingType::SoldierCamp,
        camp(
            &[(Wood, 50.0), (Stone, 25.0), (Iron, 50.0)],
            750.0,
            vec![
                spawn(AgentType::Soldier, &[(Food, 150.0), (Iron, 50.0)]),
                research(
                    Technology::Combat,
                    &[(Wood, 400.0), (Copper, 400.0), (Food, 200.0)],
                ),
            ],
        ),
    );
    buildings
}

// ---------------------------------------------------------------------------
// Pathfinding
// ---------------------------------------------------------------------------

/// Distance estimate used by A*.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathHeuristic {
    /// Exact for unit-cost 8-connected moves on an open grid.
    #[default]
    Chebyshev,
    /// Overestimates diagonal progress; paths stay valid but may be longer.
    Manhattan,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathLimits {
    pub heuristic: PathHeuristic,
    /// Node expansions before a search is abandoned.
    pub max_expanded: usize,
    /// Cells the search may stray outside the start/goal bounding box.
    pub search_margin: i32,
}

impl Default for PathLimits {
    fn default() -> Self {
        Self {
            heuristic: PathHeuristic::Chebyshev,
            max_expanded: 20_000,
            search_margin: 48,
        }
    }
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// World units per cell edge.
    pub cell_size: f64,
    pub noise: NoiseParams,
    pub biome_bands: Vec<BiomeBand>,
    pub tree_health: f64,
    pub ore_health: BTreeMap<OreType, f64>,
    pub agents: BTreeMap<AgentType, AgentStats>,
    pub buildings: BTreeMap<BuildingType, BuildingDef>,
    /// Resource units per second moved from an agent into the ledger.
    pub deposit_speed: f64,
    /// Melee reach, in cells.
    pub engagement_range_cells: f64,
    /// Final waypoints are offset by up to this many cells on each axis.
    pub waypoint_jitter_cells: f64,
    pub starting_resources: Cost,
    /// Chunks generated around the origin by `SimState::new_game`.
    pub starting_chunk_radius: i32,
    /// Behaviour switches one agent may make inside a single tick.
    pub max_phases_per_tick: u32,
    /// Generate chunks as agents first enter them.
    pub generate_visited_chunks: bool,
    pub pathing: PathLimits,
}

impl Default for GameConfig {
    fn default() -> Self {
        let mut agents = BTreeMap::new();
        agents.insert(AgentType::Colon, stats(500.0, 10.0, 2.0, 50.0, 2.0));
        agents.insert(AgentType::Miner, stats(600.0, 10.0, 2.0, 50.0, 2.0));
        agents.insert(AgentType::Lumberjack, stats(600.0, 10.0, 2.0, 60.0, 2.0));
        agents.insert(AgentType::Farmer, stats(600.0, 10.0, 2.0, 50.0, 2.0));
        agents.insert(AgentType::Hunter, stats(600.0, 10.0, 2.0, 75.0, 2.0));
        agents.insert(AgentType::Soldier, stats(600.0, 5.0, 1.0, 100.0, 3.0));

        let ore_health = [
            (OreType::Stone, 500.0),
            (OreType::Iron, 1000.0),
            (OreType::Copper, 800.0),
            (OreType::Gold, 500.0),
            (OreType::Vulcan, 200.0),
            (OreType::Crystal, 300.0),
        ]
        .into_iter()
        .collect();

        Self {
            cell_size: 30.0,
            noise: NoiseParams::default(),
            biome_bands: default_biome_bands(),
            tree_health: 200.0,
            ore_health,
            agents,
            buildings: default_buildings(),
            deposit_speed: 2.0,
            engagement_range_cells: 2.0,
            waypoint_jitter_cells: 0.45,
            starting_resources: cost(&[(ResourceType::Food, 200.0), (ResourceType::Wood, 150.0)]),
            starting_chunk_radius: 1,
            max_phases_per_tick: 32,
            generate_visited_chunks: true,
            pathing: PathLimits::default(),
        }
    }
}

impl GameConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every table is complete and every rate is usable.
    pub fn validate(&self) -> Result<(), SimError> {
        fn invalid(msg: String) -> Result<(), SimError> {
            Err(SimError::Config(msg))
        }
        if !(self.cell_size > 0.0) {
            return invalid(format!("cell_size must be positive, got {}", self.cell_size));
        }
        if self.noise.octaves == 0 || !(self.noise.scale > 0.0) {
            return invalid("noise needs at least one octave and a positive scale".into());
        }
        if self.biome_bands.is_empty() {
            return invalid("biome_bands is empty".into());
        }
        if !(self.deposit_speed > 0.0) {
            return invalid("deposit_speed must be positive".into());
        }
        if self.max_phases_per_tick == 0 {
            return invalid("max_phases_per_tick must be at least 1".into());
        }
        if !(self.engagement_range_cells > 0.0) {
            return invalid(format!(
                "engagement_range_cells must be positive, got {}",
                self.engagement_range_cells
            ));
        }
        if !(self.waypoint_jitter_cells >= 0.0) {
            return invalid(format!(
                "waypoint_jitter_cells must be non-negative, got {}",
                self.waypoint_jitter_cells
            ));
        }
        for agent_type in AgentType::ALL {
            let Some(s) = self.agents.get(&agent_type) else {
                return invalid(format!("missing stats for {agent_type:?}"));
            };
            if !(s.capacity > 0.0 && s.gather_speed > 0.0 && s.speed > 0.0 && s.max_health > 0.0) {
                return invalid(format!("{agent_type:?} stats must be positive"));
            }
            if !(s.damage >= 0.0) {
                return invalid(format!("{agent_type:?} damage must be non-negative"));
            }
        }
        for building_type in BuildingType::ALL {
            let Some(def) = self.buildings.get(&building_type) else {
                return invalid(format!("missing definition for {building_type:?}"));
            };
            if def.half_extent < 0 || def.build_duration < 0.0 || !(def.health > 0.0) {
                return invalid(format!("{building_type:?} definition is out of range"));
            }
        }
        for ore in OreType::ALL {
            if !self.ore_health.contains_key(&ore) {
                return invalid(format!("missing health for {ore:?}"));
            }
        }
        Ok(())
    }

    pub fn agent_stats(&self, agent_type: AgentType) -> Result<&AgentStats, SimError> {
        self.agents
            .get(&agent_type)
            .ok_or_else(|| SimError::Config(format!("missing stats for {agent_type:?}")))
    }

    pub fn building(&self, building_type: BuildingType) -> Result<&BuildingDef, SimError> {
        self.buildings
            .get(&building_type)
            .ok_or_else(|| SimError::Config(format!("missing definition for {building_type:?}")))
    }

    pub fn ore_health(&self, ore: OreType) -> Option<f64> {
        self.ore_health.get(&ore).copied()
    }

    /// Band for a height sample. Falls back to the last band when no
    /// threshold matches and no catch-all band exists.
    pub fn classify(&self, height: f64) -> Option<&BiomeBand> {
        self.biome_bands
            .iter()
            .find(|band| band.above.is_none_or(|t| height > t))
            .or(self.biome_bands.last())
    }

    pub fn engagement_range(&self) -> f64 {
        self.engagement_range_cells * self.cell_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        GameConfig::default().validate().unwrap();
    }

    #[test]
    fn default_config_serializes() {
        let config = GameConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let restored = GameConfig::from_json(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn config_loads_from_partial_json() {
        let json = r#"{
            "cell_size": 16.0,
            "deposit_speed": 4.0,
            "pathing": { "heuristic": "Manhattan", "max_expanded": 500, "search_margin": 8 }
        }"#;
        let config = GameConfig::from_json(json).unwrap();
        assert_eq!(config.cell_size, 16.0);
        assert_eq!(config.deposit_speed, 4.0);
        assert_eq!(config.pathing.heuristic, PathHeuristic::Manhattan);
        assert_eq!(config.pathing.max_expanded, 500);
        // Untouched fields keep defaults.
        assert_eq!(config.tree_health, 200.0);
        assert_eq!(config.biome_bands.len(), 6);
    }

    #[test]
    fn invalid_stats_are_rejected() {
        let mut config = GameConfig::default();
        config.agents.get_mut(&AgentType::Soldier).unwrap().capacity = 0.0;
        let json = serde_json::to_string(&config).unwrap();
        assert!(matches!(GameConfig::from_json(&json), Err(SimError::Config(_))));
    }

    #[test]
    fn zero_phase_cap_is_rejected() {
        let config = GameConfig {
            max_phases_per_tick: 0,
            ..GameConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimError::Config(_))));
    }

    #[test]
    fn engagement_range_must_be_positive() {
        for range in [0.0, -1.0, f64::NAN] {
            let config = GameConfig {
                engagement_range_cells: range,
                ..GameConfig::default()
            };
            assert!(matches!(config.validate(), Err(SimError::Config(_))), "{range}");
        }
    }

    #[test]
    fn jitter_may_be_zero_but_not_negative() {
        let mut config = GameConfig {
            waypoint_jitter_cells: 0.0,
            ..GameConfig::default()
        };
        config.validate().unwrap();
        for jitter in [-0.1, f64::NAN] {
            config.waypoint_jitter_cells = jitter;
            assert!(matches!(config.validate(), Err(SimError::Config(_))), "{jitter}");
        }
    }

    #[test]
    fn negative_or_nan_damage_is_rejected() {
        for damage in [-5.0, f64::NAN] {
            let mut config = GameConfig::default();
            config.agents.get_mut(&AgentType::Hunter).unwrap().damage = damage;
            assert!(matches!(config.validate(), Err(SimError::Config(_))), "{damage}");
        }
    }

    #[test]
    fn missing_table_entry_is_rejected() {
        let mut config = GameConfig::default();
        config.ore_health.remove(&OreType::Gold);
        assert!(config.validate().is_err());
        config = GameConfig::default();
        config.buildings.remove(&BuildingType::Farm);
        assert!(config.validate().is_err());
        assert!(config.building(BuildingType::Farm).is_err());
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(
            GameConfig::from_json("{ not json"),
            Err(SimError::Json(_))
        ));
    }

    #[test]
    fn classification_thresholds() {
        let config = GameConfig::default();
        let biome = |h| config.classify(h).map(|b| b.biome);
        assert_eq!(biome(4.6), Some(Biome::SnowyPeak));
        assert_eq!(biome(4.5), Some(Biome::Mountain));
        assert_eq!(biome(2.6), Some(Biome::Mountain));
        assert_eq!(biome(0.1), Some(Biome::Forest));
        assert_eq!(biome(0.0), Some(Biome::Plain));
        assert_eq!(biome(-2.7), Some(Biome::Plain));
        assert_eq!(biome(-3.0), Some(Biome::Volcano));
        assert_eq!(biome(-4.0), Some(Biome::Lava));
        assert_eq!(biome(-100.0), Some(Biome::Lava));
    }

    #[test]
    fn every_camp_but_the_farm_sells_something() {
        let config = GameConfig::default();
        for (building_type, def) in &config.buildings {
            if *building_type == BuildingType::Farm {
                assert!(def.actions.is_empty());
            } else {
                assert!(!def.actions.is_empty(), "{building_type:?} has no actions");
            }
        }
        assert!(config.buildings[&BuildingType::BaseCamp].prebuilt);
    }
}
