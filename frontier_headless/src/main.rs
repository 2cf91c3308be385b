// Headless runner: builds the standard opening from a seed, sends the
// colonists to the nearest tree, steps the world at a fixed tick duration
// and optionally writes a JSON snapshot at the end.
//
// Logging goes through `tracing`; the filter comes from `--log` if given,
// otherwise `RUST_LOG`, otherwise `info`. Run with `--log debug` to see
// chunk generation, placement and pathing diagnostics from the sim.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use frontier_sim::command::{SimAction, SimCommand};
use frontier_sim::config::GameConfig;
use frontier_sim::event::SimEventKind;
use frontier_sim::sim::SimState;
use frontier_sim::structure::StructureKind;
use frontier_sim::types::{PlayerId, Point, ResourceLedger, ResourceType};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Frontier headless simulation runner")]
struct Cli {
    /// World seed
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Number of ticks to run
    #[arg(long, default_value_t = 3000)]
    ticks: u64,

    /// Seconds per tick
    #[arg(long, default_value_t = 0.1)]
    dt: f64,

    /// GameConfig JSON file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the final state as JSON to this path
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Resource index to include in progress reports (0 = Food, 1 = Wood,
    /// ... 7 = Crystal); repeatable
    #[arg(long = "resource", value_name = "INDEX", default_values_t = [0usize, 1])]
    resources: Vec<usize>,

    /// Ticks between progress reports
    #[arg(long, default_value_t = 500)]
    report_every: u64,

    /// Log filter, e.g. `debug` or `frontier_sim=debug`
    #[arg(long)]
    log: Option<String>,
}

fn init_tracing(directive: Option<&str>) -> Result<()> {
    let filter = match directive {
        Some(d) => EnvFilter::try_new(d).with_context(|| format!("invalid log filter `{d}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<GameConfig> {
    let Some(path) = path else {
        return Ok(GameConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    GameConfig::from_json(&json).with_context(|| format!("parsing config {}", path.display()))
}

fn tracked_resources(indices: &[usize]) -> Result<Vec<ResourceType>> {
    indices
        .iter()
        .map(|&i| ResourceType::from_index(i).with_context(|| format!("--resource {i}")))
        .collect()
}

/// `Food=200 Wood=150` style summary of the tracked quantities.
fn stock_summary(ledger: &ResourceLedger, tracked: &[ResourceType]) -> String {
    tracked
        .iter()
        .map(|&r| format!("{r:?}={:.1}", ledger[r]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Anchor of the tree closest to the camp, if the opening chunks have one.
fn nearest_tree(sim: &SimState) -> Option<Point> {
    sim.spatial
        .structures()
        .filter(|(_, s)| matches!(s.kind, StructureKind::Tree(_)))
        .min_by_key(|(_, s)| s.anchor.chebyshev_distance(Point::ORIGIN))
        .map(|(_, s)| s.anchor)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref())?;

    let tracked = tracked_resources(&cli.resources)?;
    let config = load_config(cli.config.as_ref())?;
    let mut sim = SimState::new_game(cli.seed, config)?;
    let player = PlayerId(0);

    let mut commands = Vec::new();
    match nearest_tree(&sim) {
        Some(cell) => {
            info!(%cell, "sending colonists to tree");
            commands.push(SimCommand {
                player_id: player,
                action: SimAction::SetTargetLocation {
                    agents: sim.agents.ids(),
                    cell,
                },
            });
        }
        None => info!("no tree near the camp; colonists stay idle"),
    }

    let mut felled = 0usize;
    let mut chunks = 0usize;
    for _ in 0..cli.ticks {
        let result = sim.step(&commands, cli.dt);
        commands.clear();
        for err in &result.rejected {
            warn!(%err, "command rejected");
        }
        for event in &result.events {
            match event.kind {
                SimEventKind::TreeFelled { .. } => felled += 1,
                SimEventKind::ChunkGenerated { .. } => chunks += 1,
                _ => {}
            }
        }
        if cli.report_every > 0 && sim.tick % cli.report_every == 0 {
            let ledger = sim.resources(player).unwrap_or_default();
            info!(
                tick = sim.tick,
                elapsed = sim.elapsed,
                stock = %stock_summary(&ledger, &tracked),
                structures = sim.spatial.structure_count(),
                "progress"
            );
        }
    }

    if let Some(path) = &cli.snapshot {
        let json = sim.to_json()?;
        std::fs::write(path, json).with_context(|| format!("writing snapshot {}", path.display()))?;
        info!(path = %path.display(), "snapshot written");
    }

    debug!(
        generated = sim.generator.generated_chunks().count(),
        cached_noise = sim.generator.noise().cached_chunks(),
        "terrain"
    );
    let ledger = sim.resources(player).unwrap_or_default();
    println!(
        "Seed {} ran {} ticks ({:.1}s). Wood {:.1}, trees felled {}, new chunks {}.",
        cli.seed,
        sim.tick,
        sim.elapsed,
        ledger[ResourceType::Wood],
        felled,
        chunks
    );
    Ok(())
}
