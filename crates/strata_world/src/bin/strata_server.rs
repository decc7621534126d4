//! # STRATA Server
//!
//! Runs one world at its configured tick cadence.
//!
//! ## Usage
//!
//! ```bash
//! strata_server --config strata.toml --world overworld
//! strata_server --ticks 200   # bounded run, then checkpoint
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use strata_world::{World, WorldConfig, WorldResult};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "strata_server", about = "Authoritative voxel world server")]
struct Args {
    /// TOML configuration; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `world_guid` from the configuration.
    #[arg(long)]
    world: Option<String>,
    /// Overrides `world_dir` from the configuration.
    #[arg(long)]
    world_dir: Option<PathBuf>,
    /// Stop after this many ticks instead of running forever.
    #[arg(long)]
    ticks: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match serve(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("server stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn serve(args: Args) -> WorldResult<()> {
    let mut config = match &args.config {
        Some(path) => WorldConfig::load(path)?,
        None => WorldConfig::default(),
    };
    if let Some(guid) = args.world {
        config.world_guid = guid;
    }
    if let Some(dir) = args.world_dir {
        config.world_dir = dir;
    }
    config.validate()?;

    let mut world = World::open_dir(config)?;
    let info = world.info();
    tracing::info!(
        "serving world {} ({}) seed {:?} spawn {:?}",
        info.guid,
        info.title,
        info.seed,
        info.pos_spawn
    );

    match args.ticks {
        Some(ticks) => {
            for _ in 0..ticks {
                world.tick();
                world.wait_for_next_tick();
            }
            let stats = world.stats();
            tracing::info!(
                "{} ticks, avg {}us, max {}us, {} late",
                stats.total_ticks,
                stats.avg_tick_us,
                stats.max_tick_us,
                stats.late_ticks
            );
            world.shutdown()
        }
        None => {
            let running = AtomicBool::new(true);
            world.run(&running)
        }
    }
}
