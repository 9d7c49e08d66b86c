use clap::Args;
use envdeck_core::{AggregatedState, Config, Scheduler, Station, Ticks};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Args)]
pub struct RunArgs {
    /// Stop after this many ticks (default: run forever)
    #[arg(long)]
    ticks: Option<Ticks>,

    /// Write the aggregated state as JSON to this file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the snapshot every N ticks
    #[arg(long, default_value_t = 1)]
    publish_every: Ticks,
}

pub fn run(config_path: &Path, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_from(config_path)?;
    for problem in config.validate() {
        warn!("{problem}");
    }

    let mut station = Station::from_config(&config)?;
    let mut scheduler = Scheduler::new();
    station.install(&mut scheduler);
    info!(config = %config_path.display(), "station running");

    let publish_every = args.publish_every.max(1);
    let start = Instant::now();
    let mut now: Ticks = 0;
    loop {
        let ran = scheduler.tick(now, &mut station);
        if ran > 0 {
            debug!(tick = now, tasks = ran, "tick");
        }

        if let Some(path) = &args.snapshot {
            if now % publish_every == 0 {
                if let Err(e) = write_snapshot(path, &station.state.snapshot()) {
                    warn!(path = %path.display(), error = %e, "failed to write snapshot");
                }
            }
        }

        now += 1;
        if args.ticks.is_some_and(|limit| now >= limit) {
            break;
        }

        let next = start + Duration::from_secs(now);
        if let Some(wait) = next.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    info!(ticks = now, "station stopped");
    Ok(())
}

/// Written to a sibling temp file, then renamed into place.
fn write_snapshot(path: &Path, state: &AggregatedState) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}
