// Command-line runner for the chip line simulator

use anyhow::Context;
use chip_simulator_core_rs::{
    DispatchPolicy, EngineConfig, Event, EventListener, SimulationEngine, StartOutcome, Topology,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "chip-sim")]
#[command(about = "Chip manufacturing shift simulator", long_about = None)]
struct Cli {
    /// Number of production lines
    #[arg(short, long, default_value = "3")]
    lines: usize,

    /// Machines per line
    #[arg(short, long, default_value = "4")]
    machines: usize,

    /// Shift length in simulated seconds
    #[arg(short, long, default_value = "480")]
    shift: f64,

    /// Engine config file (JSON); flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wall seconds per simulated second
    #[arg(short, long)]
    time_scale: Option<f64>,

    /// RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Worker layout (per_line, per_machine)
    #[arg(long)]
    topology: Option<Topology>,

    /// Line dispatch policy (round_robin, random, smart)
    #[arg(short, long)]
    dispatch: Option<DispatchPolicy>,

    /// Print a statistics snapshot every N wall seconds (0 disables)
    #[arg(short, long, default_value = "0")]
    report_every: f64,

    /// Print chip events as JSON lines
    #[arg(short, long)]
    events: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                EngineConfig::from_json(&json)?
            }
            None => EngineConfig::default(),
        };
        if let Some(scale) = self.time_scale {
            config.time_scale = scale;
        }
        if let Some(seed) = self.seed {
            config.rng_seed = Some(seed);
        }
        if let Some(topology) = self.topology {
            config.topology = topology;
        }
        if let Some(dispatch) = self.dispatch {
            config.dispatch = dispatch;
        }
        Ok(config)
    }
}

fn print_event(event: &Event) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!(error = %e, "unserializable event"),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.engine_config()?;
    let engine = if cli.events {
        let listener: Arc<dyn EventListener> = Arc::new(print_event);
        SimulationEngine::with_listener(config, listener)?
    } else {
        SimulationEngine::new(config)?
    };

    match engine.start(cli.lines, cli.machines, cli.shift)? {
        StartOutcome::Started => {}
        StartOutcome::AlreadyRunning => anyhow::bail!("engine unexpectedly already running"),
    }
    if let Some(info) = engine.run_info() {
        tracing::info!(run_id = %info.run_id, config_hash = %info.config_hash, "run registered");
    }

    let report_every = (cli.report_every > 0.0).then(|| Duration::from_secs_f64(cli.report_every));
    let mut last_report = Instant::now();
    while engine.is_running() {
        thread::sleep(Duration::from_millis(50));
        if let Some(every) = report_every {
            if last_report.elapsed() >= every {
                last_report = Instant::now();
                println!("{}", serde_json::to_string(&engine.get_stats())?);
            }
        }
    }

    let stats = engine.get_stats();
    println!("{}", stats.to_json()?);
    Ok(())
}
