use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::rc::Rc;

use forrad_config::ForradConfig;
use forrad_simulator::Simulator;
use forrad_telemetry::logging::EventLogger;
use forrad_telemetry::metrics::MetricsRecorder;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "forrad", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the deterministic allocator simulation
    Simulate(SimulateArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Configuration file; defaults to config/forrad.yaml and FORRAD_* variables
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Number of cooperative tasks
    #[arg(long)]
    pub tasks: Option<usize>,
    /// Steps per task
    #[arg(long)]
    pub ops: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub fn run_command(cli: Cli) -> CliResult {
    match cli.command {
        Commands::Simulate(args) => run_simulation(args),
        Commands::Config(args) => print_config(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ForradConfig, forrad_config::ConfigError> {
    match path {
        Some(path) => ForradConfig::load_from_path(path),
        None => ForradConfig::load(),
    }
}

fn run_simulation(args: SimulateArgs) -> CliResult {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(seed) = args.seed {
        config.simulator.seed = seed;
    }
    if let Some(tasks) = args.tasks {
        config.simulator.task_count = tasks;
    }
    if let Some(ops) = args.ops {
        config.simulator.ops_per_task = ops;
    }

    if let Err(err) = EventLogger::init(&config.telemetry.log_level) {
        eprintln!("logging already initialised: {err}");
    }

    let mut simulator = Simulator::new(&config);
    let recorder = if config.telemetry.metrics_enabled {
        let recorder = MetricsRecorder::new()?;
        simulator = simulator.with_metrics(Rc::new(recorder.clone()));
        Some(recorder)
    } else {
        None
    };

    let report = simulator.run()?;
    tracing::info!(seed = config.simulator.seed, "simulation complete");
    println!("{report}");

    if let Some(recorder) = recorder {
        println!();
        print!("{}", recorder.gather_metrics()?);
    }
    Ok(())
}

fn print_config(args: ConfigArgs) -> CliResult {
    let config = load_config(args.config.as_ref())?;
    print!("{}", render_config(&config)?);
    Ok(())
}

fn render_config(config: &ForradConfig) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(config)
}
