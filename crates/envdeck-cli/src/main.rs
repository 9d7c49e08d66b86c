use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "envdeck", version, about = "Weather station dashboard data host")]
struct Cli {
    /// Config file (default: ~/.config/envdeck/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and poll every configured source
    Run(commands::run::RunArgs),
    /// Poll one source once and print its data as JSON
    Fetch {
        #[arg(value_enum)]
        target: commands::fetch::FetchTarget,
    },
    /// Classify a provider weather code
    Classify {
        /// Provider: owm | wettercom
        provider: String,
        /// Provider condition code
        code: i64,
    },
    /// Print the signed outlook URL checksum for the configured account
    Checksum,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("ENVDECK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.unwrap_or_else(envdeck_core::Config::path);
    let result = match cli.command {
        Commands::Run(args) => commands::run::run(&config_path, args),
        Commands::Fetch { target } => commands::fetch::run(&config_path, target),
        Commands::Classify { provider, code } => commands::classify::run(&provider, code),
        Commands::Checksum => commands::checksum::run(&config_path),
        Commands::Config { action } => commands::config::run(&config_path, action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
