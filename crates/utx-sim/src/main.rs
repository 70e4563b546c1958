use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utx_sim::logging;
use utx_sim::projection::{marker_rows, render_table, ProjectionRow};
use utx_sim::{project, run_simulation, SimConfig, DEFAULT_MARKERS};

const DEFAULT_CONFIG_PATH: &str = "./utx-sim.toml";

#[derive(Parser)]
#[command(name = "utx-sim")]
#[command(about = "UTX resource engine - inflation projection and oracle simulation", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Project the inflation curve at constant utilization
    Project {
        /// Combined utilization held for every period
        #[arg(short, long, default_value = "0.1")]
        utilization: Decimal,

        /// Number of periods to compute
        #[arg(short, long, default_value = "1096")]
        days: u64,

        /// Print every period instead of the marker rows
        #[arg(long)]
        all: bool,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Run oracles, accounts and the token bank in memory for a number of periods
    Simulate {
        #[arg(short, long)]
        days: Option<u64>,

        #[arg(long)]
        oracles: Option<usize>,

        /// Oracles that misreport their CPU total
        #[arg(long)]
        faulty: Option<usize>,

        #[arg(short, long)]
        threshold: Option<u16>,

        #[arg(short, long)]
        accounts: Option<usize>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Write the default configuration
    InitConfig {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<SimConfig> {
    let mut config = match path {
        Some(path) => SimConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            SimConfig::from_file(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => SimConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority order: CLI args > ENV vars > Config file > Defaults
    let mut config = load_config(cli.config.as_deref())?;

    if let Err(e) = logging::init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        let log_level = match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| format!("utx_sim={}", log_level)),
            ))
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    match cli.command {
        Commands::Project {
            utilization,
            days,
            all,
            format,
        } => {
            config.validate()?;
            info!(%utilization, days, "📈 Projecting inflation");
            let entries = project(&config, utilization, days)?;
            let rows: Vec<ProjectionRow> = if all {
                entries.iter().map(ProjectionRow::from).collect()
            } else {
                marker_rows(&entries, &DEFAULT_MARKERS)
            };
            match format {
                OutputFormat::Table => print!("{}", render_table(&rows)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }

        Commands::Simulate {
            days,
            oracles,
            faulty,
            threshold,
            accounts,
            format,
        } => {
            if let Some(days) = days {
                config.simulation.days = days;
            }
            if let Some(oracles) = oracles {
                config.simulation.oracles = oracles;
            }
            if let Some(faulty) = faulty {
                config.simulation.faulty_oracles = faulty;
            }
            if let Some(threshold) = threshold {
                config.simulation.threshold = threshold;
            }
            if let Some(accounts) = accounts {
                config.simulation.accounts = accounts;
            }
            config.validate()?;

            info!(
                days = config.simulation.days,
                oracles = config.simulation.oracles,
                faulty = config.simulation.faulty_oracles,
                threshold = config.simulation.threshold,
                "🧪 Starting simulation"
            );
            let report = run_simulation(&config).await?;
            match format {
                OutputFormat::Table => print!("{}", report.render()),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", output.display());
            }
            SimConfig::default().save_to_file(&output)?;
            info!(path = %output.display(), "✅ Configuration written");
        }
    }

    Ok(())
}
