use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;

use carik_core::application::manager::{Manager, ManagerContext};
use carik_core::application::services::{
    build_context, create_migration, rollback_migrations, run_migrations,
};
use carik_core::infrastructure::config::Config;
use carik_core::infrastructure::logging;
use carik_core::ManagerResult;

#[derive(Parser)]
#[command(name = "carik")]
#[command(about = "Manager runtime for the carik bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "carik.yaml")]
    config: String,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the configured managers and wait for Ctrl-C
    Run,
    /// Initialize the configured managers and print their status
    Status,
    /// Apply pending migrations
    Migrate {
        /// Stop after this version
        #[arg(long)]
        target: Option<i64>,
    },
    /// Roll back the most recent migrations
    Rollback {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
    /// Migration file helpers
    Migration {
        #[command(subcommand)]
        command: MigrationCommands,
    },
    /// Generate default config
    InitConfig,
    /// Show version
    Version,
}

#[derive(Subcommand)]
enum MigrationCommands {
    /// Scaffold the next migration file
    New { description: String },
}

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Commands::Version => {
            println!("carik v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config();
        }
        command => {
            let config = load_config(&cli.config);
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to start runtime: {}", e);
                    std::process::exit(1);
                }
            };

            if let Err(e) = rt.block_on(dispatch(command, config)) {
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load_config(path: &str) -> Config {
    if Path::new(path).exists() {
        match Config::load(path) {
            Ok(config) => return config.with_env(),
            Err(e) => {
                tracing::warn!("Failed to load {}: {}, using defaults", path, e);
            }
        }
    } else {
        tracing::debug!("Config {} not found, using defaults", path);
    }
    Config::load_env()
}

async fn dispatch(command: Commands, config: Config) -> ManagerResult<()> {
    match command {
        Commands::Run => run(config).await,
        Commands::Status => status(config).await,
        Commands::Migrate { target } => {
            let (context, updates) = updates_manager(config).await?;
            let applied = run_migrations(&updates, target).await;
            context.shutdown_all().await;

            let applied = applied?;
            if applied.is_empty() {
                println!("Schema is up to date");
            } else {
                println!("Applied: {:?}", applied);
            }
            Ok(())
        }
        Commands::Rollback { steps } => {
            let (context, updates) = updates_manager(config).await?;
            let rolled_back = rollback_migrations(&updates, steps).await;
            context.shutdown_all().await;

            println!("Rolled back: {:?}", rolled_back?);
            Ok(())
        }
        Commands::Migration { command: MigrationCommands::New { description } } => {
            let (context, updates) = updates_manager(config).await?;
            let path = create_migration(&updates, &description).await;
            context.shutdown_all().await;

            println!("Created {}", path?.display());
            Ok(())
        }
        Commands::InitConfig | Commands::Version => Ok(()),
    }
}

/// The `updates` manager with auto-migrate off, so explicit commands decide what runs
async fn updates_manager(mut config: Config) -> ManagerResult<(ManagerContext, Arc<Manager>)> {
    config.database.auto_migrate = false;
    let context = build_context(&config)?;
    let updates = context.get_manager("updates").await?;
    Ok((context, updates))
}

async fn start(config: &Config) -> ManagerResult<ManagerContext> {
    let context = build_context(config)?;
    for name in &config.managers {
        context.get_manager(name).await?;
        logging::success("runtime", &format!("Manager {} ready", name));
    }
    Ok(context)
}

async fn run(config: Config) -> ManagerResult<()> {
    let context = start(&config).await?;
    tracing::info!(managers = context.managers().len(), "carik running, press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
    }

    context.shutdown_all().await;
    Ok(())
}

async fn status(config: Config) -> ManagerResult<()> {
    let context = start(&config).await?;

    let mut report = Vec::new();
    for manager in context.managers() {
        report.push(serde_json::json!({
            "status": manager.status().await,
            "metrics": manager.performance_metrics(),
        }));
    }

    let output = serde_json::to_string_pretty(&report)
        .map_err(|e| carik_core::ManagerError::Internal(e.to_string()))?;
    println!("{}", output);

    context.shutdown_all().await;
    Ok(())
}

fn init_config() {
    match serde_yaml::to_string(&Config::default()) {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to carik.yaml and adjust as needed.");
        }
        Err(e) => tracing::error!("Failed to render config: {}", e),
    }
}
