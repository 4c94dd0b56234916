use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mindgraph::{
    config::{Config, LogFormat},
    maintenance::TaskType,
    state::AppState,
    storage::Database,
};

#[derive(Parser)]
#[command(name = "mindgraph", version, about = "Memory-augmented dialogue core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one user turn and print the reply
    Turn {
        /// The user's input text
        input: String,
    },
    /// Run one maintenance task synchronously
    Maintain {
        /// Task type: routine, graph_repair, or memory_integration
        #[arg(long, default_value = "routine")]
        task_type: TaskType,
    },
    /// Run the periodic idle sweep loop until interrupted
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Mindgraph dialogue core starting..."
    );

    // Initialize storage
    let db = match Database::new(&config.database).await {
        Ok(d) => {
            info!(path = %config.database.path.display(), "Database initialized");
            d
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    // Wire up application state (runs migrations, ensures the graph root)
    let state = match AppState::new(config, db).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to initialize application state");
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Turn { input } => {
            let outcome = state.turn().process_turn(&input).await?;
            if outcome.used_fallback {
                info!("Reply generated from fallback context");
            }
            println!("{}", outcome.response);
        }
        Command::Maintain { task_type } => {
            let report = state.scheduler().run_now(task_type).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Sweep => {
            info!("Idle sweep loop running, Ctrl-C to stop");
            let scheduler = state.scheduler().clone();
            tokio::select! {
                _ = scheduler.run_idle_loop() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                }
            }
        }
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
