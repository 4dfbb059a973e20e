//! Fluency CLI - AI gateway and content server for the learning platform.

use clap::{Parser, Subcommand};
use fluency::api::{create_router_with_state, AppState};
use fluency::config::{Config, LogVerbosity};
use fluency::progress::{JsonFileBackend, Migrator, ProgressStore, TopicMap};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "fluency")]
#[command(about = "AI feedback gateway and curriculum server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Log verbosity level (defaults to the config value)
        #[arg(short, long, value_enum)]
        log_level: Option<LogLevel>,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Inspect or update a saved progress file
    Progress {
        /// Progress JSON file
        file: PathBuf,

        #[command(subcommand)]
        action: ProgressAction,
    },
}

#[derive(Subcommand)]
enum ProgressAction {
    /// Print progress and per-level completion counts
    Show,
    /// Run pending migrations and save
    Migrate {
        /// JSON map of old module path to new module path
        #[arg(long)]
        topic_map: Option<PathBuf>,
    },
    /// Mark a module complete
    Complete {
        /// Module path, e.g. ai-fluency/foundations/tokens
        module: String,
        /// Level id, e.g. foundations
        level: String,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogLevel {
    Minimal,
    Compact,
    Verbose,
}

impl From<LogLevel> for LogVerbosity {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Minimal => LogVerbosity::Minimal,
            LogLevel::Compact => LogVerbosity::Compact,
            LogLevel::Verbose => LogVerbosity::Verbose,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, log_level, config }) => {
            run_server(port, log_level, config).await?;
        }
        Some(Commands::Config { path }) => {
            show_config(path)?;
        }
        Some(Commands::Progress { file, action }) => {
            run_progress(file, action)?;
        }
        None => {
            run_server(None, None, None).await?;
        }
    }

    Ok(())
}

async fn run_server(
    port_override: Option<u16>,
    log_level: Option<LogLevel>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = match config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let mut config = config.with_env_overrides();
    if let Some(level) = log_level {
        config.app.log_verbosity = level.into();
    }

    let port = port_override.unwrap_or(config.server.port);
    let host = config.server.host.clone();
    let verbosity = config.app.log_verbosity.clone();
    let development = config.is_development();

    if config.upstream.api_key.is_none() {
        tracing::warn!("ANTHROPIC_API_KEY not set; AI endpoints will answer 500");
    }

    let state = AppState::from_config(config)?;
    let app = create_router_with_state(state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    let addr = listener.local_addr()?;

    match verbosity {
        LogVerbosity::Minimal => {
            println!("fluency:{}", addr.port());
        }
        LogVerbosity::Compact => {
            println!("→ Fluency starting on http://{}", addr);
            if development {
                println!("→ Development mode: usage limits bypassed");
            }
        }
        LogVerbosity::Verbose => {
            println!("────────────────────────────────────────");
            println!("Fluency v{}", env!("CARGO_PKG_VERSION"));
            println!("────────────────────────────────────────");
            println!("Server:     http://{}", addr);
            println!("Health:     http://{}/health", addr);
            println!("Feedback:   http://{}/api/ai-feedback", addr);
            println!("Chat:       http://{}/api/module-chat", addr);
            println!("Courses:    http://{}/api/courses", addr);
            println!("────────────────────────────────────────");
            println!("Mode:       {}", if development { "development" } else { "production" });
            println!("Log Level:  {:?}", verbosity);
            println!("────────────────────────────────────────");
        }
    }

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("\nServer stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn show_config(show_path: bool) -> anyhow::Result<()> {
    if show_path {
        println!("{}", Config::default_path().display());
        return Ok(());
    }

    let mut config = Config::load()?.with_env_overrides();
    if config.upstream.api_key.is_some() {
        config.upstream.api_key = Some("********".to_string());
    }
    if config.supabase.service_key.is_some() {
        config.supabase.service_key = Some("********".to_string());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn run_progress(file: PathBuf, action: ProgressAction) -> anyhow::Result<()> {
    match action {
        ProgressAction::Show => {
            let store = ProgressStore::open_read_only(JsonFileBackend::new(&file))?;
            let data = store.all();

            let mut levels: BTreeMap<&str, usize> = BTreeMap::new();
            for module in data.modules.values().filter(|m| m.completed) {
                *levels.entry(module.level_id.as_str()).or_default() += 1;
            }

            println!("{}", serde_json::to_string_pretty(data)?);
            println!("────────────────────────────────────────");
            for (level, completed) in levels {
                println!("{:<20} {} complete", level, completed);
            }
        }
        ProgressAction::Migrate { topic_map } => {
            let topics = match topic_map {
                Some(path) => TopicMap::from_json(&std::fs::read_to_string(path)?)?,
                None => TopicMap::default(),
            };
            let store = ProgressStore::open_with(JsonFileBackend::new(&file), &Migrator::new(topics))?;
            println!(
                "Schema version {} ({} modules)",
                store.all().schema_version,
                store.all().modules.len()
            );
        }
        ProgressAction::Complete { module, level } => {
            let mut store = ProgressStore::open(JsonFileBackend::new(&file))?;
            store.mark_module_complete(&module, &level)?;
            println!("Marked {} complete", module);
        }
    }
    Ok(())
}
