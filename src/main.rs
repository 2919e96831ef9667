use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use studytrack::config::{Backend, ServerConfig};
use studytrack::migrate::migrate;
use studytrack::server::{AppState, create_router};
use studytrack::store::{SqliteStore, Store, open_store};
use studytrack::syllabus::Syllabus;

#[derive(Parser)]
#[command(name = "studytrack")]
#[command(about = "Study progress tracker with a competitive leaderboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// TOML config file; flags below override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the ledger and progress data
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Storage backend
        #[arg(long, value_enum)]
        backend: Option<Backend>,

        /// Syllabus definition (JSON or YAML)
        #[arg(long)]
        syllabus: Option<PathBuf>,

        /// Maximum wait for a storage lock in milliseconds (0 waits forever)
        #[arg(long)]
        lock_timeout_ms: Option<u64>,

        /// Maximum entries returned by one leaderboard read
        #[arg(long)]
        leaderboard_limit: Option<usize>,

        /// Lifetime of a login session in hours
        #[arg(long)]
        session_ttl_hours: Option<i64>,
    },

    /// Import legacy JSON data files into the sqlite backend
    Migrate {
        /// Directory holding users.json, leaderboard.json, progress.json and subject.json
        #[arg(long)]
        legacy_dir: PathBuf,

        /// Data directory of the sqlite backend
        #[arg(long)]
        data_dir: PathBuf,
    },

    /// Print the leaderboard from a data directory
    Leaderboard {
        #[arg(long)]
        data_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = Backend::File)]
        backend: Backend,

        /// Show only the top N entries
        #[arg(long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Uses the configured syllabus file, falling back to the syllabus imported
/// into the store.
fn resolve_syllabus(config: &ServerConfig, store: &dyn Store) -> anyhow::Result<Syllabus> {
    if let Some(path) = &config.syllabus {
        return Ok(Syllabus::load(path)?);
    }

    match store.stored_syllabus()? {
        Some(syllabus) => {
            syllabus.validate()?;
            Ok(syllabus)
        }
        None => bail!(
            "No syllabus configured. Pass --syllabus, or run 'studytrack migrate' to import one into the sqlite backend."
        ),
    }
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let store = open_store(config.backend, &config.data_dir, config.lock_timeout())
        .with_context(|| format!("failed to open {} store", config.backend))?;
    let syllabus = resolve_syllabus(&config, store.as_ref())?;

    info!(
        "Loaded syllabus with {} topics, using {} backend at {}",
        syllabus.topic_count(),
        config.backend,
        config.data_dir.display()
    );

    let addr = config.socket_addr()?;
    let state = Arc::new(AppState::new(store, Arc::new(syllabus), config));
    let app = create_router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn run_migrate(legacy_dir: &Path, data_dir: &Path) -> anyhow::Result<()> {
    if !legacy_dir.is_dir() {
        bail!("Legacy directory not found: {}", legacy_dir.display());
    }
    std::fs::create_dir_all(data_dir)?;

    let store = SqliteStore::new(data_dir.join(SqliteStore::DB_FILE))?;
    store.initialize()?;

    let report = migrate(legacy_dir, &store)?;
    print!("{report}");

    if report.has_failures() {
        bail!("Migration finished with errors");
    }
    Ok(())
}

fn run_leaderboard(
    data_dir: &Path,
    backend: Backend,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let defaults = ServerConfig::default();
    let store = open_store(backend, data_dir, defaults.lock_timeout())?;
    let entries = store.read_all(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No scores recorded yet.");
        return Ok(());
    }

    println!("{:>4}  {:<32} {:>6}", "RANK", "USERNAME", "SCORE");
    for entry in entries {
        println!("{:>4}  {:<32} {:>6}", entry.rank, entry.username, entry.score);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("studytrack=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            backend,
            syllabus,
            lock_timeout_ms,
            leaderboard_limit,
            session_ttl_hours,
        } => {
            let mut config = match config {
                Some(path) => ServerConfig::from_file(&path)?,
                None => ServerConfig::default(),
            };

            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            if let Some(backend) = backend {
                config.backend = backend;
            }
            if let Some(syllabus) = syllabus {
                config.syllabus = Some(syllabus);
            }
            if let Some(ms) = lock_timeout_ms {
                config.lock_timeout_ms = ms;
            }
            if let Some(limit) = leaderboard_limit {
                config.leaderboard_limit = limit;
            }
            if let Some(hours) = session_ttl_hours {
                config.session_ttl_hours = hours;
            }

            run_serve(config).await?;
        }
        Commands::Migrate {
            legacy_dir,
            data_dir,
        } => {
            tokio::task::spawn_blocking(move || run_migrate(&legacy_dir, &data_dir)).await??;
        }
        Commands::Leaderboard {
            data_dir,
            backend,
            limit,
            json,
        } => {
            run_leaderboard(&data_dir, backend, limit, json)?;
        }
    }

    Ok(())
}
