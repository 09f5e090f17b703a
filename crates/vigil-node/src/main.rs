//! vigil-node: single-writer Vigil node.
//!
//! Startup sequence:
//!   1. Load the node config and open (or initialise) the state database
//!   2. Apply genesis if the DB is fresh
//!   3. Build the engine with the configured standing oracle
//!   4. Run the requested command through the sequencer

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use vigil_core::types::EndpointId;
use vigil_genesis::{apply_genesis, GenesisParams};
use vigil_node::config::expand_tilde;
use vigil_node::{NodeConfig, Sequencer, SubmissionRequest, SystemClock};
use vigil_state::{StateDb, StateEngine, ThreatQuery};

#[derive(Parser, Debug)]
#[command(
    name = "vigil-node",
    version,
    about = "Vigil node: commit/reveal threat consensus with escalating bans"
)]
struct Args {
    /// Path to the node config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the persistent state database (overrides the config).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Path to genesis params JSON (only used on first run; overrides the config).
    #[arg(long)]
    genesis_params: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply submissions from a JSON-lines file (or stdin) in order.
    Run {
        /// Input file; `-` reads stdin.
        #[arg(long, default_value = "-")]
        input: PathBuf,
    },
    /// Rebuild state by replaying another database's operation log.
    Replay {
        /// Data directory of the source database.
        #[arg(long)]
        source: PathBuf,
    },
    /// Print the stored view of one endpoint.
    Status {
        endpoint: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vigil=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Vigil node starting");

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(path) = &args.genesis_params {
        config.genesis = load_genesis_params(path)?;
    }

    // ── State database ────────────────────────────────────────────────────────
    let data_dir = expand_tilde(&config.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(StateDb::open(&data_dir).context("opening state database")?);

    // ── Genesis if fresh ──────────────────────────────────────────────────────
    if db.genesis_applied()? {
        info!("existing database found, skipping genesis");
    } else {
        info!("fresh database, applying genesis");
        if config.genesis.operators.is_empty() {
            warn!("genesis has no operators; privileged operations will always be rejected");
        }
        apply_genesis(&db, &config.genesis).context("applying genesis")?;
    }

    // ── State engine ──────────────────────────────────────────────────────────
    let oracle = config.standing_oracle()?;
    let engine = Arc::new(StateEngine::new(Arc::clone(&db), Arc::new(oracle))?);

    match args.command {
        Command::Run { input } => run(engine, &input, config.channel_capacity).await?,
        Command::Replay { source } => {
            let source = expand_tilde(&source);
            let src = StateDb::open(&source)
                .with_context(|| format!("opening source database {}", source.display()))?;
            let log = src.logged_ops_from(db.head()? + 1)?;
            let applied = engine.replay(log).context("replaying operation log")?;
            info!(applied, head = db.head()?, "replay finished");
        }
        Command::Status { endpoint } => {
            let q = ThreatQuery::new(Arc::clone(&db));
            let ep = EndpointId::new(endpoint);
            let now = chrono::Utc::now().timestamp();
            let view = json!({
                "endpoint": ep,
                "whitelisted": q.is_whitelisted(&ep)?,
                "status": q.threat_status(&ep)?,
                "profile": q.profile(&ep)?,
                "evidence_count": q.evidence_count(&ep)?,
                "active_ban": q.active_ban(&ep, now)?,
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
    }

    db.flush()?;
    Ok(())
}

/// Feed every line of `input` through the sequencer and print one JSON
/// result per line on stdout.
async fn run(engine: Arc<StateEngine>, input: &Path, capacity: usize) -> anyhow::Result<()> {
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = if input.as_os_str() == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        let file = tokio::fs::File::open(input)
            .await
            .with_context(|| format!("opening input {}", input.display()))?;
        Box::new(BufReader::new(file))
    };

    let (handle, task) = Sequencer::new(engine, SystemClock)?.spawn(capacity);

    let (mut ok, mut rejected) = (0u64, 0u64);
    let mut lines = reader.lines();
    let mut lineno = 0usize;
    while let Some(line) = lines.next_line().await.context("reading input")? {
        lineno += 1;
        if line.trim().is_empty() {
            continue;
        }
        let request: SubmissionRequest = serde_json::from_str(&line)
            .with_context(|| format!("parsing input line {lineno}"))?;
        let client_ref = request.client_ref;
        let submission = request.seal()?;
        match handle.submit(submission).await {
            Ok(applied) => {
                ok += 1;
                println!("{}", serde_json::to_string(&applied)?);
            }
            Err(e) => {
                rejected += 1;
                println!("{}", json!({ "client_ref": client_ref, "error": e.to_string() }));
            }
        }
    }

    drop(handle);
    task.await.context("sequencer task")?;
    info!(ok, rejected, "input processed");
    Ok(())
}

fn load_genesis_params(path: &Path) -> anyhow::Result<GenesisParams> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading genesis params from {}", path.display()))?;
    serde_json::from_str(&json).context("parsing genesis params JSON")
}
