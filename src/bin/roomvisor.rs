//! Interactive front end for the ingestion runtime.
//!
//! Resumes every active channel at startup, then reads commands from stdin
//! until `exit`, end of input or a termination signal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roomvisor::{
    AddOutcome, Config, HttpLookup, MemoryStorage, Orchestrator, ResumeSummary, Storage,
    WsConnector,
};

#[derive(Parser, Debug)]
#[command(name = "roomvisor", version, about = "Supervised chat-room ingestion")]
struct Cli {
    /// Storage backend.
    #[arg(long, value_enum, env = "ROOMVISOR_STORAGE", default_value_t = Backend::Sqlite)]
    storage: Backend,

    /// SQLite database file.
    #[arg(long, default_value = "data/roomvisor.db")]
    db: PathBuf,

    /// Keep channels and events in memory only; same as `--storage memory`.
    #[arg(long)]
    memory: bool,

    #[command(flatten)]
    pg: PgArgs,

    /// File receiving messages no handler recognises.
    #[arg(long, default_value = roomvisor::DEFAULT_OVERFLOW_LOG)]
    overflow_log: PathBuf,

    /// Websocket endpoint.
    #[arg(long, default_value = roomvisor::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Channel metadata API base URL.
    #[arg(long, default_value = roomvisor::DEFAULT_LOOKUP_URL)]
    lookup_url: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Append logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    Sqlite,
    Postgres,
    Memory,
}

/// PostgreSQL connection flags, used with `--storage postgres`.
#[derive(Args, Debug)]
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
struct PgArgs {
    #[arg(long, env = "ROOMVISOR_PG_HOST", default_value = "localhost")]
    pg_host: String,

    #[arg(long, env = "ROOMVISOR_PG_PORT", default_value_t = 5432)]
    pg_port: u16,

    #[arg(long, env = "ROOMVISOR_PG_DB", default_value = "roomvisor")]
    pg_db: String,

    #[arg(long, env = "ROOMVISOR_PG_USER", default_value = "postgres")]
    pg_user: String,

    #[arg(long, env = "ROOMVISOR_PG_PASSWORD", hide_env_values = true)]
    pg_password: Option<String>,
}

const HELP: &str = "\
commands:
  add <channel>       track a channel and start ingesting it
  list                list tracked channels
  pause <channel>     stop ingesting and mark paused
  resume <channel>    clear the paused mark and start ingesting
  resume              restart every active channel that is not running
  resume-paused       clear every paused mark and start those channels
  stats <channel>     event counts for a channel
  help                show this text
  exit                stop every channel and quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let cfg = Config {
        endpoint: cli.endpoint.clone(),
        lookup_base_url: cli.lookup_url.clone(),
        overflow_log: cli.overflow_log.clone(),
        ..Config::default()
    };

    let storage = open_storage(&cli).await?;
    let lookup = HttpLookup::new(cfg.lookup_base_url.clone(), cfg.lookup_timeout)
        .context("building lookup client")?;
    let orch = Orchestrator::new(
        cfg,
        storage,
        Arc::new(lookup),
        Arc::new(WsConnector::default()),
        Vec::new(),
    );

    let summary = orch.resume_all().await.context("resuming channels")?;
    report_resume("resumed", &summary);

    tokio::select! {
        res = repl(&orch) => res?,
        res = roomvisor::wait_for_shutdown_signal() => {
            res.context("installing signal handlers")?;
            info!("termination signal received");
        }
    }

    orch.shutdown().await;
    Ok(())
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("parsing log filter")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (&cli.log_file, cli.log_json) {
        (Some(path), json) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let builder = builder.with_ansi(false).with_writer(Arc::new(file));
            if json {
                builder.json().init();
            } else {
                builder.init();
            }
        }
        (None, true) => builder.json().with_writer(std::io::stderr).init(),
        (None, false) => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

async fn open_storage(cli: &Cli) -> anyhow::Result<Arc<dyn Storage>> {
    let backend = if cli.memory { Backend::Memory } else { cli.storage };
    match backend {
        Backend::Memory => Ok(Arc::new(MemoryStorage::new())),
        Backend::Sqlite => open_sqlite(cli),
        Backend::Postgres => open_postgres(&cli.pg).await,
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(cli: &Cli) -> anyhow::Result<Arc<dyn Storage>> {
    let db = roomvisor::SqliteStorage::open(&cli.db)
        .with_context(|| format!("opening database {}", cli.db.display()))?;
    info!(path = %db.path().display(), "database opened");
    Ok(Arc::new(db))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_cli: &Cli) -> anyhow::Result<Arc<dyn Storage>> {
    anyhow::bail!("built without the sqlite feature; pick another --storage")
}

#[cfg(feature = "postgres")]
async fn open_postgres(pg: &PgArgs) -> anyhow::Result<Arc<dyn Storage>> {
    let opts = roomvisor::PostgresOptions {
        host: pg.pg_host.clone(),
        port: pg.pg_port,
        dbname: pg.pg_db.clone(),
        user: pg.pg_user.clone(),
        password: pg.pg_password.clone(),
        ..roomvisor::PostgresOptions::default()
    };
    let db = roomvisor::PostgresStorage::connect(&opts)
        .await
        .with_context(|| format!("connecting to postgres at {}:{}", opts.host, opts.port))?;
    Ok(Arc::new(db))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_pg: &PgArgs) -> anyhow::Result<Arc<dyn Storage>> {
    anyhow::bail!("built without the postgres feature; pick another --storage")
}

/// One REPL line.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Add(&'a str),
    List,
    Pause(&'a str),
    Resume(&'a str),
    /// Bare `resume`: start every active channel that is not running.
    RestartActive,
    ResumePaused,
    Stats(&'a str),
    Help,
    Exit,
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Option<Command<'_>> {
    let mut words = line.split_whitespace();
    let cmd = words.next()?;
    let arg = words.next();

    Some(match (cmd, arg) {
        ("exit" | "quit", _) => Command::Exit,
        ("help", _) => Command::Help,
        ("add", Some(ch)) => Command::Add(ch),
        ("list", _) => Command::List,
        ("pause", Some(ch)) => Command::Pause(ch),
        ("resume", Some(ch)) => Command::Resume(ch),
        ("resume", None) => Command::RestartActive,
        ("resume-paused", _) => Command::ResumePaused,
        ("stats", Some(ch)) => Command::Stats(ch),
        (other, _) => Command::Unknown(other),
    })
}

async fn repl(orch: &Orchestrator) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let Some(cmd) = parse_command(&line) else { continue };

        match cmd {
            Command::Exit => break,
            Command::Help => println!("{HELP}"),
            Command::Add(ch) => match orch.add_channel(ch).await {
                Ok(AddOutcome::Added) => println!("added {ch}"),
                Ok(AddOutcome::AlreadyTracked) => println!("{ch} is already tracked"),
                Err(e) => println!("add {ch} failed: {e}"),
            },
            Command::List => match orch.list_channels().await {
                Ok(list) if list.is_empty() => println!("no channels tracked"),
                Ok(list) => {
                    for item in list {
                        let state = if item.record.paused { "paused" } else { "active" };
                        println!(
                            "{:<24} {:<7} {:<10} added {}",
                            item.record.name.as_str(),
                            state,
                            item.status,
                            item.record.added_at.format("%Y-%m-%d %H:%M:%S"),
                        );
                    }
                }
                Err(e) => println!("list failed: {e}"),
            },
            Command::Pause(ch) => match orch.pause_channel(ch).await {
                Ok(true) => println!("paused {ch}"),
                Ok(false) => println!("{ch} is not tracked"),
                Err(e) => println!("pause {ch} failed: {e}"),
            },
            Command::Resume(ch) => match orch.resume_channel(ch).await {
                Ok(true) => println!("resumed {ch}"),
                Ok(false) => println!("{ch} is not tracked"),
                Err(e) => println!("resume {ch} failed: {e}"),
            },
            Command::RestartActive => match orch.resume_all().await {
                Ok(summary) => report_resume("restarted", &summary),
                Err(e) => println!("resume failed: {e}"),
            },
            Command::ResumePaused => match orch.resume_paused().await {
                Ok(summary) => report_resume("unpaused", &summary),
                Err(e) => println!("resume-paused failed: {e}"),
            },
            Command::Stats(ch) => match orch.channel_stats(ch).await {
                Ok(stats) => {
                    println!("{ch}: {} events, {} users", stats.total_events, stats.unique_users);
                    if let (Some(first), Some(last)) = (&stats.first_event_at, &stats.last_event_at) {
                        println!("  {first} .. {last}");
                    }
                    for (kind, n) in &stats.by_kind {
                        println!("  {kind:<28} {n}");
                    }
                }
                Err(e) => println!("stats {ch} failed: {e}"),
            },
            Command::Unknown(other) => println!("unknown or incomplete command {other:?}; type help"),
        }
    }
    Ok(())
}

fn report_resume(verb: &str, summary: &ResumeSummary) {
    info!(
        started = summary.started.len(),
        already = summary.already_supervised.len(),
        failed = summary.failed.len(),
        "{verb} channels"
    );
    for (name, err) in &summary.failed {
        warn!(channel = name.as_str(), error = %err, "channel did not start");
    }
}
