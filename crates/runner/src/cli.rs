#![forbid(unsafe_code)]

use crate::render;
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use qc_core::ids::{JobId, WorkerId};
use qc_core::{ConfigKey, JobState, JobSubmission, ValidationError};
use qc_runner::worker::{self, Worker, WorkerOptions};
use qc_runner::{StopSignal, Supervisor, install_signal_listener};
use qc_storage::{ConfigEntry, DEFAULT_LIST_LIMIT, DlqListRequest, JobsListRequest, SqliteStore};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "queuectl")]
#[command(version)]
#[command(about = "Durable background job queue with retries and a dead letter queue")]
pub(crate) struct Cli {
    /// SQLite database file shared by every worker
    #[arg(long, global = true, env = "QUEUECTL_DB", default_value = "queue.db")]
    db: PathBuf,

    /// Idle poll interval for workers, in milliseconds
    #[arg(long, global = true, env = "QUEUECTL_POLL_MS")]
    poll_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a job: {"id": "...", "command": "...", "max_retries"?: N, "priority"?: N}
    Enqueue {
        /// Job record as a JSON object
        #[arg(conflicts_with = "file")]
        json: Option<String>,

        /// Read the job record from a file instead
        #[arg(long)]
        file: Option<PathBuf>,

        /// Override the record's priority (higher runs first)
        #[arg(long, allow_negative_numbers = true)]
        priority: Option<i64>,
    },

    /// List jobs in submission order
    List {
        /// Only jobs in this state (pending, processing, completed, failed, dead)
        #[arg(long)]
        state: Option<JobState>,

        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Job counts per state, worker rows and the shutdown flag
    Status,

    /// Dead letter queue
    Dlq {
        #[command(subcommand)]
        command: DlqCommands,
    },

    /// Worker processes
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },

    /// Queue tunables stored in the database
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum DlqCommands {
    /// Dead jobs, most recent first
    List {
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Move a dead job back to pending (attempts are kept)
    Retry {
        id: String,

        /// Raise the job's retry budget in the same write
        #[arg(long)]
        max_retries: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
enum WorkerCommands {
    /// Spawn detached worker processes (clears a previous stop request)
    Start {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },

    /// Ask every worker to finish its current job and exit
    Stop,

    /// Run one worker loop in the foreground
    #[command(hide = true)]
    Run {
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print one value, or all of them
    Get { key: Option<String> },

    /// Persist a value; running workers pick it up before their next job
    Set { key: String, value: String },
}

impl Cli {
    pub(crate) fn run(self) -> anyhow::Result<()> {
        let Self {
            db,
            poll_ms,
            command,
        } = self;

        match command {
            Commands::Enqueue {
                json,
                file,
                priority,
            } => enqueue(&db, json, file, priority),
            Commands::List { state, limit } => {
                let store = open(&db)?;
                let jobs = store.jobs_list(&JobsListRequest { state, limit })?;
                print(&render::jobs(&jobs))
            }
            Commands::Status => {
                let store = open(&db)?;
                print(&render::status(&store.status()?))
            }
            Commands::Dlq { command } => dlq(&db, command),
            Commands::Worker { command } => worker(&db, poll_ms, command),
            Commands::Config { command } => config(&db, command),
        }
    }
}

fn open(db: &Path) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(db).with_context(|| format!("opening {}", db.display()))
}

fn print(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn enqueue(
    db: &Path,
    json: Option<String>,
    file: Option<PathBuf>,
    priority: Option<i64>,
) -> anyhow::Result<()> {
    let text = match (json, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => bail!("provide the job as a JSON argument or with --file"),
    };

    let mut new_job = JobSubmission::from_json(&text)?.validate()?;
    if let Some(priority) = priority {
        new_job = new_job.with_priority(priority);
    }

    let mut store = open(db)?;
    let job = store.enqueue(&new_job, qc_core::now_ms())?;
    info!(job.id = %job.id, "job enqueued");
    print(&render::job(&job))
}

fn dlq(db: &Path, command: DlqCommands) -> anyhow::Result<()> {
    match command {
        DlqCommands::List { limit } => {
            let store = open(db)?;
            print(&render::jobs(&store.dlq_list(&DlqListRequest { limit })?))
        }
        DlqCommands::Retry { id, max_retries } => {
            let id = JobId::try_new(id).map_err(ValidationError::InvalidJobId)?;
            let mut store = open(db)?;
            let now = qc_core::now_ms();
            let job = match max_retries {
                Some(budget) => store.dlq_requeue_with_budget(&id, budget, now)?,
                None => store.dlq_requeue(&id, now)?,
            };
            print(&render::job(&job))
        }
    }
}

fn worker(db: &Path, poll_ms: Option<u64>, command: WorkerCommands) -> anyhow::Result<()> {
    match command {
        WorkerCommands::Start { count } => {
            if count == 0 {
                bail!("--count must be at least 1");
            }
            let started = Supervisor::new(db)?.poll_ms(poll_ms).start(count)?;
            print(&json!({ "started": started }))
        }
        WorkerCommands::Stop => {
            let report = Supervisor::new(db)?.stop()?;
            print(&serde_json::to_value(&report)?)
        }
        WorkerCommands::Run { id } => {
            // Before anything else spawns a thread: the signal mask must be inherited.
            let stop = StopSignal::new();
            install_signal_listener(stop.clone())?;

            let id = match id {
                Some(raw) => WorkerId::try_new(raw).map_err(ValidationError::InvalidWorkerId)?,
                None => worker::new_worker_id(0)?,
            };
            let mut options = WorkerOptions::default();
            if let Some(poll_ms) = poll_ms {
                options.poll_interval = Duration::from_millis(poll_ms);
            }
            let store = open(db)?;
            Worker::new(id, store, options, stop).run()?;
            Ok(())
        }
    }
}

fn config(db: &Path, command: ConfigCommands) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Get { key: None } => {
            let store = open(db)?;
            print(&render::config(&store.config_list()?))
        }
        ConfigCommands::Get { key: Some(key) } => {
            let key = ConfigKey::parse(&key)?;
            let store = open(db)?;
            let value = store.config_get(key)?;
            print(&render::config(&[ConfigEntry { key, value }]))
        }
        ConfigCommands::Set { key, value } => {
            let key = ConfigKey::parse(&key)?;
            let mut store = open(db)?;
            let stored = store.config_set(key, &value)?;
            print(&render::config(&[ConfigEntry { key, value: stored }]))
        }
    }
}
