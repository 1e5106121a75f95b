//! Reminder daemon for nudge.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nudge::reminders::{LogSender, NotificationSender, WebhookSender};
use nudge::{
    DeadlineStatusUpdater, NotificationDispatcher, NotificationPlanner, NudgeConfig,
    ReminderScheduler, SqliteTrackerStore,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Nudge: deadline reminders for group task trackers.
#[derive(Parser)]
#[command(name = "nudge-daemon", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until Ctrl+C.
    Run,

    /// Run one check cycle and print the report.
    Check,

    /// Plan reminders for a task.
    Plan {
        #[arg(long)]
        task: i64,
    },

    /// List a member's unsent reminders.
    Pending {
        #[arg(long)]
        member: i64,
    },

    /// Schedule a reminder that fires shortly, to check delivery end to end.
    Test {
        #[arg(long)]
        member: i64,
        #[arg(long)]
        task: i64,
        /// Seconds from now.
        #[arg(long, default_value_t = 30)]
        delay: i64,
    },
}

struct Engine {
    store: Arc<SqliteTrackerStore>,
    dispatcher: Arc<NotificationDispatcher>,
    config: NudgeConfig,
}

impl Engine {
    fn open(config: NudgeConfig) -> anyhow::Result<Self> {
        let db_path = config.storage.effective_database_path();
        let store = Arc::new(
            SqliteTrackerStore::open(&db_path)
                .with_context(|| format!("opening {}", db_path.display()))?,
        );
        info!("using database {}", db_path.display());

        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            store.clone(),
            store.clone(),
            config.reminders.clone(),
        )
        .with_sender(build_sender(&config)?);

        Ok(Self {
            store,
            dispatcher: Arc::new(dispatcher),
            config,
        })
    }

    fn scheduler(&self) -> ReminderScheduler {
        let updater = DeadlineStatusUpdater::new(self.store.clone(), self.store.clone());
        ReminderScheduler::new(
            updater,
            Arc::clone(&self.dispatcher),
            self.config.reminders.clone(),
        )
    }

    fn planner(&self) -> NotificationPlanner {
        NotificationPlanner::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.config.reminders.clone(),
        )
    }
}

fn build_sender(config: &NudgeConfig) -> anyhow::Result<Arc<dyn NotificationSender>> {
    match config.delivery.webhook_url.as_deref() {
        Some(url) => {
            let timeout = Duration::from_secs(config.delivery.timeout_secs);
            Ok(Arc::new(WebhookSender::new(url, timeout)?))
        }
        None => {
            info!("no webhook configured, reminders go to the log");
            Ok(Arc::new(LogSender))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nudge=info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(NudgeConfig::default_config_path);
    let config = NudgeConfig::load_or_default(&config_path)?;
    let engine = Engine::open(config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&engine).await,
        Command::Check => {
            let report = engine.scheduler().run_check_cycle().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Plan { task } => {
            let report = engine.planner().plan_notifications(task, chrono::Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Pending { member } => {
            let pending = engine.dispatcher.pending_for_member(member)?;
            println!("{}", serde_json::to_string_pretty(&pending)?);
            Ok(())
        }
        Command::Test {
            member,
            task,
            delay,
        } => {
            let delay = chrono::Duration::try_seconds(delay).context("delay out of range")?;
            let id = engine.planner().schedule_test_notification(
                member,
                task,
                delay,
                chrono::Utc::now(),
            )?;
            match id {
                Some(id) => println!("scheduled notification {id}"),
                None => println!("member already has a one-day reminder for task {task}"),
            }
            Ok(())
        }
    }
}

async fn run(engine: &Engine) -> anyhow::Result<()> {
    println!("nudge v{}", env!("CARGO_PKG_VERSION"));

    let scheduler = engine.scheduler();
    scheduler.start()?;
    if !scheduler.is_running() {
        println!("Reminders are disabled in the configuration; nothing to do.");
        return Ok(());
    }

    println!("Scheduler running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("received Ctrl+C, shutting down...");
    scheduler.stop().await?;
    Ok(())
}
