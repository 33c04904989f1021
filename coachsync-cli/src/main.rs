use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use coachsync_core::config::Config;
use coachsync_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use coachsync_core::model::{
    ActionId, AddCustomMealPayload, LogMealPayload, MealId, MealPlanId, MealPlanItemId,
    OfflineAction, UserId, WeightUnit,
};
use coachsync_core::network::{NetworkMonitor, ReachabilityProbe};
use coachsync_core::queue::{ActionQueueStore, SqlActionStore};
use coachsync_core::remote::InMemoryRemoteStore;
use coachsync_core::shutdown::{install_ctrl_c_handler, ShutdownCoordinator};
use coachsync_core::sync::SyncManager;
use coachsync_core::HandlerRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "coachsync")]
#[command(author, version, about = "Offline action queue and sync engine", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a body weight entry
    LogWeight {
        #[arg(short, long)]
        user: String,
        value: f64,
        /// kg or lb
        #[arg(long, default_value = "kg")]
        unit: String,
        /// Measurement date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Mark a meal plan item as eaten (or not)
    LogMeal {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        plan: String,
        #[arg(long)]
        item: String,
        #[arg(long, default_value = "Meal")]
        name: String,
        /// Record the meal as not eaten, removing any existing log
        #[arg(long)]
        not_consumed: bool,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Create a custom meal and add it to a plan
    AddMeal {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        plan: String,
        name: String,
        #[arg(long)]
        calories: Option<u32>,
        #[arg(long)]
        protein: Option<f64>,
        #[arg(long)]
        carbs: Option<f64>,
        #[arg(long)]
        fat: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List pending actions in queue order
    Pending,
    /// List quarantined actions
    Quarantined,
    /// Move a quarantined action back into the pending queue
    Requeue { id: String },
    /// Run one drain pass against an in-process remote store
    ///
    /// Applied actions are removed from the local queue, but the remote is
    /// an in-memory stand-in that is discarded on exit: nothing reaches a
    /// real server.
    Drain,
    /// Probe connectivity and sync whenever it returns, until Ctrl-C
    ///
    /// Like `drain`, this syncs into a throwaway in-memory remote and
    /// empties the local queue.
    Run,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(path).into_owned());
            Config::from_file(&path)
                .with_context(|| format!("loading config from {}", path.display()))?
        }
        None => Config::default(),
    };
    config.apply_env()?;

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config.validate()?;
    Ok(config)
}

fn open_store(config: &Config) -> Result<Arc<SqlActionStore>> {
    let data_dir = PathBuf::from(shellexpand::tilde(&config.store.data_dir.to_string_lossy()).into_owned());
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let path = data_dir.join(&config.store.database_file);
    let store = SqlActionStore::open(&path)
        .with_context(|| format!("opening queue at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_action(command: &Command) -> Result<Option<OfflineAction>> {
    let action = match command {
        Command::LogWeight {
            user,
            value,
            unit,
            date,
        } => {
            let unit = match WeightUnit::from_str(unit) {
                Some(unit) => unit,
                None => bail!("unknown weight unit '{}'", unit),
            };
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            OfflineAction::log_weight(UserId::new(user.as_str()), *value, unit, date)
        }
        Command::LogMeal {
            user,
            plan,
            item,
            name,
            not_consumed,
            notes,
        } => OfflineAction::log_meal(
            UserId::new(user.as_str()),
            LogMealPayload {
                meal_plan_id: MealPlanId::new(plan.as_str()),
                meal_plan_item_id: MealPlanItemId::new(item.as_str()),
                meal_name: name.clone(),
                consumed: !not_consumed,
                notes: notes.clone(),
                actual_time: Some(Utc::now()),
            },
        ),
        Command::AddMeal {
            user,
            plan,
            name,
            calories,
            protein,
            carbs,
            fat,
            notes,
        } => OfflineAction::add_custom_meal(
            UserId::new(user.as_str()),
            AddCustomMealPayload {
                meal_id: MealId::generate(),
                meal_plan_id: MealPlanId::new(plan.as_str()),
                name: name.clone(),
                calories: *calories,
                protein_g: *protein,
                carbs_g: *carbs,
                fat_g: *fat,
                notes: notes.clone(),
            },
        ),
        _ => return Ok(None),
    };
    Ok(Some(action))
}

fn build_manager(config: &Config, store: Arc<SqlActionStore>, remote: Arc<InMemoryRemoteStore>) -> Result<Arc<SyncManager>> {
    let registry = HandlerRegistry::with_defaults(remote, config.sync.day_offset()?);
    Ok(Arc::new(SyncManager::new(store, registry, config.sync.settings())))
}

async fn run(config: &Config, store: Arc<SqlActionStore>) -> Result<()> {
    let remote = Arc::new(InMemoryRemoteStore::new());
    let manager = build_manager(config, store.clone(), remote.clone())?;
    let monitor = Arc::new(NetworkMonitor::new());
    let coordinator = Arc::new(ShutdownCoordinator::new(Duration::from_millis(200)));

    let _subscription = manager.attach(&monitor);
    let probe = ReachabilityProbe::from_config(&config.network);
    info!(address = %probe.address(), "Waiting for connectivity");
    let probe_task = tokio::spawn(probe.run(monitor.clone(), coordinator.subscribe()));

    let mut shutdown = coordinator.subscribe();
    install_ctrl_c_handler(coordinator.clone());
    let _ = shutdown.recv().await;

    if let Err(e) = probe_task.await {
        warn!(error = %e, "Probe task ended abnormally");
    }

    let pending = store.pending_count().await?;
    info!(
        pending,
        weights = remote.weights().len(),
        meal_logs = remote.meal_logs().len(),
        meals = remote.meals().len(),
        "Stopped"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let log_level = LogLevel::from_str(&config.logging.level).unwrap_or_default();
    let log_config = LogConfig::new(log_level)
        .json_format(config.logging.json_format)
        .with_timestamp(config.logging.with_timestamp)
        .with_target(config.logging.with_target);
    init_logging_with_config(log_config)?;
    coachsync_core::metrics::init_metrics();

    let store = open_store(&config)?;

    if let Some(action) = build_action(&args.command)? {
        store.enqueue(&action).await?;
        info!(action_id = %action.id, kind = %action.kind(), "Action queued");
        println!("{}", action.id);
        return Ok(());
    }

    match args.command {
        Command::Pending => {
            for action in store.get_pending_actions().await? {
                println!("{}", serde_json::to_string(&action)?);
            }
        }
        Command::Quarantined => {
            for entry in store.get_quarantined_actions().await? {
                println!("{}", serde_json::to_string(&entry)?);
            }
            for record in store.corrupted_records().await? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Command::Requeue { id } => {
            if store.requeue_quarantined(&ActionId::new(id.as_str())).await? {
                info!(action_id = %id, "Action requeued");
            } else {
                bail!("no quarantined action with id {}", id);
            }
        }
        Command::Drain => {
            let remote = Arc::new(InMemoryRemoteStore::new());
            warn!("Draining into an in-memory remote; applied actions are not kept anywhere");
            let manager = build_manager(&config, store.clone(), remote)?;
            manager.set_online(true);
            let outcome = manager.sync().await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Run => run(&config, store).await?,
        Command::LogWeight { .. } | Command::LogMeal { .. } | Command::AddMeal { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coachsync_core::model::{ActionPayload, LogWeightPayload};
    use coachsync_core::TerminalPolicy;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_log_weight_builds_action() {
        let args = parse(&[
            "coachsync", "log-weight", "--user", "u1", "81.5", "--unit", "lb", "--date", "2024-05-01",
        ]);

        let action = build_action(&args.command).unwrap().unwrap();

        assert_eq!(action.user_id.as_str(), "u1");
        assert_eq!(
            action.payload,
            ActionPayload::LogWeight(LogWeightPayload {
                value: 81.5,
                unit: WeightUnit::Lb,
                date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            })
        );
    }

    #[test]
    fn test_log_meal_not_consumed() {
        let args = parse(&[
            "coachsync", "log-meal", "--user", "u1", "--plan", "plan-1", "--item", "item-2", "--not-consumed",
        ]);

        let action = build_action(&args.command).unwrap().unwrap();

        match action.payload {
            ActionPayload::LogMeal(p) => {
                assert!(!p.consumed);
                assert_eq!(p.meal_plan_item_id.as_str(), "item-2");
                assert_eq!(p.meal_name, "Meal");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_unknown_unit_and_queue_commands() {
        let args = parse(&["coachsync", "log-weight", "--user", "u1", "70", "--unit", "stone"]);
        assert!(build_action(&args.command).is_err());

        let args = parse(&["coachsync", "pending"]);
        assert!(build_action(&args.command).unwrap().is_none());
    }

    #[test]
    fn test_config_precedence_file_env_flags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coachsync.toml");
        std::fs::write(
            &path,
            "[sync]\nterminal_policy = \"discard\"\n\n[logging]\nlevel = \"error\"\n",
        )
        .unwrap();
        let path = path.to_string_lossy().into_owned();

        let config = load_config(&parse(&["coachsync", "--config", &path, "pending"])).unwrap();
        assert_eq!(config.sync.terminal_policy, TerminalPolicy::Discard);
        assert_eq!(config.logging.level, "error");
        assert!(!config.logging.json_format);

        // Environment beats the file, flags beat the environment
        std::env::set_var("COACHSYNC_SYNC_TERMINAL_POLICY", "retain");
        std::env::set_var("COACHSYNC_LOG_LEVEL", "warn");
        let from_env = load_config(&parse(&["coachsync", "--config", &path, "pending"]));
        let from_flags = load_config(&parse(&[
            "coachsync", "--config", &path, "--log-level", "debug", "--json-logs", "pending",
        ]));
        std::env::remove_var("COACHSYNC_SYNC_TERMINAL_POLICY");
        std::env::remove_var("COACHSYNC_LOG_LEVEL");

        let from_env = from_env.unwrap();
        assert_eq!(from_env.sync.terminal_policy, TerminalPolicy::Retain);
        assert_eq!(from_env.logging.level, "warn");

        let from_flags = from_flags.unwrap();
        assert_eq!(from_flags.sync.terminal_policy, TerminalPolicy::Retain);
        assert_eq!(from_flags.logging.level, "debug");
        assert!(from_flags.logging.json_format);
    }
}
