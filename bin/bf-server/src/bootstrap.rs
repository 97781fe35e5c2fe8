//! Lazy, once-only process initialization.
//!
//! `tokio::sync::OnceCell::get_or_init` gives the double-checked-locking
//! idempotency the source framework's `InitializerGuard` implements by
//! hand (fast unlocked check, then a lock-guarded recheck) for free and
//! race-free: concurrent callers all await the same single initialization.

use bf_admin::{parse_level, AdminChannel, MuteFlag, NotificationConfig, NotificationLayer};
use bf_common::logging::LoggingHandle;
use bf_common::worker_protocol::CapabilityConnInfo;
use bf_config::AppConfig;
use bf_dispatch::{GatewayClient, GatewayConfig};
use bf_history::HistoryStore;
use bf_registry::PluginRegistry;
use bf_sandbox::{SandboxInitializerRunner, SandboxRunner, WorkerCaps};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::{error, info};

pub struct AppState {
    pub config: AppConfig,
    pub history: Arc<HistoryStore>,
    pub registry: Arc<RwLock<PluginRegistry>>,
    pub sandbox: Arc<SandboxRunner>,
    pub gateway: Arc<GatewayClient>,
    pub mute_flag: Arc<MuteFlag>,
    pub admin_channel: Arc<AdminChannel>,
    pub conn_info: CapabilityConnInfo,
}

static BOOTSTRAP: OnceCell<Arc<AppState>> = OnceCell::const_new();

/// Idempotent bootstrap entry point. Safe to call from every ingress
/// request; only the first caller (of any concurrent set) actually runs
/// initialization. History store startup failure is fatal.
pub async fn bootstrap(config: AppConfig, logging: &LoggingHandle) -> Arc<AppState> {
    BOOTSTRAP
        .get_or_init(|| async { Arc::new(initialize(config, logging).await) })
        .await
        .clone()
}

async fn initialize(config: AppConfig, logging: &LoggingHandle) -> AppState {
    let history = match HistoryStore::open(&config.paths.history_db_file).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "history store failed to initialize, exiting");
            std::process::exit(1);
        }
    };

    let registry = match PluginRegistry::discover(&PathBuf::from(&config.paths.plugins_dir)) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "plugin discovery failed, starting with an empty registry");
            PluginRegistry::default()
        }
    };
    let mut registry = registry;

    let conn_info = CapabilityConnInfo {
        history_db_path: config.paths.history_db_file.clone(),
        gateway_base_url: config.gateway.api_url.clone(),
        http_timeout_seconds: config.gateway.timeout_seconds,
    };

    let sandbox = Arc::new(SandboxRunner::new(
        PathBuf::from(&config.paths.worker_binary_path),
        WorkerCaps {
            max_cpu_time_seconds: config.handler_caps.max_cpu_time_seconds,
            max_wall_time_seconds: config.handler_caps.max_wall_time_seconds,
            memory_limit_mb: config.handler_caps.memory_limit_mb,
            monitor_interval_seconds: config.handler_caps.monitor_interval_seconds,
        },
    ));

    let initializer_runner = SandboxInitializerRunner {
        runner: SandboxRunner::new(
            PathBuf::from(&config.paths.worker_binary_path),
            WorkerCaps {
                max_cpu_time_seconds: config.handler_caps.max_cpu_time_seconds,
                max_wall_time_seconds: config.handler_caps.max_wall_time_seconds,
                memory_limit_mb: config.handler_caps.memory_limit_mb,
                monitor_interval_seconds: config.handler_caps.monitor_interval_seconds,
            },
        ),
        conn_info: conn_info.clone(),
    };
    registry.run_initializers(&initializer_runner).await;
    info!(
        failed_plugins = ?registry.failed_plugins(),
        "initializer pass complete"
    );

    let gateway = Arc::new(GatewayClient::new(GatewayConfig {
        base_url: config.gateway.api_url.clone(),
        status_path: config.gateway.status_path.clone(),
        timeout_seconds: config.gateway.timeout_seconds,
        max_retries: config.gateway.max_retries,
    }));

    if config.admin_notification.enabled {
        let notify_config = NotificationConfig {
            enabled: config.admin_notification.enabled,
            admin_id: config.admin_notification.admin_id,
            min_level: parse_level(&config.admin_notification.notify_level),
            rate_limit: Duration::from_secs(config.admin_notification.rate_limit_seconds),
            message_format: config.admin_notification.message_format.clone(),
        };
        logging.set_dynamic_layer(NotificationLayer::new(notify_config, gateway.clone()));
        info!("admin notification layer installed");
    }

    let mute_flag = Arc::new(MuteFlag::new());
    let admin_channel = Arc::new(AdminChannel::new(config.admin_notification.admin_id));
    let registry = Arc::new(RwLock::new(registry));

    if registry.read().await.has_periodic_handlers() {
        let scheduler = bf_scheduler::Scheduler::new(
            registry.clone(),
            sandbox.clone(),
            gateway.clone(),
            mute_flag.clone(),
            conn_info.clone(),
            Duration::from_secs_f64(config.handler_caps.max_wall_time_seconds),
        );
        tokio::spawn(async move { scheduler.run().await });
        info!("scheduler started");
    }

    AppState {
        config,
        history,
        registry,
        sandbox,
        gateway,
        mute_flag,
        admin_channel,
        conn_info,
    }
}

pub fn is_bootstrapped() -> bool {
    BOOTSTRAP.initialized()
}
