//! # hypha-agent
//!
//! hypha server binary. Loads settings, installs logging and metrics,
//! registers the built-in tasks and plugins, and serves until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

mod builtins;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hypha_chain::{HandlerRegistry, PluginRegistry};
use hypha_logging::LogFormat;
use hypha_ratelimit::{CounterStore, InMemoryCounterStore, JwtVerifier, RateLimiter};
use hypha_safety::SafetyCoordinator;
use hypha_server::metrics::install_recorder;
use hypha_server::{HyphaServer, ServerConfig};
use hypha_settings::{HyphaSettings, RateLimitSettings};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// hypha orchestration server.
#[derive(Parser, Debug)]
#[command(name = "hypha-agent", about = "hypha orchestration server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.hypha/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn server_config(&self, settings: &HyphaSettings) -> ServerConfig {
        let mut config = ServerConfig::from(&settings.server);
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

/// Shared counter store, if one is configured and compiled in.
#[cfg(feature = "redis")]
async fn shared_store(settings: &RateLimitSettings) -> Result<Option<Arc<dyn CounterStore>>> {
    let Some(url) = settings.redis_url.as_deref() else {
        return Ok(None);
    };
    let store = hypha_ratelimit::RedisCounterStore::connect(url)
        .await
        .context("Failed to connect to redis counter store")?;
    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "redis"))]
#[allow(clippy::unused_async)]
async fn shared_store(settings: &RateLimitSettings) -> Result<Option<Arc<dyn CounterStore>>> {
    if settings.redis_url.is_some() {
        tracing::warn!("redis_url is set but redis support is not compiled in; counting in memory");
    }
    Ok(None)
}

/// Periodically drop expired in-memory counters.
fn spawn_purge(
    store: Arc<InMemoryCounterStore>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = store.purge_expired();
                    if purged > 0 {
                        debug!(purged, remaining = store.len(), "expired counters purged");
                    }
                }
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(hypha_settings::settings_path);
    let settings = hypha_settings::load_settings_from_path(&settings_path)
        .context("Failed to load settings")?;

    let level = args.log_level.as_deref().unwrap_or(&settings.logging.level);
    hypha_logging::init_with_format(
        level,
        LogFormat::from_json_flag(args.json_logs || settings.logging.json),
    );

    let metrics = install_recorder().context("Failed to install metrics recorder")?;

    // Core services
    let safety = Arc::new(SafetyCoordinator::new());
    let tasks = HandlerRegistry::with_coordinator(Arc::clone(&safety));
    builtins::register_tasks(&tasks);
    let plugins = PluginRegistry::new();
    builtins::register_plugins(&plugins);
    let task_count = tasks.names().len();
    let plugin_count = plugins.names().len();

    // Rate limiting: shared store when configured, otherwise per-process
    let (store, memory_store) = match shared_store(&settings.rate_limit).await? {
        Some(store) => (store, None),
        None => {
            let memory = Arc::new(InMemoryCounterStore::new());
            let store: Arc<dyn CounterStore> = memory.clone();
            (store, Some(memory))
        }
    };
    let mut limiter = RateLimiter::from_settings(store, &settings.rate_limit);
    if let Some(secret) = settings.auth.jwt_secret.as_deref() {
        limiter = limiter.with_verifier(Arc::new(JwtVerifier::new(secret)));
        info!("bearer tokens verified for rate-limit identity");
    }

    let config = args.server_config(&settings);
    let server = HyphaServer::new(
        config,
        safety,
        Arc::new(tasks),
        Arc::new(plugins),
        limiter,
    )
    .with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!(%addr, task_count, plugin_count, "hypha agent listening");

    let shutdown = Arc::clone(server.shutdown());
    let mut handles = vec![handle, shutdown.cancel_on_signal()];
    if let Some(memory) = memory_store {
        let every = Duration::from_secs(settings.rate_limit.window_secs.max(1));
        handles.push(spawn_purge(memory, every, shutdown.token()));
    }

    shutdown.token().cancelled().await;
    info!("shutting down");
    let outcome = shutdown.graceful_shutdown(handles).await;

    info!(?outcome, "shutdown complete");
    Ok(())
}
