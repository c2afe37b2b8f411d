#![forbid(unsafe_code)]

//! `chat-relay` — conversational-assistant backend binary.
//!
//! Bootstraps configuration, connects the `SQLite` store, builds the
//! streaming relay (registry, orchestrator, upstream client) and serves the
//! HTTP API until ctrl-c/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use chat_relay::auth::TokenValidator;
use chat_relay::config::GlobalConfig;
use chat_relay::http::{self, AppState};
use chat_relay::persistence::conversation_repo::ConversationRepo;
use chat_relay::persistence::db;
use chat_relay::persistence::message_repo::MessageRepo;
use chat_relay::persistence::store::RelayStore;
use chat_relay::relay::orchestrator::StreamOrchestrator;
use chat_relay::relay::registry::{spawn_reaper, StreamSessionRegistry};
use chat_relay::relay::MessageStore;
use chat_relay::upstream::client::AiServiceClient;
use chat_relay::upstream::CompletionBackend;
use chat_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "chat-relay", about = "Chat streaming relay server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("chat-relay server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
            GlobalConfig::from_toml_str(&text)?
        }
        None => GlobalConfig::default(),
    };
    config.load_credentials();
    let config = Arc::new(config);
    info!(
        http_port = config.http_port,
        upstream = %config.upstream.base_url,
        "configuration loaded"
    );

    // ── Initialize database ─────────────────────────────
    let pool = db::connect(&config.db_path).await?;
    info!(db_path = %config.db_path.display(), "database connected");

    // ── Build the relay ─────────────────────────────────
    let registry = Arc::new(StreamSessionRegistry::new());
    let store: Arc<dyn MessageStore> = Arc::new(RelayStore::new(pool.clone()));
    let backend: Arc<dyn CompletionBackend> = Arc::new(AiServiceClient::new(&config.upstream)?);
    let orchestrator = Arc::new(StreamOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&backend),
        Arc::clone(&registry),
        config.relay.clone(),
        config.upstream.system_prompt.clone(),
    ));

    let ct = CancellationToken::new();
    let reaper_handle = spawn_reaper(
        Arc::clone(&registry),
        config.relay.attach_window(),
        ct.clone(),
    );
    info!("session reaper started");

    // ── Build shared application state ──────────────────
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        registry: Arc::clone(&registry),
        orchestrator,
        backend,
        conversations: ConversationRepo::new(pool.clone()),
        messages: MessageRepo::new(pool),
        validator: Arc::new(TokenValidator::new(&config.auth.jwt_secret)),
    });

    // ── Serve HTTP ──────────────────────────────────────
    let server_ct = ct.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(state, server_ct).await {
            error!(%err, "http server failed");
        }
    });

    info!("chat-relay ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    // ── Cancel live sessions and drain tasks ────────────
    registry.cancel_all().await;
    let _ = tokio::join!(server_handle, reaper_handle);
    info!("chat-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
