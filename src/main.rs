// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use cortex_relay::config::{self, StoreConfig};
use cortex_relay::prompt::PromptLibrary;
use cortex_relay::provider::{CompletionProvider, HttpSender, OpenAiProvider, ReqwestHttpSender};
use cortex_relay::routes::{self, AppState};
use cortex_relay::sections::SectionCatalog;
use cortex_relay::store::{MemoryStore, PostgrestStore, SessionStore};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cortex-relay", about = "Streaming LLM relay with early section delivery")]
struct Cli {
    /// Path to the relay.yaml config file
    #[arg(long, default_value = "relay.yaml", env = "RELAY_CONFIG")]
    config: String,

    /// Port to listen on (overrides server.port)
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,
}

fn fatal(what: &str, error: impl std::fmt::Display) -> ! {
    tracing::error!("{what}: {error}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = config::FileSource::new(cli.config);
    let config = match config::load_config(&source) {
        Ok(c) => c,
        Err(e) => fatal("failed to load config", e),
    };

    tracing::info!(
        version = %config.version,
        config_hash = %config.config_hash,
        model = %config.provider.model,
        early_batch_threshold = config.delivery.early_batch_threshold,
        heartbeat_secs = config.delivery.heartbeat_interval.as_secs(),
        "config loaded"
    );

    let prompts = match PromptLibrary::load(&config.prompts) {
        Ok(p) => p,
        Err(e) => fatal("failed to load prompts", e),
    };

    let http: Arc<dyn HttpSender> = Arc::new(ReqwestHttpSender::new(reqwest::Client::new()));
    let provider: Arc<dyn CompletionProvider> =
        Arc::new(OpenAiProvider::new(http.clone(), config.provider.clone()));

    let store: Arc<dyn SessionStore> = match &config.store {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Postgrest(settings) => Arc::new(PostgrestStore::new(http, settings.clone())),
    };

    let state = AppState {
        provider,
        prompts: Arc::new(prompts),
        store,
        catalog: Arc::new(SectionCatalog::standard().clone()),
        delivery: config.delivery,
    };
    let app = routes::build_router(state, &config.server);

    let addr = SocketAddr::new(config.server.host, cli.port.unwrap_or(config.server.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => fatal("failed to bind to address", e),
    };

    tracing::info!(%addr, "cortex relay listening");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    };

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        fatal("server error", e);
    }
}
