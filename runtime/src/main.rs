use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use docsight::{
    AppState,
    ai::{ChatClient, DocumentAnalyst, OpenAiAnalyst, TiktokenTokenizer},
    config::{AppConfig, StorageBackend, load_config},
    ingest::Ingestor,
    routes::app_router,
    storage::{DocumentStore, JsonDocumentStore, JsonDocumentStoreConfig, MemoryDocumentStore},
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(error = %err, "Backend crashed");
        eprintln!("Backend crashed: {err:#}");
    }
}

async fn run() -> Result<()> {
    init_tracing();
    if let Err(err) = dotenv() {
        warn!(error = %err, "No .env file loaded");
    }

    let mut config = load_config()
        .await
        .context("Failed to load application configuration")?;
    if config.auth.api_key.is_none() {
        config.auth.api_key = env::var("API_KEY").ok().filter(|key| !key.trim().is_empty());
    }
    if config.auth.enabled && config.auth.api_key.is_none() {
        warn!("API key auth is enabled but no key is configured, document endpoints will reject every request");
    }

    let store = build_store(&config);
    store
        .initialize()
        .await
        .context("Failed to initialize document store")?;

    let analyst = build_analyst(&config)?;
    let state = Arc::new(AppState {
        ingestor: Arc::new(Ingestor::new(&config.ingestion)),
        store: store.clone(),
        analyst,
        config: Arc::new(config.clone()),
    });

    let addr_string = format!("{}:{}", config.server.host, config.server.port);
    let addr = addr_string
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid server address: {addr_string}"))?;
    info!(host = %config.server.host, port = config.server.port, "Loaded configuration");

    let app = app_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;
    info!(%addr, "Backend server listening");

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(err) = store.finalize().await {
        warn!(error = %err, "Failed to finalize document store");
    }

    server_result.context("Server encountered a fatal error")?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn build_store(config: &AppConfig) -> Arc<dyn DocumentStore> {
    match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryDocumentStore::new()),
        StorageBackend::Json => Arc::new(JsonDocumentStore::new(JsonDocumentStoreConfig {
            working_dir: config.working_dir(),
            namespace: config.storage.namespace.clone(),
        })),
    }
}

fn build_analyst(config: &AppConfig) -> Result<Option<Arc<dyn DocumentAnalyst>>> {
    let api_key = match env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            warn!("OPENAI_API_KEY not set, document queries are disabled");
            return Ok(None);
        }
    };

    let client = ChatClient::new(api_key, Some(config.llm.base_url.clone()))?;
    let tokenizer = TiktokenTokenizer::new().context("Failed to initialize tokenizer")?;
    Ok(Some(Arc::new(OpenAiAnalyst::new(
        client,
        Arc::new(tokenizer),
        config.llm.clone(),
    ))))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                if stream.recv().await.is_some() {
                    info!("Received SIGTERM");
                }
            }
            Err(err) => warn!(error = %err, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received termination signal (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received termination signal (SIGTERM)");
        }
    }
}
