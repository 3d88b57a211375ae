//! Tontine Processor - Main entry point
//!
//! Runs the ingestion loop and the query API in one process until a shutdown
//! signal arrives or ingestion fails.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tontine_common::logging::{init_logging, LogConfig};
use tracing::{error, info};

use tontine_processor::{
    api::{self, AppState},
    config::{Config, IndexerTransport},
    db::{self, Store},
    ingest::{
        GrpcTransactionSource, HttpTransactionSource, ProcessorExit, TontineProcessor,
        TransactionSource,
    },
};

#[derive(Parser, Debug)]
#[command(name = "tontine-processor")]
#[command(about = "Index tontine contract events and serve them over HTTP", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "TONTINE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .log_file_prefix("tontine-processor")
        .filter_directives("tontine_processor=debug,tower_http=debug,sqlx=warn")
        .build()
        .with_env_overrides()?;
    let _guard = init_logging(&log_config)?;

    info!("Starting tontine processor");

    let config = Config::load(cli.config.as_deref())?;
    info!(
        chain_id = config.chain_id,
        indexer_name = %config.indexer.name,
        module = %config.processor_config().target.destroy_function_id(),
        transport = ?config.indexer.transport,
        run_processor = config.run_processor,
        api_port = ?config.api.port,
        "Configuration loaded"
    );

    let store = db::connect(&config.db_config()).await?;
    store.ensure_schema().await?;
    info!("Database schema ready");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let ingestion = run_ingestion(&config, store.clone(), shutdown.clone());
    let api = run_api(&config, store, shutdown.clone());

    let result = tokio::try_join!(ingestion, api);
    shutdown.cancel();

    if let Err(e) = &result {
        error!("Tontine processor exiting: {:#}", e);
    }
    result.map(|_| ())
}

async fn run_ingestion(
    config: &Config,
    store: Arc<dyn Store>,
    shutdown: CancellationToken,
) -> Result<()> {
    if !config.run_processor {
        info!("Processor is disabled (run_processor=false)");
        return Ok(());
    }

    let indexer = &config.indexer;
    let source: Arc<dyn TransactionSource> = match indexer.transport {
        IndexerTransport::Grpc => Arc::new(GrpcTransactionSource::new(
            &indexer.endpoint,
            &indexer.api_key,
            &indexer.name,
        )?),
        IndexerTransport::Http => Arc::new(HttpTransactionSource::new(
            indexer.endpoint.clone(),
            indexer.api_key.clone(),
            indexer.name.clone(),
        )?),
    };
    let mut processor = TontineProcessor::new(config.processor_config(), store, source);

    match processor.run(shutdown).await? {
        ProcessorExit::Shutdown => Ok(()),
        ProcessorExit::StreamClosed => {
            anyhow::bail!("Transaction stream closed by upstream; restart to resume from checkpoint")
        },
    }
}

async fn run_api(config: &Config, store: Arc<dyn Store>, shutdown: CancellationToken) -> Result<()> {
    let Some(port) = config.api.port else {
        info!("API is disabled (no api_port configured)");
        return Ok(());
    };

    let state = AppState {
        store,
        indexer_name: config.indexer.name.clone(),
    };
    api::serve(state, &config.api, port, shutdown).await
}

async fn shutdown_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    shutdown.cancel();
}
