//! Tontine Processor Library
//!
//! Indexes the events of one on-chain tontine contract into a relational view
//! and serves that view over HTTP.
//!
//! # Overview
//!
//! - **Ingestion**: streams transactions from an indexer, decodes contract
//!   events and applies them one version at a time ([`ingest`])
//! - **Store**: schema, transactional writes and read queries over
//!   PostgreSQL or SQLite ([`db`])
//! - **Query API**: read-only axum routes ([`api`], [`features`])
//! - **Configuration**: YAML file plus `TONTINE_*` environment ([`config`])
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tontine_processor::{config::Config, db, ingest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let store = db::connect(&config.db_config()).await?;
//!     store.ensure_schema().await?;
//!
//!     let source = ingest::GrpcTransactionSource::new(
//!         &config.indexer.endpoint,
//!         &config.indexer.api_key,
//!         &config.indexer.name,
//!     )?;
//!     let mut processor =
//!         ingest::TontineProcessor::new(config.processor_config(), store, Arc::new(source));
//!     processor.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;

pub use error::AppError;
