//! Upstream transaction stream
//!
//! The stream is consumed through [`TransactionSource`], so the ingestion
//! loop does not care how batches are transported. Indexers are normally
//! reached over gRPC ([`GrpcTransactionSource`](super::grpc::GrpcTransactionSource)).
//! [`HttpTransactionSource`] reads the JSON mapping of the same stream from
//! relays that expose it over HTTP: one POST opens the stream, and the
//! response body carries newline-delimited JSON batches until the server
//! closes it.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

use super::error::{IngestError, IngestResult};
use super::models::{GetTransactionsRequest, TransactionsResponse};

pub const AUTHORIZATION_HEADER: &str = "x-aptos-data-authorization";
pub const REQUEST_NAME_HEADER: &str = "x-aptos-request-name";

pub type TransactionStream = BoxStream<'static, IngestResult<TransactionsResponse>>;

/// Opens an ordered stream of transaction batches.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Start streaming at `starting_version`. The stream ends when the
    /// upstream closes the connection.
    async fn open(&self, starting_version: u64) -> IngestResult<TransactionStream>;
}

#[derive(Debug, Clone)]
pub struct HttpTransactionSource {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    request_name: String,
}

impl HttpTransactionSource {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        request_name: impl Into<String>,
    ) -> IngestResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tontine-processor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::stream(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            request_name: request_name.into(),
        })
    }
}

#[async_trait]
impl TransactionSource for HttpTransactionSource {
    async fn open(&self, starting_version: u64) -> IngestResult<TransactionStream> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION_HEADER, &self.api_key)
            .header(REQUEST_NAME_HEADER, &self.request_name)
            .json(&GetTransactionsRequest::from_version(starting_version))
            .send()
            .await
            .map_err(|e| IngestError::stream(format!("Failed to connect to {}: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::stream(format!(
                "Upstream returned {}: {}",
                status, body
            )));
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let lines = FramedRead::new(StreamReader::new(body), LinesCodec::new());

        Ok(lines
            .filter_map(|line| async move {
                match line {
                    Ok(line) if line.trim().is_empty() => None,
                    Ok(line) => Some(serde_json::from_str::<TransactionsResponse>(&line).map_err(
                        |e| IngestError::stream(format!("Undecodable batch: {}", e)),
                    )),
                    Err(e) => Some(Err(IngestError::stream(format!(
                        "Failed to read stream: {}",
                        e
                    )))),
                }
            })
            .boxed())
    }
}
