//! gRPC transaction stream client
//!
//! Opens the indexer's server-streaming `GetTransactions` call. The API key
//! and request name travel as request metadata, and decoded messages have no
//! size limit since a single batch can be large.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{ClientTlsConfig, Endpoint};

use super::error::{IngestError, IngestResult};
use super::models::{GetTransactionsRequest, TransactionsResponse};
use super::proto;
use super::stream::{TransactionSource, TransactionStream, AUTHORIZATION_HEADER, REQUEST_NAME_HEADER};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct GrpcTransactionSource {
    endpoint: Endpoint,
    api_key: AsciiMetadataValue,
    request_name: AsciiMetadataValue,
}

impl std::fmt::Debug for GrpcTransactionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcTransactionSource")
            .field("endpoint", self.endpoint.uri())
            .field("api_key", &"<redacted>")
            .field("request_name", &self.request_name)
            .finish()
    }
}

impl GrpcTransactionSource {
    /// `endpoint` is an `http://` or `https://` URL; TLS with the system
    /// roots is used for `https`.
    pub fn new(endpoint: &str, api_key: &str, request_name: &str) -> IngestResult<Self> {
        let mut builder = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| IngestError::stream(format!("Invalid indexer endpoint '{}': {}", endpoint, e)))?
            .connect_timeout(CONNECT_TIMEOUT)
            .http2_keep_alive_interval(KEEP_ALIVE_INTERVAL)
            .keep_alive_timeout(KEEP_ALIVE_TIMEOUT);

        if endpoint.starts_with("https://") {
            builder = builder
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| IngestError::stream(format!("Failed to configure TLS: {}", e)))?;
        }

        Ok(Self {
            endpoint: builder,
            api_key: metadata_value("API key", api_key)?,
            request_name: metadata_value("request name", request_name)?,
        })
    }
}

fn metadata_value(what: &str, value: &str) -> IngestResult<AsciiMetadataValue> {
    value
        .parse()
        .map_err(|_| IngestError::stream(format!("The {} is not valid gRPC metadata", what)))
}

#[async_trait]
impl TransactionSource for GrpcTransactionSource {
    async fn open(&self, starting_version: u64) -> IngestResult<TransactionStream> {
        let uri = self.endpoint.uri().to_string();
        let channel = self
            .endpoint
            .connect()
            .await
            .map_err(|e| IngestError::stream(format!("Failed to connect to {}: {}", uri, e)))?;

        let mut client = tonic::client::Grpc::new(channel).max_decoding_message_size(usize::MAX);
        client
            .ready()
            .await
            .map_err(|e| IngestError::stream(format!("Indexer at {} is not ready: {}", uri, e)))?;

        let mut request = tonic::Request::new(proto::GetTransactionsRequest::from(
            &GetTransactionsRequest::from_version(starting_version),
        ));
        request
            .metadata_mut()
            .insert(AUTHORIZATION_HEADER, self.api_key.clone());
        request
            .metadata_mut()
            .insert(REQUEST_NAME_HEADER, self.request_name.clone());

        let response = client
            .server_streaming(
                request,
                PathAndQuery::from_static(proto::GET_TRANSACTIONS_PATH),
                ProstCodec::<proto::GetTransactionsRequest, proto::TransactionsResponse>::default(),
            )
            .await
            .map_err(|status| {
                IngestError::stream(format!(
                    "GetTransactions was rejected ({:?}): {}",
                    status.code(),
                    status.message()
                ))
            })?;

        Ok(response
            .into_inner()
            .map(|batch| {
                batch.map(TransactionsResponse::from).map_err(|status| {
                    IngestError::stream(format!(
                        "Stream failed ({:?}): {}",
                        status.code(),
                        status.message()
                    ))
                })
            })
            .boxed())
    }
}
