//! End-to-end ingestion tests: scripted stream → decoder → materializer → store

mod helpers;

use helpers::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tontine_common::types::TontineStateKind;
use tontine_processor::db::Store;
use tontine_processor::ingest::{
    IngestError, ProcessorExit, StartingVersionConfig, TontineProcessor,
};

async fn run(
    store: Arc<dyn Store>,
    starting_version: StartingVersionConfig,
    batches: Vec<tontine_processor::ingest::models::TransactionsResponse>,
) -> Result<ProcessorExit, IngestError> {
    let source = VecSource::new(batches);
    TontineProcessor::new(processor_config(starting_version), store, source)
        .run(CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_tontine_lifecycle_ends_complete_with_members_kept() {
    let store = memory_store().await;

    let exit = run(
        store.clone(),
        StartingVersionConfig::default(),
        vec![
            batch(vec![user_txn(0, vec![created("a", "1"), invited("a", "2")])]),
            batch(vec![
                user_txn(1, vec![contributed("0xa", "0x1"), contributed("0xa", "0x2")]),
                user_txn(2, vec![locked("0xa")]),
            ]),
        ],
    )
    .await
    .unwrap();
    assert_eq!(exit, ProcessorExit::StreamClosed);
    assert_eq!(
        store.tontine_state("0xa").await.unwrap(),
        Some(TontineStateKind::Locked)
    );
    let members_before = store.tontine_members("0xa").await.unwrap();
    assert_eq!(members_before.len(), 2);
    assert!(members_before.iter().all(|m| m.has_ever_contributed));

    run(
        store.clone(),
        StartingVersionConfig::default(),
        vec![batch(vec![user_txn(3, vec![funds_claimed("0xa")])])],
    )
    .await
    .unwrap();

    assert_eq!(store.tontine_state("0xa").await.unwrap(), None);
    assert_eq!(store.tontine_members("0xa").await.unwrap(), members_before);
    assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), Some(4));

    let tontines = store.member_tontines("0x2").await.unwrap();
    assert_eq!(tontines.len(), 1);
    assert_eq!(tontines[0].state, -1);
}

#[tokio::test]
async fn test_member_left_removes_only_that_member() {
    let store = memory_store().await;

    run(
        store.clone(),
        StartingVersionConfig::default(),
        vec![batch(vec![
            user_txn(0, vec![created("0xa", "0x1"), invited("0xa", "0x2"), invited("0xa", "0x3")]),
            user_txn(1, vec![left("0xa", "0x2")]),
        ])],
    )
    .await
    .unwrap();

    let members: Vec<_> = store
        .tontine_members("0xa")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.member_address)
        .collect();
    assert_eq!(members, vec!["0x1", "0x3"]);
}

#[tokio::test]
async fn test_create_then_destroy_in_one_version() {
    let store = memory_store().await;

    run(
        store.clone(),
        StartingVersionConfig::default(),
        vec![batch(vec![with_destroy_call(
            user_txn(0, vec![created("0xa", "0x1"), invited("0xa", "0x2")]),
            "a",
        )])],
    )
    .await
    .unwrap();

    assert!(store.tontine_members("0xa").await.unwrap().is_empty());
    assert_eq!(store.tontine_state("0xa").await.unwrap(), None);
    assert!(store.member_tontines("0x1").await.unwrap().is_empty());
    assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_irrelevant_transactions_only_advance_checkpoint() {
    let store = memory_store().await;

    run(
        store.clone(),
        StartingVersionConfig {
            override_version: None,
            default_version: Some(100),
        },
        vec![batch(vec![
            system_txn(100),
            user_txn(101, vec![event_from("0xdead", "TontineCreatedEvent", "0xa", serde_json::json!({"creator": "0x1"}))]),
            user_txn(102, vec![event("SomeFutureEvent", "0xa", serde_json::json!({"x": 1}))]),
        ])],
    )
    .await
    .unwrap();

    assert!(store.member_tontines("0x1").await.unwrap().is_empty());
    assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), Some(103));
}

#[tokio::test]
async fn test_crash_before_commit_replays_the_version() {
    let store = memory_store().await;
    let batches = || {
        vec![batch(vec![
            user_txn(0, vec![created("0xa", "0x1")]),
            user_txn(1, vec![invited("0xa", "0x2"), contributed("0xa", "0x1")]),
        ])]
    };

    // Version 1 writes its rows, then fails before the checkpoint commits.
    let crashing = CrashBeforeCommit::new(store.clone(), 2);
    let err = run(crashing, StartingVersionConfig::default(), batches())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::StoreWrite { version: 1, .. }));
    assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), Some(1));
    assert_eq!(store.tontine_members("0xa").await.unwrap().len(), 1);

    // Restart resolves to version 1, not 2, and reapplies it.
    let source = VecSource::new(vec![batch(vec![user_txn(
        1,
        vec![invited("0xa", "0x2"), contributed("0xa", "0x1")],
    )])]);
    TontineProcessor::new(
        processor_config(StartingVersionConfig::default()),
        store.clone(),
        source.clone(),
    )
    .run(CancellationToken::new())
    .await
    .unwrap();
    assert_eq!(source.opened_at(), Some(1));

    // Same final state as an uninterrupted run.
    let reference = memory_store().await;
    run(reference.clone(), StartingVersionConfig::default(), batches())
        .await
        .unwrap();

    for member in ["0x1", "0x2"] {
        assert_eq!(
            store.member_tontines(member).await.unwrap(),
            reference.member_tontines(member).await.unwrap()
        );
    }
    assert_eq!(
        store.tontine_members("0xa").await.unwrap(),
        reference.tontine_members("0xa").await.unwrap()
    );
    assert_eq!(
        store.next_version(INDEXER_NAME).await.unwrap(),
        reference.next_version(INDEXER_NAME).await.unwrap()
    );
}

#[tokio::test]
async fn test_gap_stops_before_applying() {
    let store = memory_store().await;

    let err = run(
        store.clone(),
        StartingVersionConfig {
            override_version: Some(5),
            default_version: None,
        },
        vec![batch(vec![user_txn(7, vec![created("0xa", "0x1")])])],
    )
    .await
    .unwrap_err();

    assert_eq!(err.version(), Some(7));
    assert!(store.tontine_members("0xa").await.unwrap().is_empty());
    assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), None);
}

#[tokio::test]
async fn test_wrong_chain_applies_nothing_from_the_batch() {
    let store = memory_store().await;
    let mut foreign = batch(vec![user_txn(0, vec![created("0xa", "0x1")])]);
    foreign.chain_id = Some(CHAIN_ID + 1);

    let err = run(store.clone(), StartingVersionConfig::default(), vec![foreign])
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::ProtocolViolation(_)));
    assert!(store.tontine_members("0xa").await.unwrap().is_empty());
    assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), None);
}

#[tokio::test]
async fn test_malformed_payload_is_fatal_and_not_checkpointed() {
    let store = memory_store().await;

    let err = run(
        store.clone(),
        StartingVersionConfig::default(),
        vec![batch(vec![
            user_txn(0, vec![created("0xa", "0x1")]),
            user_txn(1, vec![event("MemberInvitedEvent", "0xa", serde_json::json!({"invitee": "0x2"}))]),
        ])],
    )
    .await
    .unwrap_err();

    assert!(matches!(err, IngestError::Decode { version: 1, .. }));
    assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_non_json_lock_payload_is_fatal_and_not_checkpointed() {
    let store = memory_store().await;
    let mut lock = locked("0xa");
    lock.data = "this is not json".to_string();

    let err = run(
        store.clone(),
        StartingVersionConfig::default(),
        vec![batch(vec![user_txn(0, vec![created("0xa", "0x1")]), user_txn(1, vec![lock])])],
    )
    .await
    .unwrap_err();

    assert!(matches!(err, IngestError::Decode { version: 1, .. }));
    assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), Some(1));
    assert_eq!(
        store.tontine_state("0xa").await.unwrap(),
        Some(TontineStateKind::Staging)
    );
}

#[tokio::test]
async fn test_override_rewinds_past_checkpoint() {
    let store = memory_store().await;

    run(
        store.clone(),
        StartingVersionConfig::default(),
        vec![batch(vec![system_txn(0), system_txn(1), system_txn(2)])],
    )
    .await
    .unwrap();
    assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), Some(3));

    let source = VecSource::new(vec![batch(vec![system_txn(1)])]);
    TontineProcessor::new(
        processor_config(StartingVersionConfig {
            override_version: Some(1),
            default_version: None,
        }),
        store.clone(),
        source.clone(),
    )
    .run(CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(source.opened_at(), Some(1));
    assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), Some(2));
}

mod http_source {
    use super::*;
    use tontine_processor::ingest::HttpTransactionSource;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_ingests_from_http_stream() {
        let server = MockServer::start().await;
        let lines: Vec<String> = vec![
            serde_json::to_string(&batch(vec![user_txn(0, vec![created("0xa", "0x1")])])).unwrap(),
            serde_json::to_string(&batch(vec![user_txn(1, vec![locked("0xa")])])).unwrap(),
        ];

        Mock::given(method("POST"))
            .and(header("x-aptos-request-name", INDEXER_NAME))
            .respond_with(ResponseTemplate::new(200).set_body_string(lines.join("\n") + "\n"))
            .mount(&server)
            .await;

        let store = memory_store().await;
        let source = HttpTransactionSource::new(server.uri(), "key", INDEXER_NAME).unwrap();
        let exit = TontineProcessor::new(
            processor_config(StartingVersionConfig::default()),
            store.clone(),
            Arc::new(source),
        )
        .run(CancellationToken::new())
        .await
        .unwrap();

        assert_eq!(exit, ProcessorExit::StreamClosed);
        assert_eq!(
            store.tontine_state("0xa").await.unwrap(),
            Some(TontineStateKind::Locked)
        );
        assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), Some(2));
    }
}

mod grpc_source {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tonic::body::BoxBody;
    use tonic::codec::ProstCodec;
    use tonic::codegen::tokio_stream::wrappers::TcpListenerStream;
    use tonic::codegen::{http, BoxFuture, Service};
    use tonic::server::{NamedService, ServerStreamingService};
    use tonic::{Request, Response, Status};
    use tontine_processor::ingest::{proto, GrpcTransactionSource};

    type Batches = futures::stream::Iter<std::vec::IntoIter<Result<proto::TransactionsResponse, Status>>>;

    /// Starting version and the two metadata entries of one call.
    type Received = (Option<u64>, String, String);

    /// In-process `aptos.indexer.v1.RawData` server replaying fixed batches.
    #[derive(Clone, Default)]
    struct RawDataServer {
        batches: Vec<proto::TransactionsResponse>,
        received: Arc<Mutex<Vec<Received>>>,
    }

    struct GetTransactions(RawDataServer);

    impl ServerStreamingService<proto::GetTransactionsRequest> for GetTransactions {
        type Response = proto::TransactionsResponse;
        type ResponseStream = Batches;
        type Future = futures::future::Ready<Result<Response<Batches>, Status>>;

        fn call(&mut self, request: Request<proto::GetTransactionsRequest>) -> Self::Future {
            let metadata = |key: &str| {
                request
                    .metadata()
                    .get(key)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            self.0.received.lock().unwrap().push((
                request.get_ref().starting_version,
                metadata("x-aptos-data-authorization"),
                metadata("x-aptos-request-name"),
            ));

            let batches: Vec<_> = self.0.batches.iter().cloned().map(Ok).collect();
            futures::future::ready(Ok(Response::new(futures::stream::iter(batches))))
        }
    }

    impl Service<http::Request<BoxBody>> for RawDataServer {
        type Response = http::Response<BoxBody>;
        type Error = Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: http::Request<BoxBody>) -> Self::Future {
            let method = GetTransactions(self.clone());
            Box::pin(async move {
                let codec =
                    ProstCodec::<proto::TransactionsResponse, proto::GetTransactionsRequest>::default();
                Ok(tonic::server::Grpc::new(codec)
                    .server_streaming(method, request)
                    .await)
            })
        }
    }

    impl NamedService for RawDataServer {
        const NAME: &'static str = "aptos.indexer.v1.RawData";
    }

    async fn serve(server: RawDataServer) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(
            tonic::transport::Server::builder()
                .add_service(server)
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );
        format!("http://{}", addr)
    }

    fn proto_event(name: &str, tontine: &str, data: String) -> proto::Event {
        proto::Event {
            key: Some(proto::EventKey {
                account_address: tontine.to_string(),
            }),
            move_type: Some(proto::MoveType {
                content: Some(proto::MoveTypeContent::Struct(proto::MoveStructTag {
                    address: MODULE_ADDRESS.to_string(),
                    module: MODULE_NAME.to_string(),
                    name: name.to_string(),
                })),
            }),
            data,
        }
    }

    fn proto_batch(version: u64, events: Vec<proto::Event>) -> proto::TransactionsResponse {
        proto::TransactionsResponse {
            transactions: vec![proto::Transaction {
                version,
                transaction_type: 4,
                txn_data: Some(proto::TxnData::User(proto::UserTransaction {
                    request: None,
                    events,
                })),
            }],
            chain_id: Some(CHAIN_ID),
        }
    }

    async fn ingest(server: RawDataServer) -> (Arc<dyn Store>, ProcessorExit) {
        let endpoint = serve(server).await;
        let store = memory_store().await;
        let source = GrpcTransactionSource::new(&endpoint, "secret", INDEXER_NAME).unwrap();

        let exit = TontineProcessor::new(
            processor_config(StartingVersionConfig::default()),
            store.clone(),
            Arc::new(source),
        )
        .run(CancellationToken::new())
        .await
        .unwrap();

        (store, exit)
    }

    #[tokio::test]
    async fn test_ingests_from_grpc_stream() {
        let server = RawDataServer {
            batches: vec![
                proto_batch(
                    0,
                    vec![proto_event("TontineCreatedEvent", "0xa", r#"{"creator":"0x1"}"#.to_string())],
                ),
                proto_batch(1, vec![proto_event("TontineLockedEvent", "0xa", "{}".to_string())]),
            ],
            ..Default::default()
        };
        let received = server.received.clone();

        let (store, exit) = ingest(server).await;

        assert_eq!(exit, ProcessorExit::StreamClosed);
        assert_eq!(
            store.tontine_state("0xa").await.unwrap(),
            Some(TontineStateKind::Locked)
        );
        assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), Some(2));
        assert_eq!(
            *received.lock().unwrap(),
            vec![(Some(0), "secret".to_string(), INDEXER_NAME.to_string())]
        );
    }

    #[tokio::test]
    async fn test_accepts_batches_above_default_message_limit() {
        let padding = "x".repeat(5 * 1024 * 1024);
        let data = format!(r#"{{"creator":"0x1","note":"{}"}}"#, padding);
        let server = RawDataServer {
            batches: vec![proto_batch(0, vec![proto_event("TontineCreatedEvent", "0xa", data)])],
            ..Default::default()
        };

        let (store, exit) = ingest(server).await;

        assert_eq!(exit, ProcessorExit::StreamClosed);
        assert_eq!(store.member_tontines("0x1").await.unwrap().len(), 1);
        assert_eq!(store.next_version(INDEXER_NAME).await.unwrap(), Some(1));
    }
}
