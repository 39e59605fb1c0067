use std::collections::VecDeque;
use std::sync::Arc;

use http::{Response as HttpResponse, StatusCode};
use plume_common::did_doc::PdsEndpointError;
use plume_common::http_client::HttpClient;
use plume_common::types::{Did, Handle};
use plume_identity::PlumeResolver;
use plume_identity::resolver::{IdentityError, IdentityResolver, ResolverOptions};
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct MockClient {
    queue: Arc<Mutex<VecDeque<HttpResponse<Vec<u8>>>>>,
    log: Arc<Mutex<Vec<http::Request<Vec<u8>>>>>,
}

impl MockClient {
    async fn push_json(&self, status: StatusCode, body: serde_json::Value) {
        self.queue.lock().await.push_back(
            HttpResponse::builder()
                .status(status)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(&body).unwrap())
                .unwrap(),
        );
    }
}

impl HttpClient for MockClient {
    type Error = std::convert::Infallible;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>,
    > + Send {
        let log = self.log.clone();
        let queue = self.queue.clone();
        async move {
            log.lock().await.push(request);
            Ok(queue.lock().await.pop_front().expect("no queued response"))
        }
    }
}

fn resolver(client: MockClient) -> PlumeResolver<MockClient> {
    PlumeResolver::new(client, ResolverOptions::default())
}

fn pds_doc(did: &str) -> serde_json::Value {
    serde_json::json!({
        "id": did,
        "alsoKnownAs": ["at://alice.example"],
        "service": [{
            "id": "#atproto_pds",
            "type": "AtprotoPersonalDataServer",
            "serviceEndpoint": "https://pds.example"
        }]
    })
}

#[tokio::test]
async fn plc_document_fetched_from_directory() {
    let client = MockClient::default();
    client.push_json(StatusCode::OK, pds_doc("did:plc:abc123")).await;
    let r = resolver(client.clone());

    let did = Did::new("did:plc:abc123").unwrap();
    let pds = r.pds_for_did(&did).await.unwrap();
    assert_eq!(pds.as_str(), "https://pds.example/");

    let log = client.log.lock().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].method(), http::Method::GET);
    assert_eq!(
        log[0].uri().to_string(),
        "https://plc.directory/did%3Aplc%3Aabc123"
    );
}

#[tokio::test]
async fn non_success_is_resolution_error() {
    let client = MockClient::default();
    client
        .push_json(StatusCode::NOT_FOUND, serde_json::json!({"message": "DID not registered"}))
        .await;
    let r = resolver(client);
    let err = r
        .resolve_did_doc(&Did::new("did:plc:missing").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::HttpStatus(StatusCode::NOT_FOUND)));
}

#[tokio::test]
async fn malformed_document_is_resolution_error() {
    let client = MockClient::default();
    client
        .push_json(StatusCode::OK, serde_json::json!({"not": "a document"}))
        .await;
    let r = resolver(client);
    let err = r
        .resolve_did_doc(&Did::new("did:plc:abc123").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Serde(_)));
}

#[tokio::test]
async fn other_methods_are_unsupported_without_a_request() {
    let client = MockClient::default();
    let r = resolver(client.clone());
    let err = r
        .resolve_did_doc(&Did::new("did:web:example.com").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::UnsupportedDidMethod(_)));
    assert!(client.log.lock().await.is_empty());
}

#[tokio::test]
async fn zero_pds_entries_fails() {
    let client = MockClient::default();
    client
        .push_json(
            StatusCode::OK,
            serde_json::json!({ "id": "did:plc:abc123", "service": [] }),
        )
        .await;
    let r = resolver(client);
    let err = r
        .pds_for_did(&Did::new("did:plc:abc123").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Pds(PdsEndpointError::Missing)));
}

#[tokio::test]
async fn document_for_another_did_rejected() {
    let client = MockClient::default();
    client.push_json(StatusCode::OK, pds_doc("did:plc:someoneelse")).await;
    let r = resolver(client);
    let err = r
        .pds_for_did(&Did::new("did:plc:abc123").unwrap())
        .await
        .unwrap_err();
    match err {
        IdentityError::DocIdMismatch { expected, found } => {
            assert_eq!(expected.as_str(), "did:plc:abc123");
            assert_eq!(found.as_str(), "did:plc:someoneelse");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn handle_resolves_through_public_endpoint() {
    let client = MockClient::default();
    client
        .push_json(StatusCode::OK, serde_json::json!({ "did": "did:plc:bob" }))
        .await;
    let r = resolver(client.clone());
    let did = r
        .resolve_handle(&Handle::new("@Bob.Example").unwrap())
        .await
        .unwrap();
    assert_eq!(did.as_str(), "did:plc:bob");

    let log = client.log.lock().await;
    assert_eq!(
        log[0].uri().to_string(),
        "https://public.api.bsky.app/xrpc/com.atproto.identity.resolveHandle?handle=bob.example"
    );
}

#[tokio::test]
async fn pds_for_handle_chains_both_lookups() {
    let client = MockClient::default();
    client
        .push_json(StatusCode::OK, serde_json::json!({ "did": "did:plc:abc123" }))
        .await;
    client.push_json(StatusCode::OK, pds_doc("did:plc:abc123")).await;
    let r = resolver(client.clone());
    let (did, pds) = r
        .pds_for_handle(&Handle::new("alice.example").unwrap())
        .await
        .unwrap();
    assert_eq!(did.as_str(), "did:plc:abc123");
    assert_eq!(pds.host_str(), Some("pds.example"));
    assert_eq!(client.log.lock().await.len(), 2);
}
