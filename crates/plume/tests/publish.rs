mod common;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use common::*;
use http::{StatusCode, header};
use plume::config::ClientConfig;
use plume::error::{FetchError, PublishError};
use plume::publisher::NewPost;
use plume::{SessionManager, detect_facets};
use plume_common::AtUri;
use plume_common::types::Did;
use plume_identity::PlumeResolver;
use serde_json::{Value, json};
use smol_str::SmolStr;

const CREATE_RECORD_URL: &str = "https://pds.example/xrpc/com.atproto.repo.createRecord";
const PARENT: &str = "at://did:plc:parent/app.bsky.feed.post/xyz";

type Manager = SessionManager<MockClient, PlumeResolver<MockClient>>;

/// Signed in over OAuth as `did:plc:abc123`, whose PDS is pds.example.
async fn signed_in() -> (Fixture, Manager) {
    signed_in_with(
        StatusCode::OK,
        json!({
            "uri": "at://did:plc:abc123/app.bsky.feed.post/3kabc",
            "cid": "bafyNEW",
            "validationStatus": "valid"
        }),
    )
    .await
}

async fn signed_in_with(create_status: StatusCode, create_body: Value) -> (Fixture, Manager) {
    let mut sdk = MockSdk::new(MockClient::default());
    sdk.init_sub = Some(Did::new("did:plc:abc123").unwrap());
    let f = Fixture::new(sdk, RecordingNavigator::default());
    f.http.route(
        &plc_prefix("did:plc:abc123"),
        StatusCode::OK,
        pds_doc("did:plc:abc123"),
    );
    f.http.route(CREATE_RECORD_URL, create_status, create_body);
    let m = f.manager(ClientConfig::default());
    m.init().await.unwrap();
    (f, m)
}

async fn created_record(f: &Fixture) -> Value {
    let requests = f.http.requests_to(CREATE_RECORD_URL).await;
    assert_eq!(requests.len(), 1, "expected exactly one createRecord");
    serde_json::from_slice(requests[0].body()).unwrap()
}

#[tokio::test]
async fn publishes_root_post_to_resolved_pds() {
    let (f, m) = signed_in().await;

    let created = m.publisher().publish(NewPost::new("hello world").build()).await.unwrap();
    assert_eq!(created.uri.as_str(), "at://did:plc:abc123/app.bsky.feed.post/3kabc");
    assert_eq!(created.cid, "bafyNEW");

    let requests = f.http.requests_to(CREATE_RECORD_URL).await;
    assert_eq!(requests[0].method(), http::Method::POST);
    assert_eq!(
        requests[0].headers()[header::AUTHORIZATION],
        "DPoP mock-token"
    );

    let body = created_record(&f).await;
    assert_eq!(body["repo"], "did:plc:abc123");
    assert_eq!(body["collection"], "app.bsky.feed.post");
    assert_eq!(body["record"]["$type"], "app.bsky.feed.post");
    assert_eq!(body["record"]["text"], "hello world");
    assert!(body["record"]["createdAt"].as_str().unwrap().ends_with('Z'));
    assert!(body["record"].get("reply").is_none());
    assert!(f.sdk.restored.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn reply_references_parent_fingerprint() {
    let (f, m) = signed_in().await;
    f.http.route(
        "https://pds.example/xrpc/com.atproto.repo.getRecord?repo=did%3Aplc%3Aparent&collection=app.bsky.feed.post&rkey=xyz",
        StatusCode::OK,
        json!({"uri": PARENT, "cid": "bafyABC", "value": {"text": "parent"}}),
    );

    let post = NewPost::new("agreed")
        .reply_to(AtUri::new(PARENT).unwrap())
        .build();
    m.publisher().publish(post).await.unwrap();

    let body = created_record(&f).await;
    let record = &body["record"];
    assert_eq!(record["reply"]["root"]["cid"], "bafyABC");
    assert_eq!(record["reply"]["parent"]["cid"], "bafyABC");
    assert_eq!(record["reply"]["root"]["uri"], PARENT);
    assert_eq!(record["reply"]["parent"]["uri"], PARENT);
}

#[tokio::test]
async fn reply_parent_falls_back_to_public_mirror() {
    let (f, m) = signed_in().await;
    f.http.route(
        "https://public.api.bsky.app/xrpc/com.atproto.repo.getRecord",
        StatusCode::OK,
        json!({"uri": PARENT, "cid": "bafyMIRROR", "value": {}}),
    );

    let post = NewPost::new("late reply")
        .reply_to(AtUri::new(PARENT).unwrap())
        .build();
    m.publisher().publish(post).await.unwrap();

    let uris = f.http.uris().await;
    let pds_lookup = uris
        .iter()
        .position(|u| u.starts_with("https://pds.example/xrpc/com.atproto.repo.getRecord"))
        .unwrap();
    let mirror_lookup = uris
        .iter()
        .position(|u| u.starts_with("https://public.api.bsky.app/xrpc/com.atproto.repo.getRecord"))
        .unwrap();
    assert!(pds_lookup < mirror_lookup);
    assert_eq!(
        created_record(&f).await["record"]["reply"]["parent"]["cid"],
        "bafyMIRROR"
    );
}

#[tokio::test]
async fn unresolvable_reply_parent_sends_nothing() {
    let (f, m) = signed_in().await;
    let post = NewPost::new("into the void")
        .reply_to(AtUri::new(PARENT).unwrap())
        .build();
    let err = m.publisher().publish(post).await.unwrap_err();
    assert!(matches!(err, PublishError::ReplyParentNotFound(uri) if uri.as_str() == PARENT));
    assert!(f.http.requests_to(CREATE_RECORD_URL).await.is_empty());
}

#[tokio::test]
async fn missing_pds_fails_before_any_pds_request() {
    let mut sdk = MockSdk::new(MockClient::default());
    sdk.init_sub = Some(Did::new("did:plc:nopds").unwrap());
    let f = Fixture::new(sdk, RecordingNavigator::default());
    f.http.route(
        &plc_prefix("did:plc:nopds"),
        StatusCode::OK,
        json!({"id": "did:plc:nopds", "service": []}),
    );
    let m = f.manager(ClientConfig::default());
    m.init().await.unwrap();

    let err = m
        .publisher()
        .publish(NewPost::new("hello").build())
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Pds(_)));
    assert!(f.http.requests_to(PDS).await.is_empty());
}

#[tokio::test]
async fn unresolvable_mention_keeps_handle() {
    let (f, m) = signed_in().await;
    f.http.route(
        "https://public.api.bsky.app/xrpc/com.atproto.identity.resolveHandle?handle=bob.example",
        StatusCode::OK,
        json!({"did": "did:plc:bob"}),
    );

    let text = "hi @ghost.example and @bob.example";
    let post = NewPost::new(text).facets(detect_facets(text)).build();
    m.publisher().publish(post).await.unwrap();

    let facets = created_record(&f).await["record"]["facets"].clone();
    assert_eq!(facets[0]["features"][0]["did"], "ghost.example");
    assert_eq!(facets[0]["index"]["byteStart"], 3);
    assert_eq!(facets[1]["features"][0]["$type"], "app.bsky.richtext.facet#mention");
    assert_eq!(facets[1]["features"][0]["did"], "did:plc:bob");
}

#[tokio::test]
async fn extras_cannot_replace_typed_fields() {
    let (f, m) = signed_in().await;
    let mut extra: BTreeMap<SmolStr, Value> = BTreeMap::new();
    extra.insert("text".into(), json!("overwritten"));
    extra.insert("langs".into(), json!(["en"]));

    m.publisher()
        .publish(NewPost::new("original").extra(extra).build())
        .await
        .unwrap();

    let body = created_record(&f).await;
    let record = &body["record"];
    assert_eq!(record["text"], "original");
    assert_eq!(record["langs"], json!(["en"]));
}

#[tokio::test]
async fn pds_rejection_carries_body() {
    let (_f, m) = signed_in_with(
        StatusCode::BAD_REQUEST,
        json!({"error": "InvalidRecord", "message": "text too long"}),
    )
    .await;
    let err = m
        .publisher()
        .publish(NewPost::new("x".repeat(3001)).build())
        .await
        .unwrap_err();
    match err {
        PublishError::Fetch(FetchError::Status { status, body }) => {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body.contains("InvalidRecord"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn publish_requires_a_session() {
    let f = Fixture::new(MockSdk::new(MockClient::default()), RecordingNavigator::default());
    let m = f.manager(ClientConfig::default());
    let err = m
        .publisher()
        .publish(NewPost::new("hello").build())
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Fetch(FetchError::NotAuthenticated)));
    assert!(f.http.uris().await.is_empty());
}

#[tokio::test]
async fn server_session_uses_bearer_token() {
    let f = Fixture::new(MockSdk::new(MockClient::default()), RecordingNavigator::default());
    f.http.route(
        &plc_prefix("did:plc:bob"),
        StatusCode::OK,
        pds_doc("did:plc:bob"),
    );
    f.http.route(
        "https://pds.example/xrpc/com.atproto.server.createSession",
        StatusCode::OK,
        json!({
            "accessJwt": "access-jwt",
            "refreshJwt": "refresh-jwt",
            "did": "did:plc:bob",
            "handle": "bob.example"
        }),
    );
    f.http.route(
        CREATE_RECORD_URL,
        StatusCode::OK,
        json!({"uri": "at://did:plc:bob/app.bsky.feed.post/1", "cid": "bafyB"}),
    );
    let m = f.manager(ClientConfig::default());
    m.login_with_password("did:plc:bob", "hunter2").await.unwrap();

    m.publisher().publish(NewPost::new("hi").build()).await.unwrap();

    let requests = f.http.requests_to(CREATE_RECORD_URL).await;
    assert_eq!(
        requests[0].headers()[header::AUTHORIZATION],
        "Bearer access-jwt"
    );
    assert_eq!(f.sdk.restored.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn uploads_blob_with_content_type() {
    let (f, m) = signed_in().await;
    let blob = json!({
        "$type": "blob",
        "ref": {"$link": "bafkreiblob"},
        "mimeType": "image/png",
        "size": 4
    });
    f.http.route(
        "https://pds.example/xrpc/com.atproto.repo.uploadBlob",
        StatusCode::OK,
        json!({"blob": blob.clone()}),
    );

    let uploaded = m
        .publisher()
        .upload_blob(vec![0x89, b'P', b'N', b'G'], "image/png")
        .await
        .unwrap();
    assert_eq!(uploaded.0, blob);

    let requests = f
        .http
        .requests_to("https://pds.example/xrpc/com.atproto.repo.uploadBlob")
        .await;
    assert_eq!(requests[0].headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(requests[0].body(), &vec![0x89, b'P', b'N', b'G']);
}
