#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use http::{HeaderValue, StatusCode, header};
use plume::config::ClientConfig;
use plume::host::{Host, MemoryStorage, Navigator, Storage};
use plume::oauth::{
    CallbackOutcome, CallbackParams, OAuthSdk, OAuthSession, SdkError, SdkEvent, SdkInit,
    SignInOptions,
};
use plume::popup::BroadcastBus;
use plume::SessionManager;
use plume_common::http_client::HttpClient;
use plume_common::types::{Did, Handle};
use plume_identity::PlumeResolver;
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast};

pub const PDS: &str = "https://pds.example";

/// HTTP mock answering by URL prefix; unmatched requests get a 404.
#[derive(Clone, Default)]
pub struct MockClient {
    routes: Arc<std::sync::Mutex<Vec<(String, StatusCode, Value)>>>,
    pub log: Arc<Mutex<Vec<http::Request<Vec<u8>>>>>,
}

impl MockClient {
    pub fn route(&self, prefix: &str, status: StatusCode, body: Value) {
        self.routes
            .lock()
            .unwrap()
            .push((prefix.to_string(), status, body));
    }

    pub async fn uris(&self) -> Vec<String> {
        self.log
            .lock()
            .await
            .iter()
            .map(|r| r.uri().to_string())
            .collect()
    }

    pub async fn requests_to(&self, prefix: &str) -> Vec<http::Request<Vec<u8>>> {
        self.log
            .lock()
            .await
            .iter()
            .filter(|r| r.uri().to_string().starts_with(prefix))
            .map(|r| {
                let mut copy = http::Request::builder()
                    .method(r.method().clone())
                    .uri(r.uri().clone());
                for (name, value) in r.headers() {
                    copy = copy.header(name, value);
                }
                copy.body(r.body().clone()).unwrap()
            })
            .collect()
    }

    fn respond(&self, uri: &str) -> http::Response<Vec<u8>> {
        let routes = self.routes.lock().unwrap();
        let (status, body) = routes
            .iter()
            .find(|(prefix, _, _)| uri.starts_with(prefix.as_str()))
            .map(|(_, status, body)| (*status, body.clone()))
            .unwrap_or((StatusCode::NOT_FOUND, json!({"error": "NotFound"})));
        http::Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&body).unwrap())
            .unwrap()
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
        let this = self.clone();
        async move {
            let response = this.respond(&request.uri().to_string());
            this.log.lock().await.push(request);
            Ok(response)
        }
    }
}

/// An OAuth session whose fetch marks requests with a DPoP header.
pub struct MockSession {
    pub sub: Did,
    pub http: MockClient,
}

#[async_trait]
impl OAuthSession for MockSession {
    fn sub(&self) -> &Did {
        &self.sub
    }

    async fn fetch_handler(
        &self,
        mut request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, SdkError> {
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("DPoP mock-token"));
        self.http
            .send_http(request)
            .await
            .map_err(|e| SdkError::new(e.to_string()))
    }
}

pub struct MockSdk {
    pub http: MockClient,
    pub init_calls: AtomicUsize,
    /// What `init` reports; `None` means anonymous
    pub init_sub: Option<Did>,
    pub init_from_callback: bool,
    pub init_error: Option<SdkError>,
    pub sign_in_error: Option<SdkError>,
    pub revoke_error: Option<SdkError>,
    pub restore_error: Option<SdkError>,
    /// Announce a deletion from inside `revoke`, as real SDKs do
    pub revoke_announces: bool,
    pub signed_in: Mutex<Vec<(Handle, SignInOptions)>>,
    pub revoked: Mutex<Vec<Did>>,
    pub restored: AtomicUsize,
    pub events: broadcast::Sender<SdkEvent>,
}

impl MockSdk {
    pub fn new(http: MockClient) -> Self {
        Self {
            http,
            init_calls: AtomicUsize::new(0),
            init_sub: None,
            init_from_callback: false,
            init_error: None,
            sign_in_error: None,
            revoke_error: None,
            restore_error: None,
            revoke_announces: false,
            signed_in: Mutex::new(Vec::new()),
            revoked: Mutex::new(Vec::new()),
            restored: AtomicUsize::new(0),
            events: broadcast::channel(8).0,
        }
    }

    fn session(&self, sub: Did) -> Arc<dyn OAuthSession> {
        Arc::new(MockSession {
            sub,
            http: self.http.clone(),
        })
    }
}

#[async_trait]
impl OAuthSdk for MockSdk {
    async fn init(&self) -> Result<Option<SdkInit>, SdkError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up
        tokio::task::yield_now().await;
        if let Some(e) = &self.init_error {
            return Err(e.clone());
        }
        Ok(self.init_sub.clone().map(|sub| {
            if self.init_from_callback {
                SdkInit::Callback(CallbackOutcome {
                    session: self.session(sub),
                    state: Some("app-state".into()),
                })
            } else {
                SdkInit::Restored(self.session(sub))
            }
        }))
    }

    async fn sign_in(&self, handle: &Handle, options: SignInOptions) -> Result<(), SdkError> {
        self.signed_in.lock().await.push((handle.clone(), options));
        match &self.sign_in_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn callback(&self, params: CallbackParams) -> Result<CallbackOutcome, SdkError> {
        if params.code == "bad" {
            return Err(SdkError::new("invalid_grant"));
        }
        Ok(CallbackOutcome {
            session: self.session(Did::new("did:plc:alice").unwrap()),
            state: params.state.map(|s| s.to_string()),
        })
    }

    async fn restore(&self, sub: &Did) -> Result<Arc<dyn OAuthSession>, SdkError> {
        self.restored.fetch_add(1, Ordering::SeqCst);
        match &self.restore_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.session(sub.clone())),
        }
    }

    async fn revoke(&self, sub: &Did) -> Result<(), SdkError> {
        self.revoked.lock().await.push(sub.clone());
        if self.revoke_announces {
            let _ = self.events.send(SdkEvent::Deleted {
                sub: sub.clone(),
                cause: "revoked".into(),
            });
            tokio::task::yield_now().await;
        }
        match &self.revoke_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.events.subscribe()
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub location: Option<String>,
    pub reloads: AtomicUsize,
    pub navigations: std::sync::Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn current_location(&self) -> Option<String> {
        self.location.clone()
    }

    fn navigate(&self, path: &str) {
        self.navigations.lock().unwrap().push(path.to_string());
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn pds_doc(did: &str) -> Value {
    json!({
        "id": did,
        "service": [{
            "id": "#atproto_pds",
            "type": "AtprotoPersonalDataServer",
            "serviceEndpoint": PDS
        }]
    })
}

pub fn plc_prefix(did: &str) -> String {
    format!("https://plc.directory/{}", did.replace(':', "%3A"))
}

pub struct Fixture {
    pub http: MockClient,
    pub sdk: Arc<MockSdk>,
    pub storage: MemoryStorage,
    pub navigator: Arc<RecordingNavigator>,
    pub host: Host,
}

impl Fixture {
    pub fn new(sdk: MockSdk, navigator: RecordingNavigator) -> Self {
        let http = sdk.http.clone();
        let sdk = Arc::new(sdk);
        let storage = MemoryStorage::default();
        let navigator = Arc::new(navigator);
        let host = Host {
            storage: Arc::new(storage.clone()),
            navigator: navigator.clone(),
            events: Default::default(),
            bus: Arc::new(BroadcastBus::default()),
        };
        Self {
            http,
            sdk,
            storage,
            navigator,
            host,
        }
    }

    pub fn replace_storage(&mut self, storage: Arc<dyn Storage>) {
        self.host.storage = storage;
    }

    pub fn manager(&self, config: ClientConfig) -> SessionManager<MockClient, PlumeResolver<MockClient>> {
        let resolver = PlumeResolver::new(self.http.clone(), config.resolver_options());
        SessionManager::new(
            config,
            self.sdk.clone(),
            self.http.clone(),
            resolver,
            self.host.clone(),
        )
    }
}
