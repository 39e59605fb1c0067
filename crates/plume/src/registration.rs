//! Best-effort account registration with the application backend.

use http::{Method, Request, header};
use plume_common::error::{ClientError, TransportError, XrpcResult};
use plume_common::http_client::HttpClient;
use plume_common::session::IdentitySession;
use plume_common::xrpc::check_status;
use serde::Serialize;
use url::Url;

use crate::policy::{FailurePolicy, Operation};

#[derive(Serialize)]
struct Registration<'a> {
    did: &'a str,
    handle: &'a str,
}

/// Announces new sessions to a registration endpoint.
#[derive(Clone)]
pub struct Registrar<C> {
    http: C,
    endpoint: Option<Url>,
}

impl<C: HttpClient + Sync> Registrar<C> {
    /// Registrar posting to `endpoint`; `None` disables registration.
    pub fn new(http: C, endpoint: Option<Url>) -> Self {
        Self { http, endpoint }
    }

    /// POST `{did, handle}` for `session`. Failures are logged and dropped.
    pub async fn register(&self, session: &IdentitySession) {
        let Some(endpoint) = &self.endpoint else {
            return;
        };
        let result = self.send(endpoint, session).await;
        if let Ok(Some(())) = FailurePolicy::apply(Operation::Registration, result) {
            tracing::debug!(sub = %session.sub(), "registered");
        }
    }

    async fn send(&self, endpoint: &Url, session: &IdentitySession) -> XrpcResult<()> {
        let body = serde_json::to_vec(&Registration {
            did: session.sub().as_str(),
            handle: &session.handle,
        })
        .map_err(|e| ClientError::Encode(e.to_string()))?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(endpoint.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)?;
        let response = self
            .http
            .send_http(request)
            .await
            .map_err(|e| TransportError::Other(Box::new(e)))?;
        check_status(response)?;
        Ok(())
    }
}
