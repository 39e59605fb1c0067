//! Authenticated calls against the current identity's PDS.
//!
//! The transport is picked once per call: a server-issued access token is sent
//! as a bearer header; otherwise the OAuth session for the subject is restored
//! from the SDK and its DPoP-bound fetch is used.

use std::sync::Arc;

use bytes::Bytes;
use http::Request;
use plume_common::AuthorizationToken;
use plume_common::error::TransportError;
use plume_common::http_client::HttpClient;
use plume_common::session::IdentitySession;
use plume_common::xrpc::{CallOptions, blob_request, procedure_request};
use serde::Serialize;
use serde::de::DeserializeOwned;
use smol_str::SmolStr;
use url::Url;

use crate::error::FetchError;
use crate::oauth::{OAuthSdk, OAuthSession};
use crate::store::SessionStore;

/// How a request is authenticated.
#[derive(Debug, Clone)]
pub enum Transport {
    /// Server-issued access token, sent as `Authorization: Bearer`
    BearerToken(SmolStr),
    /// OAuth session whose fetch adds DPoP proofs
    DpopSession(Arc<dyn OAuthSession>),
}

/// Sends requests to a PDS on behalf of the current session.
pub struct AuthenticatedFetcher<C> {
    http: C,
    sdk: Arc<dyn OAuthSdk>,
    store: Arc<SessionStore>,
}

impl<C: Clone> Clone for AuthenticatedFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            sdk: self.sdk.clone(),
            store: self.store.clone(),
        }
    }
}

impl<C: HttpClient + Sync> AuthenticatedFetcher<C> {
    /// Fetcher over `http` for bearer calls and `sdk` for DPoP calls.
    pub fn new(http: C, sdk: Arc<dyn OAuthSdk>, store: Arc<SessionStore>) -> Self {
        Self { http, sdk, store }
    }

    /// The current session, or [`FetchError::NotAuthenticated`].
    pub fn session(&self) -> Result<IdentitySession, FetchError> {
        self.store.current().ok_or(FetchError::NotAuthenticated)
    }

    /// Pick the transport for the current session.
    pub async fn transport(&self) -> Result<Transport, FetchError> {
        let session = self.session()?;
        match &session.access_token {
            Some(token) => Ok(Transport::BearerToken(token.clone())),
            None => {
                let oauth = self.sdk.restore(session.sub()).await?;
                Ok(Transport::DpopSession(oauth))
            }
        }
    }

    async fn send(
        &self,
        build: impl FnOnce(&CallOptions) -> Result<Request<Vec<u8>>, TransportError>,
    ) -> Result<Bytes, FetchError> {
        let transport = self.transport().await?;
        let response = match &transport {
            Transport::BearerToken(token) => {
                let opts = CallOptions {
                    auth: Some(AuthorizationToken::Bearer(token.clone())),
                    ..Default::default()
                };
                let request = build(&opts)?;
                tracing::debug!(uri = %request.uri(), transport = "bearer", "pds request");
                self.http
                    .send_http(request)
                    .await
                    .map_err(|e| TransportError::Other(Box::new(e)))?
            }
            Transport::DpopSession(oauth) => {
                let request = build(&CallOptions::default())?;
                tracing::debug!(uri = %request.uri(), transport = "dpop", "pds request");
                oauth.fetch_handler(request).await?
            }
        };

        let status = response.status();
        let body = response.into_body();
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(Bytes::from(body))
    }

    /// POST a JSON procedure to `pds` and decode the JSON output.
    pub async fn procedure<B, T>(&self, pds: &Url, nsid: &str, input: &B) -> Result<T, FetchError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let body = self
            .send(|opts| procedure_request(pds, nsid, input, opts))
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// POST raw bytes to `pds` and decode the JSON output.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        pds: &Url,
        nsid: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<T, FetchError> {
        let body = self
            .send(|opts| blob_request(pds, nsid, bytes, mime_type, opts))
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
