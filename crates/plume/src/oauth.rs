//! The OAuth SDK as seen from plume.
//!
//! The SDK owns authorization, token storage, refresh and DPoP proofs. Plume
//! only drives it through [`OAuthSdk`] and reads its notifications.

use std::sync::Arc;

use async_trait::async_trait;
use plume_common::types::{Did, Handle};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tokio::sync::broadcast;

/// Opaque failure reported by the SDK.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
#[error("{message}")]
#[diagnostic(code(plume::oauth::sdk))]
pub struct SdkError {
    message: SmolStr,
}

/// Message fragments the SDK uses when the user backs out of authorization.
const CANCELLATION_MARKERS: &[&str] = &["cancel", "popup closed", "user aborted", "access_denied"];

impl SdkError {
    /// Wrap an SDK failure message.
    pub fn new(message: impl Into<SmolStr>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The SDK's message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the message says the user cancelled the login.
    pub fn is_cancellation(&self) -> bool {
        let lower = self.message.to_lowercase();
        CANCELLATION_MARKERS.iter().any(|m| lower.contains(m))
    }
}

/// Options passed to [`OAuthSdk::sign_in`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInOptions {
    /// Application state echoed back by the callback
    pub state: Option<String>,
    /// Authorize in a popup window instead of redirecting the page
    pub popup: bool,
}

/// Parameters delivered to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: SmolStr,
    /// State parameter, identifies the pending authorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SmolStr>,
    /// Issuer of the authorization server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<SmolStr>,
}

impl CallbackParams {
    /// Parse from a redirect query string (with or without the leading `?`).
    pub fn from_query(query: &str) -> Result<Self, SdkError> {
        parse_callback_query(query.trim_start_matches('?'))
    }
}

fn parse_callback_query(query: &str) -> Result<CallbackParams, SdkError> {
    let pairs = url::form_urlencoded::parse(query.as_bytes());
    let mut code = None;
    let mut state = None;
    let mut iss = None;
    let mut error = None;
    for (key, value) in pairs {
        match key.as_ref() {
            "code" => code = Some(SmolStr::new(value)),
            "state" => state = Some(SmolStr::new(value)),
            "iss" => iss = Some(SmolStr::new(value)),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }
    if let Some(error) = error {
        return Err(SdkError::new(error));
    }
    let code = code.ok_or_else(|| SdkError::new("callback is missing the authorization code"))?;
    Ok(CallbackParams { code, state, iss })
}

/// An authenticated OAuth session held by the SDK.
#[async_trait]
pub trait OAuthSession: Send + Sync {
    /// Subject of the session.
    fn sub(&self) -> &Did;

    /// Send a request with DPoP-bound authorization.
    ///
    /// Nonce handling and the single nonce retry happen inside the SDK.
    async fn fetch_handler(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, SdkError>;
}

impl std::fmt::Debug for dyn OAuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSession").field("sub", self.sub()).finish()
    }
}

/// A processed authorization callback.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    /// The new session
    pub session: Arc<dyn OAuthSession>,
    /// Application state from the authorization request
    pub state: Option<String>,
}

/// What the SDK found when it started.
#[derive(Debug, Clone)]
pub enum SdkInit {
    /// The page was an authorization callback and it was processed
    Callback(CallbackOutcome),
    /// A stored session was restored
    Restored(Arc<dyn OAuthSession>),
}

/// Session notifications from the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkEvent {
    /// Tokens for `sub` were refreshed
    Updated {
        /// Subject whose tokens changed
        sub: Did,
    },
    /// The session for `sub` is gone (revoked, refresh failed, ...)
    Deleted {
        /// Subject whose session was removed
        sub: Did,
        /// SDK-provided reason
        cause: SmolStr,
    },
}

/// Operations plume consumes from the OAuth SDK.
#[async_trait]
pub trait OAuthSdk: Send + Sync {
    /// Construct the client and run its callback/restore flow.
    async fn init(&self) -> Result<Option<SdkInit>, SdkError>;

    /// Start authorization for `handle`. Redirects or opens a popup.
    async fn sign_in(&self, handle: &Handle, options: SignInOptions) -> Result<(), SdkError>;

    /// Exchange callback parameters for a session.
    async fn callback(&self, params: CallbackParams) -> Result<CallbackOutcome, SdkError>;

    /// Load the stored session for `sub`.
    async fn restore(&self, sub: &Did) -> Result<Arc<dyn OAuthSession>, SdkError>;

    /// Revoke the session for `sub`.
    async fn revoke(&self, sub: &Did) -> Result<(), SdkError>;

    /// Session updated/deleted notifications.
    fn subscribe(&self) -> broadcast::Receiver<SdkEvent>;
}
