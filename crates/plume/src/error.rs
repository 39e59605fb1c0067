//! Error types for session, fetch, publish, storage and popup operations.

use http::StatusCode;
use miette::Diagnostic;
use plume_common::AtUri;
use plume_common::error::{AtStrError, ClientError, TransportError};
use plume_common::types::Did;
use plume_identity::resolver::IdentityError;

use crate::oauth::SdkError;

/// Authentication and session lifecycle errors.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum SessionError {
    /// The user backed out of the authorization flow
    #[error("login cancelled")]
    #[diagnostic(code(plume::session::cancelled))]
    LoginCancelled,

    /// The authorization callback could not be processed
    #[error("authorization callback failed: {0}")]
    #[diagnostic(
        code(plume::session::callback),
        help("the callback URL may be stale or already used; start the login again")
    )]
    Callback(#[source] SdkError),

    /// No session exists for the requested subject
    #[error("no session found for {0}")]
    #[diagnostic(code(plume::session::not_found), help("sign in again"))]
    SessionNotFound(Did),

    /// Any other SDK failure
    #[error("OAuth SDK error: {0}")]
    #[diagnostic(code(plume::session::sdk))]
    Sdk(#[source] SdkError),

    /// The handle given to `login` is not a valid handle
    #[error(transparent)]
    #[diagnostic(code(plume::session::invalid_handle))]
    InvalidHandle(#[from] AtStrError),

    /// Identity resolution failed while logging in
    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),

    /// A direct server call failed
    #[error("server login failed: {0}")]
    #[diagnostic(code(plume::session::server))]
    Server(#[from] ClientError),

    /// Persisting session identity failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(#[from] StorageError),

    /// A refresh tried to change the subject of the current session
    #[error("session subject mismatch: current {current}, update for {update}")]
    #[diagnostic(
        code(plume::session::subject_mismatch),
        help("the subject of a session never changes; log out before switching accounts")
    )]
    SubjectMismatch {
        /// Subject of the current session
        current: Did,
        /// Subject the update carried
        update: Did,
    },

    /// Popup login failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Popup(#[from] PopupError),
}

impl SessionError {
    /// Classify an SDK error raised while starting a login.
    pub fn from_sign_in(err: SdkError) -> Self {
        if err.is_cancellation() {
            Self::LoginCancelled
        } else {
            Self::Sdk(err)
        }
    }

    /// Classify an SDK error raised while processing a callback.
    pub fn from_callback(err: SdkError) -> Self {
        if err.is_cancellation() {
            Self::LoginCancelled
        } else {
            Self::Callback(err)
        }
    }

    /// Short human-readable reason, suitable for a login failure screen.
    pub fn user_message(&self) -> String {
        match self {
            Self::LoginCancelled => "Login was cancelled.".to_string(),
            Self::Callback(_) => {
                "The sign-in response could not be processed. Please try again.".to_string()
            }
            Self::SessionNotFound(_) => "Your session has expired. Please sign in again.".to_string(),
            Self::InvalidHandle(e) => format!("\"{}\" is not a valid handle.", e.value),
            Self::Identity(_) => "We could not find that account.".to_string(),
            Self::Server(ClientError::Http(h)) if h.status == StatusCode::UNAUTHORIZED => {
                "Invalid identifier or password.".to_string()
            }
            Self::Server(_) | Self::Storage(_) => {
                "Sign-in failed because of a network problem. Please try again.".to_string()
            }
            Self::Popup(PopupError::ResultTimeout) => {
                "The sign-in window did not respond in time.".to_string()
            }
            Self::Sdk(e) | Self::Popup(PopupError::Failed(e)) => {
                format!("Sign-in failed: {}", e.message())
            }
            Self::SubjectMismatch { .. } | Self::Popup(_) => {
                "Sign-in failed. Please try again.".to_string()
            }
        }
    }
}

/// Errors from an authenticated PDS call.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum FetchError {
    /// There is no current identity session
    #[error("not authenticated")]
    #[diagnostic(code(plume::fetch::not_authenticated), help("sign in before publishing"))]
    NotAuthenticated,

    /// The PDS answered with a non-success status
    #[error("PDS returned {status}: {body}")]
    #[diagnostic(code(plume::fetch::status))]
    Status {
        /// HTTP status code
        status: StatusCode,
        /// Raw response body text, which may not be JSON
        body: String,
    },

    /// The request never reached the PDS
    #[error(transparent)]
    #[diagnostic(transparent)]
    Transport(#[from] TransportError),

    /// The OAuth session could not be restored or its fetch failed
    #[error("OAuth session error: {0}")]
    #[diagnostic(code(plume::fetch::sdk))]
    Sdk(#[from] SdkError),

    /// The response body was not the expected JSON
    #[error("failed to decode PDS response: {0}")]
    #[diagnostic(code(plume::fetch::decode))]
    Decode(#[from] serde_json::Error),
}

/// Errors from publishing a record or uploading a blob.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum PublishError {
    /// The PDS of the current identity could not be resolved
    #[error("could not resolve the PDS: {0}")]
    #[diagnostic(code(plume::publish::pds))]
    Pds(#[source] IdentityError),

    /// A reply was requested but the parent has no resolvable fingerprint
    #[error("reply parent {0} could not be resolved")]
    #[diagnostic(
        code(plume::publish::reply_parent_not_found),
        help("the parent post may have been deleted")
    )]
    ReplyParentNotFound(AtUri),

    /// The authenticated call failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),
}

/// Errors from host storage.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum StorageError {
    /// Stored value could not be (de)serialized
    #[error("serialization error: {0}")]
    #[diagnostic(code(plume::storage::serde))]
    Serde(#[from] serde_json::Error),
    /// Any other error from a backend implementation
    #[error(transparent)]
    #[diagnostic(code(plume::storage::other))]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the popup login handshake.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum PopupError {
    /// The popup never received an acknowledgement for its result
    #[error("login result was not acknowledged in time")]
    #[diagnostic(
        code(plume::popup::delivery_timeout),
        help("the opener window may have been closed or navigated away")
    )]
    DeliveryTimeout,

    /// The opener never received a result
    #[error("no login result arrived from the popup")]
    #[diagnostic(code(plume::popup::result_timeout))]
    ResultTimeout,

    /// The callback carried no request id to answer
    #[error("callback state does not identify a popup request")]
    #[diagnostic(code(plume::popup::missing_request_id))]
    MissingRequestId,

    /// The message bus shut down
    #[error("message bus closed")]
    #[diagnostic(code(plume::popup::bus_closed))]
    BusClosed,

    /// The popup reported a failed login
    #[error("popup login failed: {0}")]
    #[diagnostic(code(plume::popup::failed))]
    Failed(#[source] SdkError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_normalized() {
        let err = SessionError::from_sign_in(SdkError::new("User cancelled"));
        assert!(matches!(err, SessionError::LoginCancelled));
        assert_eq!(err.user_message(), "Login was cancelled.");

        let err = SessionError::from_sign_in(SdkError::new("server_error"));
        assert!(matches!(err, SessionError::Sdk(_)));
        assert_eq!(err.user_message(), "Sign-in failed: server_error");
    }

    #[test]
    fn callback_errors_keep_their_kind() {
        let err = SessionError::from_callback(SdkError::new("invalid_grant"));
        assert!(matches!(err, SessionError::Callback(_)));
    }
}
