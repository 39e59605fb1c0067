//! The process-wide current session.
//!
//! One writer (the session manager) and any number of readers. Readers get
//! cloned snapshots, or a `watch` receiver to follow changes.

use plume_common::session::IdentitySession;
use tokio::sync::watch;

use crate::error::SessionError;
use crate::host::StorageArea;

/// Local-area key holding the current subject DID.
pub const SUB_KEY: &str = "plume.sub";
/// Local-area key holding the current handle.
pub const HANDLE_KEY: &str = "plume.handle";
/// Local-area key holding a server-issued session blob.
pub const SERVER_SESSION_KEY: &str = "plume.server-session";
/// Session-area key holding the post-login destination.
pub const RETURN_TO_KEY: &str = "plume.return-to";

/// Every identity-related storage key; all are cleared together on logout.
pub const IDENTITY_KEYS: [(StorageArea, &str); 4] = [
    (StorageArea::Local, SUB_KEY),
    (StorageArea::Local, HANDLE_KEY),
    (StorageArea::Local, SERVER_SESSION_KEY),
    (StorageArea::Session, RETURN_TO_KEY),
];

/// Authentication lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Initial state, and the state after an anonymous init
    Unauthenticated,
    /// The SDK is starting up
    Initializing,
    /// A session is current
    Authenticated,
    /// The SDK reported new tokens and the session is being updated
    Refreshing,
    /// Logged out or revoked; the host is reloading
    LoggedOut,
}

/// Holder of the current [`IdentitySession`].
pub struct SessionStore {
    session: watch::Sender<Option<IdentitySession>>,
    state: watch::Sender<AuthState>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Empty store in [`AuthState::Unauthenticated`].
    pub fn new() -> Self {
        Self {
            session: watch::Sender::new(None),
            state: watch::Sender::new(AuthState::Unauthenticated),
        }
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Option<IdentitySession> {
        self.session.borrow().clone()
    }

    /// Follow session changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<IdentitySession>> {
        self.session.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    /// Follow lifecycle state changes.
    pub fn watch_state(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Move to `state`.
    pub fn set_state(&self, state: AuthState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(?previous, ?state, "auth state");
        }
    }

    /// Install `session` as current, replacing any previous identity.
    pub fn establish(&self, session: IdentitySession) {
        self.session.send_replace(Some(session));
    }

    /// Replace the current session with a refreshed copy of the same subject.
    pub fn refresh(&self, session: IdentitySession) -> Result<(), SessionError> {
        let mut result = Ok(());
        self.session.send_if_modified(|current| match current {
            Some(existing) if existing.sub() != session.sub() => {
                result = Err(SessionError::SubjectMismatch {
                    current: existing.sub().clone(),
                    update: session.sub().clone(),
                });
                false
            }
            _ => {
                *current = Some(session);
                true
            }
        });
        result
    }

    /// Forget the current session.
    pub fn clear(&self) {
        self.session.send_replace(None);
    }
}
