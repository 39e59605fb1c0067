use plume_common::session::IdentitySession;
use plume_common::types::Did;
use smol_str::SmolStr;
use tokio::sync::broadcast;

/// Why a logout happened, when it was not requested locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutDetail {
    /// Subject that was logged out
    pub sub: Did,
    /// Reason given by the SDK
    pub cause: SmolStr,
}

/// Session transitions announced to the rest of the application.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A session was established
    Login(IdentitySession),
    /// The session ended; `None` for an explicit logout
    Logout(Option<LogoutDetail>),
    /// The session's profile was (re)loaded
    ProfileLoaded(IdentitySession),
}

impl AppEvent {
    /// Global event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login(_) => "oauth:login",
            Self::Logout(_) => "oauth:logout",
            Self::ProfileLoaded(_) => "oauth:profile-loaded",
        }
    }
}

/// Broadcast bus for [`AppEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    /// Bus retaining up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Listen for events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Having no listeners is fine.
    pub fn emit(&self, event: AppEvent) {
        tracing::debug!(event = event.name(), "emit");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(32)
    }
}
