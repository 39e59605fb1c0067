//! Cross-window handshake for popup login.
//!
//! The popup finishes authorization and must tell the opener who signed in.
//! Messages between windows can be lost, so the popup re-posts its
//! [`PopupMessage::Result`] until the opener answers with a matching
//! [`PopupMessage::Ack`]. Both sides give up after a bounded wait.
//!
//! ```text
//! opener                      popup
//!   | --- Request{id} ------->  |   (answered at once if a result is ready)
//!   | <-- Result{id, outcome} - |   (every retry_interval)
//!   | --- Ack{id} ----------->  |
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use plume_common::types::Did;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::config::PopupOptions;
use crate::error::PopupError;
use crate::oauth::SdkError;

/// Envelope exchanged between the opener and the popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PopupMessage {
    /// Opener asks for the result of request `id`
    Request {
        /// Request id, carried through authorization as the state parameter
        id: SmolStr,
    },
    /// Opener confirms it received the result of `id`
    Ack {
        /// Request id
        id: SmolStr,
    },
    /// Popup reports how request `id` ended
    Result {
        /// Request id
        id: SmolStr,
        /// Login outcome
        outcome: PopupOutcome,
    },
}

/// How the popup login ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum PopupOutcome {
    /// Authorized; the SDK now holds a session for `sub`
    Success {
        /// Subject that signed in
        sub: Did,
    },
    /// Authorization failed
    Failure {
        /// SDK error message
        message: SmolStr,
    },
}

/// Cross-window message channel (`BroadcastChannel` in a browser).
///
/// Every subscriber sees every message, including its own posts.
pub trait MessageBus: Send + Sync {
    /// Post to all windows. Delivery is not guaranteed.
    fn post(&self, message: PopupMessage);

    /// Receive messages posted from now on.
    fn subscribe(&self) -> broadcast::Receiver<PopupMessage>;
}

/// In-process [`MessageBus`] over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<PopupMessage>,
}

impl BroadcastBus {
    /// Bus retaining up to `capacity` undelivered messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MessageBus for BroadcastBus {
    fn post(&self, message: PopupMessage) {
        let _ = self.tx.send(message);
    }

    fn subscribe(&self) -> broadcast::Receiver<PopupMessage> {
        self.tx.subscribe()
    }
}

/// Fresh id for a popup login request.
pub fn new_request_id() -> SmolStr {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    SmolStr::new(format!("popup-{now:x}-{n}"))
}

/// Popup side: post `outcome` for request `id` until the opener acknowledges it.
pub async fn deliver_result(
    bus: &dyn MessageBus,
    id: &str,
    outcome: PopupOutcome,
    opts: &PopupOptions,
) -> Result<(), PopupError> {
    let mut rx = bus.subscribe();
    let result = PopupMessage::Result {
        id: SmolStr::new(id),
        outcome,
    };
    let mut retry = tokio::time::interval(opts.retry_interval);
    let deadline = tokio::time::sleep(opts.ack_timeout);
    tokio::pin!(deadline);

    let mut posts = 0u32;
    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::warn!(id, posts, "popup result never acknowledged");
                return Err(PopupError::DeliveryTimeout);
            }
            _ = retry.tick() => {
                posts += 1;
                bus.post(result.clone());
            }
            msg = rx.recv() => match msg {
                Ok(PopupMessage::Ack { id: acked }) if acked == id => {
                    tracing::debug!(id, posts, "popup result acknowledged");
                    return Ok(());
                }
                Ok(PopupMessage::Request { id: asked }) if asked == id => {
                    posts += 1;
                    bus.post(result.clone());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "popup bus lagged"),
                Err(RecvError::Closed) => return Err(PopupError::BusClosed),
            },
        }
    }
}

/// Opener side: wait for the result of request `id`.
///
/// `rx` must be subscribed before authorization starts so an early result is
/// not missed. Every result seen is acknowledged, including ones for other
/// requests, so stale popups stop re-posting.
pub async fn await_result(
    bus: &dyn MessageBus,
    mut rx: broadcast::Receiver<PopupMessage>,
    id: &str,
    opts: &PopupOptions,
) -> Result<Did, PopupError> {
    bus.post(PopupMessage::Request {
        id: SmolStr::new(id),
    });

    let wait = async {
        let mut seen = HashSet::new();
        loop {
            match rx.recv().await {
                Ok(PopupMessage::Result { id: rid, outcome }) => {
                    bus.post(PopupMessage::Ack { id: rid.clone() });
                    if rid != id {
                        if seen.insert(rid.clone()) {
                            tracing::debug!(id = %rid, "acknowledged result for another request");
                        }
                        continue;
                    }
                    return match outcome {
                        PopupOutcome::Success { sub } => Ok(sub),
                        PopupOutcome::Failure { message } => {
                            Err(PopupError::Failed(SdkError::new(message)))
                        }
                    };
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "popup bus lagged"),
                Err(RecvError::Closed) => return Err(PopupError::BusClosed),
            }
        }
    };

    tokio::time::timeout(opts.result_timeout, wait)
        .await
        .map_err(|_| PopupError::ResultTimeout)?
}
