//! Facilities the embedding environment provides: durable key/value storage,
//! page navigation, and an application event bus.
//!
//! In a browser these map onto local/session storage, `location`, and
//! `window` events. The in-memory implementations here back native hosts and
//! tests.

mod events;
mod navigation;
mod storage;

use std::sync::Arc;

pub use events::{AppEvent, EventBus, LogoutDetail};
pub use navigation::Navigator;
pub use storage::{MemoryStorage, Storage, StorageArea};

use crate::popup::MessageBus;

/// Everything the session manager needs from its host.
#[derive(Clone)]
pub struct Host {
    /// Durable key/value storage
    pub storage: Arc<dyn Storage>,
    /// Page location and reload
    pub navigator: Arc<dyn Navigator>,
    /// Application event bus
    pub events: EventBus,
    /// Cross-window message bus for popup login
    pub bus: Arc<dyn MessageBus>,
}
