use tokio::sync::broadcast::{self, error::TryRecvError};

use super::{RecentConnections, RecentsError, RecentsStore, RecentsUpdate};
use crate::{
    location::{MultihopContext, UserSelectedRelays},
    settings::SettingsStore,
};

/// Whether recents count as enabled before anything has been stored.
pub const DEFAULT_RECENTS_ENABLED: bool = true;

/// Caches the latest recents snapshot and hides store failures from its callers.
///
/// Failures are logged, and the controller keeps serving the last good
/// snapshot (or nothing at all).
pub struct RecentsController<S> {
    store: RecentsStore<S>,
    updates: broadcast::Receiver<RecentsUpdate>,
    recent_connections: Option<RecentConnections>,
}

impl<S: SettingsStore> RecentsController<S> {
    /// Subscribe to `store` and load what it currently holds.
    pub fn new(store: RecentsStore<S>) -> Self {
        let updates = store.subscribe();
        let mut controller = Self {
            store,
            updates,
            recent_connections: None,
        };
        controller.store.emit_current();
        controller.sync();
        controller
    }

    pub fn is_enabled(&self) -> bool {
        self.recent_connections
            .as_ref()
            .map_or(DEFAULT_RECENTS_ENABLED, |recents| recents.is_enabled)
    }

    pub fn recent_connections(&self) -> Option<&RecentConnections> {
        self.recent_connections.as_ref()
    }

    pub fn toggle(&mut self) {
        self.store.set_enabled(!self.is_enabled());
        self.sync();
    }

    /// Record `location` for `hop`. Does nothing if recents are disabled.
    pub fn save(&mut self, location: UserSelectedRelays, hop: MultihopContext) {
        self.store.add(location, hop);
        self.sync();
    }

    pub fn fetch(&self, hop: MultihopContext) -> &[UserSelectedRelays] {
        self.recent_connections
            .as_ref()
            .map(|recents| recents.locations(hop))
            .unwrap_or_default()
    }

    /// Drain every update the store has published since the last call.
    fn sync(&mut self) {
        loop {
            match self.updates.try_recv() {
                Ok(Ok(recents)) => self.recent_connections = Some(recents),
                Ok(Err(error)) => self.on_failure(&error),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {skipped} recent connection updates");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    fn on_failure(&mut self, error: &RecentsError) {
        match error {
            // Nothing stored yet. This only happens on first use.
            RecentsError::NotFound => {
                tracing::info!("Initializing recent connections");
                self.store.set_enabled(DEFAULT_RECENTS_ENABLED);
            }
            RecentsError::RecentsDisabled => {
                tracing::debug!("Not recording location: recents are disabled");
            }
            error => {
                tracing::error!("Failed to update recent connections: {error}");
            }
        }
    }
}
