//! Recently selected locations per hop.

mod controller;
mod projection;
mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    location::{MultihopContext, UserSelectedRelays},
    settings::StoreError,
};

pub use controller::{DEFAULT_RECENTS_ENABLED, RecentsController};
pub use projection::{MAX_DISPLAYED_RECENTS, project_recents};
pub use store::{DEFAULT_MAX_LIMIT, RecentsStore};

/// The persisted recents record.
///
/// Disabled recents never hold any locations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecentConnections {
    pub is_enabled: bool,
    pub entry_locations: Vec<UserSelectedRelays>,
    pub exit_locations: Vec<UserSelectedRelays>,
}

impl RecentConnections {
    pub fn new(is_enabled: bool) -> Self {
        Self {
            is_enabled,
            entry_locations: Vec::new(),
            exit_locations: Vec::new(),
        }
    }

    pub fn locations(&self, hop: MultihopContext) -> &[UserSelectedRelays] {
        match hop {
            MultihopContext::Entry => &self.entry_locations,
            MultihopContext::Exit => &self.exit_locations,
        }
    }

    fn locations_mut(&mut self, hop: MultihopContext) -> &mut Vec<UserSelectedRelays> {
        match hop {
            MultihopContext::Entry => &mut self.entry_locations,
            MultihopContext::Exit => &mut self.exit_locations,
        }
    }

    /// Put `location` first in the `hop` list, keeping at most `max_limit` unique entries.
    pub fn inserting(
        mut self,
        location: UserSelectedRelays,
        hop: MultihopContext,
        max_limit: usize,
    ) -> Self {
        let locations = self.locations_mut(hop);
        locations.retain(|existing| *existing != location);
        locations.insert(0, location);
        locations.truncate(max_limit);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecentsError {
    #[error("Recent connections have not been stored yet")]
    NotFound,
    #[error("Failed to decode recent connections")]
    Decode(#[source] serde_json::Error),
    #[error("Failed to encode recent connections")]
    Encode(#[source] serde_json::Error),
    #[error("Failed to access the settings store")]
    Store(#[source] StoreError),
    #[error("To add the location to the recents, first enable it in the settings.")]
    RecentsDisabled,
}

impl RecentsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RecentsError::NotFound)
    }
}

impl From<StoreError> for RecentsError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { .. } => RecentsError::NotFound,
            error => RecentsError::Store(error),
        }
    }
}

/// What the recents store broadcasts after every operation.
pub type RecentsUpdate = Result<RecentConnections, Arc<RecentsError>>;
