use std::sync::Arc;

use tokio::sync::broadcast;

use super::{RecentConnections, RecentsError, RecentsUpdate};
use crate::{
    location::{MultihopContext, UserSelectedRelays},
    settings::{SettingsKey, SettingsStore, parse_unversioned_payload, produce_unversioned_payload},
};

pub const DEFAULT_MAX_LIMIT: usize = 50;

const CHANNEL_CAPACITY: usize = 16;

/// Persists [`RecentConnections`] and broadcasts every new snapshot.
///
/// Each operation publishes exactly one [`RecentsUpdate`]: the new snapshot on
/// success, or the failure. Failures are never retried.
pub struct RecentsStore<S> {
    store: S,
    max_limit: usize,
    updates: broadcast::Sender<RecentsUpdate>,
}

impl<S: SettingsStore> RecentsStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_max_limit(store, DEFAULT_MAX_LIMIT)
    }

    pub fn with_max_limit(store: S, max_limit: usize) -> Self {
        let (updates, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            store,
            max_limit,
            updates,
        }
    }

    pub fn max_limit(&self) -> usize {
        self.max_limit
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecentsUpdate> {
        self.updates.subscribe()
    }

    pub fn read(&self) -> Result<RecentConnections, RecentsError> {
        let data = self.store.read(SettingsKey::RecentConnections)?;
        let mut value: RecentConnections =
            parse_unversioned_payload(&data).map_err(RecentsError::Decode)?;
        if !value.is_enabled {
            value = RecentConnections::new(false);
        }
        Ok(value)
    }

    pub fn write(&self, value: &RecentConnections) -> Result<(), RecentsError> {
        let data = produce_unversioned_payload(value).map_err(RecentsError::Encode)?;
        self.store.write(&data, SettingsKey::RecentConnections)?;
        Ok(())
    }

    /// Turn recents on or off. Stored locations are always cleared.
    pub fn set_enabled(&self, is_enabled: bool) {
        let value = RecentConnections::new(is_enabled);
        let result = self.write(&value).map(|()| value);
        self.publish(result);
    }

    /// Record `location` as the most recent selection for `hop`.
    ///
    /// Fails with [`RecentsError::RecentsDisabled`] without writing anything
    /// if recents are turned off.
    pub fn add(&self, location: UserSelectedRelays, hop: MultihopContext) {
        let result = self.read().and_then(|current| {
            if !current.is_enabled {
                return Err(RecentsError::RecentsDisabled);
            }
            let new = current.inserting(location, hop, self.max_limit);
            self.write(&new)?;
            Ok(new)
        });
        self.publish(result);
    }

    /// Publish the stored snapshot, or why it could not be read.
    pub fn emit_current(&self) {
        self.publish(self.read());
    }

    fn publish(&self, result: Result<RecentConnections, RecentsError>) {
        if let Err(error) = &result {
            tracing::debug!("Recents operation failed: {error}");
        }
        if self.updates.send(result.map_err(Arc::new)).is_err() {
            tracing::trace!("No subscribers for recent connections");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{location::RelayLocation, settings::MemoryStore};

    fn loc(code: &str) -> UserSelectedRelays {
        UserSelectedRelays::location(RelayLocation::Country(code.into()))
    }

    fn next(rx: &mut broadcast::Receiver<RecentsUpdate>) -> RecentsUpdate {
        rx.try_recv().expect("an update was published")
    }

    fn enabled_store(max_limit: usize) -> (RecentsStore<MemoryStore>, MemoryStore) {
        let memory = MemoryStore::new();
        let store = RecentsStore::with_max_limit(memory.clone(), max_limit);
        store.set_enabled(true);
        (store, memory)
    }

    #[test]
    fn first_read_is_not_found() {
        let store = RecentsStore::new(MemoryStore::new());
        let mut rx = store.subscribe();
        store.emit_current();
        assert!(next(&mut rx).unwrap_err().is_not_found());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn corrupt_payload_is_decode_error() {
        let memory = MemoryStore::new();
        memory.insert_raw(SettingsKey::RecentConnections, "not json");
        let store = RecentsStore::new(memory);
        assert!(matches!(store.read(), Err(RecentsError::Decode(_))));
    }

    #[test]
    fn add_moves_to_front_and_caps() {
        let (store, _) = enabled_store(2);
        let mut rx = store.subscribe();
        let exit = |rx: &mut broadcast::Receiver<RecentsUpdate>| next(rx).unwrap().exit_locations;

        store.add(loc("a"), MultihopContext::Exit);
        assert_eq!(exit(&mut rx), vec![loc("a")]);
        store.add(loc("b"), MultihopContext::Exit);
        assert_eq!(exit(&mut rx), vec![loc("b"), loc("a")]);
        store.add(loc("a"), MultihopContext::Exit);
        assert_eq!(exit(&mut rx), vec![loc("a"), loc("b")]);
        store.add(loc("c"), MultihopContext::Exit);
        assert_eq!(exit(&mut rx), vec![loc("c"), loc("a")]);

        assert_eq!(store.read().unwrap().exit_locations, vec![loc("c"), loc("a")]);
    }

    #[test]
    fn bounded_recency_over_long_sequences() {
        let (store, _) = enabled_store(DEFAULT_MAX_LIMIT);
        for i in 0..120 {
            store.add(loc(&format!("c{}", i % 70)), MultihopContext::Entry);
        }
        let entries = store.read().unwrap().entry_locations;
        assert_eq!(entries.len(), DEFAULT_MAX_LIMIT);
        assert_eq!(entries[0], loc("c49"));
        assert_eq!(entries[DEFAULT_MAX_LIMIT - 1], loc("c0"));
    }

    #[test]
    fn hops_are_independent() {
        let (store, _) = enabled_store(5);
        store.add(loc("a"), MultihopContext::Entry);
        store.add(loc("b"), MultihopContext::Exit);
        let current = store.read().unwrap();
        assert_eq!(current.entry_locations, vec![loc("a")]);
        assert_eq!(current.exit_locations, vec![loc("b")]);
    }

    #[test]
    fn toggling_clears_recents() {
        let (store, _) = enabled_store(5);
        store.add(loc("a"), MultihopContext::Entry);
        store.add(loc("b"), MultihopContext::Exit);

        store.set_enabled(false);
        assert_eq!(store.read().unwrap(), RecentConnections::new(false));

        store.set_enabled(true);
        assert_eq!(store.read().unwrap(), RecentConnections::new(true));
    }

    #[test]
    fn add_while_disabled_does_not_write() {
        let memory = MemoryStore::new();
        let store = RecentsStore::new(memory.clone());
        store.set_enabled(false);
        let writes = memory.write_count();
        let mut rx = store.subscribe();

        store.add(loc("a"), MultihopContext::Entry);

        let error = next(&mut rx).unwrap_err();
        assert!(matches!(*error, RecentsError::RecentsDisabled));
        assert_eq!(memory.write_count(), writes);
    }

    #[test]
    fn failed_write_publishes_failure() {
        let (store, memory) = enabled_store(5);
        let mut rx = store.subscribe();
        memory.set_fail_writes(true);

        store.add(loc("a"), MultihopContext::Entry);
        assert!(matches!(*next(&mut rx).unwrap_err(), RecentsError::Store(_)));
        assert!(rx.try_recv().is_err());

        memory.set_fail_writes(false);
        assert!(store.read().unwrap().entry_locations.is_empty());
    }
}
