//! Tunnel settings and status, as delivered by the tunnel observer.

use serde::{Deserialize, Serialize};

use crate::location::{MultihopContext, RelayLocation, UserSelectedRelays};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Constraint<T> {
    Any,
    Only(T),
}

impl<T> Default for Constraint<T> {
    fn default() -> Self {
        Constraint::Any
    }
}

impl<T> Constraint<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Constraint::Any => None,
            Constraint::Only(value) => Some(value),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Constraint::Any)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    MullvadOwned,
    Rented,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RelayFilter {
    pub ownership: Constraint<Ownership>,
    pub providers: Constraint<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RelayConstraints {
    pub entry_locations: Constraint<UserSelectedRelays>,
    pub exit_locations: Constraint<UserSelectedRelays>,
    pub filter: Constraint<RelayFilter>,
}

impl Default for RelayConstraints {
    fn default() -> Self {
        Self {
            entry_locations: Constraint::Any,
            exit_locations: Constraint::Only(UserSelectedRelays::location(
                RelayLocation::Country("se".into()),
            )),
            filter: Constraint::Any,
        }
    }
}

impl RelayConstraints {
    pub fn locations(&self, hop: MultihopContext) -> Option<&UserSelectedRelays> {
        match hop {
            MultihopContext::Entry => self.entry_locations.value(),
            MultihopContext::Exit => self.exit_locations.value(),
        }
    }

    pub fn set_locations(&mut self, hop: MultihopContext, locations: UserSelectedRelays) {
        let constraint = Constraint::Only(locations);
        match hop {
            MultihopContext::Entry => self.entry_locations = constraint,
            MultihopContext::Exit => self.exit_locations = constraint,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct DaitaSettings {
    pub enabled: bool,
    pub use_multihop_if_necessary: bool,
}

impl DaitaSettings {
    /// DAITA may pick the entry relay on its own.
    pub fn is_automatic_routing(&self) -> bool {
        self.enabled && self.use_multihop_if_necessary
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TunnelSettings {
    pub relay_constraints: RelayConstraints,
    pub multihop_enabled: bool,
    pub daita: DaitaSettings,
    pub obfuscation_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedReason {
    NoRelaysSatisfyingConstraints,
    NoRelaysSatisfyingDaitaConstraints,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRelay {
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRelays {
    pub entry: Option<SelectedRelay>,
    pub exit: SelectedRelay,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TunnelStatus {
    pub state: ConnectionState,
    pub relays: Option<SelectedRelays>,
    pub blocked_reason: Option<BlockedReason>,
}

impl TunnelStatus {
    /// Hostname of the relay `hop` is connected through, if any.
    pub fn hostname(&self, hop: MultihopContext) -> Option<&str> {
        let relays = self.relays.as_ref()?;
        match hop {
            MultihopContext::Entry => relays.entry.as_ref().map(|relay| relay.hostname.as_str()),
            MultihopContext::Exit => Some(relays.exit.hostname.as_str()),
        }
    }
}
