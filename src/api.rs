//! The relay list as served by the Mullvad API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    relay_candidates::{self, RelayCandidateProvider, RelayCandidates, filter_matches},
    tunnel::TunnelSettings,
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Location {
    pub country: String,
    pub city: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RelayList {
    /// Keyed by `<country code>-<city code>`.
    pub locations: BTreeMap<String, Location>,
    pub wireguard: WireguardList,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WireguardList {
    pub relays: Vec<Relay>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Relay {
    pub hostname: String,
    pub location: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub owned: bool,
    #[serde(default)]
    pub provider: String,
}

fn default_true() -> bool {
    true
}

impl RelayList {
    /// Join every relay with its location.
    ///
    /// Relays with unknown or malformed locations are skipped.
    pub fn relays(&self) -> Vec<relay_candidates::Relay> {
        self.wireguard
            .relays
            .iter()
            .filter_map(|relay| {
                let Some(location) = self.locations.get(&relay.location) else {
                    tracing::warn!("{} has unknown location {}", relay.hostname, relay.location);
                    return None;
                };
                let Some((country_code, city_code)) = relay.location.split_once('-') else {
                    tracing::warn!("{} has malformed location {}", relay.hostname, relay.location);
                    return None;
                };
                Some(relay_candidates::Relay {
                    hostname: relay.hostname.clone(),
                    country_code: country_code.to_owned(),
                    country_name: location.country.clone(),
                    city_code: city_code.to_owned(),
                    city_name: location.city.clone(),
                    owned: relay.owned,
                    provider: relay.provider.clone(),
                    active: relay.active,
                })
            })
            .collect()
    }
}

impl RelayCandidateProvider for RelayList {
    fn find_candidates(&self, settings: &TunnelSettings) -> anyhow::Result<RelayCandidates> {
        let relays: Vec<_> = self
            .relays()
            .into_iter()
            .filter(|relay| filter_matches(&settings.relay_constraints.filter, relay))
            .collect();
        Ok(RelayCandidates {
            entry_relays: settings.multihop_enabled.then(|| relays.clone()),
            exit_relays: relays,
        })
    }
}
