//! The relays a hop may currently use, and the location tree built from them.

use std::collections::BTreeMap;

use crate::{
    location::{LocationNode, RelayLocation},
    tunnel::{Constraint, Ownership, RelayFilter, TunnelSettings},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    pub hostname: String,
    pub country_code: String,
    pub country_name: String,
    pub city_code: String,
    pub city_name: String,
    pub owned: bool,
    pub provider: String,
    pub active: bool,
}

impl Relay {
    pub fn location(&self) -> RelayLocation {
        RelayLocation::Hostname(
            self.country_code.clone(),
            self.city_code.clone(),
            self.hostname.clone(),
        )
    }
}

/// Relays matching the current settings.
///
/// `entry_relays` is `None` when multihop is off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayCandidates {
    pub exit_relays: Vec<Relay>,
    pub entry_relays: Option<Vec<Relay>>,
}

/// Finds the relays available for the current tunnel settings.
pub trait RelayCandidateProvider {
    fn find_candidates(&self, settings: &TunnelSettings) -> anyhow::Result<RelayCandidates>;
}

/// Whether `relay` passes the ownership and provider `filter`.
pub fn filter_matches(filter: &Constraint<RelayFilter>, relay: &Relay) -> bool {
    let Some(filter) = filter.value() else {
        return true;
    };
    let ownership = match filter.ownership {
        Constraint::Any => true,
        Constraint::Only(Ownership::MullvadOwned) => relay.owned,
        Constraint::Only(Ownership::Rented) => !relay.owned,
    };
    let provider = match &filter.providers {
        Constraint::Any => true,
        Constraint::Only(providers) => providers.contains(&relay.provider),
    };
    ownership && provider
}

/// Build a country/city/relay tree, sorted by name at every level.
pub fn location_tree(relays: &[Relay]) -> Vec<LocationNode> {
    type Cities<'a> = BTreeMap<(&'a str, &'a str), Vec<&'a Relay>>;
    let mut countries: BTreeMap<(&str, &str), Cities<'_>> = BTreeMap::new();
    for relay in relays.iter().filter(|relay| relay.active) {
        countries
            .entry((relay.country_name.as_str(), relay.country_code.as_str()))
            .or_default()
            .entry((relay.city_name.as_str(), relay.city_code.as_str()))
            .or_default()
            .push(relay);
    }

    countries
        .into_iter()
        .map(|((country_name, country_code), cities)| {
            let cities = cities
                .into_iter()
                .map(|((city_name, city_code), mut relays)| {
                    relays.sort_by(|a, b| a.hostname.cmp(&b.hostname));
                    let relays = relays
                        .into_iter()
                        .map(|relay| LocationNode::new(relay.hostname.as_str(), relay.location()))
                        .collect();
                    LocationNode::new(
                        city_name,
                        RelayLocation::City(country_code.to_owned(), city_code.to_owned()),
                    )
                    .with_children(relays)
                })
                .collect();

            LocationNode::new(country_name, RelayLocation::Country(country_code.to_owned()))
                .with_children(cities)
        })
        .collect()
}
