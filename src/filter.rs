use crate::{
    location::MultihopContext,
    tunnel::{Constraint, Ownership, RelayConstraints, TunnelSettings},
};

/// A setting that narrows down which relays a hop can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectLocationFilter {
    Owned,
    Rented,
    /// Number of providers allowed.
    Provider(usize),
    Daita,
    Obfuscation,
}

impl SelectLocationFilter {
    /// Filters in effect for the entry and exit hop, in that order.
    ///
    /// DAITA and obfuscation only concern the relay the device connects to.
    pub fn active_filters(settings: &TunnelSettings) -> (Vec<Self>, Vec<Self>) {
        let mut shared = Vec::new();
        if let Some(filter) = settings.relay_constraints.filter.value() {
            match filter.ownership {
                Constraint::Only(Ownership::MullvadOwned) => shared.push(Self::Owned),
                Constraint::Only(Ownership::Rented) => shared.push(Self::Rented),
                Constraint::Any => {}
            }
            if let Constraint::Only(providers) = &filter.providers {
                shared.push(Self::Provider(providers.len()));
            }
        }

        let mut entry = shared.clone();
        let mut exit = shared;
        let first_hop = if settings.multihop_enabled {
            &mut entry
        } else {
            &mut exit
        };
        if settings.daita.enabled {
            first_hop.push(Self::Daita);
        }
        if settings.obfuscation_enabled {
            first_hop.push(Self::Obfuscation);
        }
        (entry, exit)
    }

    pub fn for_hop(settings: &TunnelSettings, hop: MultihopContext) -> Vec<Self> {
        let (entry, exit) = Self::active_filters(settings);
        match hop {
            MultihopContext::Entry => entry,
            MultihopContext::Exit => exit,
        }
    }

    /// `constraints` with this filter lifted.
    ///
    /// Returns `None` for filters that are not relay constraints, or when
    /// there is nothing to remove.
    pub fn removed_from(self, constraints: &RelayConstraints) -> Option<RelayConstraints> {
        let mut constraints = constraints.clone();
        let Constraint::Only(filter) = &mut constraints.filter else {
            return None;
        };
        match self {
            Self::Owned | Self::Rented => filter.ownership = Constraint::Any,
            Self::Provider(_) => filter.providers = Constraint::Any,
            Self::Daita | Self::Obfuscation => return None,
        }
        Some(constraints)
    }
}
