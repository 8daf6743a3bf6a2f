//! Maps a persisted [`UserSelectedRelays`] back onto a node among the current candidates.

use crate::location::{LocationNode, UserSelectedRelays, location_path, node_at};

/// The node sets a selection can be resolved against.
#[derive(Debug, Clone, Copy)]
pub struct LocationNodes<'a> {
    pub all_locations: &'a [LocationNode],
    pub custom_lists: &'a [LocationNode],
}

impl<'a> LocationNodes<'a> {
    pub fn new(all_locations: &'a [LocationNode], custom_lists: &'a [LocationNode]) -> Self {
        Self {
            all_locations,
            custom_lists,
        }
    }

    /// Use one node set for both locations and custom lists.
    pub fn single(nodes: &'a [LocationNode]) -> Self {
        Self::new(nodes, nodes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSet {
    AllLocations,
    CustomLists,
}

/// Where in a [`LocationNodes`] a selection was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub set: CandidateSet,
    pub path: Vec<usize>,
}

impl Located {
    pub fn node<'a>(&self, candidates: LocationNodes<'a>) -> Option<&'a LocationNode> {
        let nodes = match self.set {
            CandidateSet::AllLocations => candidates.all_locations,
            CandidateSet::CustomLists => candidates.custom_lists,
        };
        node_at(nodes, &self.path)
    }
}

/// Find where `selection` lives among `candidates`.
///
/// A whole-list selection only ever matches a custom list root. A selection of
/// a location inside a custom list is looked up like a plain location, and
/// never matches a custom list root.
pub fn locate(selection: &UserSelectedRelays, candidates: LocationNodes<'_>) -> Option<Located> {
    if let Some(list_selection) = &selection.custom_list_selection {
        if list_selection.is_list {
            return candidates
                .custom_lists
                .iter()
                .position(|node| node.as_custom_list_node() == Some(&list_selection.list_id))
                .map(|index| Located {
                    set: CandidateSet::CustomLists,
                    path: vec![index],
                });
        }
    }

    let location = selection.locations.first()?;
    location_path(candidates.all_locations, &location.node_code()).map(|path| Located {
        set: CandidateSet::AllLocations,
        path,
    })
}

/// Whether `node` stands for the same place `selection` would resolve to.
pub fn node_matches(selection: &UserSelectedRelays, node: &LocationNode) -> bool {
    match &selection.custom_list_selection {
        Some(list_selection) if list_selection.is_list => {
            node.as_custom_list_node() == Some(&list_selection.list_id)
        }
        _ => {
            node.as_custom_list_node().is_none()
                && selection
                    .locations
                    .first()
                    .is_some_and(|location| node.code == location.node_code())
        }
    }
}

/// Resolve `selection` to a copy of the matching node, if it is still available.
pub fn resolve(
    selection: &UserSelectedRelays,
    candidates: LocationNodes<'_>,
) -> Option<LocationNode> {
    locate(selection, candidates)?.node(candidates).cloned()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::location::{CustomListId, CustomListRole, RelayLocation};

    fn country(code: &str) -> RelayLocation {
        RelayLocation::Country(code.into())
    }

    fn city(country: &str, city: &str) -> RelayLocation {
        RelayLocation::City(country.into(), city.into())
    }

    fn host(country: &str, city: &str, host: &str) -> RelayLocation {
        RelayLocation::Hostname(country.into(), city.into(), host.into())
    }

    fn all_locations() -> Vec<LocationNode> {
        vec![
            LocationNode::new("Germany", country("de")).with_children(vec![
                LocationNode::new("Berlin", city("de", "ber")).with_children(vec![
                    LocationNode::new("de-ber-wg-001", host("de", "ber", "de-ber-wg-001")),
                ]),
            ]),
            LocationNode::new("Sweden", country("se")).with_children(vec![
                LocationNode::new("Gothenburg", city("se", "got")).with_children(vec![
                    LocationNode::new("se-got-wg-001", host("se", "got", "se-got-wg-001")),
                    LocationNode::new("se-got-wg-002", host("se", "got", "se-got-wg-002")),
                ]),
            ]),
        ]
    }

    fn custom_lists() -> Vec<LocationNode> {
        let mut member = LocationNode::new("Gothenburg", city("se", "got"));
        member.custom_list = Some(CustomListRole::Member(CustomListId("fav".into())));
        vec![LocationNode {
            name: "Favourites".into(),
            code: "favourites".into(),
            locations: vec![city("se", "got")],
            custom_list: Some(CustomListRole::List(CustomListId("fav".into()))),
            children: vec![member],
            ..Default::default()
        }]
    }

    #[test]
    fn resolves_each_location_kind() {
        let all = all_locations();
        let candidates = LocationNodes::new(&all, &[]);

        let node = resolve(&UserSelectedRelays::location(country("se")), candidates).unwrap();
        assert_eq!(node.name, "Sweden");

        let node = resolve(&UserSelectedRelays::location(city("se", "got")), candidates).unwrap();
        assert_eq!(node.name, "Gothenburg");
        assert_eq!(node.children.len(), 2);

        // The country and city of a hostname play no part in matching.
        let selection = UserSelectedRelays::location(host("xx", "yy", "de-ber-wg-001"));
        let node = resolve(&selection, candidates).unwrap();
        assert_eq!(node.code, "de-ber-wg-001");
    }

    #[test]
    fn only_first_location_is_matched() {
        let all = all_locations();
        let selection = UserSelectedRelays::new(vec![city("no", "osl"), country("se")]);
        assert!(resolve(&selection, LocationNodes::new(&all, &[])).is_none());
    }

    #[test]
    fn missing_locations_resolve_to_nothing() {
        let all = all_locations();
        let candidates = LocationNodes::new(&all, &[]);
        assert!(resolve(&UserSelectedRelays::location(city("se", "mma")), candidates).is_none());
        assert!(resolve(&UserSelectedRelays::default(), candidates).is_none());
    }

    #[test]
    fn whole_list_selection_prefers_custom_list() {
        let all = all_locations();
        let lists = custom_lists();
        let selection =
            UserSelectedRelays::custom_list(CustomListId("fav".into()), true, vec![country("se")]);

        let node = resolve(&selection, LocationNodes::new(&all, &lists)).unwrap();
        assert_eq!(node.as_custom_list_node(), Some(&CustomListId("fav".into())));

        // A deleted list never falls back to a plain location.
        assert!(resolve(&selection, LocationNodes::new(&all, &[])).is_none());
    }

    #[test]
    fn member_selection_resolves_as_plain_location() {
        let all = all_locations();
        let lists = custom_lists();
        let selection = UserSelectedRelays::custom_list(
            CustomListId("fav".into()),
            false,
            vec![city("se", "got")],
        );
        let located = locate(&selection, LocationNodes::new(&all, &lists)).unwrap();
        assert_eq!(located.set, CandidateSet::AllLocations);
        assert_eq!(located.path, vec![1, 0]);
    }

    #[test]
    fn every_reachable_node_round_trips() {
        let all = all_locations();
        let candidates = LocationNodes::new(&all, &[]);
        let mut stack: Vec<&LocationNode> = all.iter().collect();
        while let Some(node) = stack.pop() {
            let resolved = resolve(&node.user_selected_relays(), candidates).unwrap();
            assert_eq!(resolved.name, node.name);
            assert_eq!(resolved.code, node.code);
            let codes = |n: &LocationNode| {
                n.children.iter().map(|c| c.code.clone()).collect::<Vec<_>>()
            };
            assert_eq!(codes(&resolved), codes(node));
            stack.extend(node.children.iter());
        }
    }

    #[test]
    fn matching_nodes() {
        let all = all_locations();
        let lists = custom_lists();
        let gothenburg = &all[1].children[0];

        let plain = UserSelectedRelays::location(city("se", "got"));
        assert!(node_matches(&plain, gothenburg));
        assert!(node_matches(&plain, &lists[0].children[0]));
        assert!(!node_matches(&plain, &all[1]));

        let whole_list =
            UserSelectedRelays::custom_list(CustomListId("fav".into()), true, vec![city("se", "got")]);
        assert!(node_matches(&whole_list, &lists[0]));
        assert!(!node_matches(&whole_list, gothenburg));
        assert!(!node_matches(&UserSelectedRelays::default(), gothenburg));
    }

    #[test]
    fn list_ids_never_match_locations() {
        let all = all_locations();
        let list = LocationNode {
            name: "Sweden list".into(),
            code: "se".into(),
            custom_list: Some(CustomListRole::List(CustomListId("se".into()))),
            ..Default::default()
        };
        let plain = UserSelectedRelays::location(country("se"));
        assert!(!node_matches(&plain, &list));

        // Recents mix list roots and locations in one flat set.
        let flat = vec![list, all[1].clone()];
        let located = locate(&plain, LocationNodes::single(&flat)).unwrap();
        assert_eq!(located.path, vec![1]);
    }

    #[test]
    fn flat_node_sets_resolve_nested_codes() {
        // Recents are flat: cities and hosts sit at the top level.
        let all = all_locations();
        let flat = vec![all[1].children[0].clone(), all[0].children[0].children[0].clone()];
        let candidates = LocationNodes::single(&flat);
        assert!(resolve(&UserSelectedRelays::location(city("se", "got")), candidates).is_some());
        let selection = UserSelectedRelays::location(host("de", "ber", "de-ber-wg-001"));
        assert_eq!(locate(&selection, candidates).unwrap().path, vec![1]);
    }
}
