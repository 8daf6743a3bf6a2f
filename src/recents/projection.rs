use crate::{
    location::{LocationNode, UserSelectedRelays},
    resolver::{LocationNodes, resolve},
};

/// How many recents are shown per hop.
pub const MAX_DISPLAYED_RECENTS: usize = 3;

/// Resolve a hop's recents against its live location tree.
///
/// Entries that no longer resolve are skipped. The nodes are flat copies:
/// recents never show their children.
pub fn project_recents(
    candidates: LocationNodes<'_>,
    recents: &[UserSelectedRelays],
) -> Vec<LocationNode> {
    recents
        .iter()
        .filter_map(|recent| resolve(recent, candidates))
        .map(|mut node| {
            node.shows_children = false;
            node.is_hidden_from_search = false;
            node
        })
        .take(MAX_DISPLAYED_RECENTS)
        .collect()
}
