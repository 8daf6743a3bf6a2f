//! Location selection for the entry and exit hop.
//!
//! [`SelectLocation`] owns one [`LocationContext`] per hop and rebuilds all of
//! it from scratch whenever settings, tunnel status, search text, recents or
//! custom lists change. Nothing is patched incrementally.

use crate::{
    custom_list::{CustomListRepository, custom_list_nodes},
    filter::SelectLocationFilter,
    location::{
        LocationNode, MultihopContext, UserSelectedRelays, descendant_path, expand_path, node_at,
        node_at_mut,
    },
    recents::{RecentsController, project_recents},
    relay_candidates::{RelayCandidateProvider, location_tree},
    resolver::{LocationNodes, locate, node_matches},
    settings::SettingsStore,
    tunnel::{BlockedReason, RelayConstraints, TunnelSettings, TunnelStatus},
};

/// Receives what the user picked.
pub trait SelectLocationDelegate {
    fn did_select_entry_relay_locations(&mut self, relays: UserSelectedRelays);
    fn did_select_exit_relay_locations(&mut self, relays: UserSelectedRelays);
    fn did_update_relay_constraints(&mut self, constraints: RelayConstraints);
}

/// Everything shown for one hop.
#[derive(Debug, Clone, Default)]
pub struct LocationContext {
    pub locations: Vec<LocationNode>,
    pub custom_lists: Vec<LocationNode>,
    pub recents: Vec<LocationNode>,
    pub filter: Vec<SelectLocationFilter>,
    pub search_text: String,
    pub selected_location: Option<LocationNode>,
}

impl LocationContext {
    fn nodes_mut(&mut self, set: NodeSet) -> &mut Vec<LocationNode> {
        match set {
            NodeSet::Locations => &mut self.locations,
            NodeSet::CustomLists => &mut self.custom_lists,
            NodeSet::Recents => &mut self.recents,
        }
    }

    fn all_nodes_mut(&mut self) -> impl Iterator<Item = &mut LocationNode> {
        self.locations
            .iter_mut()
            .chain(self.custom_lists.iter_mut())
            .chain(self.recents.iter_mut())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeSet {
    Locations,
    CustomLists,
    Recents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchFoundReason {
    NoFilterMatch,
    SelectionNotAvailable,
}

impl NoMatchFoundReason {
    pub fn description(self) -> &'static str {
        match self {
            NoMatchFoundReason::NoFilterMatch => "Selection does not match filter",
            NoMatchFoundReason::SelectionNotAvailable => "Selection is not available",
        }
    }
}

/// What a hop currently points at.
#[derive(Debug, Clone)]
pub struct HopSummary {
    pub hop: MultihopContext,
    pub selected_location: Option<LocationNode>,
    pub no_match_found: Option<NoMatchFoundReason>,
}

pub struct SelectLocation<S> {
    settings: TunnelSettings,
    status: TunnelStatus,
    relay_candidates: Box<dyn RelayCandidateProvider>,
    custom_list_repository: Box<dyn CustomListRepository>,
    recents: RecentsController<S>,
    delegate: Box<dyn SelectLocationDelegate>,
    entry_context: LocationContext,
    exit_context: LocationContext,
    multihop_context: MultihopContext,
    search_text: String,
    is_recents_enabled: bool,
}

impl<S: SettingsStore> SelectLocation<S> {
    pub fn new(
        settings: TunnelSettings,
        status: TunnelStatus,
        relay_candidates: Box<dyn RelayCandidateProvider>,
        custom_list_repository: Box<dyn CustomListRepository>,
        recents: RecentsController<S>,
        delegate: Box<dyn SelectLocationDelegate>,
    ) -> Self {
        // Help the user fix a DAITA block by starting on the entry hop.
        let multihop_context = if settings.multihop_enabled
            && status.blocked_reason == Some(BlockedReason::NoRelaysSatisfyingDaitaConstraints)
        {
            MultihopContext::Entry
        } else {
            MultihopContext::Exit
        };
        let is_recents_enabled = recents.is_enabled();

        let mut this = Self {
            settings,
            status,
            relay_candidates,
            custom_list_repository,
            recents,
            delegate,
            entry_context: LocationContext::default(),
            exit_context: LocationContext::default(),
            multihop_context,
            search_text: String::new(),
            is_recents_enabled,
        };
        this.reload();
        this
    }

    pub fn context(&self, hop: MultihopContext) -> &LocationContext {
        match hop {
            MultihopContext::Entry => &self.entry_context,
            MultihopContext::Exit => &self.exit_context,
        }
    }

    fn context_mut(&mut self, hop: MultihopContext) -> &mut LocationContext {
        match hop {
            MultihopContext::Entry => &mut self.entry_context,
            MultihopContext::Exit => &mut self.exit_context,
        }
    }

    pub fn entry_context(&self) -> &LocationContext {
        &self.entry_context
    }

    pub fn exit_context(&self) -> &LocationContext {
        &self.exit_context
    }

    /// The context of the hop currently being edited.
    pub fn visible_context(&self) -> &LocationContext {
        self.context(self.multihop_context)
    }

    pub fn multihop_context(&self) -> MultihopContext {
        self.multihop_context
    }

    pub fn set_multihop_context(&mut self, hop: MultihopContext) {
        self.multihop_context = hop;
    }

    pub fn is_multihop_enabled(&self) -> bool {
        self.settings.multihop_enabled
    }

    pub fn is_recents_enabled(&self) -> bool {
        self.is_recents_enabled
    }

    pub fn show_daita_info(&self) -> bool {
        self.settings.daita.is_automatic_routing()
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn settings(&self) -> &TunnelSettings {
        &self.settings
    }

    pub fn recents(&self) -> &RecentsController<S> {
        &self.recents
    }

    /// One summary per hop in use, entry first.
    pub fn hop_summaries(&self) -> Vec<HopSummary> {
        let hops: &[MultihopContext] = if self.settings.multihop_enabled {
            &MultihopContext::ALL
        } else {
            &[MultihopContext::Exit]
        };
        hops.iter()
            .map(|&hop| {
                let context = self.context(hop);
                let selected_location = context.selected_location.clone();
                let no_match_found = match (&selected_location, context.filter.is_empty()) {
                    (Some(_), _) => None,
                    (None, false) => Some(NoMatchFoundReason::NoFilterMatch),
                    (None, true) => Some(NoMatchFoundReason::SelectionNotAvailable),
                };
                HopSummary {
                    hop,
                    selected_location,
                    no_match_found,
                }
            })
            .collect()
    }

    pub fn on_tunnel_settings_updated(&mut self, settings: TunnelSettings) {
        self.settings = settings;
        self.record_recents();
        self.reload();
    }

    pub fn on_tunnel_status_updated(&mut self, status: TunnelStatus) {
        self.status = status;
        self.reload();
    }

    /// Filter all location trees by `search_text`. Repeating the current text does nothing.
    pub fn set_search_text(&mut self, search_text: impl Into<String>) {
        let search_text = search_text.into();
        if search_text == self.search_text {
            return;
        }
        self.search_text = search_text;
        self.search();
        if self.search_text.is_empty() {
            self.expand_selected_location();
        }
    }

    /// The user picked `node` in the current hop.
    ///
    /// Picking the entry moves on to the exit hop. Excluded nodes cannot be picked.
    pub fn select_location(&mut self, node: &LocationNode) {
        if node.is_excluded {
            tracing::debug!("Ignoring selection of excluded location {}", node.code);
            return;
        }
        let relays = node.user_selected_relays();
        match self.multihop_context {
            MultihopContext::Entry => {
                self.delegate.did_select_entry_relay_locations(relays);
                self.multihop_context = MultihopContext::Exit;
            }
            MultihopContext::Exit => self.delegate.did_select_exit_relay_locations(relays),
        }
    }

    pub fn toggle_recents(&mut self) {
        self.recents.toggle();
        self.refresh_recents();
        self.update_selections();
        self.update_connected_locations();
    }

    pub fn remove_filter(&mut self, filter: SelectLocationFilter) {
        if let Some(constraints) = filter.removed_from(&self.settings.relay_constraints) {
            self.delegate.did_update_relay_constraints(constraints);
        }
    }

    pub fn add_location_to_custom_list(&mut self, location: &LocationNode, custom_list_name: &str) {
        if let Err(error) = self
            .custom_list_repository
            .add_locations(custom_list_name, &location.locations)
        {
            tracing::warn!("Failed to add {} to {custom_list_name}: {error:#}", location.code);
        }
        self.custom_lists_changed();
    }

    pub fn remove_location_from_custom_list(
        &mut self,
        location: &LocationNode,
        custom_list_name: &str,
    ) {
        if let Err(error) = self
            .custom_list_repository
            .remove_locations(custom_list_name, &location.locations)
        {
            tracing::warn!(
                "Failed to remove {} from {custom_list_name}: {error:#}",
                location.code
            );
        }
        self.custom_lists_changed();
    }

    pub fn delete_custom_list(&mut self, name: &str) {
        let result = self
            .custom_list_repository
            .fetch_by_name(name)
            .and_then(|list| match list {
                Some(list) => self.custom_list_repository.delete(&list.id),
                None => Ok(()),
            });
        if let Err(error) = result {
            tracing::warn!("Failed to delete custom list {name}: {error:#}");
        }
        self.custom_lists_changed();
    }

    pub fn custom_lists_changed(&mut self) {
        self.refresh_custom_lists();
        self.update_selections();
        self.update_connected_locations();
    }

    fn reload(&mut self) {
        self.fetch_locations();
        self.refresh_custom_lists();
        self.refresh_recents();
        self.update_selections();
        self.update_connected_locations();
        if !self.search_text.is_empty() {
            self.search();
        }
        for hop in MultihopContext::ALL {
            let filter = SelectLocationFilter::for_hop(&self.settings, hop);
            self.context_mut(hop).filter = filter;
        }
    }

    fn selection(&self, hop: MultihopContext) -> Option<UserSelectedRelays> {
        if hop == MultihopContext::Entry && !self.settings.multihop_enabled {
            return None;
        }
        self.settings.relay_constraints.locations(hop).cloned()
    }

    fn record_recents(&mut self) {
        for hop in MultihopContext::ALL {
            if let Some(selection) = self.selection(hop) {
                self.recents.save(selection, hop);
            }
        }
    }

    fn fetch_locations(&mut self) {
        match self.relay_candidates.find_candidates(&self.settings) {
            Ok(candidates) => {
                self.exit_context.locations = location_tree(&candidates.exit_relays);
                self.entry_context.locations = candidates
                    .entry_relays
                    .as_deref()
                    .map(location_tree)
                    .unwrap_or_default();
            }
            Err(error) => {
                tracing::error!("Failed to find relay candidates: {error:#}");
                self.entry_context.locations.clear();
                self.exit_context.locations.clear();
            }
        }
    }

    fn refresh_custom_lists(&mut self) {
        let lists = self
            .custom_list_repository
            .fetch_all()
            .unwrap_or_else(|error| {
                tracing::warn!("Failed to fetch custom lists: {error:#}");
                Vec::new()
            });
        for hop in MultihopContext::ALL {
            let context = self.context_mut(hop);
            context.custom_lists = custom_list_nodes(&lists, &context.locations);
        }
    }

    fn refresh_recents(&mut self) {
        self.is_recents_enabled = self.recents.is_enabled();
        for hop in MultihopContext::ALL {
            let context = self.context(hop);
            let recents = project_recents(
                LocationNodes::new(&context.locations, &context.custom_lists),
                self.recents.fetch(hop),
            );
            self.context_mut(hop).recents = recents;
        }
    }

    fn update_selections(&mut self) {
        for hop in MultihopContext::ALL {
            for node in self.context_mut(hop).all_nodes_mut() {
                node.reset_selection();
            }
        }

        let selections = MultihopContext::ALL.map(|hop| (hop, self.selection(hop)));
        for (hop, selection) in &selections {
            if let Some(selection) = selection {
                self.mark_selected(*hop, selection);
            }
        }
        for (hop, selection) in &selections {
            if let Some(selection) = selection {
                self.mark_excluded(hop.opposite(), selection);
            }
        }

        self.expand_selected_location();
        for hop in MultihopContext::ALL {
            let selected = self.find_selected(hop);
            self.context_mut(hop).selected_location = selected;
        }
    }

    fn mark_selected(&mut self, hop: MultihopContext, selection: &UserSelectedRelays) {
        let is_recents_enabled = self.is_recents_enabled;
        let context = self.context_mut(hop);
        let located = if is_recents_enabled {
            locate(selection, LocationNodes::single(&context.recents))
                .map(|located| (NodeSet::Recents, located.path))
        } else {
            locate_in_custom_lists(selection, &context.custom_lists)
                .map(|path| (NodeSet::CustomLists, path))
                .or_else(|| {
                    locate(selection, LocationNodes::single(&context.locations))
                        .map(|located| (NodeSet::Locations, located.path))
                })
        };
        let Some((set, path)) = located else {
            tracing::debug!("{hop} selection is not available");
            return;
        };
        if let Some(node) = node_at_mut(context.nodes_mut(set), &path) {
            node.is_selected = true;
        }
    }

    /// Exclude every node in `hop` that stands for the other hop's `selection`.
    fn mark_excluded(&mut self, hop: MultihopContext, selection: &UserSelectedRelays) {
        for root in self.context_mut(hop).all_nodes_mut() {
            root.for_each_mut(&mut |node| {
                // A hop's own selection always stays selectable.
                if !node.is_selected && node_matches(selection, node) {
                    node.is_excluded = true;
                }
            });
        }
    }

    fn find_selected(&self, hop: MultihopContext) -> Option<LocationNode> {
        let context = self.context(hop);
        let sets = if self.is_recents_enabled {
            vec![&context.recents]
        } else {
            vec![&context.custom_lists, &context.locations]
        };
        sets.into_iter()
            .find_map(|nodes| selected_path(nodes).and_then(|path| node_at(nodes, &path)))
            .cloned()
    }

    /// Recents are flat, so nothing is expanded while they are enabled.
    fn expand_selected_location(&mut self) {
        if self.is_recents_enabled {
            return;
        }
        for hop in MultihopContext::ALL {
            let context = self.context_mut(hop);
            for set in [NodeSet::Locations, NodeSet::CustomLists] {
                let nodes = context.nodes_mut(set);
                if let Some(path) = selected_path(nodes) {
                    expand_path(nodes, &path);
                }
            }
        }
    }

    fn update_connected_locations(&mut self) {
        for hop in MultihopContext::ALL {
            let hostname = self.status.hostname(hop).map(str::to_owned);
            let context = self.context_mut(hop);
            for set in [NodeSet::Locations, NodeSet::CustomLists, NodeSet::Recents] {
                mark_connected(context.nodes_mut(set), hostname.as_deref());
            }
        }
    }

    fn search(&mut self) {
        let raw_search_text = self.search_text.clone();
        let search_text = raw_search_text.to_lowercase();
        for hop in MultihopContext::ALL {
            let context = self.context_mut(hop);
            context.search_text.clone_from(&raw_search_text);
            for set in [NodeSet::Locations, NodeSet::CustomLists] {
                let nodes = context.nodes_mut(set);
                if search_text.is_empty() {
                    for node in nodes.iter_mut() {
                        node.for_each_mut(&mut |node| {
                            node.is_hidden_from_search = false;
                            node.shows_children = false;
                        });
                    }
                } else {
                    apply_search(nodes, &search_text);
                }
            }
        }
    }
}

/// Look for a custom-list selection among the custom list nodes.
///
/// Locations inside a list are looked up in that list only.
fn locate_in_custom_lists(
    selection: &UserSelectedRelays,
    custom_lists: &[LocationNode],
) -> Option<Vec<usize>> {
    let list_selection = selection.custom_list_selection.as_ref()?;
    if list_selection.is_list {
        return locate(selection, LocationNodes::single(custom_lists)).map(|located| located.path);
    }
    let index = custom_lists
        .iter()
        .position(|node| node.as_custom_list_node() == Some(&list_selection.list_id))?;
    let code = selection.locations.first()?.node_code();
    let mut path = descendant_path(&custom_lists[index].children, &code)?;
    path.insert(0, index);
    Some(path)
}

fn selected_path(nodes: &[LocationNode]) -> Option<Vec<usize>> {
    nodes.iter().enumerate().find_map(|(index, node)| {
        if node.is_selected {
            return Some(vec![index]);
        }
        let mut path = selected_path(&node.children)?;
        path.insert(0, index);
        Some(path)
    })
}

/// Mark the relay named `hostname` and all its ancestors. Returns whether it was found.
fn mark_connected(nodes: &mut [LocationNode], hostname: Option<&str>) -> bool {
    let mut found = false;
    for node in nodes {
        let in_children = mark_connected(&mut node.children, hostname);
        let connected = in_children || hostname.is_some_and(|hostname| node.code == hostname);
        node.connected_hostname = hostname.filter(|_| connected).map(str::to_owned);
        found |= connected;
    }
    found
}

/// Hide nodes that neither match `search_text` nor contain a match.
///
/// Returns whether any node in `nodes` matched.
fn apply_search(nodes: &mut [LocationNode], search_text: &str) -> bool {
    let mut any_match = false;
    for node in nodes {
        if node.name.to_lowercase().contains(search_text) {
            node.for_each_mut(&mut |node| node.is_hidden_from_search = false);
            any_match = true;
        } else {
            let child_match = apply_search(&mut node.children, search_text);
            node.is_hidden_from_search = !child_match;
            node.shows_children = child_match;
            any_match |= child_match;
        }
    }
    any_match
}
