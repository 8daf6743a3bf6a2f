//! Location tree and the durable selection identifiers that point into it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A geographic relay location, from coarse to fine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelayLocation {
    Country(String),
    City(String, String),
    Hostname(String, String, String),
}

impl RelayLocation {
    /// The code path identifying this location in a location tree.
    ///
    /// Hostnames are globally unique, so they are matched on their own.
    pub fn code_path(&self) -> Vec<&str> {
        match self {
            RelayLocation::Country(country) => vec![country.as_str()],
            RelayLocation::City(country, city) => vec![country.as_str(), city.as_str()],
            RelayLocation::Hostname(_, _, hostname) => vec![hostname.as_str()],
        }
    }

    /// The combined node code of this location, e.g. `se-got`.
    pub fn node_code(&self) -> String {
        combine_node_codes(&self.code_path())
    }
}

impl fmt::Display for RelayLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayLocation::Country(country) => write!(f, "{country}"),
            RelayLocation::City(country, city) => write!(f, "{country}-{city}"),
            RelayLocation::Hostname(_, _, hostname) => write!(f, "{hostname}"),
        }
    }
}

pub fn combine_node_codes(codes: &[&str]) -> String {
    codes.join("-")
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct CustomListId(pub String);

impl fmt::Display for CustomListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct CustomListSelection {
    pub list_id: CustomListId,
    /// `true` if the whole list was selected, `false` if a location inside it was.
    pub is_list: bool,
}

/// What the user picked for a hop.
///
/// This is what gets persisted, never a reference to a tree node. The first
/// location is the one resolution looks for.
#[derive(Serialize, Deserialize, Debug, Clone, Default, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSelectedRelays {
    pub locations: Vec<RelayLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_list_selection: Option<CustomListSelection>,
}

impl UserSelectedRelays {
    pub fn new(locations: Vec<RelayLocation>) -> Self {
        Self {
            locations,
            custom_list_selection: None,
        }
    }

    pub fn location(location: RelayLocation) -> Self {
        Self::new(vec![location])
    }

    pub fn custom_list(
        list_id: CustomListId,
        is_list: bool,
        locations: Vec<RelayLocation>,
    ) -> Self {
        Self {
            locations,
            custom_list_selection: Some(CustomListSelection { list_id, is_list }),
        }
    }
}

// Location order does not matter for equality.
impl PartialEq for UserSelectedRelays {
    fn eq(&self, other: &Self) -> bool {
        if self.custom_list_selection != other.custom_list_selection
            || self.locations.len() != other.locations.len()
        {
            return false;
        }
        let mut ours: Vec<_> = self.locations.iter().collect();
        let mut theirs: Vec<_> = other.locations.iter().collect();
        ours.sort();
        theirs.sort();
        ours == theirs
    }
}

/// Which hop of a multihop connection is being edited.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MultihopContext {
    Entry,
    Exit,
}

impl MultihopContext {
    pub const ALL: [MultihopContext; 2] = [MultihopContext::Entry, MultihopContext::Exit];

    pub fn opposite(self) -> Self {
        match self {
            MultihopContext::Entry => MultihopContext::Exit,
            MultihopContext::Exit => MultihopContext::Entry,
        }
    }
}

impl fmt::Display for MultihopContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultihopContext::Entry => f.write_str("Entry"),
            MultihopContext::Exit => f.write_str("Exit"),
        }
    }
}

/// How a node relates to a custom list, if at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomListRole {
    /// The node is the custom list itself.
    List(CustomListId),
    /// The node is a location inside the custom list.
    Member(CustomListId),
}

/// A node in a location tree.
///
/// Nodes own their children. Cloning a node deep-copies its subtree, so flags
/// set on a copy never reach the tree it was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocationNode {
    pub name: String,
    /// Combined code, unique within a tree. See [`combine_node_codes`].
    pub code: String,
    pub locations: Vec<RelayLocation>,
    pub custom_list: Option<CustomListRole>,
    pub children: Vec<LocationNode>,
    pub is_selected: bool,
    pub is_excluded: bool,
    pub shows_children: bool,
    pub is_hidden_from_search: bool,
    pub connected_hostname: Option<String>,
}

impl LocationNode {
    pub fn new(name: impl Into<String>, location: RelayLocation) -> Self {
        Self {
            name: name.into(),
            code: location.node_code(),
            locations: vec![location],
            ..Default::default()
        }
    }

    pub fn with_children(mut self, children: Vec<LocationNode>) -> Self {
        self.children = children;
        self
    }

    /// The backing custom list, if this node is a custom list root.
    pub fn as_custom_list_node(&self) -> Option<&CustomListId> {
        match &self.custom_list {
            Some(CustomListRole::List(id)) => Some(id),
            _ => None,
        }
    }

    /// The identifier to persist when the user picks this node.
    pub fn user_selected_relays(&self) -> UserSelectedRelays {
        match &self.custom_list {
            Some(CustomListRole::List(id)) => {
                UserSelectedRelays::custom_list(id.clone(), true, self.locations.clone())
            }
            Some(CustomListRole::Member(id)) => {
                UserSelectedRelays::custom_list(id.clone(), false, self.locations.clone())
            }
            None => UserSelectedRelays::new(self.locations.clone()),
        }
    }

    /// Applies `f` to this node and every descendant, parents first.
    pub fn for_each_mut(&mut self, f: &mut impl FnMut(&mut LocationNode)) {
        f(self);
        for child in &mut self.children {
            child.for_each_mut(f);
        }
    }

    pub fn reset_selection(&mut self) {
        self.for_each_mut(&mut |node| {
            node.is_selected = false;
            node.is_excluded = false;
        });
    }

    /// Child indices leading from this node's children down to the node with `code`.
    pub fn descendant_path(&self, code: &str) -> Option<Vec<usize>> {
        descendant_path(&self.children, code)
    }
}

/// Depth-first search for `code`, returning the index path to the first match.
pub fn descendant_path(nodes: &[LocationNode], code: &str) -> Option<Vec<usize>> {
    for (index, node) in nodes.iter().enumerate() {
        if node.code == code {
            return Some(vec![index]);
        }
        if let Some(mut path) = node.descendant_path(code) {
            path.insert(0, index);
            return Some(path);
        }
    }
    None
}

/// Like [`descendant_path`], but custom list roots are neither matched nor searched.
///
/// List roots are keyed by list id, which may look like any location code.
pub fn location_path(nodes: &[LocationNode], code: &str) -> Option<Vec<usize>> {
    nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.as_custom_list_node().is_none())
        .find_map(|(index, node)| {
            let mut path = if node.code == code {
                Vec::new()
            } else {
                location_path(&node.children, code)?
            };
            path.insert(0, index);
            Some(path)
        })
}

pub fn node_at<'a>(nodes: &'a [LocationNode], path: &[usize]) -> Option<&'a LocationNode> {
    let (first, rest) = path.split_first()?;
    let node = nodes.get(*first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        node_at(&node.children, rest)
    }
}

pub fn node_at_mut<'a>(
    nodes: &'a mut [LocationNode],
    path: &[usize],
) -> Option<&'a mut LocationNode> {
    let (first, rest) = path.split_first()?;
    let node = nodes.get_mut(*first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        node_at_mut(&mut node.children, rest)
    }
}

/// Sets `shows_children` on every node strictly above `path`.
pub fn expand_path(nodes: &mut [LocationNode], path: &[usize]) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let Some(node) = nodes.get_mut(*first) else {
        return;
    };
    if !rest.is_empty() {
        node.shows_children = true;
        expand_path(&mut node.children, rest);
    }
}
