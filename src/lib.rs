//! Picking relay locations for the entry and exit hop, and remembering recent picks.

pub mod api;
pub mod custom_list;
pub mod filter;
pub mod location;
pub mod recents;
pub mod relay_candidates;
pub mod resolver;
pub mod select_location;
pub mod settings;
pub mod tunnel;
