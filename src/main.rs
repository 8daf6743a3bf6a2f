use std::{fmt::Write as _, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use mullvad_locations::{
    api,
    custom_list::{CustomListRepository, StoredCustomLists},
    filter::SelectLocationFilter,
    location::{LocationNode, MultihopContext, UserSelectedRelays, descendant_path, node_at},
    recents::{RecentsController, RecentsStore},
    select_location::{SelectLocation, SelectLocationDelegate},
    settings::{
        FileStore, SettingsKey, SettingsStore, StoreError, parse_unversioned_payload,
        produce_unversioned_payload,
    },
    tunnel::{
        BlockedReason, ConnectionState, RelayConstraints, SelectedRelay, SelectedRelays,
        TunnelSettings, TunnelStatus,
    },
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const RELAY_LIST: &str = include_str!("relays.json");

#[derive(Parser, Debug)]
#[command(version, about = "Pick entry and exit locations for a multihop tunnel")]
struct Args {
    /// Where settings, custom lists and recents are kept.
    #[arg(long, env = "MULLVAD_LOCATIONS_STATE_DIR", default_value = "state")]
    state_dir: PathBuf,

    /// Relay list to use instead of the bundled one.
    #[arg(long)]
    relay_list: Option<PathBuf>,

    /// How many recent locations to remember per hop.
    #[arg(long, default_value_t = mullvad_locations::recents::DEFAULT_MAX_LIMIT)]
    max_recents: usize,

    /// Enable multihop if no settings have been stored yet.
    #[arg(long)]
    multihop: bool,
}

/// A line typed at the prompt.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the locations of the current hop.
    Show,
    /// Switch to the entry or exit hop.
    Hop { hop: Hop },
    /// Select the location with the given code, e.g. `se-got`.
    Select { code: String },
    /// Filter locations by name. No text clears the search.
    Search { text: Vec<String> },
    /// Turn recents on or off.
    Recents,
    /// Pretend to be connected through the given relays.
    Connect { exit: String, entry: Option<String> },
    Disconnect,
    /// Pretend the tunnel is blocked.
    Block { reason: BlockReason },
    Multihop { enabled: Toggle },
    /// Manage custom lists.
    #[command(subcommand)]
    List(ListCommand),
    /// Lift a relay filter.
    RemoveFilter { filter: FilterKind },
    Quit,
}

#[derive(Subcommand, Debug)]
enum ListCommand {
    New { name: String },
    Add { name: String, code: String },
    Remove { name: String, code: String },
    Delete { name: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Hop {
    Entry,
    Exit,
}

impl From<Hop> for MultihopContext {
    fn from(hop: Hop) -> Self {
        match hop {
            Hop::Entry => MultihopContext::Entry,
            Hop::Exit => MultihopContext::Exit,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BlockReason {
    Constraints,
    Daita,
    Other,
}

impl From<BlockReason> for BlockedReason {
    fn from(reason: BlockReason) -> Self {
        match reason {
            BlockReason::Constraints => BlockedReason::NoRelaysSatisfyingConstraints,
            BlockReason::Daita => BlockedReason::NoRelaysSatisfyingDaitaConstraints,
            BlockReason::Other => BlockedReason::Other,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FilterKind {
    Ownership,
    Provider,
}

enum Event {
    Line(String),
    SelectedRelays(MultihopContext, UserSelectedRelays),
    RelayConstraints(RelayConstraints),
}

/// Feeds selections back into the event loop, where settings are owned.
struct Delegate {
    events: mpsc::UnboundedSender<Event>,
}

impl Delegate {
    fn send(&self, event: Event) {
        if self.events.send(event).is_err() {
            tracing::warn!("Event loop has stopped");
        }
    }
}

impl SelectLocationDelegate for Delegate {
    fn did_select_entry_relay_locations(&mut self, relays: UserSelectedRelays) {
        self.send(Event::SelectedRelays(MultihopContext::Entry, relays));
    }

    fn did_select_exit_relay_locations(&mut self, relays: UserSelectedRelays) {
        self.send(Event::SelectedRelays(MultihopContext::Exit, relays));
    }

    fn did_update_relay_constraints(&mut self, constraints: RelayConstraints) {
        self.send(Event::RelayConstraints(constraints));
    }
}

fn load_settings(store: &FileStore, multihop: bool) -> anyhow::Result<TunnelSettings> {
    match store.read(SettingsKey::TunnelSettings) {
        Ok(data) => parse_unversioned_payload(&data).context("Failed to decode tunnel settings"),
        Err(StoreError::NotFound { .. }) => Ok(TunnelSettings {
            multihop_enabled: multihop,
            ..Default::default()
        }),
        Err(error) => Err(error).context("Failed to read tunnel settings"),
    }
}

fn save_settings(store: &FileStore, settings: &TunnelSettings) -> anyhow::Result<()> {
    let data = produce_unversioned_payload(settings).context("Failed to encode tunnel settings")?;
    store
        .write(&data, SettingsKey::TunnelSettings)
        .context("Failed to store tunnel settings")
}

fn load_relay_list(path: Option<&PathBuf>) -> anyhow::Result<api::RelayList> {
    let relay_list = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => RELAY_LIST.to_owned(),
    };
    serde_json::from_str(&relay_list).context("Failed to parse relay-list")
}

fn render_nodes(out: &mut String, nodes: &[LocationNode], depth: usize) {
    for node in nodes.iter().filter(|node| !node.is_hidden_from_search) {
        let marker = match (node.is_selected, node.is_excluded) {
            (true, _) => "[x]",
            (false, true) => "[-]",
            (false, false) => "[ ]",
        };
        let connected = if node.connected_hostname.is_some() { " *" } else { "" };
        let _ = writeln!(
            out,
            "{:indent$}{marker} {} ({}){connected}",
            "",
            node.name,
            node.code,
            indent = depth * 2
        );
        if node.shows_children {
            render_nodes(out, &node.children, depth + 1);
        }
    }
}

fn render<S: SettingsStore>(select: &SelectLocation<S>) -> String {
    let mut out = String::new();
    let multihop = if select.is_multihop_enabled() { "on" } else { "off" };
    let _ = writeln!(out, "Multihop {multihop}");
    if select.show_daita_info() {
        let _ = writeln!(out, "DAITA picks the entry relay automatically");
    }
    for summary in select.hop_summaries() {
        let current = if summary.hop == select.multihop_context() { ">" } else { " " };
        let selected = match (&summary.selected_location, summary.no_match_found) {
            (Some(node), _) => node.name.clone(),
            (None, Some(reason)) => reason.description().to_owned(),
            (None, None) => "Select location".to_owned(),
        };
        let _ = writeln!(out, "{current} {}: {selected}", summary.hop);
    }

    let context = select.visible_context();
    if !select.search_text().is_empty() {
        let _ = writeln!(out, "Search: {}", select.search_text());
    }
    if !context.filter.is_empty() {
        let _ = writeln!(out, "Filters: {:?}", context.filter);
    }
    if select.is_recents_enabled() {
        let _ = writeln!(out, "Recents");
        render_nodes(&mut out, &context.recents, 1);
    }
    let _ = writeln!(out, "Custom lists");
    render_nodes(&mut out, &context.custom_lists, 1);
    let _ = writeln!(out, "All locations");
    render_nodes(&mut out, &context.locations, 1);
    out
}

/// Find a node by code among what the current hop displays.
fn find_node<S: SettingsStore>(select: &SelectLocation<S>, code: &str) -> Option<LocationNode> {
    let context = select.visible_context();
    let sets = if select.is_recents_enabled() {
        vec![&context.recents]
    } else {
        vec![&context.custom_lists, &context.locations]
    };
    sets.into_iter().find_map(|nodes| {
        let path = descendant_path(nodes, code)?;
        node_at(nodes, &path).cloned()
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let relay_list = load_relay_list(args.relay_list.as_ref())?;
    let store = FileStore::new(&args.state_dir)
        .with_context(|| format!("Failed to create {}", args.state_dir.display()))?;
    let mut settings = load_settings(&store, args.multihop)?;
    let custom_lists = StoredCustomLists::new(store.clone());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    let (events_tx, mut events) = mpsc::unbounded_channel();

    let recents_store = RecentsStore::with_max_limit(store.clone(), args.max_recents);
    tracing::debug!("Remembering up to {} recents per hop", recents_store.max_limit());
    let recents = RecentsController::new(recents_store);
    let mut select = SelectLocation::new(
        settings.clone(),
        TunnelStatus::default(),
        Box::new(relay_list),
        Box::new(StoredCustomLists::new(store.clone())),
        recents,
        Box::new(Delegate {
            events: events_tx.clone(),
        }),
    );

    {
        let events_tx = events_tx.clone();
        rt.spawn_blocking(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if events_tx.send(Event::Line(line)).is_err() {
                    return;
                }
            }
            // The delegate keeps the channel open, so end of input has to be spelled out.
            let _ = events_tx.send(Event::Line("quit".to_owned()));
        });
    }
    drop(events_tx);

    print!("{}", render(&select));

    let result = rt.block_on(async {
        while let Some(event) = events.recv().await {
            match event {
                Event::SelectedRelays(hop, relays) => {
                    settings.relay_constraints.set_locations(hop, relays);
                }
                Event::RelayConstraints(constraints) => {
                    settings.relay_constraints = constraints;
                }
                Event::Line(line) if line.trim().is_empty() => continue,
                Event::Line(line) => {
                    let words = line.split_whitespace();
                    let command = match Line::try_parse_from(words) {
                        Ok(Line { command }) => command,
                        Err(error) => {
                            eprintln!("{error}");
                            continue;
                        }
                    };
                    match command {
                        Command::Show => {}
                        Command::Hop { hop } => select.set_multihop_context(hop.into()),
                        Command::Select { code } => match find_node(&select, &code) {
                            Some(node) => select.select_location(&node),
                            None => eprintln!("No location {code}"),
                        },
                        Command::Search { text } => select.set_search_text(text.join(" ")),
                        Command::Recents => select.toggle_recents(),
                        Command::Connect { exit, entry } => {
                            select.on_tunnel_status_updated(TunnelStatus {
                                state: ConnectionState::Connected,
                                relays: Some(SelectedRelays {
                                    entry: entry.map(|hostname| SelectedRelay { hostname }),
                                    exit: SelectedRelay { hostname: exit },
                                }),
                                blocked_reason: None,
                            });
                        }
                        Command::Disconnect => {
                            select.on_tunnel_status_updated(TunnelStatus::default());
                        }
                        Command::Block { reason } => {
                            select.on_tunnel_status_updated(TunnelStatus {
                                state: ConnectionState::Error,
                                relays: None,
                                blocked_reason: Some(reason.into()),
                            });
                        }
                        Command::Multihop { enabled } => {
                            settings.multihop_enabled = matches!(enabled, Toggle::On);
                        }
                        Command::List(command) => {
                            let result = match command {
                                ListCommand::New { name } => {
                                    custom_lists.create(&name).map(|list| {
                                        tracing::info!("Created list {} ({})", list.name, list.id);
                                        select.custom_lists_changed();
                                    })
                                }
                                ListCommand::Add { name, code } => match find_node(&select, &code) {
                                    Some(node) => {
                                        select.add_location_to_custom_list(&node, &name);
                                        Ok(())
                                    }
                                    None => Err(anyhow::anyhow!("No location {code}")),
                                },
                                ListCommand::Remove { name, code } => {
                                    match find_node(&select, &code) {
                                        Some(node) => {
                                            select.remove_location_from_custom_list(&node, &name);
                                            Ok(())
                                        }
                                        None => Err(anyhow::anyhow!("No location {code}")),
                                    }
                                }
                                ListCommand::Delete { name } => {
                                    select.delete_custom_list(&name);
                                    Ok(())
                                }
                            };
                            if let Err(error) = result {
                                eprintln!("{error:#}");
                            }
                        }
                        Command::RemoveFilter { filter } => {
                            select.remove_filter(match filter {
                                FilterKind::Ownership => SelectLocationFilter::Owned,
                                FilterKind::Provider => SelectLocationFilter::Provider(0),
                            });
                        }
                        Command::Quit => break,
                    }
                }
            }

            // Settings changes made by the delegate arrive as events of their own.
            if events.is_empty() {
                if &settings != select.settings() {
                    save_settings(&store, &settings)?;
                    select.on_tunnel_settings_updated(settings.clone());
                }
                print!("{}", render(&select));
            }
        }
        anyhow::Ok(())
    });

    // The stdin reader may still be blocked on a read.
    rt.shutdown_background();
    result
}
