//! User-defined groups of locations.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::{
    location::{CustomListId, CustomListRole, LocationNode, RelayLocation, location_path, node_at},
    settings::{
        SettingsKey, SettingsStore, StoreError, parse_unversioned_payload,
        produce_unversioned_payload,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CustomList {
    pub id: CustomListId,
    pub name: String,
    pub locations: Vec<RelayLocation>,
}

impl CustomList {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: CustomListId(id.into()),
            name: name.into(),
            locations: Vec::new(),
        }
    }
}

/// Storage of custom lists.
pub trait CustomListRepository {
    fn fetch_all(&self) -> anyhow::Result<Vec<CustomList>>;

    /// Insert `list`, or replace the list with the same id.
    fn save(&self, list: CustomList) -> anyhow::Result<()>;

    fn delete(&self, id: &CustomListId) -> anyhow::Result<()>;

    /// Store an empty list called `name` under an id no other list uses.
    fn create(&self, name: &str) -> anyhow::Result<CustomList> {
        let lists = self.fetch_all()?;
        if lists.iter().any(|list| list.name == name) {
            bail!("A custom list named {name} already exists");
        }
        let id = (1..=lists.len() + 1)
            .map(|n| n.to_string())
            .find(|id| lists.iter().all(|list| &list.id.0 != id))
            .context("No free custom list id")?;
        let list = CustomList::new(id, name);
        self.save(list.clone())?;
        Ok(list)
    }

    fn fetch_by_name(&self, name: &str) -> anyhow::Result<Option<CustomList>> {
        Ok(self.fetch_all()?.into_iter().find(|list| list.name == name))
    }

    fn add_locations(&self, name: &str, locations: &[RelayLocation]) -> anyhow::Result<()> {
        let Some(mut list) = self.fetch_by_name(name)? else {
            bail!("No custom list named {name}");
        };
        for location in locations {
            if !list.locations.contains(location) {
                list.locations.push(location.clone());
            }
        }
        self.save(list)
    }

    fn remove_locations(&self, name: &str, locations: &[RelayLocation]) -> anyhow::Result<()> {
        let Some(mut list) = self.fetch_by_name(name)? else {
            bail!("No custom list named {name}");
        };
        list.locations.retain(|location| !locations.contains(location));
        self.save(list)
    }
}

/// Custom lists kept in the settings store.
pub struct StoredCustomLists<S> {
    store: S,
}

impl<S: SettingsStore> StoredCustomLists<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn write(&self, lists: &[CustomList]) -> anyhow::Result<()> {
        let data = produce_unversioned_payload(&lists).context("Failed to encode custom lists")?;
        self.store
            .write(&data, SettingsKey::CustomLists)
            .context("Failed to store custom lists")
    }
}

impl<S: SettingsStore> CustomListRepository for StoredCustomLists<S> {
    fn fetch_all(&self) -> anyhow::Result<Vec<CustomList>> {
        match self.store.read(SettingsKey::CustomLists) {
            Ok(data) => parse_unversioned_payload(&data).context("Failed to decode custom lists"),
            Err(StoreError::NotFound { .. }) => Ok(Vec::new()),
            Err(error) => Err(error).context("Failed to read custom lists"),
        }
    }

    fn save(&self, list: CustomList) -> anyhow::Result<()> {
        let mut lists = self.fetch_all()?;
        if lists
            .iter()
            .any(|existing| existing.name == list.name && existing.id != list.id)
        {
            bail!("A custom list named {} already exists", list.name);
        }
        match lists.iter_mut().find(|existing| existing.id == list.id) {
            Some(existing) => *existing = list,
            None => lists.push(list),
        }
        self.write(&lists)
    }

    fn delete(&self, id: &CustomListId) -> anyhow::Result<()> {
        let mut lists = self.fetch_all()?;
        lists.retain(|list| &list.id != id);
        self.write(&lists)
    }
}

/// Build one root node per custom list out of a hop's location tree.
///
/// Members are copies of the matching location nodes. Members that are not
/// in `all_locations` are left out.
pub fn custom_list_nodes(lists: &[CustomList], all_locations: &[LocationNode]) -> Vec<LocationNode> {
    lists
        .iter()
        .map(|list| {
            let children = list
                .locations
                .iter()
                .filter_map(|location| {
                    let path = location_path(all_locations, &location.node_code())?;
                    let mut member = node_at(all_locations, &path)?.clone();
                    member.for_each_mut(&mut |node| {
                        node.custom_list = Some(CustomListRole::Member(list.id.clone()));
                    });
                    Some(member)
                })
                .collect();

            LocationNode {
                name: list.name.clone(),
                code: list.id.0.clone(),
                locations: list.locations.clone(),
                custom_list: Some(CustomListRole::List(list.id.clone())),
                children,
                ..Default::default()
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{relay_candidates::location_tree, relay_candidates::test::relay, settings::MemoryStore};

    fn city(country: &str, city: &str) -> RelayLocation {
        RelayLocation::City(country.into(), city.into())
    }

    #[test]
    fn repository_crud() {
        let repository = StoredCustomLists::new(MemoryStore::new());
        assert!(repository.fetch_all().unwrap().is_empty());

        repository.save(CustomList::new("1", "Work")).unwrap();
        repository.save(CustomList::new("2", "Home")).unwrap();
        assert!(repository.save(CustomList::new("3", "Work")).is_err());

        repository
            .add_locations("Work", &[city("se", "got"), city("se", "got")])
            .unwrap();
        repository.add_locations("Work", &[city("de", "ber")]).unwrap();
        let work = repository.fetch_by_name("Work").unwrap().unwrap();
        assert_eq!(work.locations, vec![city("se", "got"), city("de", "ber")]);

        repository.remove_locations("Work", &[city("se", "got")]).unwrap();
        let work = repository.fetch_by_name("Work").unwrap().unwrap();
        assert_eq!(work.locations, vec![city("de", "ber")]);

        repository.delete(&CustomListId("1".into())).unwrap();
        let names: Vec<_> = repository
            .fetch_all()
            .unwrap()
            .into_iter()
            .map(|list| list.name)
            .collect();
        assert_eq!(names, ["Home"]);
        assert!(repository.add_locations("Work", &[]).is_err());
    }

    #[test]
    fn created_lists_get_fresh_ids() {
        let repository = StoredCustomLists::new(MemoryStore::new());
        repository.save(CustomList::new("2", "Home")).unwrap();

        let work = repository.create("Work").unwrap();
        repository.add_locations("Work", &[city("se", "got")]).unwrap();
        let lower = repository.create("work").unwrap();
        assert_ne!(work.id, lower.id);
        assert!(repository.create("Work").is_err());

        let lists = repository.fetch_all().unwrap();
        assert_eq!(lists.len(), 3);
        let work = repository.fetch_by_name("Work").unwrap().unwrap();
        assert_eq!(work.locations, vec![city("se", "got")]);
    }

    #[test]
    fn corrupt_lists_are_an_error() {
        let store = MemoryStore::new();
        store.insert_raw(SettingsKey::CustomLists, "nope");
        assert!(StoredCustomLists::new(store).fetch_all().is_err());
    }

    #[test]
    fn list_nodes_copy_available_members() {
        let all = location_tree(&[
            relay("se-got-wg-001", true, "31173"),
            relay("de-ber-wg-001", false, "M247"),
        ]);
        let mut list = CustomList::new("fav", "Favourites");
        list.locations = vec![city("se", "got"), city("no", "osl")];

        let nodes = custom_list_nodes(&[list], &all);
        assert_eq!(nodes.len(), 1);
        let root = &nodes[0];
        assert_eq!(root.as_custom_list_node(), Some(&CustomListId("fav".into())));
        assert_eq!(root.children.len(), 1);

        let member = &root.children[0];
        assert_eq!(member.code, "se-got");
        let selection = member.children[0].user_selected_relays();
        assert_eq!(
            selection.custom_list_selection.map(|s| s.is_list),
            Some(false)
        );
        // The plain tree is not affected.
        assert!(all.iter().all(|n| n.custom_list.is_none()));
    }
}
