use std::collections::BTreeMap;

use bevy::prelude::*;
use serde::Serialize;

use crate::config::GameConfig;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelIdentity {
    pub ordinal: u32,
    pub locator: String,
}

/// Fixed, ordered list of playable levels. Ordinals are dense and 1-based.
#[derive(Resource, Clone, Debug, Default)]
pub struct LevelCatalog {
    entries: Vec<LevelIdentity>,
    item_grants: BTreeMap<u32, Vec<String>>,
}

impl LevelCatalog {
    pub fn new(locators: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let entries = locators
            .into_iter()
            .map(Into::into)
            .map(|locator: String| locator.trim().to_string())
            .filter(|locator| !locator.is_empty())
            .enumerate()
            .map(|(i, locator)| LevelIdentity {
                ordinal: i as u32 + 1,
                locator,
            })
            .collect();
        Self {
            entries,
            item_grants: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &GameConfig) -> Self {
        Self::new(config.levels.iter().cloned()).with_item_grants(config.item_grants.clone())
    }

    pub fn with_item_grants(mut self, grants: BTreeMap<u32, Vec<String>>) -> Self {
        self.item_grants = grants;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LevelIdentity] {
        &self.entries
    }

    pub fn get(&self, ordinal: u32) -> Option<&LevelIdentity> {
        let index = (ordinal as usize).checked_sub(1)?;
        self.entries.get(index)
    }

    pub fn locator(&self, ordinal: u32) -> Option<&str> {
        self.get(ordinal).map(|entry| entry.locator.as_str())
    }

    pub fn contains(&self, ordinal: u32) -> bool {
        self.get(ordinal).is_some()
    }

    /// Items a player would carry on entering `ordinal` having finished every
    /// earlier level, in grant order without duplicates.
    pub fn items_before(&self, ordinal: u32) -> Vec<String> {
        let mut items: Vec<String> = Vec::new();
        for (_, granted) in self.item_grants.range(..ordinal) {
            for item in granted {
                if !items.contains(item) {
                    items.push(item.clone());
                }
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_are_dense_and_one_based() {
        let catalog = LevelCatalog::new(["a.rhai", " ", "b.rhai", "c.rhai"]);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.locator(1), Some("a.rhai"));
        assert_eq!(catalog.locator(2), Some("b.rhai"));
        assert_eq!(catalog.locator(3), Some("c.rhai"));
        assert_eq!(catalog.locator(0), None);
        assert_eq!(catalog.locator(4), None);
        assert!(catalog
            .entries()
            .iter()
            .enumerate()
            .all(|(i, e)| e.ordinal == i as u32 + 1));
    }

    #[test]
    fn items_before_unions_earlier_grants_only() {
        let catalog = LevelCatalog::new(["1", "2", "3", "4"]).with_item_grants(BTreeMap::from([
            (1, vec!["computer".to_string()]),
            (2, vec!["phone".to_string(), "computer".to_string()]),
            (3, vec!["redKey".to_string()]),
        ]));
        assert!(catalog.items_before(1).is_empty());
        assert_eq!(catalog.items_before(2), vec!["computer"]);
        assert_eq!(catalog.items_before(3), vec!["computer", "phone"]);
        assert_eq!(catalog.items_before(4), vec!["computer", "phone", "redKey"]);
    }
}
