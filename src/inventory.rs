use bevy::prelude::*;
use std::collections::BTreeMap;

pub struct InventoryPlugin;

impl Plugin for InventoryPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ItemRegistry>()
            .init_resource::<Inventory>();
    }
}

/// Item kinds that can lie on the map and be carried.
#[derive(Resource, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ItemRegistry {
    pub items: BTreeMap<String, ItemDef>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ItemDef {
    pub name: String,
    pub symbol: char,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Default for ItemRegistry {
    fn default() -> Self {
        let items = [
            ("computer", "Computer", '⌘'),
            ("phone", "Phone", '☎'),
            ("redKey", "Red key", 'k'),
            ("greenKey", "Green key", 'k'),
            ("blueKey", "Blue key", 'k'),
            ("theAlgorithm", "The Algorithm", '∑'),
        ]
        .into_iter()
        .map(|(id, name, symbol)| {
            (
                id.to_string(),
                ItemDef {
                    name: name.to_string(),
                    symbol,
                    metadata: serde_json::Value::Null,
                },
            )
        })
        .collect();
        Self { items }
    }
}

impl ItemRegistry {
    pub fn is_item(&self, kind: &str) -> bool {
        self.items.contains_key(kind)
    }
}

/// Items the player carries, in pickup order.
///
/// `revision` moves on every change; the inventory display is considered stale
/// until `mark_drawn` catches `drawn_revision` up.
#[derive(Resource, Clone, Debug, Default, serde::Serialize)]
pub struct Inventory {
    items: Vec<String>,
    revision: u64,
    drawn_revision: u64,
}

impl Inventory {
    pub fn add_item(&mut self, item_id: &str) -> bool {
        if self.has_item(item_id) {
            return false;
        }
        self.items.push(item_id.to_string());
        self.revision += 1;
        true
    }

    pub fn remove_item(&mut self, item_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i != item_id);
        let removed = self.items.len() != before;
        if removed {
            self.revision += 1;
        }
        removed
    }

    pub fn has_item(&self, item_id: &str) -> bool {
        self.items.iter().any(|i| i == item_id)
    }

    pub fn set_items(&mut self, items: impl IntoIterator<Item = String>) {
        let mut next: Vec<String> = Vec::new();
        for item in items {
            if !next.contains(&item) {
                next.push(item);
            }
        }
        if next != self.items {
            self.items = next;
            self.revision += 1;
        }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn needs_redraw(&self) -> bool {
        self.drawn_revision != self.revision
    }

    pub fn mark_drawn(&mut self) {
        self.drawn_revision = self.revision;
    }
}
