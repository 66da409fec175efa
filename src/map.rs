use std::collections::BTreeMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DEFAULT_MAP_HEIGHT, DEFAULT_MAP_WIDTH};
use crate::inventory::{Inventory, ItemRegistry};

pub const BLOCK: &str = "block";
pub const TREE: &str = "tree";
pub const WATER: &str = "water";
pub const EXIT: &str = "exit";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("({x}, {y}) is outside the {width}x{height} map")]
    OutOfBounds { x: i32, y: i32, width: i32, height: i32 },
    #[error("({x}, {y}) is already occupied")]
    Occupied { x: i32, y: i32 },
    #[error("unknown object type '{0}'")]
    UnknownObject(String),
    #[error("the player has already been placed")]
    PlayerAlreadyPlaced,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Block,
    Tree,
    Water,
    Exit,
    Item(String),
}

impl ObjectKind {
    pub fn passable(&self) -> bool {
        !matches!(self, ObjectKind::Block | ObjectKind::Tree | ObjectKind::Water)
    }

    pub fn symbol(&self, items: &ItemRegistry) -> char {
        match self {
            ObjectKind::Block => '#',
            ObjectKind::Tree => '♣',
            ObjectKind::Water => '~',
            ObjectKind::Exit => '⎋',
            ObjectKind::Item(id) => items.items.get(id).map(|d| d.symbol).unwrap_or('?'),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapProperties {
    pub allow_overwrite: bool,
    pub exit_requires: Vec<String>,
    pub exit_locked: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum ExitRule {
    #[default]
    Open,
    Locked,
    RequiresItems(Vec<String>),
    /// Decided by the level's `on_exit` hook.
    Script,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlayerState {
    pub x: i32,
    pub y: i32,
    pub placed: bool,
    pub can_move: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "item", rename_all = "snake_case")]
pub enum MoveOutcome {
    Frozen,
    Blocked,
    Moved,
    PickedUp(String),
    ReachedExit,
}

#[derive(Resource, Clone, Debug)]
pub struct LevelMap {
    width: i32,
    height: i32,
    objects: BTreeMap<(i32, i32), String>,
    item_kinds: ItemRegistry,
    pub player: PlayerState,
    pub chapter: Option<String>,
    pub status: Option<String>,
    pub exit_rule: ExitRule,
    pub properties: MapProperties,
}

impl Default for LevelMap {
    fn default() -> Self {
        Self::new(DEFAULT_MAP_WIDTH, DEFAULT_MAP_HEIGHT)
    }
}

impl LevelMap {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            objects: BTreeMap::new(),
            item_kinds: ItemRegistry::default(),
            player: PlayerState::default(),
            chapter: None,
            status: None,
            exit_rule: ExitRule::Open,
            properties: MapProperties::default(),
        }
    }

    pub fn with_items(mut self, registry: ItemRegistry) -> Self {
        self.item_kinds = registry;
        self
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Clears everything a level put on the map. Dimensions survive.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.player = PlayerState::default();
        self.chapter = None;
        self.status = None;
        self.exit_rule = ExitRule::Open;
        self.properties = MapProperties::default();
    }

    /// Applies a level's `mapProperties`. Unknown keys are ignored; a
    /// malformed record leaves the defaults in place.
    pub fn set_properties(&mut self, config: &serde_json::Value) {
        let properties = if config.is_null() {
            MapProperties::default()
        } else {
            match serde_json::from_value::<MapProperties>(config.clone()) {
                Ok(p) => p,
                Err(e) => {
                    warn!("[Cellblock map] Ignoring malformed mapProperties: {e}");
                    MapProperties::default()
                }
            }
        };
        self.exit_rule = if properties.exit_locked {
            ExitRule::Locked
        } else if !properties.exit_requires.is_empty() {
            ExitRule::RequiresItems(properties.exit_requires.clone())
        } else {
            ExitRule::Open
        };
        self.properties = properties;
    }

    pub fn classify(&self, kind: &str) -> Option<ObjectKind> {
        match kind {
            BLOCK => Some(ObjectKind::Block),
            TREE => Some(ObjectKind::Tree),
            WATER => Some(ObjectKind::Water),
            EXIT => Some(ObjectKind::Exit),
            other if self.item_kinds.is_item(other) => Some(ObjectKind::Item(other.to_string())),
            _ => None,
        }
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        (0..self.width).contains(&x) && (0..self.height).contains(&y)
    }

    fn check_bounds(&self, x: i32, y: i32) -> Result<(), MapError> {
        if self.in_bounds(x, y) {
            Ok(())
        } else {
            Err(MapError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            })
        }
    }

    pub fn place_object(&mut self, x: i32, y: i32, kind: &str) -> Result<(), MapError> {
        self.check_bounds(x, y)?;
        if self.classify(kind).is_none() {
            return Err(MapError::UnknownObject(kind.to_string()));
        }
        let player_here = self.player.placed && (self.player.x, self.player.y) == (x, y);
        if !self.properties.allow_overwrite && (self.objects.contains_key(&(x, y)) || player_here)
        {
            return Err(MapError::Occupied { x, y });
        }
        self.objects.insert((x, y), kind.to_string());
        Ok(())
    }

    pub fn place_player(&mut self, x: i32, y: i32) -> Result<(), MapError> {
        self.check_bounds(x, y)?;
        if self.player.placed {
            return Err(MapError::PlayerAlreadyPlaced);
        }
        if self.objects.contains_key(&(x, y)) {
            return Err(MapError::Occupied { x, y });
        }
        self.player.x = x;
        self.player.y = y;
        self.player.placed = true;
        Ok(())
    }

    pub fn object_at(&self, x: i32, y: i32) -> Option<&str> {
        self.objects.get(&(x, y)).map(String::as_str)
    }

    pub fn count_objects(&self, kind: &str) -> usize {
        self.objects.values().filter(|k| *k == kind).count()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Static part of the exit check. `None` means the level script decides.
    pub fn exit_permitted_by_rule(&self, inventory: &Inventory) -> Option<bool> {
        match &self.exit_rule {
            ExitRule::Open => Some(true),
            ExitRule::Locked => Some(false),
            ExitRule::RequiresItems(items) => Some(items.iter().all(|i| inventory.has_item(i))),
            ExitRule::Script => None,
        }
    }

    pub fn try_move_player(&mut self, dx: i32, dy: i32) -> MoveOutcome {
        if !self.player.can_move || !self.player.placed {
            return MoveOutcome::Frozen;
        }
        let (x, y) = (
            self.player.x + dx.clamp(-1, 1),
            self.player.y + dy.clamp(-1, 1),
        );
        if !self.in_bounds(x, y) {
            return MoveOutcome::Blocked;
        }
        let kind = self.objects.get(&(x, y)).and_then(|k| self.classify(k));
        if kind.as_ref().is_some_and(|k| !k.passable()) {
            return MoveOutcome::Blocked;
        }
        self.player.x = x;
        self.player.y = y;
        match kind {
            Some(ObjectKind::Exit) => MoveOutcome::ReachedExit,
            Some(ObjectKind::Item(id)) => {
                self.objects.remove(&(x, y));
                MoveOutcome::PickedUp(id)
            }
            _ => MoveOutcome::Moved,
        }
    }

    pub fn render_rows(&self) -> Vec<String> {
        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| {
                        if self.player.placed && (self.player.x, self.player.y) == (x, y) {
                            '@'
                        } else {
                            self.objects
                                .get(&(x, y))
                                .and_then(|k| self.classify(k))
                                .map(|k| k.symbol(&self.item_kinds))
                                .unwrap_or('.')
                        }
                    })
                    .collect()
            })
            .collect()
    }
}
