use std::collections::BTreeMap;
use std::path::PathBuf;

use bevy::prelude::*;
use thiserror::Error;

pub const LEVEL_REACHED_KEY: &str = "levelReached";
pub const HELP_COMMANDS_KEY: &str = "helpCommands";
const HELP_COMMANDS_DELIMITER: char = ';';

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("failed to write progress file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode progress: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), ProgressError>;
}

#[derive(Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn with_values<K: Into<String>, V: Into<String>>(
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), ProgressError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// One JSON object of string values, rewritten whole on every `set`.
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(values) => values,
                Err(e) => {
                    warn!(
                        "[Cellblock progress] Ignoring unreadable progress file {}: {e}",
                        path.display()
                    );
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { path, values }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), ProgressError> {
        if self.values.get(key) == Some(&value) {
            return Ok(());
        }
        self.values.insert(key.to_string(), value);
        let contents = serde_json::to_string_pretty(&self.values)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ProgressError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        std::fs::write(&self.path, contents).map_err(|source| ProgressError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub level_reached: u32,
    pub help_commands: Vec<String>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            level_reached: 1,
            help_commands: Vec::new(),
        }
    }
}

#[derive(Resource)]
pub struct ProgressStore {
    backend: Box<dyn KeyValueStore>,
}

impl ProgressStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn memory() -> Self {
        Self::new(MemoryStore::default())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(JsonFileStore::open(path))
    }

    pub fn load(&self) -> ProgressSnapshot {
        let level_reached = self
            .backend
            .get(LEVEL_REACHED_KEY)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);
        let help_commands = self
            .backend
            .get(HELP_COMMANDS_KEY)
            .map(|joined| split_commands(&joined))
            .unwrap_or_default();
        ProgressSnapshot {
            level_reached,
            help_commands,
        }
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.backend.get(key)
    }

    pub fn save_level_reached(&mut self, level_reached: u32) {
        self.write(LEVEL_REACHED_KEY, level_reached.to_string());
    }

    pub fn save_help_commands(&mut self, commands: &[String]) {
        let joined = commands
            .iter()
            .filter(|c| !c.is_empty() && !c.contains(HELP_COMMANDS_DELIMITER))
            .cloned()
            .collect::<Vec<_>>()
            .join(&HELP_COMMANDS_DELIMITER.to_string());
        self.write(HELP_COMMANDS_KEY, joined);
    }

    fn write(&mut self, key: &str, value: String) {
        if let Err(e) = self.backend.set(key, value) {
            warn!("[Cellblock progress] Failed to persist '{key}': {e}");
        }
    }
}

fn split_commands(joined: &str) -> Vec<String> {
    let mut commands: Vec<String> = Vec::new();
    for command in joined.split(HELP_COMMANDS_DELIMITER).map(str::trim) {
        if !command.is_empty() && !commands.iter().any(|c| c == command) {
            commands.push(command.to_string());
        }
    }
    commands
}
