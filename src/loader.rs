use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bevy::prelude::*;
use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::config::{FetchMode, GameConfig};

const EMBEDDED_LEVELS_JSON: &str =
    include_str!(concat!(env!("OUT_DIR"), "/cellblock_embedded_levels.json"));

#[derive(Debug, Error)]
pub enum LoadFailure {
    #[error("level '{locator}' not found")]
    NotFound { locator: String },
    #[error("level locator '{locator}' is not a plain relative path")]
    InvalidLocator { locator: String },
    #[error("failed to read level '{locator}': {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },
}

/// Where level source text comes from.
pub trait LevelSource: Send + Sync {
    fn fetch(&self, locator: &str) -> Result<String, LoadFailure>;
    fn describe(&self) -> String;
}

/// Reads `<root>/<locator>` from disk.
pub struct DirectoryLevelSource {
    root: PathBuf,
}

impl DirectoryLevelSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LevelSource for DirectoryLevelSource {
    fn fetch(&self, locator: &str) -> Result<String, LoadFailure> {
        let relative = Path::new(locator);
        if locator.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(LoadFailure::InvalidLocator {
                locator: locator.to_string(),
            });
        }
        let path = self.root.join(relative);
        std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadFailure::NotFound {
                    locator: locator.to_string(),
                }
            } else {
                LoadFailure::Io {
                    locator: locator.to_string(),
                    source,
                }
            }
        })
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// Level files compiled into the binary, or supplied directly.
#[derive(Default)]
pub struct EmbeddedLevelSource {
    levels: HashMap<String, String>,
}

impl EmbeddedLevelSource {
    pub fn new(levels: HashMap<String, String>) -> Self {
        Self { levels }
    }

    pub fn from_build() -> Self {
        match serde_json::from_str::<HashMap<String, String>>(EMBEDDED_LEVELS_JSON) {
            Ok(levels) => Self { levels },
            Err(e) => {
                error!("[Cellblock loader] Embedded level data is unreadable: {e}");
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl LevelSource for EmbeddedLevelSource {
    fn fetch(&self, locator: &str) -> Result<String, LoadFailure> {
        self.levels
            .get(locator)
            .cloned()
            .ok_or_else(|| LoadFailure::NotFound {
                locator: locator.to_string(),
            })
    }

    fn describe(&self) -> String {
        format!("{} embedded levels", self.levels.len())
    }
}

pub struct LoadCompletion {
    pub ticket: u64,
    pub level: u32,
    pub result: Result<String, LoadFailure>,
}

/// Fetches level text and posts results back to the frame loop. Each request
/// is independent; nothing is cancelled or cached.
#[derive(Resource)]
pub struct ContentLoader {
    source: Arc<dyn LevelSource>,
    mode: FetchMode,
    tx: Sender<LoadCompletion>,
    rx: Receiver<LoadCompletion>,
}

impl ContentLoader {
    pub fn new(source: Arc<dyn LevelSource>, mode: FetchMode) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            source,
            mode,
            tx,
            rx,
        }
    }

    /// Embedded levels win when the build carried any; otherwise the
    /// configured directory is read.
    pub fn from_config(config: &GameConfig) -> Self {
        let embedded = EmbeddedLevelSource::from_build();
        let source: Arc<dyn LevelSource> = if embedded.is_empty() {
            Arc::new(DirectoryLevelSource::new(&config.levels_dir))
        } else {
            Arc::new(embedded)
        };
        info!("[Cellblock loader] Levels from {}", source.describe());
        Self::new(source, config.fetch_mode)
    }

    pub fn request(&self, ticket: u64, level: u32, locator: &str) {
        match self.mode {
            FetchMode::Inline => {
                let result = self.source.fetch(locator);
                let _ = self.tx.send(LoadCompletion {
                    ticket,
                    level,
                    result,
                });
            }
            FetchMode::Background => {
                let source = Arc::clone(&self.source);
                let tx = self.tx.clone();
                let locator = locator.to_string();
                std::thread::spawn(move || {
                    let result = source.fetch(&locator);
                    let _ = tx.send(LoadCompletion {
                        ticket,
                        level,
                        result,
                    });
                });
            }
        }
    }

    pub fn drain(&self) -> Vec<LoadCompletion> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedded() -> Arc<dyn LevelSource> {
        Arc::new(EmbeddedLevelSource::new(HashMap::from([(
            "01.rhai".to_string(),
            "fn start_level(map) {}".to_string(),
        )])))
    }

    #[test]
    fn inline_loads_complete_immediately() {
        let loader = ContentLoader::new(embedded(), FetchMode::Inline);
        loader.request(5, 1, "01.rhai");
        loader.request(6, 2, "02.rhai");
        let done = loader.drain();
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].ticket, 5);
        assert!(done[0].result.is_ok());
        assert!(matches!(
            done[1].result,
            Err(LoadFailure::NotFound { ref locator }) if locator == "02.rhai"
        ));
        assert!(loader.drain().is_empty());
    }

    #[test]
    fn background_loads_arrive_on_the_channel() {
        let loader = ContentLoader::new(embedded(), FetchMode::Background);
        loader.request(1, 1, "01.rhai");
        let completion = loader
            .rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("background fetch should post a completion");
        assert_eq!(completion.level, 1);
        assert!(completion.result.is_ok());
    }

    #[test]
    fn directory_source_refuses_escaping_locators() {
        let source = DirectoryLevelSource::new("levels");
        assert!(matches!(
            source.fetch("../secret.txt"),
            Err(LoadFailure::InvalidLocator { .. })
        ));
        assert!(matches!(
            source.fetch("definitely_missing.rhai"),
            Err(LoadFailure::NotFound { .. })
        ));
    }

    #[test]
    fn directory_source_reads_shipped_levels() {
        let source = DirectoryLevelSource::new(concat!(env!("CARGO_MANIFEST_DIR"), "/levels"));
        for locator in crate::config::DEFAULT_LEVEL_FILES {
            let text = source.fetch(locator).expect("shipped level should be readable");
            assert!(text.contains("start_level"));
        }
    }

    #[test]
    fn shipped_levels_pass_validation() {
        use crate::editor::CodeEditor;
        use crate::scripting::{ValidationEngine, ValidationOutcome, ValidationRequest};

        let config = GameConfig::default();
        let engine = ValidationEngine::from_config(&config);
        let source = DirectoryLevelSource::new(concat!(env!("CARGO_MANIFEST_DIR"), "/levels"));
        for (i, locator) in crate::config::DEFAULT_LEVEL_FILES.iter().enumerate() {
            let text = source.fetch(locator).expect("readable");
            let mut editor = CodeEditor::default();
            editor.load_code(i as u32 + 1, &text).expect("well-formed level");
            let player = editor.get_player_code();
            let outcome = engine.validate(ValidationRequest {
                full_source: editor.get_code(),
                player_source: &player,
                properties: editor.get_properties(),
                unlocked: &[],
            });
            assert!(
                matches!(outcome, ValidationOutcome::Accepted(_)),
                "{locator} was rejected"
            );
        }
    }
}
