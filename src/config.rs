use std::collections::BTreeMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAP_WIDTH: i32 = 50;
pub const DEFAULT_MAP_HEIGHT: i32 = 25;
pub const DEFAULT_NEW_LEVEL_FADE_UNITS: u32 = 100;
pub const DEFAULT_RETRY_FADE_UNITS: u32 = 10;
pub const DEFAULT_RHAI_MAX_OPERATIONS: u64 = 500_000;
pub const DEFAULT_RHAI_MAX_CALL_LEVELS: usize = 64;

/// Level files shipped in `levels/`, in play order.
pub const DEFAULT_LEVEL_FILES: &[&str] = &[
    "01_cellBlockA.rhai",
    "02_theLongWayOut.rhai",
    "03_validationEngaged.rhai",
    "04_multiplicity.rhai",
    "99_credits.rhai",
];

pub const DEFAULT_FORBIDDEN_TOKENS: &[&str] = &[
    "eval",
    "import",
    "export",
    "Fn",
    "call",
    "curry",
    "is_def_fn",
    "is_def_var",
];

pub const DEFAULT_MUSIC_TRACKS: &[&str] = &[
    "cloudy_sunset",
    "gray_static",
    "long_corridor",
    "night_owl",
    "soft_circuit",
    "the_archivist",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    Background,
    Inline,
}

impl Default for FetchMode {
    fn default() -> Self {
        if cfg!(target_arch = "wasm32") {
            FetchMode::Inline
        } else {
            FetchMode::Background
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_RHAI_MAX_OPERATIONS,
            max_call_levels: DEFAULT_RHAI_MAX_CALL_LEVELS,
        }
    }
}

impl ScriptLimits {
    pub fn from_env(self) -> Self {
        Self {
            max_operations: env_u64("CELLBLOCK_RHAI_MAX_OPERATIONS", self.max_operations)
                .max(10_000),
            max_call_levels: env_u64(
                "CELLBLOCK_RHAI_MAX_CALL_LEVELS",
                self.max_call_levels as u64,
            )
            .max(8) as usize,
        }
    }
}

#[derive(Resource, Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub window_title: String,
    pub window_width: f32,
    pub window_height: f32,
    pub levels_dir: String,
    pub progress_path: String,
    pub debug_mode: bool,
    pub api_addr: String,
    pub fetch_mode: FetchMode,
    pub map_width: i32,
    pub map_height: i32,
    pub levels: Vec<String>,
    /// Items granted for completing a level, keyed by level ordinal.
    pub item_grants: BTreeMap<u32, Vec<String>>,
    pub music_tracks: Vec<String>,
    pub forbidden_tokens: Vec<String>,
    pub new_level_fade_units: u32,
    pub retry_fade_units: u32,
    pub script: ScriptLimits,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            window_title: "Cellblock".to_string(),
            window_width: 1000.0,
            window_height: 600.0,
            levels_dir: "levels".to_string(),
            progress_path: "progress.json".to_string(),
            debug_mode: false,
            api_addr: "127.0.0.1:3000".to_string(),
            fetch_mode: FetchMode::default(),
            map_width: DEFAULT_MAP_WIDTH,
            map_height: DEFAULT_MAP_HEIGHT,
            levels: DEFAULT_LEVEL_FILES.iter().map(|s| s.to_string()).collect(),
            item_grants: BTreeMap::from([
                (1, vec!["computer".to_string()]),
                (3, vec!["phone".to_string()]),
            ]),
            music_tracks: DEFAULT_MUSIC_TRACKS.iter().map(|s| s.to_string()).collect(),
            forbidden_tokens: DEFAULT_FORBIDDEN_TOKENS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            new_level_fade_units: DEFAULT_NEW_LEVEL_FADE_UNITS,
            retry_fade_units: DEFAULT_RETRY_FADE_UNITS,
            script: ScriptLimits::default(),
        }
    }
}

/// Whether the app runs without a window.
#[derive(Resource, Clone, Copy, Default)]
pub struct HeadlessMode(pub bool);

pub fn load_game_config(args: &[String]) -> GameConfig {
    let path = std::env::var("CELLBLOCK_GAME_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "cellblock.json".to_string());
    let mut config = match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<GameConfig>(&contents) {
            Ok(cfg) => {
                println!("[Cellblock] Loaded config from {}", path);
                cfg
            }
            Err(e) => {
                eprintln!("[Cellblock] Failed to parse {}: {}", path, e);
                GameConfig::default()
            }
        },
        Err(_) => GameConfig::default(),
    };
    apply_env_overrides(&mut config);
    if args.iter().any(|a| a == "--debug") {
        config.debug_mode = true;
    }
    config.script = config.script.from_env();
    config
}

fn apply_env_overrides(config: &mut GameConfig) {
    if let Some(dir) = env_string("CELLBLOCK_LEVELS_DIR") {
        config.levels_dir = dir;
    }
    if let Some(path) = env_string("CELLBLOCK_PROGRESS_PATH") {
        config.progress_path = path;
    }
    if let Some(addr) = env_string("CELLBLOCK_API_ADDR") {
        config.api_addr = addr;
    }
    if let Some(flag) = env_string("CELLBLOCK_DEBUG") {
        config.debug_mode = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
