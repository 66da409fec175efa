use serde::{Deserialize, Serialize};

use crate::audio::AudioStateSnapshot;
use crate::lifecycle::{EvalReport, LevelState, LifecyclePhase};
use crate::map::{ExitRule, PlayerState};

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn from_result(result: Result<T, String>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => Self {
                ok: false,
                data: None,
                error: Some(e),
            },
        }
    }
}

impl ApiResponse<()> {
    pub fn err(msg: impl Into<String>) -> ApiResponse<String> {
        ApiResponse {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct MapView {
    pub width: i32,
    pub height: i32,
    pub rows: Vec<String>,
    pub player: PlayerState,
    pub exit_rule: ExitRule,
    pub chapter: Option<String>,
    pub status: Option<String>,
}

#[derive(Serialize, Clone)]
pub struct GameSnapshot {
    pub level: LevelState,
    pub phase: LifecyclePhase,
    pub debug: bool,
    pub map: MapView,
    pub inventory: Vec<String>,
    pub display: serde_json::Value,
    pub audio: AudioStateSnapshot,
    pub last_eval: Option<EvalReport>,
}

#[derive(Serialize, Clone)]
pub struct CodeView {
    pub level: Option<u32>,
    pub code: String,
    pub player_code: String,
}

#[derive(Deserialize)]
pub struct JumpRequest {
    pub level: u32,
}

#[derive(Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct MoveRequest {
    pub dx: i32,
    pub dy: i32,
}

#[derive(Deserialize, Default)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
}
