use thiserror::Error;

use crate::editor::EditorError;
use crate::loader::LoadFailure;
use crate::scripting::ScriptFault;

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("level {0} is not in the catalog")]
    UnknownLevel(u32),
    #[error("no level has been loaded yet")]
    NoLevelLoaded,
    #[error("a level load is still in progress")]
    LoadInFlight,
    #[error("level {level} is not ready to leave")]
    NotReady { level: u32 },
    #[error("the editor does not hold level {current}")]
    EditorMismatch { current: u32 },
    #[error("level {level} is locked (reached {reached})")]
    LevelLocked { level: u32, reached: u32 },
    #[error(transparent)]
    Load(#[from] LoadFailure),
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error(transparent)]
    Script(#[from] ScriptFault),
}
