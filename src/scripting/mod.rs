pub mod commands;
pub mod map_api;
pub mod validate;

use rhai::Engine;
use thiserror::Error;

use crate::config::ScriptLimits;

pub use map_api::{MapHandle, ScriptWorld};
pub use validate::{
    AcceptedLevel, RejectReason, ValidationEngine, ValidationOutcome, ValidationRequest,
};

pub const ENTRY_START: &str = "start_level";
pub const ENTRY_VALIDATE: &str = "validate_level";
pub const ENTRY_EXIT: &str = "on_exit";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptFault {
    #[error("level script failed to compile: {0}")]
    Compile(String),
    #[error("level script has no {0}(map) function")]
    MissingEntryPoint(&'static str),
    #[error("{function} raised: {message}")]
    Runtime {
        function: &'static str,
        message: String,
    },
}

pub fn make_rhai_engine(limits: ScriptLimits) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_string_size(4_096);
    engine.set_max_array_size(4_096);
    engine.set_max_map_size(1_024);
    map_api::register(&mut engine);
    engine
}
