use bevy::prelude::*;
use rhai::{Dynamic, Engine, Scope, AST};
use serde::Serialize;

use super::commands::{contains_word_token, referenced_commands};
use super::map_api::MapHandle;
use super::{make_rhai_engine, ScriptFault, ENTRY_EXIT, ENTRY_START, ENTRY_VALIDATE};
use crate::config::{GameConfig, ScriptLimits};
use crate::editor::LevelProperties;
use crate::map::LevelMap;

/// Why staged code was turned away. Carried for logs and the control API; the
/// player only ever sees the rejection itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    ForbiddenToken(String),
    Compile(String),
    MissingEntryPoint,
    Runtime(String),
    PreconditionFailed(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::ForbiddenToken(t) => write!(f, "'{t}' is not allowed here"),
            RejectReason::Compile(e) => write!(f, "syntax error: {e}"),
            RejectReason::MissingEntryPoint => write!(f, "missing {ENTRY_START}(map)"),
            RejectReason::Runtime(e) => write!(f, "error while starting the level: {e}"),
            RejectReason::PreconditionFailed(e) => write!(f, "level validation failed: {e}"),
        }
    }
}

pub struct ValidationRequest<'a> {
    pub full_source: &'a str,
    pub player_source: &'a str,
    pub properties: &'a LevelProperties,
    pub unlocked: &'a [String],
}

/// A level that passed validation, not yet applied to anything.
pub struct AcceptedLevel {
    engine: Engine,
    ast: AST,
    pub introduced_commands: Vec<String>,
    pub introduced_items: Vec<String>,
    pub music_track: Option<String>,
    pub map_config: serde_json::Value,
    pub has_exit_hook: bool,
}

impl AcceptedLevel {
    /// Builds the level into `map` by running `start_level` on a copy and
    /// writing the copy back only if it finishes.
    pub fn run(&self, map: &mut LevelMap) -> Result<(), ScriptFault> {
        let handle = MapHandle::new(map.clone(), Vec::new());
        call_entry(&self.engine, &self.ast, ENTRY_START, &handle)?;
        *map = handle.map();
        Ok(())
    }
}

pub enum ValidationOutcome {
    Accepted(AcceptedLevel),
    Rejected(RejectReason),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }
}

#[derive(Resource, Clone)]
pub struct ValidationEngine {
    pub limits: ScriptLimits,
    pub forbidden_tokens: Vec<String>,
    pub map_width: i32,
    pub map_height: i32,
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::from_config(&GameConfig::default())
    }
}

impl ValidationEngine {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            limits: config.script,
            forbidden_tokens: config.forbidden_tokens.clone(),
            map_width: config.map_width,
            map_height: config.map_height,
        }
    }

    /// Decides whether `full_source` may run. Nothing outside this call is
    /// touched; the dry run happens on a scratch map.
    pub fn validate(&self, req: ValidationRequest<'_>) -> ValidationOutcome {
        if let Some(token) = self
            .forbidden_tokens
            .iter()
            .find(|t| contains_word_token(req.player_source, t))
        {
            return ValidationOutcome::Rejected(RejectReason::ForbiddenToken(token.clone()));
        }

        let engine = make_rhai_engine(self.limits);
        let ast = match engine.compile(req.full_source) {
            Ok(ast) => ast,
            Err(e) => return ValidationOutcome::Rejected(RejectReason::Compile(e.to_string())),
        };
        if !defines(&ast, ENTRY_START) {
            return ValidationOutcome::Rejected(RejectReason::MissingEntryPoint);
        }

        let mut scratch = LevelMap::new(self.map_width, self.map_height);
        scratch.set_properties(&req.properties.map_properties);
        let handle = MapHandle::new(scratch, Vec::new());
        if let Err(fault) = call_entry(&engine, &ast, ENTRY_START, &handle) {
            return ValidationOutcome::Rejected(RejectReason::Runtime(fault.to_string()));
        }
        if defines(&ast, ENTRY_VALIDATE) {
            match call_entry(&engine, &ast, ENTRY_VALIDATE, &handle) {
                Ok(result) if result.as_bool() == Ok(false) => {
                    return ValidationOutcome::Rejected(RejectReason::PreconditionFailed(
                        format!("{ENTRY_VALIDATE} returned false"),
                    ));
                }
                Ok(_) => {}
                Err(fault) => {
                    return ValidationOutcome::Rejected(RejectReason::PreconditionFailed(
                        fault.to_string(),
                    ));
                }
            }
        }

        let introduced_commands =
            introduced_commands(&req.properties.commands_introduced, req.player_source, req.unlocked);
        let has_exit_hook = defines(&ast, ENTRY_EXIT);
        ValidationOutcome::Accepted(AcceptedLevel {
            engine,
            ast,
            introduced_commands,
            introduced_items: req.properties.items_introduced.clone(),
            music_track: req.properties.music.clone(),
            map_config: req.properties.map_properties.clone(),
            has_exit_hook,
        })
    }

    /// Runs the level's `on_exit(map)` against a copy of `map`, with the
    /// player's real inventory visible. Only a literal `true` opens the exit.
    pub fn exit_permitted(
        &self,
        source: &str,
        map: &LevelMap,
        inventory: &[String],
    ) -> Result<bool, ScriptFault> {
        let engine = make_rhai_engine(self.limits);
        let ast = engine
            .compile(source)
            .map_err(|e| ScriptFault::Compile(e.to_string()))?;
        if !defines(&ast, ENTRY_EXIT) {
            return Err(ScriptFault::MissingEntryPoint(ENTRY_EXIT));
        }
        let handle = MapHandle::new(map.clone(), inventory.to_vec());
        let result = call_entry(&engine, &ast, ENTRY_EXIT, &handle)?;
        Ok(result.as_bool().unwrap_or(false))
    }
}

fn defines(ast: &AST, name: &str) -> bool {
    ast.iter_functions()
        .any(|f| f.name == name && f.params.len() == 1)
}

fn call_entry(
    engine: &Engine,
    ast: &AST,
    function: &'static str,
    handle: &MapHandle,
) -> Result<Dynamic, ScriptFault> {
    let mut scope = Scope::new();
    engine
        .call_fn::<Dynamic>(&mut scope, ast, function, (handle.clone(),))
        .map_err(|e| ScriptFault::Runtime {
            function,
            message: e.to_string(),
        })
}

/// Declared commands first, then commands the player called, each once and
/// only if not already unlocked.
fn introduced_commands(declared: &[String], player_source: &str, unlocked: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in declared
        .iter()
        .cloned()
        .chain(referenced_commands(player_source))
    {
        if !name.is_empty() && !unlocked.contains(&name) && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"
fn start_level(map) {
    map.place_player(1, 1);
    map.place_object(2, 2, "block");
    map.place_object(48, 23, "exit");
}
"#;

    fn validate(engine: &ValidationEngine, full: &str, player: &str) -> ValidationOutcome {
        engine.validate(ValidationRequest {
            full_source: full,
            player_source: player,
            properties: &LevelProperties::default(),
            unlocked: &[],
        })
    }

    fn reason(outcome: ValidationOutcome) -> RejectReason {
        match outcome {
            ValidationOutcome::Rejected(r) => r,
            ValidationOutcome::Accepted(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn accepted_level_builds_the_map() {
        let engine = ValidationEngine::default();
        let ValidationOutcome::Accepted(level) = validate(&engine, GOOD, "") else {
            panic!("expected acceptance");
        };
        let mut map = LevelMap::default();
        level.run(&mut map).expect("level runs");
        assert_eq!(map.object_at(48, 23), Some("exit"));
        assert!(map.player.placed);
    }

    #[test]
    fn rejects_each_failure_class() {
        let engine = ValidationEngine::default();
        assert_eq!(
            reason(validate(&engine, GOOD, "eval(\"1\")")),
            RejectReason::ForbiddenToken("eval".into())
        );
        assert!(matches!(
            reason(validate(&engine, "fn start_level(map) { map.place_player(1, 1) ", "")),
            RejectReason::Compile(_)
        ));
        assert_eq!(
            reason(validate(&engine, "fn begin(map) {}", "")),
            RejectReason::MissingEntryPoint
        );
        assert!(matches!(
            reason(validate(
                &engine,
                "fn start_level(map) { map.place_player(1, 1); map.place_player(2, 2); }",
                ""
            )),
            RejectReason::Runtime(_)
        ));
        assert!(matches!(
            reason(validate(
                &engine,
                "fn start_level(map) {} fn validate_level(map) { map.validate_at_least(\"exit\", 1); }",
                ""
            )),
            RejectReason::PreconditionFailed(_)
        ));
        assert!(matches!(
            reason(validate(
                &engine,
                "fn start_level(map) {} fn validate_level(map) { false }",
                ""
            )),
            RejectReason::PreconditionFailed(_)
        ));
    }

    #[test]
    fn runaway_scripts_are_rejected() {
        let engine = ValidationEngine {
            limits: ScriptLimits {
                max_operations: 10_000,
                max_call_levels: 8,
            },
            ..ValidationEngine::default()
        };
        assert!(matches!(
            reason(validate(&engine, "fn start_level(map) { loop {} }", "loop {}")),
            RejectReason::Runtime(_)
        ));
    }

    #[test]
    fn same_text_gives_same_tag() {
        let engine = ValidationEngine::default();
        for _ in 0..3 {
            assert!(validate(&engine, GOOD, "").is_accepted());
            assert!(!validate(&engine, "fn start_level(map) { throw \"no\"; }", "").is_accepted());
        }
    }

    #[test]
    fn introduced_commands_are_ordered_and_new() {
        let engine = ValidationEngine::default();
        let properties = LevelProperties {
            commands_introduced: vec!["map.get_width".into(), "map.place_object".into()],
            ..LevelProperties::default()
        };
        let player = r#"map.place_object(2, 2, "block"); map.count_objects("block"); map.get_height();"#;
        let full = format!("fn start_level(map) {{ {player} }}");
        let unlocked = vec!["map.get_width".to_string()];
        let outcome = engine.validate(ValidationRequest {
            full_source: &full,
            player_source: player,
            properties: &properties,
            unlocked: &unlocked,
        });
        let ValidationOutcome::Accepted(level) = outcome else {
            panic!("expected acceptance");
        };
        assert_eq!(
            level.introduced_commands,
            vec!["map.place_object", "map.count_objects", "map.get_height"]
        );
    }

    #[test]
    fn exit_hook_sees_the_inventory() {
        let engine = ValidationEngine::default();
        let source = r#"
            fn start_level(map) { map.place_player(0, 0); }
            fn on_exit(map) { map.has_item("redKey") }
        "#;
        let map = LevelMap::default();
        assert_eq!(engine.exit_permitted(source, &map, &[]), Ok(false));
        assert_eq!(
            engine.exit_permitted(source, &map, &["redKey".to_string()]),
            Ok(true)
        );
        assert_eq!(
            engine.exit_permitted(GOOD, &map, &[]),
            Err(ScriptFault::MissingEntryPoint(ENTRY_EXIT))
        );
    }
}
