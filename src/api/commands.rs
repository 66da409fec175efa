use super::*;
use crate::display::{display_state, Display};
use crate::editor::CodeEditor;
use crate::error::LevelError;
use crate::events::{LevelEvent, LevelEventLog};
use crate::inventory::Inventory;
use crate::lifecycle::{
    eval_level_code, jump_if_reached, move_player, move_to_next_level, restart_level, start,
    EvalReport, ExitOutcome, LevelLifecycle,
};
use crate::map::{LevelMap, MoveOutcome};
use crate::scripting::commands::{help_for, CommandHelp};

type Reply<T> = tokio::sync::oneshot::Sender<T>;

/// Commands sent from API -> Bevy
pub enum ApiCommand {
    GetState(Reply<GameSnapshot>),
    Start(Reply<Result<u64, String>>),
    Next(Reply<Result<ExitOutcome, String>>),
    Restart(Reply<Result<EvalReport, String>>),
    Jump(u32, Reply<Result<u64, String>>),
    GetCode(Reply<CodeView>),
    SetCode(String, Reply<Result<EvalReport, String>>),
    Execute(Reply<Result<EvalReport, String>>),
    GetCommands(Reply<Vec<CommandHelp>>),
    MovePlayer(i32, i32, Reply<MoveOutcome>),
    GetEvents(u64, Reply<Vec<LevelEvent>>),
}

#[derive(Resource)]
pub struct ApiChannels {
    pub receiver: Receiver<ApiCommand>,
}

/// Applies queued API commands against the world. Replies are best effort;
/// a handler that gave up waiting is not an error.
pub(super) fn process_api_commands(world: &mut World) {
    let pending: Vec<ApiCommand> = world.resource::<ApiChannels>().receiver.try_iter().collect();
    for command in pending {
        match command {
            ApiCommand::GetState(tx) => {
                let _ = tx.send(snapshot(world));
            }
            ApiCommand::Start(tx) => {
                let _ = tx.send(start(world).map_err(|e| e.to_string()));
            }
            ApiCommand::Next(tx) => {
                let _ = tx.send(move_to_next_level(world).map_err(|e| e.to_string()));
            }
            ApiCommand::Restart(tx) => {
                let _ = tx.send(restart_level(world).map_err(|e| e.to_string()));
            }
            ApiCommand::Jump(level, tx) => {
                let _ = tx.send(jump_if_reached(world, level).map_err(|e| e.to_string()));
            }
            ApiCommand::GetCode(tx) => {
                let editor = world.resource::<CodeEditor>();
                let _ = tx.send(CodeView {
                    level: editor.level(),
                    code: editor.get_code().to_string(),
                    player_code: editor.get_player_code(),
                });
            }
            ApiCommand::SetCode(code, tx) => {
                let _ = tx.send(submit_code(world, &code).map_err(|e| e.to_string()));
            }
            ApiCommand::Execute(tx) => {
                let _ = tx.send(eval_level_code(world, None, false).map_err(|e| e.to_string()));
            }
            ApiCommand::GetCommands(tx) => {
                let unlocked = &world.resource::<LevelLifecycle>().state().unlocked_commands;
                let _ = tx.send(help_for(unlocked));
            }
            ApiCommand::MovePlayer(dx, dy, tx) => {
                let _ = tx.send(move_player(world, dx, dy));
            }
            ApiCommand::GetEvents(since, tx) => {
                let _ = tx.send(world.resource::<LevelEventLog>().since(since));
            }
        }
    }
}

fn submit_code(world: &mut World, code: &str) -> Result<EvalReport, LevelError> {
    if world.resource::<LevelLifecycle>().load_in_flight() {
        return Err(LevelError::LoadInFlight);
    }
    world.resource_mut::<CodeEditor>().set_code(code)?;
    eval_level_code(world, None, false)
}

fn snapshot(world: &World) -> GameSnapshot {
    let lifecycle = world.resource::<LevelLifecycle>();
    let map = world.resource::<LevelMap>();
    GameSnapshot {
        level: lifecycle.state().clone(),
        phase: lifecycle.phase().clone(),
        debug: lifecycle.debug(),
        map: MapView {
            width: map.width(),
            height: map.height(),
            rows: map.render_rows(),
            player: map.player.clone(),
            exit_rule: map.exit_rule.clone(),
            chapter: map.chapter.clone(),
            status: map.status.clone(),
        },
        inventory: world.resource::<Inventory>().items().to_vec(),
        display: display_state(world.resource::<Display>()),
        audio: world.resource::<crate::audio::AudioManager>().snapshot(),
        last_eval: lifecycle.last_eval().cloned(),
    }
}
