mod systems;

use bevy::prelude::*;
use serde::Serialize;

use crate::audio::{AudioManager, CUE_BLIP, CUE_COMPLETE, CUE_STATIC};
use crate::catalog::LevelCatalog;
use crate::config::GameConfig;
use crate::display::{Display, DisplaySet};
use crate::editor::CodeEditor;
use crate::error::LevelError;
use crate::events::LevelEventLog;
use crate::inventory::Inventory;
use crate::loader::{ContentLoader, LoadCompletion};
use crate::map::{ExitRule, LevelMap};
use crate::progress::{ProgressSnapshot, ProgressStore};
use crate::scripting::commands::all_command_names;
use crate::scripting::{RejectReason, ValidationEngine, ValidationOutcome, ValidationRequest};

pub use systems::{move_player, LifecycleRequest, LifecycleRequests};

pub struct LifecyclePlugin;

impl Plugin for LifecyclePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LifecycleRequests>()
            .configure_sets(
                Update,
                (
                    LifecycleSet::Requests,
                    LifecycleSet::Loads,
                    DisplaySet::Fades,
                    LifecycleSet::Transitions,
                )
                    .chain(),
            )
            .add_systems(
                Update,
                (
                    systems::drain_lifecycle_requests.in_set(LifecycleSet::Requests),
                    systems::pump_level_loads.in_set(LifecycleSet::Loads),
                    systems::finish_transitions.in_set(LifecycleSet::Transitions),
                ),
            );
    }
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum LifecycleSet {
    Requests,
    Loads,
    Transitions,
}

/// Session progression state. Only the operations in this module change it.
#[derive(Clone, Debug, Serialize)]
pub struct LevelState {
    pub current_level: u32,
    pub level_reached: u32,
    pub unlocked_commands: Vec<String>,
    #[serde(skip)]
    pub staged_source: String,
    #[serde(skip)]
    pub last_good_source: String,
}

impl Default for LevelState {
    fn default() -> Self {
        Self {
            current_level: 1,
            level_reached: 1,
            unlocked_commands: Vec::new(),
            staged_source: String::new(),
            last_good_source: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum LifecyclePhase {
    Idle,
    Loading { level: u32, ticket: u64 },
    Validating { level: u32 },
    TransitioningIn { level: u32, ticket: u64 },
    PlayReady { level: u32 },
    Rejected { level: u32 },
    Faulted { level: u32, error: String },
}

#[derive(Clone, Debug)]
struct PendingLoad {
    ticket: u64,
    level: u32,
}

#[derive(Clone, Debug)]
struct PendingTransition {
    ticket: u64,
    level: u32,
    music: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalStatus {
    Accepted,
    Rejected,
    Faulted,
}

#[derive(Clone, Debug, Serialize)]
pub struct EvalReport {
    pub level: u32,
    pub status: EvalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub introduced_commands: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_ticket: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExitOutcome {
    Denied,
    FinalLevel,
    Advanced { level: u32, ticket: u64 },
}

/// Code handed to `eval_level_code` instead of reading the editor.
#[derive(Clone, Debug)]
pub struct StagedCode {
    pub full: String,
    pub player: String,
}

#[derive(Resource)]
pub struct LevelLifecycle {
    state: LevelState,
    phase: LifecyclePhase,
    debug: bool,
    new_level_fade_units: u32,
    retry_fade_units: u32,
    next_ticket: u64,
    pending_load: Option<PendingLoad>,
    pending_transition: Option<PendingTransition>,
    last_eval: Option<EvalReport>,
}

impl LevelLifecycle {
    /// Session state from stored progress. Debug sessions open every level
    /// and every command without touching storage.
    pub fn new(progress: ProgressSnapshot, config: &GameConfig, catalog: &LevelCatalog) -> Self {
        let mut state = LevelState {
            level_reached: progress.level_reached.max(1),
            unlocked_commands: progress.help_commands,
            ..LevelState::default()
        };
        if config.debug_mode {
            state.level_reached = state.level_reached.max(catalog.len() as u32);
            state.unlocked_commands = all_command_names();
        }
        Self {
            state,
            phase: LifecyclePhase::Idle,
            debug: config.debug_mode,
            new_level_fade_units: config.new_level_fade_units,
            retry_fade_units: config.retry_fade_units,
            next_ticket: 0,
            pending_load: None,
            pending_transition: None,
            last_eval: None,
        }
    }

    pub fn state(&self) -> &LevelState {
        &self.state
    }

    pub fn phase(&self) -> &LifecyclePhase {
        &self.phase
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn last_eval(&self) -> Option<&EvalReport> {
        self.last_eval.as_ref()
    }

    pub fn load_in_flight(&self) -> bool {
        self.pending_load.is_some()
    }

    pub fn transition_in_flight(&self) -> bool {
        self.pending_transition.is_some()
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn unlock(&mut self, commands: &[String]) -> bool {
        let mut changed = false;
        for command in commands {
            if !self.state.unlocked_commands.contains(command) {
                self.state.unlocked_commands.push(command.clone());
                changed = true;
            }
        }
        changed
    }
}

/// Begins the session at the first level.
pub fn start(world: &mut World) -> Result<u64, LevelError> {
    get_level(world, 1)
}

/// Makes `level` current and requests its content. Returns the load ticket;
/// the rest of the sequence runs as the load and fade complete.
pub fn get_level(world: &mut World, level: u32) -> Result<u64, LevelError> {
    let locator = world
        .resource::<LevelCatalog>()
        .locator(level)
        .map(str::to_string)
        .ok_or(LevelError::UnknownLevel(level))?;

    let (ticket, reached, debug) = {
        let mut lifecycle = world.resource_mut::<LevelLifecycle>();
        lifecycle.state.current_level = level;
        lifecycle.state.level_reached = lifecycle.state.level_reached.max(level);
        lifecycle.pending_transition = None;
        let ticket = lifecycle.issue_ticket();
        lifecycle.pending_load = Some(PendingLoad { ticket, level });
        lifecycle.phase = LifecyclePhase::Loading { level, ticket };
        (ticket, lifecycle.state.level_reached, lifecycle.debug)
    };
    if !debug {
        world
            .resource_mut::<ProgressStore>()
            .save_level_reached(reached);
    }
    world.resource_mut::<LevelMap>().player.can_move = false;
    world.resource_mut::<LevelEventLog>().emit(
        "level_requested",
        Some(level),
        serde_json::json!({ "ticket": ticket, "locator": locator }),
    );
    info!("[Cellblock levels] Loading level {level} ({locator})");
    world
        .resource::<ContentLoader>()
        .request(ticket, level, &locator);
    Ok(ticket)
}

/// Applies one content fetch result. Results for anything but the newest
/// request are dropped.
pub fn complete_load(world: &mut World, completion: LoadCompletion) {
    let LoadCompletion {
        ticket,
        level,
        result,
    } = completion;
    {
        let mut lifecycle = world.resource_mut::<LevelLifecycle>();
        let fresh = lifecycle
            .pending_load
            .as_ref()
            .is_some_and(|p| p.ticket == ticket && p.level == level);
        if !fresh {
            debug!("[Cellblock levels] Discarding stale load {ticket} for level {level}");
            return;
        }
        lifecycle.pending_load = None;
    }

    let text = match result {
        Ok(text) => text,
        Err(e) => {
            fault(world, level, e.to_string(), "level_load_failed");
            return;
        }
    };
    if let Err(e) = world.resource_mut::<CodeEditor>().load_code(level, &text) {
        fault(world, level, e.to_string(), "level_load_failed");
        return;
    }
    world.resource_mut::<LevelEventLog>().emit(
        "level_loaded",
        Some(level),
        serde_json::json!({ "ticket": ticket, "bytes": text.len() }),
    );
    if let Err(e) = eval_level_code(world, None, true) {
        warn!("[Cellblock levels] Level {level} could not be evaluated: {e}");
        return;
    }
    world.resource_mut::<Display>().focus();
}

/// Validates code and, if it is accepted, rebuilds the level from it.
///
/// With no explicit code the editor's current text is used and a good
/// checkpoint is saved on success. Nothing is evaluated while a load is
/// pending or when the editor holds a different level than the current one.
pub fn eval_level_code(
    world: &mut World,
    code: Option<StagedCode>,
    is_new_level: bool,
) -> Result<EvalReport, LevelError> {
    let (level, loading) = {
        let lifecycle = world.resource::<LevelLifecycle>();
        (lifecycle.state.current_level, lifecycle.pending_load.is_some())
    };
    if loading {
        return Err(LevelError::LoadInFlight);
    }
    let (full, player, from_editor) = match code {
        Some(code) => (code.full, code.player, false),
        None => {
            let editor = world.resource::<CodeEditor>();
            if editor.level() != Some(level) {
                return Err(LevelError::EditorMismatch { current: level });
            }
            (editor.get_code().to_string(), editor.get_player_code(), true)
        }
    };
    let properties = world.resource::<CodeEditor>().get_properties().clone();

    world.resource_scope(|world, mut display: Mut<Display>| {
        display.save_grid(world.resource::<LevelMap>(), Some(level));
    });

    let unlocked = {
        let mut lifecycle = world.resource_mut::<LevelLifecycle>();
        lifecycle.phase = LifecyclePhase::Validating { level };
        lifecycle.state.unlocked_commands.clone()
    };
    let outcome = world.resource::<ValidationEngine>().validate(ValidationRequest {
        full_source: &full,
        player_source: &player,
        properties: &properties,
        unlocked: &unlocked,
    });

    let report = match outcome {
        ValidationOutcome::Rejected(reason) => reject(world, level, reason),
        ValidationOutcome::Accepted(accepted) => {
            {
                let mut map = world.resource_mut::<LevelMap>();
                map.reset();
                map.set_properties(&accepted.map_config);
            }
            {
                let mut lifecycle = world.resource_mut::<LevelLifecycle>();
                lifecycle.state.staged_source = full.clone();
                if from_editor {
                    lifecycle.state.last_good_source = full;
                }
            }
            if from_editor {
                world.resource_mut::<CodeEditor>().save_good_state();
            }
            {
                let mut display = world.resource_mut::<Display>();
                display.clear_canvas();
                display.hide_canvas();
            }

            let run = {
                let mut map = world.resource_mut::<LevelMap>();
                let run = accepted.run(&mut map);
                if accepted.has_exit_hook {
                    map.exit_rule = ExitRule::Script;
                }
                map.player.can_move = false;
                run
            };
            if let Err(e) = run {
                let error = e.to_string();
                fault(world, level, error.clone(), "level_faulted");
                let report = EvalReport {
                    level,
                    status: EvalStatus::Faulted,
                    reason: Some(error),
                    introduced_commands: Vec::new(),
                    transition_ticket: None,
                };
                world.resource_mut::<LevelLifecycle>().last_eval = Some(report.clone());
                return Ok(report);
            }

            {
                let mut inventory = world.resource_mut::<Inventory>();
                for item in &accepted.introduced_items {
                    inventory.remove_item(item);
                }
            }

            let (ticket, units, unlocked_now, debug) = {
                let mut lifecycle = world.resource_mut::<LevelLifecycle>();
                let changed = lifecycle.unlock(&accepted.introduced_commands);
                let ticket = lifecycle.issue_ticket();
                let units = if is_new_level {
                    lifecycle.new_level_fade_units
                } else {
                    lifecycle.retry_fade_units
                };
                lifecycle.pending_transition = Some(PendingTransition {
                    ticket,
                    level,
                    music: accepted.music_track.clone(),
                });
                lifecycle.phase = LifecyclePhase::TransitioningIn { level, ticket };
                let unlocked_now = changed.then(|| lifecycle.state.unlocked_commands.clone());
                (ticket, units, unlocked_now, lifecycle.debug)
            };
            if let Some(all) = unlocked_now {
                if !debug {
                    world.resource_mut::<ProgressStore>().save_help_commands(&all);
                }
                world.resource_mut::<LevelEventLog>().emit(
                    "commands_unlocked",
                    Some(level),
                    serde_json::json!({ "commands": accepted.introduced_commands }),
                );
            }
            world.resource_mut::<Display>().fade_in(ticket, units);
            world.resource_mut::<LevelEventLog>().emit(
                "level_accepted",
                Some(level),
                serde_json::json!({ "ticket": ticket, "new_level": is_new_level }),
            );
            info!("[Cellblock levels] Level {level} accepted");
            EvalReport {
                level,
                status: EvalStatus::Accepted,
                reason: None,
                introduced_commands: accepted.introduced_commands.clone(),
                transition_ticket: Some(ticket),
            }
        }
    };
    world.resource_mut::<LevelLifecycle>().last_eval = Some(report.clone());
    Ok(report)
}

fn reject(world: &mut World, level: u32, reason: RejectReason) -> EvalReport {
    world.resource_mut::<AudioManager>().play_sfx(CUE_STATIC);
    world.resource_mut::<LevelMap>().player.can_move = false;
    {
        let mut lifecycle = world.resource_mut::<LevelLifecycle>();
        lifecycle.pending_transition = None;
        lifecycle.phase = LifecyclePhase::Rejected { level };
    }
    world.resource_mut::<LevelEventLog>().emit(
        "level_rejected",
        Some(level),
        serde_json::json!({ "reason": reason }),
    );
    warn!("[Cellblock levels] Level {level} rejected: {reason}");
    EvalReport {
        level,
        status: EvalStatus::Rejected,
        reason: Some(reason.to_string()),
        introduced_commands: Vec::new(),
        transition_ticket: None,
    }
}

fn fault(world: &mut World, level: u32, error: String, event: &str) {
    world.resource_mut::<LevelMap>().player.can_move = false;
    {
        let mut lifecycle = world.resource_mut::<LevelLifecycle>();
        lifecycle.pending_transition = None;
        lifecycle.phase = LifecyclePhase::Faulted {
            level,
            error: error.clone(),
        };
    }
    error!("[Cellblock levels] Level {level} faulted: {error}");
    world.resource_mut::<LevelEventLog>().emit(
        event,
        Some(level),
        serde_json::json!({ "error": error }),
    );
}

/// Finishes the fade-in identified by `ticket`: reveal, music, then movement.
pub fn complete_transition(world: &mut World, ticket: u64) {
    let pending = {
        let mut lifecycle = world.resource_mut::<LevelLifecycle>();
        match lifecycle.pending_transition.take() {
            Some(pending) if pending.ticket == ticket => {
                lifecycle.phase = LifecyclePhase::PlayReady {
                    level: pending.level,
                };
                pending
            }
            other => {
                lifecycle.pending_transition = other;
                debug!("[Cellblock levels] Discarding stale transition {ticket}");
                return;
            }
        }
    };
    world.resource_mut::<Inventory>().mark_drawn();
    world.resource_mut::<Display>().show_canvas();
    {
        let mut audio = world.resource_mut::<AudioManager>();
        match pending.music.as_deref() {
            Some(track) => audio.play_track_by_name(pending.level, track),
            None => audio.play_track_by_num(pending.level),
        }
    }
    world.resource_mut::<LevelMap>().player.can_move = true;
    world.resource_mut::<Display>().focus();
    world.resource_mut::<LevelEventLog>().emit(
        "transition_complete",
        Some(pending.level),
        serde_json::json!({ "ticket": ticket }),
    );
}

/// Snaps the editor back to the last accepted code and evaluates it again.
pub fn restart_level(world: &mut World) -> Result<EvalReport, LevelError> {
    let (last_good, current) = {
        let lifecycle = world.resource::<LevelLifecycle>();
        if lifecycle.pending_load.is_some() {
            return Err(LevelError::LoadInFlight);
        }
        if lifecycle.state.last_good_source.is_empty() {
            return Err(LevelError::NoLevelLoaded);
        }
        (
            lifecycle.state.last_good_source.clone(),
            lifecycle.state.current_level,
        )
    };
    if world.resource::<CodeEditor>().level() != Some(current) {
        return Err(LevelError::EditorMismatch { current });
    }
    world.resource_mut::<CodeEditor>().set_code(&last_good)?;
    eval_level_code(world, None, false)
}

/// Whether the current map lets the player leave.
pub fn exit_permitted(world: &World) -> bool {
    let map = world.resource::<LevelMap>();
    let inventory = world.resource::<Inventory>();
    if let Some(permitted) = map.exit_permitted_by_rule(inventory) {
        return permitted;
    }
    let source = &world.resource::<LevelLifecycle>().state.staged_source;
    match world
        .resource::<ValidationEngine>()
        .exit_permitted(source, map, inventory.items())
    {
        Ok(permitted) => permitted,
        Err(e) => {
            warn!("[Cellblock levels] Exit check failed: {e}");
            false
        }
    }
}

/// Leaves the current level. Only a level that finished its fade-in and is
/// being played can be left.
pub fn move_to_next_level(world: &mut World) -> Result<ExitOutcome, LevelError> {
    let current = {
        let lifecycle = world.resource::<LevelLifecycle>();
        if lifecycle.state.staged_source.is_empty() {
            return Err(LevelError::NoLevelLoaded);
        }
        let current = lifecycle.state.current_level;
        if lifecycle.phase != (LifecyclePhase::PlayReady { level: current }) {
            return Err(LevelError::NotReady { level: current });
        }
        current
    };
    if !exit_permitted(world) {
        world.resource_mut::<AudioManager>().play_sfx(CUE_BLIP);
        world
            .resource_mut::<LevelEventLog>()
            .emit("exit_denied", Some(current), serde_json::Value::Null);
        return Ok(ExitOutcome::Denied);
    }
    let next = current + 1;
    if !world.resource::<LevelCatalog>().contains(next) {
        info!("[Cellblock levels] Level {current} is the last level");
        return Ok(ExitOutcome::FinalLevel);
    }
    world.resource_mut::<AudioManager>().play_sfx(CUE_COMPLETE);
    world.resource_mut::<LevelMap>().player.can_move = false;
    world
        .resource_mut::<LevelEventLog>()
        .emit("level_complete", Some(current), serde_json::Value::Null);
    let ticket = get_level(world, next)?;
    Ok(ExitOutcome::Advanced {
        level: next,
        ticket,
    })
}

/// Goes straight to `level`, carrying the items earlier levels would have
/// granted. Skips the exit check.
pub fn jump_to_nth_level(world: &mut World, level: u32) -> Result<u64, LevelError> {
    let items = {
        let catalog = world.resource::<LevelCatalog>();
        if !catalog.contains(level) {
            return Err(LevelError::UnknownLevel(level));
        }
        catalog.items_before(level)
    };
    world.resource_mut::<Inventory>().set_items(items);
    let ticket = get_level(world, level)?;
    world.resource_mut::<Display>().focus();
    Ok(ticket)
}

/// `jump_to_nth_level` for players: levels past the furthest reached stay
/// closed outside debug sessions.
pub fn jump_if_reached(world: &mut World, level: u32) -> Result<u64, LevelError> {
    let (reached, debug) = {
        let lifecycle = world.resource::<LevelLifecycle>();
        (lifecycle.state.level_reached, lifecycle.debug)
    };
    if !debug && level > reached {
        return Err(LevelError::LevelLocked { level, reached });
    }
    jump_to_nth_level(world, level)
}
