use std::collections::VecDeque;

use bevy::prelude::*;

use super::{
    complete_load, complete_transition, eval_level_code, jump_if_reached, move_to_next_level,
    restart_level, start,
};
use crate::audio::{AudioManager, CUE_PICKUP};
use crate::display::Display;
use crate::events::LevelEventLog;
use crate::inventory::Inventory;
use crate::loader::ContentLoader;
use crate::map::{LevelMap, MoveOutcome};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleRequest {
    Start,
    Advance,
    Restart,
    Execute,
    Jump(u32),
    Move { dx: i32, dy: i32 },
}

/// Player-originated requests, applied in order once per frame.
#[derive(Resource, Default)]
pub struct LifecycleRequests {
    queue: VecDeque<LifecycleRequest>,
}

impl LifecycleRequests {
    pub fn push(&mut self, request: LifecycleRequest) {
        self.queue.push_back(request);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn take_all(&mut self) -> Vec<LifecycleRequest> {
        self.queue.drain(..).collect()
    }
}

pub(super) fn drain_lifecycle_requests(world: &mut World) {
    let requests = world.resource_mut::<LifecycleRequests>().take_all();
    for request in requests {
        let result = match request {
            LifecycleRequest::Start => start(world).map(|_| ()),
            LifecycleRequest::Advance => move_to_next_level(world).map(|_| ()),
            LifecycleRequest::Restart => restart_level(world).map(|_| ()),
            LifecycleRequest::Execute => eval_level_code(world, None, false).map(|_| ()),
            LifecycleRequest::Jump(level) => jump_if_reached(world, level).map(|_| ()),
            LifecycleRequest::Move { dx, dy } => {
                move_player(world, dx, dy);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("[Cellblock levels] Request failed: {e}");
        }
    }
}

pub(super) fn pump_level_loads(world: &mut World) {
    let completions = world.resource::<ContentLoader>().drain();
    for completion in completions {
        complete_load(world, completion);
    }
}

pub(super) fn finish_transitions(world: &mut World) {
    let tickets = world.resource_mut::<Display>().take_completed();
    for ticket in tickets {
        complete_transition(world, ticket);
    }
}

/// Moves the player one cell. Picking up an item carries it; stepping on the
/// exit asks to leave the level.
pub fn move_player(world: &mut World, dx: i32, dy: i32) -> MoveOutcome {
    let outcome = world.resource_mut::<LevelMap>().try_move_player(dx, dy);
    match &outcome {
        MoveOutcome::PickedUp(item) => {
            {
                let mut inventory = world.resource_mut::<Inventory>();
                inventory.add_item(item);
                inventory.mark_drawn();
            }
            world.resource_mut::<AudioManager>().play_sfx(CUE_PICKUP);
            let level = world
                .resource::<super::LevelLifecycle>()
                .state
                .current_level;
            world.resource_mut::<LevelEventLog>().emit(
                "item_picked_up",
                Some(level),
                serde_json::json!({ "item": item }),
            );
        }
        MoveOutcome::ReachedExit => {
            if let Err(e) = move_to_next_level(world) {
                warn!("[Cellblock levels] Exit failed: {e}");
            }
        }
        MoveOutcome::Frozen | MoveOutcome::Blocked | MoveOutcome::Moved => {}
    }
    outcome
}
