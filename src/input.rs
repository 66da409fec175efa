use bevy::prelude::*;
use std::collections::HashSet;

use crate::display::Display;
use crate::lifecycle::{LifecycleRequest, LifecycleRequests, LifecycleSet};

/// Abstraction layer between raw input and game systems.
/// Both keyboard (windowed) and tests (headless) write to this.
#[derive(Resource, Default, Clone)]
pub struct VirtualInput {
    pub just_pressed: HashSet<String>,
}

impl VirtualInput {
    pub fn just_pressed(&self, action: &str) -> bool {
        self.just_pressed.contains(action)
    }

    pub fn press(&mut self, action: &str) {
        self.just_pressed.insert(action.to_string());
    }
}

pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<VirtualInput>()
            .add_systems(
                PreUpdate,
                keyboard_to_virtual.run_if(resource_exists::<ButtonInput<KeyCode>>),
            )
            .add_systems(
                Update,
                virtual_to_requests.before(LifecycleSet::Requests),
            )
            .add_systems(Last, clear_virtual_input);
    }
}

/// Translate keyboard input to VirtualInput action names
fn keyboard_to_virtual(keyboard: Res<ButtonInput<KeyCode>>, mut vinput: ResMut<VirtualInput>) {
    let bindings: [(&[KeyCode], &str); 7] = [
        (&[KeyCode::ArrowLeft, KeyCode::KeyA], "left"),
        (&[KeyCode::ArrowRight, KeyCode::KeyD], "right"),
        (&[KeyCode::ArrowUp, KeyCode::KeyW], "up"),
        (&[KeyCode::ArrowDown, KeyCode::KeyS], "down"),
        (&[KeyCode::F4], "restart"),
        (&[KeyCode::F5], "execute"),
        (&[KeyCode::Enter], "start"),
    ];
    for (keys, action) in bindings {
        if keyboard.any_just_pressed(keys.iter().copied()) {
            vinput.press(action);
        }
    }
}

/// Movement only reaches the map while the play field has focus.
fn virtual_to_requests(
    vinput: Res<VirtualInput>,
    display: Res<Display>,
    mut requests: ResMut<LifecycleRequests>,
) {
    if display.focused {
        for (action, dx, dy) in [("left", -1, 0), ("right", 1, 0), ("up", 0, -1), ("down", 0, 1)] {
            if vinput.just_pressed(action) {
                requests.push(LifecycleRequest::Move { dx, dy });
            }
        }
    }
    if vinput.just_pressed("restart") {
        requests.push(LifecycleRequest::Restart);
    }
    if vinput.just_pressed("execute") {
        requests.push(LifecycleRequest::Execute);
    }
    if vinput.just_pressed("start") {
        requests.push(LifecycleRequest::Start);
    }
}

fn clear_virtual_input(mut vinput: ResMut<VirtualInput>) {
    vinput.just_pressed.clear();
}
