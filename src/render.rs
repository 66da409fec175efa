use bevy::prelude::*;

use crate::config::HeadlessMode;
use crate::display::{Display, DisplaySet};
use crate::inventory::{Inventory, ItemRegistry};
use crate::map::LevelMap;

pub struct RenderPlugin;

impl Plugin for RenderPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_play_field)
            .add_systems(
                Update,
                (sync_play_field, sync_inventory_panel, sync_fade_overlay)
                    .after(DisplaySet::Fades),
            );
    }
}

#[derive(Component)]
struct GridText;

#[derive(Component)]
struct StatusText;

#[derive(Component)]
struct InventoryText;

#[derive(Component)]
struct FadeOverlay;

fn spawn_play_field(mut commands: Commands, headless: Res<HeadlessMode>) {
    if headless.0 {
        return;
    }
    commands.spawn(Camera2d);
    commands
        .spawn(Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            flex_direction: FlexDirection::Column,
            padding: UiRect::all(Val::Px(8.0)),
            ..default()
        })
        .with_children(|root| {
            root.spawn((
                StatusText,
                Text::new(""),
                TextFont {
                    font_size: 16.0,
                    ..default()
                },
                TextColor(Color::srgb(0.8, 0.8, 0.6)),
            ));
            root.spawn((
                GridText,
                Text::new(""),
                TextFont {
                    font_size: 14.0,
                    ..default()
                },
                TextColor(Color::srgb(0.7, 0.9, 0.7)),
            ));
            root.spawn((
                InventoryText,
                Text::new(""),
                TextFont {
                    font_size: 16.0,
                    ..default()
                },
                TextColor(Color::WHITE),
            ));
        });
    commands.spawn((
        FadeOverlay,
        Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            position_type: PositionType::Absolute,
            ..default()
        },
        BackgroundColor(Color::srgba(0.0, 0.0, 0.0, 0.0)),
        GlobalZIndex(100),
        PickingBehavior::IGNORE,
    ));
}

fn sync_play_field(
    map: Res<LevelMap>,
    display: Res<Display>,
    mut grid_q: Query<(&mut Text, &mut Visibility), (With<GridText>, Without<StatusText>)>,
    mut status_q: Query<&mut Text, (With<StatusText>, Without<GridText>)>,
) {
    if !map.is_changed() && !display.is_changed() {
        return;
    }
    if let Ok((mut text, mut visibility)) = grid_q.get_single_mut() {
        *visibility = if display.canvas_visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
        text.0 = map.render_rows().join("\n");
    }
    if let Ok(mut text) = status_q.get_single_mut() {
        let chapter = map.chapter.as_deref().unwrap_or("");
        let status = map.status.as_deref().unwrap_or("");
        text.0 = format!("{chapter}\n{status}");
    }
}

fn sync_inventory_panel(
    inventory: Res<Inventory>,
    registry: Res<ItemRegistry>,
    mut shown_revision: Local<Option<u64>>,
    mut text_q: Query<&mut Text, With<InventoryText>>,
) {
    // The lifecycle decides when the panel is refreshed.
    if inventory.needs_redraw() || *shown_revision == Some(inventory.revision()) {
        return;
    }
    let Ok(mut text) = text_q.get_single_mut() else {
        return;
    };
    let names: Vec<&str> = inventory
        .items()
        .iter()
        .map(|id| {
            registry
                .items
                .get(id)
                .map(|d| d.name.as_str())
                .unwrap_or(id.as_str())
        })
        .collect();
    text.0 = format!("Inventory: {}", names.join(", "));
    *shown_revision = Some(inventory.revision());
}

fn sync_fade_overlay(
    display: Res<Display>,
    mut overlay_q: Query<&mut BackgroundColor, With<FadeOverlay>>,
) {
    let Ok(mut color) = overlay_q.get_single_mut() else {
        return;
    };
    color.0 = Color::srgba(0.0, 0.0, 0.0, display.overlay_alpha);
}
