#![cfg_attr(target_arch = "wasm32", allow(dead_code))]

#[cfg(not(target_arch = "wasm32"))]
mod api;
mod audio;
mod catalog;
mod config;
mod display;
mod editor;
mod error;
mod events;
mod input;
mod inventory;
mod lifecycle;
mod loader;
mod map;
mod progress;
mod render;
mod scripting;

use bevy::prelude::*;
use config::{GameConfig, HeadlessMode};

fn progress_store(config: &GameConfig) -> progress::ProgressStore {
    #[cfg(target_arch = "wasm32")]
    {
        let _ = config;
        progress::ProgressStore::memory()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        progress::ProgressStore::file(&config.progress_path)
    }
}

/// Opens the first level once every collaborator is in place.
fn begin_session(world: &mut World) {
    if let Err(e) = lifecycle::start(world) {
        error!("[Cellblock] Could not start: {e}");
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let headless = args.iter().any(|a| a == "--headless");
    let config = config::load_game_config(&args);

    let mut app = App::new();
    app.insert_resource(HeadlessMode(headless));

    if headless {
        // Headless mode: no window, no rendering, just ECS + API
        app.add_plugins((MinimalPlugins, bevy::log::LogPlugin::default()));
        info!("[Cellblock] Starting in HEADLESS mode");
    } else {
        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: config.window_title.clone(),
                resolution: (config.window_width, config.window_height).into(),
                present_mode: bevy::window::PresentMode::AutoVsync,
                ..default()
            }),
            ..default()
        }));
        app.insert_resource(ClearColor(Color::srgb(0.05, 0.05, 0.05)));
        info!("[Cellblock] Starting in WINDOWED mode");
    }

    let catalog = catalog::LevelCatalog::from_config(&config);
    let progress = progress_store(&config);
    let lifecycle = lifecycle::LevelLifecycle::new(progress.load(), &config, &catalog);
    if config.debug_mode {
        info!("[Cellblock] Debug mode: all levels and commands unlocked");
    }

    let items = inventory::ItemRegistry::default();
    app.insert_resource(loader::ContentLoader::from_config(&config))
        .insert_resource(scripting::ValidationEngine::from_config(&config))
        .insert_resource(audio::AudioManager::from_config(&config))
        .insert_resource(
            map::LevelMap::new(config.map_width, config.map_height).with_items(items.clone()),
        )
        .insert_resource(items)
        .init_resource::<editor::CodeEditor>()
        .insert_resource(catalog)
        .insert_resource(progress)
        .insert_resource(lifecycle)
        .insert_resource(config)
        .add_plugins((
            events::LevelEventsPlugin,
            inventory::InventoryPlugin,
            display::DisplayPlugin,
            audio::AudioPlugin,
            lifecycle::LifecyclePlugin,
            input::InputPlugin,
            render::RenderPlugin,
        ))
        .add_systems(Startup, begin_session);

    #[cfg(not(target_arch = "wasm32"))]
    app.add_plugins(api::ApiPlugin);

    app.run();
}
