mod commands;
mod router;
mod routes;
mod security;
pub mod types;

use axum::{
    extract::Request,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bevy::prelude::*;
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::GameConfig;
use crate::lifecycle::LifecycleSet;
pub use commands::{ApiChannels, ApiCommand};
use commands::process_api_commands;
use router::build_router;
use routes::*;
use security::*;
use types::*;

/// Local HTTP control surface. Handlers never touch the world; they queue an
/// `ApiCommand` and await the reply sent from `process_api_commands`.
pub struct ApiPlugin;

impl Plugin for ApiPlugin {
    fn build(&self, app: &mut App) {
        let (tx, rx) = crossbeam_channel::unbounded::<ApiCommand>();
        app.insert_resource(ApiChannels { receiver: rx })
            .add_systems(Update, process_api_commands.before(LifecycleSet::Requests));

        let addr = app
            .world()
            .get_resource::<GameConfig>()
            .map(|c| c.api_addr.clone())
            .unwrap_or_else(|| GameConfig::default().api_addr);
        let state = AppState { sender: tx };
        let security = ApiSecurity::from_env();
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("[Cellblock API] Failed to start runtime: {e}");
                    return;
                }
            };
            rt.block_on(async {
                let app = build_router(state, security);
                let listener = match tokio::net::TcpListener::bind(&addr).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        error!("[Cellblock API] Failed to bind {addr}: {e}");
                        return;
                    }
                };
                info!("[Cellblock API] Listening on http://{addr}");
                if let Err(e) = axum::serve(listener, app).await {
                    error!("[Cellblock API] Server stopped: {e}");
                }
            });
        });
    }
}

#[derive(Clone)]
pub(super) struct AppState {
    pub(super) sender: Sender<ApiCommand>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioManager, AudioPlugin};
    use crate::catalog::LevelCatalog;
    use crate::config::FetchMode;
    use crate::display::DisplayPlugin;
    use crate::editor::CodeEditor;
    use crate::error::LevelError;
    use crate::events::LevelEventsPlugin;
    use crate::inventory::{InventoryPlugin, ItemRegistry};
    use crate::lifecycle::{
        EvalReport, EvalStatus, ExitOutcome, LevelLifecycle, LifecyclePhase, LifecyclePlugin,
    };
    use crate::loader::{ContentLoader, EmbeddedLevelSource};
    use crate::map::{LevelMap, MoveOutcome};
    use crate::progress::ProgressStore;
    use crate::scripting::ValidationEngine;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::util::ServiceExt;

    const FIRST: &str = r#"#BEGIN_PROPERTIES#
{ "commandsIntroduced": ["map.place_object"] }
#END_PROPERTIES#
fn start_level(map) {
    map.place_player(0, 0);
    // #BEGIN_EDITABLE#
    map.place_object(4, 4, "block");
    // #END_EDITABLE#
    map.place_object(1, 0, "exit");
}
"#;

    const SECOND: &str = "fn start_level(map) { map.place_player(2, 2); }\n";

    fn runtime_app(receiver: Receiver<ApiCommand>) -> App {
        let config = GameConfig {
            levels: vec!["1.rhai".to_string(), "2.rhai".to_string()],
            new_level_fade_units: 2,
            retry_fade_units: 1,
            fetch_mode: FetchMode::Inline,
            ..GameConfig::default()
        };
        let sources = HashMap::from([
            ("1.rhai".to_string(), FIRST.to_string()),
            ("2.rhai".to_string(), SECOND.to_string()),
        ]);
        let catalog = LevelCatalog::from_config(&config);
        let progress = ProgressStore::memory();
        let lifecycle = LevelLifecycle::new(progress.load(), &config, &catalog);

        let mut app = App::new();
        app.add_plugins((
            LevelEventsPlugin,
            InventoryPlugin,
            DisplayPlugin,
            AudioPlugin,
            LifecyclePlugin,
        ))
        .insert_resource(ApiChannels { receiver })
        .insert_resource(ContentLoader::new(
            Arc::new(EmbeddedLevelSource::new(sources)),
            FetchMode::Inline,
        ))
        .insert_resource(ValidationEngine::from_config(&config))
        .insert_resource(AudioManager::from_config(&config))
        .insert_resource(
            LevelMap::new(config.map_width, config.map_height).with_items(ItemRegistry::default()),
        )
        .insert_resource(catalog)
        .insert_resource(progress)
        .insert_resource(lifecycle)
        .init_resource::<CodeEditor>()
        .add_systems(Update, process_api_commands.before(LifecycleSet::Requests));
        app
    }

    fn settle(app: &mut App) {
        for _ in 0..6 {
            app.update();
        }
    }

    fn send<T>(
        app: &mut App,
        sender: &Sender<ApiCommand>,
        make: impl FnOnce(tokio::sync::oneshot::Sender<T>) -> ApiCommand,
    ) -> T {
        let (tx, rx) = tokio::sync::oneshot::channel();
        sender.send(make(tx)).expect("send command");
        app.update();
        rx.blocking_recv().expect("reply")
    }

    #[test]
    fn start_then_state_reports_ready_level() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut app = runtime_app(receiver);

        let ticket = send(&mut app, &sender, ApiCommand::Start).expect("start");
        assert!(ticket > 0);
        settle(&mut app);

        let state = send(&mut app, &sender, ApiCommand::GetState);
        assert_eq!(state.phase, LifecyclePhase::PlayReady { level: 1 });
        assert_eq!(state.level.current_level, 1);
        assert!(state.map.player.can_move);
        assert!(state.level.unlocked_commands.contains(&"map.place_object".to_string()));
    }

    #[test]
    fn submitted_code_is_validated_and_scaffolding_is_protected() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut app = runtime_app(receiver);
        send(&mut app, &sender, ApiCommand::Start).expect("start");
        settle(&mut app);

        let code = send(&mut app, &sender, ApiCommand::GetCode);
        assert_eq!(code.level, Some(1));
        assert!(code.player_code.contains("place_object(4, 4"));

        let edited = code.code.replace("place_object(4, 4", "place_object(5, 5");
        let report: EvalReport =
            send(&mut app, &sender, |tx| ApiCommand::SetCode(edited, tx)).expect("accepted");
        assert_eq!(report.status, EvalStatus::Accepted);

        let tampered = code.code.replace("place_object(1, 0, \"exit\")", "");
        let err = send(&mut app, &sender, |tx| ApiCommand::SetCode(tampered, tx));
        assert!(err.is_err());
    }

    #[test]
    fn walking_onto_the_exit_advances() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut app = runtime_app(receiver);
        send(&mut app, &sender, ApiCommand::Start).expect("start");
        settle(&mut app);

        let outcome = send(&mut app, &sender, |tx| ApiCommand::MovePlayer(1, 0, tx));
        assert_eq!(outcome, MoveOutcome::ReachedExit);
        settle(&mut app);

        let state = send(&mut app, &sender, ApiCommand::GetState);
        assert_eq!(state.level.current_level, 2);
        assert_eq!(state.level.level_reached, 2);

        let events = send(&mut app, &sender, |tx| ApiCommand::GetEvents(0, tx));
        assert!(events.iter().any(|e| e.name == "level_complete"));

        let next = send(&mut app, &sender, ApiCommand::Next).expect("exit checked");
        assert_eq!(next, ExitOutcome::FinalLevel);
    }

    #[test]
    fn execute_in_the_same_frame_as_start_is_refused() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut app = runtime_app(receiver);
        let (start_tx, start_rx) = tokio::sync::oneshot::channel();
        let (exec_tx, exec_rx) = tokio::sync::oneshot::channel();
        sender.send(ApiCommand::Start(start_tx)).expect("send start");
        sender.send(ApiCommand::Execute(exec_tx)).expect("send execute");
        app.update();

        assert!(start_rx.blocking_recv().expect("reply").is_ok());
        let refused = exec_rx.blocking_recv().expect("reply");
        assert_eq!(refused.err(), Some(LevelError::LoadInFlight.to_string()));

        settle(&mut app);
        let report = send(&mut app, &sender, ApiCommand::Execute).expect("level 1 is loaded");
        assert_eq!(report.status, EvalStatus::Accepted);
    }

    #[test]
    fn locked_jump_reports_error() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut app = runtime_app(receiver);
        let result = send(&mut app, &sender, |tx| ApiCommand::Jump(2, tx));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn route_reports_closed_game_loop() {
        let (sender, receiver) = crossbeam_channel::unbounded::<ApiCommand>();
        drop(receiver);
        let security = ApiSecurity {
            required_token: None,
            limiter: RateLimiter::new(100),
        };
        let app = build_router(AppState { sender }, security);
        let req = HttpRequest::builder()
            .uri("/state")
            .body(Body::empty())
            .expect("request");
        let res = app.oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().is_some());
    }
}
