use super::*;
use crate::events::LevelEvent;
use crate::lifecycle::{EvalReport, ExitOutcome};
use crate::map::MoveOutcome;
use crate::scripting::commands::CommandHelp;
use axum::extract::Query;

/// Hands a command to the game loop and waits for its reply.
async fn ask<T>(
    state: &AppState,
    make: impl FnOnce(tokio::sync::oneshot::Sender<T>) -> ApiCommand,
) -> Result<T, String> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    state
        .sender
        .send(make(tx))
        .map_err(|_| "Game loop is not running".to_string())?;
    rx.await.map_err(|_| "Channel closed".to_string())
}

async fn ask_fallible<T>(
    state: &AppState,
    make: impl FnOnce(tokio::sync::oneshot::Sender<Result<T, String>>) -> ApiCommand,
) -> Result<T, String> {
    ask(state, make).await?
}

pub(super) async fn get_state(State(state): State<AppState>) -> Json<ApiResponse<GameSnapshot>> {
    Json(ApiResponse::from_result(ask(&state, ApiCommand::GetState).await))
}

pub(super) async fn start_game(State(state): State<AppState>) -> Json<ApiResponse<u64>> {
    Json(ApiResponse::from_result(
        ask_fallible(&state, ApiCommand::Start).await,
    ))
}

pub(super) async fn next_level(State(state): State<AppState>) -> Json<ApiResponse<ExitOutcome>> {
    Json(ApiResponse::from_result(
        ask_fallible(&state, ApiCommand::Next).await,
    ))
}

pub(super) async fn restart(State(state): State<AppState>) -> Json<ApiResponse<EvalReport>> {
    Json(ApiResponse::from_result(
        ask_fallible(&state, ApiCommand::Restart).await,
    ))
}

pub(super) async fn jump(
    State(state): State<AppState>,
    Json(req): Json<JumpRequest>,
) -> Json<ApiResponse<u64>> {
    Json(ApiResponse::from_result(
        ask_fallible(&state, |tx| ApiCommand::Jump(req.level, tx)).await,
    ))
}

pub(super) async fn get_code(State(state): State<AppState>) -> Json<ApiResponse<CodeView>> {
    Json(ApiResponse::from_result(ask(&state, ApiCommand::GetCode).await))
}

pub(super) async fn set_code(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> Json<ApiResponse<EvalReport>> {
    Json(ApiResponse::from_result(
        ask_fallible(&state, |tx| ApiCommand::SetCode(req.code, tx)).await,
    ))
}

pub(super) async fn execute_code(State(state): State<AppState>) -> Json<ApiResponse<EvalReport>> {
    Json(ApiResponse::from_result(
        ask_fallible(&state, ApiCommand::Execute).await,
    ))
}

pub(super) async fn get_commands(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<CommandHelp>>> {
    Json(ApiResponse::from_result(
        ask(&state, ApiCommand::GetCommands).await,
    ))
}

pub(super) async fn move_player(
    State(state): State<AppState>,
    Json(req): Json<MoveRequest>,
) -> Json<ApiResponse<MoveOutcome>> {
    Json(ApiResponse::from_result(
        ask(&state, |tx| ApiCommand::MovePlayer(req.dx, req.dy, tx)).await,
    ))
}

pub(super) async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<ApiResponse<Vec<LevelEvent>>> {
    Json(ApiResponse::from_result(
        ask(&state, |tx| ApiCommand::GetEvents(query.since, tx)).await,
    ))
}
