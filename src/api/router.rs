use super::*;

pub(super) fn build_router(state: AppState, security: ApiSecurity) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/events", get(get_events))
        .route("/commands", get(get_commands))
        .route("/level/start", post(start_game))
        .route("/level/next", post(next_level))
        .route("/level/restart", post(restart))
        .route("/level/jump", post(jump))
        .route("/code", get(get_code).post(set_code))
        .route("/code/execute", post(execute_code))
        .route("/player/move", post(move_player))
        .with_state(state)
        .layer(middleware::from_fn_with_state(security, api_guard))
}
