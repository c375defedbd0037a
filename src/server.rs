use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::debug;

use crate::{
    registry::GameRegistry,
    server_types::{ApiRequestError, ApiResult, BoardView, GameStatus, MoveRequest, NewGameRequest},
    session::{GameId, GameSession, TurnState},
};

pub fn serve_games(registry: Arc<GameRegistry>) -> Router {
    Router::new()
        .route("/games", post(new_game))
        .route("/games/:id", get(get_status))
        .route("/games/:id/moves", post(play_move))
        .route("/games/:id/board", get(render_board))
        .with_state(registry)
}

async fn new_game(
    State(registry): State<Arc<GameRegistry>>,
    request: Option<Json<NewGameRequest>>,
) -> ApiResult<GameStatus> {
    let replaces = request.and_then(|Json(r)| r.replaces);
    let session = registry.renew(replaces);
    // The oracle may have the first move.
    kick_ai_turn(&session).await;
    ApiResult::Ok(status_of(&session).await)
}

async fn get_status(
    State(registry): State<Arc<GameRegistry>>,
    Path(id): Path<GameId>,
) -> ApiResult<GameStatus> {
    let Some(session) = registry.get(&id) else {
        return ApiResult::RequestError(ApiRequestError::UnknownGame);
    };
    kick_ai_turn(&session).await;
    ApiResult::Ok(status_of(&session).await)
}

async fn play_move(
    State(registry): State<Arc<GameRegistry>>,
    Path(id): Path<GameId>,
    Json(request): Json<MoveRequest>,
) -> ApiResult<GameStatus> {
    let Some(session) = registry.get(&id) else {
        return ApiResult::RequestError(ApiRequestError::UnknownGame);
    };
    let played = match session.apply_player_move(&request.r#move).await {
        Ok(_) => {
            kick_ai_turn(&session).await;
            Ok(status_of(&session).await)
        }
        Err(why) => {
            debug!(game = %id, error = %why, "player move refused");
            Err(why)
        }
    };
    played.into()
}

async fn render_board(
    State(registry): State<Arc<GameRegistry>>,
    Path(id): Path<GameId>,
) -> ApiResult<BoardView> {
    match registry.get(&id) {
        Some(session) => ApiResult::Ok(BoardView {
            board: session.render_position().await,
        }),
        None => ApiResult::RequestError(ApiRequestError::UnknownGame),
    }
}

/// Start the oracle's move if it is due. The computation outlives the request.
async fn kick_ai_turn(session: &Arc<GameSession>) {
    if session.state().await == TurnState::AiPending {
        // Dropping the handle detaches the task; it logs its own failures.
        drop(session.maybe_start_ai_turn().await);
    }
}

async fn status_of(session: &GameSession) -> GameStatus {
    // Notification before snapshot: a move landing in between is still in the
    // snapshot, and gets announced on the next poll.
    let ai_moved = session.consume_notification();
    GameStatus {
        game: session.status().await,
        ai_moved,
    }
}
