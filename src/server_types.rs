#[cfg(feature = "server")]
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::error::MoveError;
use crate::session::{GameId, SessionSnapshot};

/// Start a new game.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewGameRequest {
    /// The game this one supersedes. It is discarded.
    #[serde(default)]
    pub replaces: Option<GameId>,
}

/// Play the human's move.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MoveRequest {
    /// The move in short algebraic notation, e.g. `Nf3` or `O-O`.
    pub r#move: String,
}

/// Where a game stands, as seen by the player.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GameStatus {
    #[serde(flatten)]
    pub game: SessionSnapshot,

    /// True exactly once after each oracle move, for whichever request observes it first.
    pub ai_moved: bool,
}

/// The board as a text diagram, oriented towards the player.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BoardView {
    pub board: String,
}

/// Errors relating to a submitted request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ApiRequestError {
    /// No live game has this id. It may have been replaced or evicted.
    UnknownGame,

    /// The rules engine rejected the player's move.
    IllegalMove { notation: String },

    /// The oracle is to move.
    NotPlayerTurn,

    GameOver,
}

impl From<MoveError> for ApiRequestError {
    fn from(err: MoveError) -> Self {
        match err {
            MoveError::Illegal { notation } => ApiRequestError::IllegalMove { notation },
            MoveError::NotPlayerTurn => ApiRequestError::NotPlayerTurn,
            MoveError::GameOver => ApiRequestError::GameOver,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ApiResult<T> {
    RequestError(ApiRequestError),
    Ok(T),
}

impl<T> From<Result<T, MoveError>> for ApiResult<T> {
    fn from(result: Result<T, MoveError>) -> Self {
        match result {
            Ok(value) => ApiResult::Ok(value),
            Err(err) => ApiResult::RequestError(err.into()),
        }
    }
}

#[cfg(feature = "server")]
impl ApiRequestError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiRequestError::UnknownGame => StatusCode::NOT_FOUND,
            ApiRequestError::IllegalMove { .. } => StatusCode::BAD_REQUEST,
            ApiRequestError::NotPlayerTurn | ApiRequestError::GameOver => StatusCode::CONFLICT,
        }
    }
}

#[cfg(feature = "server")]
impl<T> IntoResponse for ApiResult<T>
where
    T: Serialize,
{
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiResult::RequestError(what) => (what.status_code(), Json(what)).into_response(),
            ApiResult::Ok(what) => (StatusCode::OK, Json(what)).into_response(),
        }
    }
}
