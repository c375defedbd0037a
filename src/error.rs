use std::time::Duration;

use thiserror::Error;

/// Why a move submitted by the human player was refused.
///
/// In every case the position is left exactly as it was.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoveError {
    /// The rules engine could not parse the notation, or the move it names is not legal here.
    #[error("`{notation}` is not a legal move in this position")]
    Illegal { notation: String },

    /// The AI is to move; the player has to wait for it.
    #[error("it is not the player's turn")]
    NotPlayerTurn,

    #[error("the game is already over")]
    GameOver,
}

/// Failures of the text-generation service itself, as opposed to bad answers from it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The request never produced an HTTP response (connection, DNS, TLS...).
    #[error("oracle transport failure: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered, but the envelope did not contain a reply.
    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),

    /// No reply arrived within the per-call deadline.
    #[error("oracle did not answer within {0:?}")]
    Timeout(Duration),
}

impl OracleError {
    /// Whether trying the same request again may help.
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::Transport(_) | OracleError::Timeout(_) => true,
            OracleError::Status { status, .. } => *status == 429 || *status >= 500,
            OracleError::MalformedResponse(_) => false,
        }
    }
}

/// Terminal outcome of a negotiation that did not produce a move.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Every round got an answer, and none of them named a legal move.
    #[error("oracle failed to provide a valid move after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The oracle could not be reached, even after retrying.
    #[error(transparent)]
    Transport(#[from] OracleError),

    /// Negotiation was requested for a position with nothing to play.
    #[error("position has no legal moves")]
    NoLegalMoves,

    /// The position moved on while the oracle was thinking.
    #[error("negotiated move `{san}` no longer applies to the position")]
    StalePosition { san: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is not set")]
    MissingVar(&'static str),

    #[error("environment variable `{name}` has an invalid value: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}
