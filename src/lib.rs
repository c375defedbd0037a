pub mod chess_serde;
pub mod config;
pub mod error;
pub mod negotiation;
pub mod openai;
pub mod registry;
pub mod rules;
pub mod scripted;
#[cfg(feature = "server")]
pub mod server;
pub mod server_types;
pub mod session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{ConfigError, MoveError, NegotiationError, OracleError};
pub use negotiation::{Negotiated, Negotiator};
pub use registry::GameRegistry;
pub use session::{GameId, GameSession, TurnState};
pub use shakmaty;

/// Who wrote a message in an oracle conversation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of an oracle conversation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The trait that defines a move oracle.
///
/// An oracle is a text-generation service: it is given a conversation and answers with free text.
/// It knows nothing about chess legality, and nothing it says is trusted.
/// The [`Negotiator`] is what turns its answers into legal moves.
///
/// The conversation passed to [`Oracle::complete`] always starts with a single
/// [`Role::System`] message, followed by alternating [`Role::User`] and
/// [`Role::Assistant`] messages, ending with a user message.
///
/// ## Failure
/// An oracle should only return an error when it could not produce an answer at all
/// (network trouble, authentication, a malformed response envelope).
/// An answer that makes no sense is still an `Ok`; judging it is the negotiator's job.
///
/// ## Latency
/// Calls may take a long time. Implementations must not block the executor while waiting;
/// the negotiator may additionally wrap each call in a timeout.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Produce the next assistant reply for `conversation`.
    async fn complete(&self, conversation: &[Message]) -> Result<String, OracleError>;
}
