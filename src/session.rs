//! One game between a human and the oracle.
//!
//! A [`GameSession`] owns its position exclusively. Mutations (the player's move, applying the
//! oracle's move) go through a single lock, and the oracle is only ever consulted on a snapshot, so
//! status queries never wait on a slow oracle call.
//!
//! Turn ownership:
//!
//! ```text
//!            player moves                 maybe_start_ai_turn
//! PlayerTurn ------------> AiPending ---------------------------> AiComputing
//!     ^                        ^                                      |
//!     |                        +-------- negotiation failed ----------+
//!     +------------------- oracle move applied ----------------------+
//! ```
//!
//! Any transition can instead land in `GameOver`, which is terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Color};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{MoveError, NegotiationError};
use crate::negotiation::Negotiator;
use crate::rules::{side_name, Game, GameOutcome, PlayedMove};

pub type GameId = Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// The human is to move.
    PlayerTurn,
    /// The oracle is to move, and nobody has asked it yet.
    AiPending,
    /// An oracle negotiation is running for this session.
    AiComputing,
    GameOver,
}

/// Single-slot mailbox announcing that the oracle just moved.
///
/// Posting twice before anyone looks is the same as posting once, and only one
/// reader ever sees a given post.
#[derive(Debug, Default)]
pub struct Notification {
    posted: AtomicBool,
}

impl Notification {
    pub fn post(&self) {
        self.posted.store(true, Ordering::Release);
    }

    /// Read and clear in one step.
    pub fn take(&self) -> bool {
        self.posted.swap(false, Ordering::AcqRel)
    }
}

/// Clears the in-flight flag when the computation ends, however it ends.
struct Computing<'a>(&'a AtomicBool);

impl Drop for Computing<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything a client needs to show the game.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionSnapshot {
    pub id: GameId,
    #[serde(with = "crate::chess_serde::color_serde")]
    pub player: Color,
    pub state: TurnState,
    #[serde(with = "crate::chess_serde::position_serde")]
    pub position: Chess,
    /// Only filled in when it is the player's turn.
    pub legal_moves: Vec<String>,
    pub history: Vec<PlayedMove>,
    pub result: Option<GameOutcome>,
}

pub struct GameSession {
    id: GameId,
    player: Color,
    game: Mutex<Game>,
    computing: AtomicBool,
    ai_moved: Notification,
    negotiator: Arc<Negotiator>,
    last_active: StdMutex<Instant>,
}

impl GameSession {
    pub fn new(id: GameId, player: Color, negotiator: Arc<Negotiator>) -> Self {
        Self {
            id,
            player,
            game: Mutex::new(Game::new()),
            computing: AtomicBool::new(false),
            ai_moved: Notification::default(),
            negotiator,
            last_active: StdMutex::new(Instant::now()),
        }
    }

    /// A fresh game whose id and player side are drawn from `rng`.
    pub fn with_random_side<R: Rng>(rng: &mut R, negotiator: Arc<Negotiator>) -> Self {
        let id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        let player = if rng.gen_bool(0.5) {
            Color::White
        } else {
            Color::Black
        };
        info!(game = %id, player = side_name(player), "new game");
        Self::new(id, player, negotiator)
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn player_side(&self) -> Color {
        self.player
    }

    pub fn is_computing(&self) -> bool {
        self.computing.load(Ordering::Acquire)
    }

    /// Whether an oracle move has landed since the last call. Only one caller sees each move.
    pub fn consume_notification(&self) -> bool {
        self.ai_moved.take()
    }

    /// How long since anyone last touched this session.
    pub fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .map(|at| at.elapsed())
            .unwrap_or_default()
    }

    fn touch(&self) {
        if let Ok(mut at) = self.last_active.lock() {
            *at = Instant::now();
        }
    }

    fn state_of(&self, game: &Game) -> TurnState {
        if game.is_over() {
            TurnState::GameOver
        } else if game.side_to_move() == self.player {
            TurnState::PlayerTurn
        } else if self.is_computing() {
            TurnState::AiComputing
        } else {
            TurnState::AiPending
        }
    }

    pub async fn state(&self) -> TurnState {
        let game = self.game.lock().await;
        self.state_of(&game)
    }

    pub async fn is_player_turn(&self) -> bool {
        self.game.lock().await.side_to_move() == self.player
    }

    pub async fn is_over(&self) -> bool {
        self.game.lock().await.is_over()
    }

    /// `None` until the game is over.
    pub async fn result(&self) -> Option<GameOutcome> {
        self.game.lock().await.outcome()
    }

    /// The board diagram, from the player's side.
    pub async fn render_position(&self) -> String {
        self.game.lock().await.render(self.player)
    }

    pub async fn status(&self) -> SessionSnapshot {
        self.touch();
        let game = self.game.lock().await;
        let state = self.state_of(&game);
        let legal_moves = if state == TurnState::PlayerTurn {
            game.legal_moves().into_iter().map(|m| m.san).collect()
        } else {
            Vec::new()
        };
        SessionSnapshot {
            id: self.id,
            player: self.player,
            state,
            position: game.position().clone(),
            legal_moves,
            history: game.history().to_vec(),
            result: game.outcome(),
        }
    }

    /// Play the human's move.
    ///
    /// Refused, with the position untouched, when the game is over, when it is the oracle's turn,
    /// or when the rules engine rejects the notation.
    pub async fn apply_player_move(&self, notation: &str) -> Result<TurnState, MoveError> {
        self.touch();
        let mut game = self.game.lock().await;
        if game.is_over() {
            return Err(MoveError::GameOver);
        }
        if game.side_to_move() != self.player {
            return Err(MoveError::NotPlayerTurn);
        }
        game.apply_san(notation)?;
        let state = self.state_of(&game);
        info!(game = %self.id, notation, ?state, "player moved");
        Ok(state)
    }

    /// Start the oracle's move in the background if one is due.
    ///
    /// Does nothing and returns `None` when it is the player's turn, the game is over, or a
    /// computation is already running. Of any number of concurrent callers, at most one gets a
    /// handle. Awaiting the handle is optional; failures are logged either way.
    pub async fn maybe_start_ai_turn(
        self: &Arc<Self>,
    ) -> Option<JoinHandle<Result<(), NegotiationError>>> {
        let game = self.game.lock().await;
        if game.is_over() || game.side_to_move() == self.player {
            return None;
        }
        if self
            .computing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let snapshot = game.clone();
        drop(game);

        self.touch();
        info!(game = %self.id, "starting AI turn");
        let session = Arc::clone(self);
        Some(tokio::spawn(async move { session.run_ai_turn(snapshot).await }))
    }

    async fn run_ai_turn(&self, snapshot: Game) -> Result<(), NegotiationError> {
        let computing = Computing(&self.computing);

        let negotiated = match self.negotiator.negotiate(&snapshot).await {
            Ok(negotiated) => negotiated,
            Err(err) => {
                warn!(game = %self.id, error = %err, "AI turn did not complete");
                return Err(err);
            }
        };

        let mut game = self.game.lock().await;
        if game.history().len() != snapshot.history().len() {
            return Err(NegotiationError::StalePosition {
                san: negotiated.san,
            });
        }
        if game.apply_move(&negotiated.mv).is_err() {
            return Err(NegotiationError::StalePosition {
                san: negotiated.san,
            });
        }
        self.ai_moved.post();
        drop(computing);
        info!(
            game = %self.id,
            san = %negotiated.san,
            attempts = negotiated.attempts,
            state = ?self.state_of(&game),
            "AI moved"
        );
        drop(game);
        self.touch();
        Ok(())
    }
}
