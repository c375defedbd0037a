//! The rules-engine capability, backed by [`shakmaty`].
//!
//! Nothing in this crate decides chess legality on its own: every question about the
//! position (what can be played, whose turn it is, whether the game is finished) goes
//! through [`Game`], which is a thin layer over [`Chess`] plus the list of moves played.

use std::collections::HashMap;
use std::fmt::Write;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shakmaty::{
    fen::Fen,
    san::SanPlus,
    zobrist::{Zobrist64, ZobristHash},
    Chess, Color, EnPassantMode, File, Move, Outcome, Position, Rank, Square,
};

use crate::error::MoveError;

/// Halfmove clock value at which the game is drawn without any claim (75-move rule).
const AUTOMATIC_DRAW_HALFMOVES: u32 = 150;

/// Occurrences of one position at which the game is drawn without any claim (fivefold
/// repetition).
const AUTOMATIC_DRAW_REPETITIONS: u32 = 5;

/// How a finished game ended.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    White,
    Black,
    Draw,
}

impl GameOutcome {
    pub fn winner(self) -> Option<Color> {
        match self {
            GameOutcome::White => Some(Color::White),
            GameOutcome::Black => Some(Color::Black),
            GameOutcome::Draw => None,
        }
    }

    fn pgn_result(self) -> &'static str {
        match self {
            GameOutcome::White => "1-0",
            GameOutcome::Black => "0-1",
            GameOutcome::Draw => "1/2-1/2",
        }
    }
}

impl From<Outcome> for GameOutcome {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Decisive {
                winner: Color::White,
            } => GameOutcome::White,
            Outcome::Decisive {
                winner: Color::Black,
            } => GameOutcome::Black,
            Outcome::Draw => GameOutcome::Draw,
        }
    }
}

/// A legal move, as the rules engine names it and as it plays it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalMove {
    /// Short algebraic notation including the check or mate suffix, e.g. `Qxf7#`.
    pub san: String,
    pub mv: Move,
}

/// A move that has been played, in the order it was played.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    #[serde(with = "crate::chess_serde::color_serde")]
    pub side: Color,
    #[serde(with = "crate::chess_serde::san_serde")]
    pub san: SanPlus,
}

/// One game's position together with its move history.
#[derive(Debug, Clone)]
pub struct Game {
    position: Chess,
    history: Vec<PlayedMove>,
    /// How often each position has occurred, keyed by its repetition hash.
    seen: HashMap<Zobrist64, u32>,
    most_repeated: u32,
}

impl Default for Game {
    fn default() -> Self {
        let mut game = Self {
            position: Chess::default(),
            history: Vec::new(),
            seen: HashMap::new(),
            most_repeated: 0,
        };
        game.record_position();
        game
    }
}

impl Game {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn history(&self) -> &[PlayedMove] {
        &self.history
    }

    pub fn side_to_move(&self) -> Color {
        self.position.turn()
    }

    /// All legal moves in the engine's move-generation order.
    pub fn legal_moves(&self) -> Vec<LegalMove> {
        self.position
            .legal_moves()
            .into_iter()
            .map(|mv| {
                let mut after = self.position.clone();
                let san = SanPlus::from_move_and_play_unchecked(&mut after, &mv);
                LegalMove {
                    san: san.to_string(),
                    mv,
                }
            })
            .collect()
    }

    /// Parse a move in short algebraic notation and play it.
    ///
    /// The check suffix is optional. On failure the position is not touched.
    pub fn apply_san(&mut self, notation: &str) -> Result<Move, MoveError> {
        let illegal = || MoveError::Illegal {
            notation: notation.to_string(),
        };
        let parsed = SanPlus::from_str(notation.trim()).map_err(|_| illegal())?;
        let mv = parsed.san.to_move(&self.position).map_err(|_| illegal())?;
        self.play(&mv);
        Ok(mv)
    }

    /// Play a move that was already resolved against this position.
    pub fn apply_move(&mut self, mv: &Move) -> Result<(), MoveError> {
        if !self.position.is_legal(mv) {
            return Err(MoveError::Illegal {
                notation: mv.to_string(),
            });
        }
        self.play(mv);
        Ok(())
    }

    fn play(&mut self, mv: &Move) {
        let side = self.position.turn();
        let san = SanPlus::from_move_and_play_unchecked(&mut self.position, mv);
        self.history.push(PlayedMove { side, san });
        self.record_position();
    }

    fn record_position(&mut self) {
        let key = self.position.zobrist_hash::<Zobrist64>(EnPassantMode::Legal);
        let count = self.seen.entry(key).or_insert(0);
        *count += 1;
        self.most_repeated = self.most_repeated.max(*count);
    }

    pub fn outcome(&self) -> Option<GameOutcome> {
        self.position
            .outcome()
            .map(GameOutcome::from)
            .or_else(|| {
                (self.position.halfmoves() >= AUTOMATIC_DRAW_HALFMOVES
                    || self.most_repeated >= AUTOMATIC_DRAW_REPETITIONS)
                    .then_some(GameOutcome::Draw)
            })
    }

    pub fn is_over(&self) -> bool {
        self.outcome().is_some()
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    /// Text diagram of the board, one rank per line, seen from `orientation`'s side.
    ///
    /// White pieces are uppercase, black pieces lowercase, empty squares are `.`.
    pub fn render(&self, orientation: Color) -> String {
        let board = self.position.board();
        let ranks: Vec<u32> = match orientation {
            Color::White => (0..8).rev().collect(),
            Color::Black => (0..8).collect(),
        };
        let files: Vec<u32> = match orientation {
            Color::White => (0..8).collect(),
            Color::Black => (0..8).rev().collect(),
        };

        let mut out = String::with_capacity(8 * 16);
        for (row, rank) in ranks.iter().enumerate() {
            if row > 0 {
                out.push('\n');
            }
            for (col, file) in files.iter().enumerate() {
                if col > 0 {
                    out.push(' ');
                }
                let square = Square::from_coords(File::new(*file), Rank::new(*rank));
                out.push(board.piece_at(square).map_or('.', |piece| piece.char()));
            }
        }
        out
    }

    /// PGN movetext without headers, terminated by the result token.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for (ply, played) in self.history.iter().enumerate() {
            if ply % 2 == 0 {
                let _ = write!(out, "{}. ", ply / 2 + 1);
            }
            let _ = write!(out, "{} ", played.san);
        }
        out.push_str(self.outcome().map_or("*", GameOutcome::pgn_result));
        out
    }
}

pub fn side_name(side: Color) -> &'static str {
    match side {
        Color::White => "white",
        Color::Black => "black",
    }
}
