//! Turning free-text oracle answers into a legal move.
//!
//! The oracle is asked for a move with a fixed output contract: the last line of its answer must be
//! `**Move: <san>**`. Each answer is judged against the legal moves of the position, and a wrong
//! answer is met with a corrective message appended to the same conversation, so the oracle sees
//! its own earlier mistakes. The first answer naming a legal move wins.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use shakmaty::{Color, Move};
use tracing::{debug, error, info, warn};

use crate::config::NegotiationConfig;
use crate::error::{NegotiationError, OracleError};
use crate::rules::{side_name, Game, LegalMove};
use crate::{Message, Oracle};

/// `**Move:`, then move numbers and spacing to skip, then the move itself, then `**`.
static MOVE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*\*Move:[\s.\d]*([^*]*)\*\*").expect("move line pattern is valid"));

/// Pull the candidate move out of an oracle reply.
///
/// Only the final line is considered. Returns `None` when it does not follow the
/// `**Move: <move>**` contract.
pub fn parse_move_reply(reply: &str) -> Option<&str> {
    let last_line = reply.trim().lines().last()?;
    MOVE_LINE
        .captures(last_line)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str())
}

/// Why a single oracle answer was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The answer did not end with a `**Move: ...**` line.
    Unparseable,
    /// The answer named something that is not a legal move here.
    Illegal(String),
}

impl Rejection {
    fn correction(&self, legal_list: &str, question: &str) -> String {
        match self {
            Rejection::Unparseable => format!(
                "I could not parse a move from your response.\n\
                 End your response with one of these legal moves: {legal_list}\n\
                 Follow the format specified: **Move: <move>**\n\
                 {question}"
            ),
            Rejection::Illegal(token) => format!(
                "{token} was not valid.\n\
                 Make sure your move is in Short Algebraic Notation.\n\
                 Here are the possible moves: {legal_list}\n\
                 {question}"
            ),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unparseable => write!(f, "no move line in reply"),
            Rejection::Illegal(token) => write!(f, "`{token}` is not a legal move"),
        }
    }
}

fn judge<'a>(reply: &str, legal: &'a [LegalMove]) -> Result<&'a LegalMove, Rejection> {
    let token = parse_move_reply(reply).ok_or(Rejection::Unparseable)?;
    legal
        .iter()
        .find(|candidate| candidate.san == token)
        .ok_or_else(|| Rejection::Illegal(token.to_string()))
}

pub fn system_prompt(side: Color) -> String {
    format!(
        "You are playing chess for the {} side.\n\
         Show your reasoning for every legal move before deciding on a single one.\n\
         End your response with a new line of the form: \"**Move: <move>**\", where <move> is a move \
         in Short Standard Algebraic Notation and contains no unnecessary characters.\n\
         When castling, use the letter \"O\" (uppercase) instead of the digit \"0\".",
        side_name(side)
    )
}

pub fn position_prompt(game: &Game) -> String {
    format!(
        "Here is the board as a grid:\n\
         {}\n\
         The uppercase letters represent the white pieces, and the lowercase letters represent the black pieces.\n\
         The dots represent empty squares. Each piece is represented by its first letter, except the knight, which is N.\n\
         Here is the PGN of the game so far:\n\
         {}\n\
         What is your move in Short Standard Algebraic Notation?",
        game.render(Color::White),
        game.transcript()
    )
}

/// A move the oracle agreed on.
#[derive(Debug, Clone)]
pub struct Negotiated {
    pub mv: Move,
    pub san: String,
    /// Rounds used, including the successful one.
    pub attempts: u32,
    /// The whole exchange, ending with the accepted answer.
    pub conversation: Vec<Message>,
}

/// Runs the move negotiation protocol against an [`Oracle`].
///
/// A negotiator holds no per-game state and can be shared by every session.
pub struct Negotiator {
    oracle: Arc<dyn Oracle>,
    config: NegotiationConfig,
}

impl Negotiator {
    pub fn new(oracle: Arc<dyn Oracle>, config: NegotiationConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Ask the oracle for a move in `game` until it names a legal one.
    ///
    /// The legal moves are computed once up front; `game` is only read.
    /// Fails with [`NegotiationError::Exhausted`] after `max_rounds` wrong answers, or with
    /// [`NegotiationError::Transport`] when the oracle cannot be reached at all.
    pub async fn negotiate(&self, game: &Game) -> Result<Negotiated, NegotiationError> {
        let legal = game.legal_moves();
        if legal.is_empty() {
            return Err(NegotiationError::NoLegalMoves);
        }
        let legal_list = legal
            .iter()
            .map(|m| m.san.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let side = game.side_to_move();
        let question = position_prompt(game);

        debug!(side = side_name(side), legal = %legal_list, "starting move negotiation");

        let mut conversation = vec![
            Message::system(system_prompt(side)),
            Message::user(question.clone()),
        ];

        for round in 1..=self.config.max_rounds {
            let reply = self.ask(&conversation).await?;
            let verdict = judge(&reply, &legal);
            conversation.push(Message::assistant(reply));

            match verdict {
                Ok(chosen) => {
                    info!(round, san = %chosen.san, "oracle move accepted");
                    return Ok(Negotiated {
                        mv: chosen.mv.clone(),
                        san: chosen.san.clone(),
                        attempts: round,
                        conversation,
                    });
                }
                Err(rejection) => {
                    warn!(round, %rejection, "oracle reply rejected");
                    conversation.push(Message::user(rejection.correction(&legal_list, &question)));
                }
            }
        }

        error!(
            attempts = self.config.max_rounds,
            "oracle never produced a legal move"
        );
        Err(NegotiationError::Exhausted {
            attempts: self.config.max_rounds,
        })
    }

    /// One round's oracle call. Unreachable-oracle failures are retried here with backoff,
    /// so they never use up a negotiation round.
    async fn ask(&self, conversation: &[Message]) -> Result<String, OracleError> {
        let mut failures = 0u32;
        loop {
            match self.call_once(conversation).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_retryable() && failures < self.config.max_transport_retries => {
                    let delay = self
                        .config
                        .transport_backoff
                        .saturating_mul(1u32 << failures.min(16));
                    failures += 1;
                    warn!(error = %err, retry = failures, ?delay, "oracle unreachable, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(error = %err, failures, "giving up on oracle");
                    return Err(err);
                }
            }
        }
    }

    async fn call_once(&self, conversation: &[Message]) -> Result<String, OracleError> {
        match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.oracle.complete(conversation))
                .await
                .map_err(|_| OracleError::Timeout(limit))?,
            None => self.oracle.complete(conversation).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::scripted::ScriptedOracle;
    use crate::Role;

    fn negotiator(oracle: &Arc<ScriptedOracle>, config: NegotiationConfig) -> Negotiator {
        let negotiator = Negotiator::new(oracle.clone(), config.clone());
        assert_eq!(negotiator.config().max_rounds, config.max_rounds);
        negotiator
    }

    fn fast_config() -> NegotiationConfig {
        NegotiationConfig {
            transport_backoff: Duration::from_millis(10),
            ..NegotiationConfig::default()
        }
    }

    #[test]
    fn parses_move_lines() {
        assert_eq!(parse_move_reply("**Move: e4**"), Some("e4"));
        assert_eq!(parse_move_reply("**Move: 1.Nf3**"), Some("Nf3"));
        assert_eq!(parse_move_reply("**Move: 1. Nf3**"), Some("Nf3"));
        assert_eq!(parse_move_reply("**Move:O-O**"), Some("O-O"));
        assert_eq!(parse_move_reply("**Move: 12... Qxf7#**"), Some("Qxf7#"));
        assert_eq!(parse_move_reply("1. e4**"), None);
        assert_eq!(parse_move_reply(""), None);
    }

    #[test]
    fn only_the_last_line_counts() {
        let reply = "**Move: d4**\nOn second thought I prefer the king pawn.\n**Move: e4**\n\n";
        assert_eq!(parse_move_reply(reply), Some("e4"));

        let reply = "**Move: e4**\nThat is my final answer.";
        assert_eq!(parse_move_reply(reply), None);
    }

    #[test]
    fn judging_is_exact() {
        let legal = Game::new().legal_moves();
        assert!(judge("**Move: e4**", &legal).is_ok());
        assert_eq!(
            judge("**Move: E4**", &legal),
            Err(Rejection::Illegal("E4".to_string()))
        );
        assert_eq!(judge("e4", &legal), Err(Rejection::Unparseable));
    }

    #[tokio::test]
    async fn succeeds_on_third_answer() {
        let oracle = Arc::new(ScriptedOracle::new([
            "I think the best move is to push a pawn.",
            "Let me attack.\n**Move: Qh5**",
            "Sorry.\n**Move: e4**",
        ]));
        let game = Game::new();

        let negotiated = negotiator(&oracle, fast_config())
            .negotiate(&game)
            .await
            .unwrap();

        assert_eq!(negotiated.san, "e4");
        assert_eq!(negotiated.attempts, 3);
        assert_eq!(oracle.calls(), 3);

        let mut after = game.clone();
        after.apply_move(&negotiated.mv).unwrap();
        let mut direct = game.clone();
        direct.apply_san("e4").unwrap();
        assert_eq!(after.fen(), direct.fen());
    }

    #[tokio::test]
    async fn corrections_are_specific_and_cumulative() {
        let oracle = Arc::new(ScriptedOracle::new([
            "no idea",
            "**Move: Qh5**",
            "**Move: Nf3**",
        ]));
        let negotiated = negotiator(&oracle, fast_config())
            .negotiate(&Game::new())
            .await
            .unwrap();

        let roles: Vec<Role> = negotiated.conversation.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [
                Role::System,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
            ]
        );
        let conversation = &negotiated.conversation;
        assert!(conversation[0].content.contains("white side"));
        assert!(conversation[0].content.contains("**Move: <move>**"));
        assert!(conversation[1].content.contains("r n b q k b n r"));
        assert!(conversation[3]
            .content
            .starts_with("I could not parse a move from your response."));
        assert!(conversation[5].content.starts_with("Qh5 was not valid."));
        assert!(conversation[5].content.contains("Nf3"));
        assert!(conversation[5].content.ends_with(&conversation[1].content));

        // The oracle saw its own earlier answers each time it was asked again.
        let seen = oracle.conversations();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].len(), 2);
        assert_eq!(seen[2].len(), 6);
    }

    #[tokio::test]
    async fn exhausts_after_max_rounds() {
        let oracle = Arc::new(
            ScriptedOracle::new(["**Move: Ke2**"]).repeat_when_empty("I resign from thinking."),
        );
        let result = negotiator(&oracle, fast_config())
            .negotiate(&Game::new())
            .await;

        assert_eq!(result.unwrap_err(), NegotiationError::Exhausted { attempts: 30 });
        assert_eq!(oracle.calls(), 30);
    }

    #[tokio::test]
    async fn stops_at_configured_bound() {
        let oracle = Arc::new(ScriptedOracle::new(Vec::<String>::new()).repeat_when_empty("hmm"));
        let config = NegotiationConfig {
            max_rounds: 4,
            ..fast_config()
        };
        let result = negotiator(&oracle, config).negotiate(&Game::new()).await;
        assert_eq!(result.unwrap_err(), NegotiationError::Exhausted { attempts: 4 });
        assert_eq!(oracle.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_do_not_use_rounds() {
        let oracle = Arc::new(
            ScriptedOracle::new(Vec::<String>::new())
                .then_fail(OracleError::Transport("connection reset".into()))
                .then_fail(OracleError::Status {
                    status: 503,
                    body: "overloaded".into(),
                })
                .then_reply("**Move: d4**"),
        );
        let config = NegotiationConfig {
            max_rounds: 1,
            ..fast_config()
        };
        let negotiated = negotiator(&oracle, config)
            .negotiate(&Game::new())
            .await
            .unwrap();
        assert_eq!(negotiated.san, "d4");
        assert_eq!(negotiated.attempts, 1);
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_transport_failure_is_reported_as_such() {
        let oracle = Arc::new(ScriptedOracle::new(Vec::<String>::new()));
        for _ in 0..10 {
            oracle.push_failure(OracleError::Transport("dns".into()));
        }
        let result = negotiator(&oracle, fast_config())
            .negotiate(&Game::new())
            .await;
        assert_eq!(
            result.unwrap_err(),
            NegotiationError::Transport(OracleError::Transport("dns".into()))
        );
        // First try plus three retries.
        assert_eq!(oracle.calls(), 4);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let oracle = Arc::new(ScriptedOracle::new(Vec::<String>::new()).then_fail(
            OracleError::Status {
                status: 401,
                body: "bad key".into(),
            },
        ));
        let result = negotiator(&oracle, fast_config())
            .negotiate(&Game::new())
            .await;
        assert!(matches!(
            result,
            Err(NegotiationError::Transport(OracleError::Status { status: 401, .. }))
        ));
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_oracle_times_out() {
        let oracle = Arc::new(
            ScriptedOracle::new(Vec::<String>::new())
                .then_stall()
                .then_reply("**Move: c4**"),
        );
        let config = NegotiationConfig {
            request_timeout: Some(Duration::from_secs(5)),
            ..fast_config()
        };
        let negotiated = negotiator(&oracle, config)
            .negotiate(&Game::new())
            .await
            .unwrap();
        assert_eq!(negotiated.san, "c4");
        assert_eq!(negotiated.attempts, 1);
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn finished_game_is_refused() {
        let mut game = Game::new();
        for m in ["f3", "e5", "g4", "Qh4#"] {
            game.apply_san(m).unwrap();
        }
        let oracle = Arc::new(ScriptedOracle::new(["**Move: Kf2**"]));
        let result = negotiator(&oracle, fast_config()).negotiate(&game).await;
        assert_eq!(result.unwrap_err(), NegotiationError::NoLegalMoves);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn every_legal_move_round_trips() {
        let mut game = Game::new();
        for m in ["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"] {
            game.apply_san(m).unwrap();
        }
        for legal in game.legal_moves() {
            let oracle = Arc::new(ScriptedOracle::new([format!("**Move: {}**", legal.san)]));
            let negotiated = negotiator(&oracle, fast_config())
                .negotiate(&game)
                .await
                .unwrap();

            let mut via_oracle = game.clone();
            via_oracle.apply_move(&negotiated.mv).unwrap();
            let mut direct = game.clone();
            direct.apply_san(&legal.san).unwrap();
            assert_eq!(via_oracle.fen(), direct.fen(), "move {}", legal.san);
        }
    }
}
