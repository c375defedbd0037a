use std::sync::Arc;

use oracle_chess::{
    config::NegotiationConfig, rules::GameOutcome, scripted::ScriptedOracle,
    shakmaty::Color, GameRegistry, MoveError, NegotiationError, Negotiator, TurnState,
};
use rand::{rngs::StdRng, SeedableRng};

fn registry_with(oracle: Arc<ScriptedOracle>, config: NegotiationConfig) -> GameRegistry {
    let negotiator = Arc::new(Negotiator::new(oracle, config));
    GameRegistry::with_rng(negotiator, StdRng::seed_from_u64(2024))
}

/// Creates games until one gives the player the requested side.
fn game_for(registry: &GameRegistry, side: Color) -> Arc<oracle_chess::GameSession> {
    loop {
        let session = registry.create();
        if session.player_side() == side {
            return session;
        }
        registry.replace(&session.id());
    }
}

#[tokio::test]
async fn player_and_oracle_alternate() {
    let oracle = Arc::new(ScriptedOracle::new([
        "The Sicilian is sharp.\n**Move: 1... c5**",
        "Developing.\nMove: Nc6",
        "**Move: Nc6**",
    ]));
    let registry = registry_with(oracle.clone(), NegotiationConfig::default());
    let session = game_for(&registry, Color::White);

    assert!(session.is_player_turn().await);
    assert_eq!(
        session.apply_player_move("e4").await,
        Ok(TurnState::AiPending)
    );

    let first = session.maybe_start_ai_turn().await.expect("AI move due");
    first.await.unwrap().unwrap();
    assert!(session.consume_notification());
    assert_eq!(session.state().await, TurnState::PlayerTurn);

    session.apply_player_move("Nf3").await.unwrap();
    session
        .maybe_start_ai_turn()
        .await
        .expect("AI move due")
        .await
        .unwrap()
        .unwrap();

    let status = session.status().await;
    let played: Vec<String> = status.history.iter().map(|m| m.san.to_string()).collect();
    assert_eq!(played, ["e4", "c5", "Nf3", "Nc6"]);
    assert_eq!(oracle.calls(), 3);

    // The second negotiation opened with the updated position and transcript.
    let conversations = oracle.conversations();
    assert!(conversations[1][0].content.contains("black side"));
    assert!(conversations[1][1].content.contains("1. e4 c5 2. Nf3 *"));
}

#[tokio::test]
async fn oracle_that_never_complies_leaves_game_playable() {
    let oracle = Arc::new(
        ScriptedOracle::new(Vec::<String>::new()).repeat_when_empty("**Move: Qxe7**"),
    );
    let config = NegotiationConfig {
        max_rounds: 5,
        ..NegotiationConfig::default()
    };
    let registry = registry_with(oracle.clone(), config);
    let session = game_for(&registry, Color::Black);

    let attempt = session.maybe_start_ai_turn().await.unwrap();
    assert_eq!(
        attempt.await.unwrap(),
        Err(NegotiationError::Exhausted { attempts: 5 })
    );
    assert_eq!(session.state().await, TurnState::AiPending);
    assert!(!session.is_computing());
    assert_eq!(
        session.apply_player_move("e5").await,
        Err(MoveError::NotPlayerTurn)
    );

    oracle.push_reply("**Move: e4**");
    session.maybe_start_ai_turn().await.unwrap().await.unwrap().unwrap();
    assert_eq!(
        session.apply_player_move("e5").await,
        Ok(TurnState::AiPending)
    );
}

#[tokio::test]
async fn finished_game_reports_result() {
    let oracle = Arc::new(ScriptedOracle::new([
        "**Move: e5**",
        "**Move: Nc6**",
        "**Move: Nf6**",
    ]));
    let registry = registry_with(oracle, NegotiationConfig::default());
    let session = game_for(&registry, Color::White);

    for player_move in ["e4", "Bc4", "Qh5"] {
        session.apply_player_move(player_move).await.unwrap();
        session
            .maybe_start_ai_turn()
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(
        session.apply_player_move("Qxf7").await,
        Ok(TurnState::GameOver)
    );
    let result = session.result().await;
    assert_eq!(result, Some(GameOutcome::White));
    assert_eq!(result.and_then(GameOutcome::winner), Some(session.player_side()));
    assert_eq!(session.state().await, TurnState::GameOver);
    assert!(session.maybe_start_ai_turn().await.is_none());
}
