//! Process-wide lookup of live games by id.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info};

use crate::negotiation::Negotiator;
use crate::session::{GameId, GameSession};

/// All live games, keyed by id.
///
/// Sessions stay until they are replaced, removed, or evicted for idleness.
/// The registry owns the random source used for new games, so a seeded registry
/// hands out the same ids and sides every run.
pub struct GameRegistry {
    sessions: DashMap<GameId, Arc<GameSession>>,
    negotiator: Arc<Negotiator>,
    rng: Mutex<StdRng>,
}

impl GameRegistry {
    pub fn new(negotiator: Arc<Negotiator>) -> Self {
        Self::with_rng(negotiator, StdRng::from_entropy())
    }

    pub fn with_rng(negotiator: Arc<Negotiator>, rng: StdRng) -> Self {
        Self {
            sessions: DashMap::new(),
            negotiator,
            rng: Mutex::new(rng),
        }
    }

    /// Start a new game with a fresh id and a random side for the player.
    pub fn create(&self) -> Arc<GameSession> {
        let session = {
            let mut rng = match self.rng.lock() {
                Ok(rng) => rng,
                Err(poisoned) => poisoned.into_inner(),
            };
            GameSession::with_random_side(&mut *rng, Arc::clone(&self.negotiator))
        };
        let session = Arc::new(session);
        self.sessions.insert(session.id(), Arc::clone(&session));
        session
    }

    pub fn get(&self, id: &GameId) -> Option<Arc<GameSession>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop a game. A computation already running for it finishes on its own and is then discarded.
    pub fn replace(&self, id: &GameId) -> Option<Arc<GameSession>> {
        let removed = self.sessions.remove(id).map(|(_, session)| session);
        if removed.is_some() {
            debug!(game = %id, "game removed");
        }
        removed
    }

    /// Abandon the caller's previous game, if any, and start a new one.
    pub fn renew(&self, previous: Option<GameId>) -> Arc<GameSession> {
        if let Some(previous) = previous {
            self.replace(&previous);
        }
        self.create()
    }

    /// Remove every game nobody has touched for `max_idle`, except games whose oracle is still
    /// thinking. Returns how many were removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.is_computing() || session.idle_for() < max_idle);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!(evicted, remaining = self.sessions.len(), "evicted idle games");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
