//! A deterministic [`Oracle`] that replays a fixed script.
//!
//! Useful for tests and for running the server without network access.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::OracleError;
use crate::{Message, Oracle};

#[derive(Debug, Clone)]
enum Step {
    Reply(String),
    Fail(OracleError),
    /// Never answer.
    Stall,
}

/// Answers with queued steps, in order.
///
/// Once the queue is empty it keeps answering with the fallback reply, if one was set,
/// and otherwise fails with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    steps: Mutex<VecDeque<Step>>,
    fallback: Option<String>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    conversations: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| Step::Reply(r.into()))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.push(Step::Reply(reply.into()));
        self
    }

    pub fn then_fail(self, error: OracleError) -> Self {
        self.push(Step::Fail(error));
        self
    }

    pub fn then_stall(self) -> Self {
        self.push(Step::Stall);
        self
    }

    pub fn repeat_when_empty(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Make every call wait for a permit from `gate` before answering.
    /// Permits are consumed, one per call.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.push(Step::Reply(reply.into()));
    }

    pub fn push_failure(&self, error: OracleError) {
        self.push(Step::Fail(error));
    }

    fn push(&self, step: Step) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
    }

    /// How many times [`Oracle::complete`] has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every conversation received so far, in call order.
    pub fn conversations(&self) -> Vec<Vec<Message>> {
        self.conversations
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    fn next_step(&self) -> Option<Step> {
        self.steps.lock().ok()?.pop_front()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, conversation: &[Message]) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.conversations.lock() {
            seen.push(conversation.to_vec());
        }

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| OracleError::Transport("oracle gate closed".to_string()))?
                .forget();
        }

        match self.next_step() {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Stall) => std::future::pending().await,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| OracleError::Transport("script exhausted".to_string())),
        }
    }
}
