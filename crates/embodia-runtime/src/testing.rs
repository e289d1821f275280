//! In-process backend for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use embodia_types::ConversationTurn;

use crate::backend::ReasoningBackend;
use crate::llm_driver::LlmError;

/// Replays canned replies in order and records every request it sees.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl ScriptedBackend {
    pub(crate) fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    pub(crate) fn failing(reason: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(reason.to_string())])),
            ..Self::default()
        }
    }

    /// Sleep for `delay` before every reply.
    pub(crate) fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn requests(&self) -> Vec<Vec<ConversationTurn>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn complete(&self, _preamble: &str, turns: &[ConversationTurn]) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(turns.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(LlmError::BadResponse(reason)),
            None => Err(LlmError::BadResponse("script exhausted".into())),
        }
    }
}
