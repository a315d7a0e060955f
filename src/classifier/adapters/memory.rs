//! Scripted in-memory classifier for tests and local runs.

use crate::classifier::ports::{Classifier, ClassifierError, ClassifierResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct ScriptedState {
    replies: VecDeque<ClassifierResult<String>>,
    fallback: Option<String>,
    prompts: Vec<String>,
}

/// Classifier answering from a queue of scripted replies.
///
/// Queued replies are consumed in order; once the queue is empty the
/// fallback reply is returned, or a malformed-response error when none is
/// set.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClassifier {
    state: Arc<RwLock<ScriptedState>>,
}

impl ScriptedClassifier {
    /// Creates a classifier with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a classifier that always answers `reply`.
    #[must_use]
    pub fn always(reply: impl Into<String>) -> Self {
        let classifier = Self::default();
        if let Ok(mut state) = classifier.state.write() {
            state.fallback = Some(reply.into());
        }
        classifier
    }

    /// Queues a reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            state.replies.push_back(Ok(reply.into()));
        }
    }

    /// Queues a failure.
    pub fn push_failure(&self, error: ClassifierError) {
        if let Ok(mut state) = self.state.write() {
            state.replies.push_back(Err(error));
        }
    }

    /// Returns every prompt received so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.state
            .read()
            .map(|state| state.prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, prompt: &str) -> ClassifierResult<String> {
        let mut state = self
            .state
            .write()
            .map_err(|err| ClassifierError::transport(std::io::Error::other(err.to_string())))?;
        state.prompts.push(prompt.to_owned());
        if let Some(reply) = state.replies.pop_front() {
            return reply;
        }
        state
            .fallback
            .clone()
            .ok_or_else(|| ClassifierError::MalformedResponse("no scripted reply".to_owned()))
    }
}
