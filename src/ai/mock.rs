use super::{CompletionService, GenerationOptions};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

const DEFAULT_REPLY: &str =
    r#"{"output": "Un riflesso di prova.", "eco": ["eco di prova"], "frase_finale": "Che cosa risuona in te?"}"#;

#[derive(Debug, Clone)]
enum MockOutcome {
    Text(String),
    Timeout,
    ApiError(u16),
}

/// Scripted completion client for orchestrator and dispatch tests.
///
/// Outcomes are replayed in order and cycle when exhausted; with no script
/// every call returns a small valid JSON reply.
#[derive(Clone)]
pub struct MockCompletionClient {
    outcomes: Arc<Mutex<Vec<MockOutcome>>>,
    call_count: Arc<Mutex<usize>>,
    last_prompt: Arc<Mutex<Option<String>>>,
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            last_prompt: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push(MockOutcome::Text(response.into()));
        self
    }

    pub fn with_timeout(self) -> Self {
        self.outcomes.lock().unwrap().push(MockOutcome::Timeout);
        self
    }

    pub fn with_api_error(self, status: u16) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push(MockOutcome::ApiError(status));
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// The most recent prompt seen, for asserting template selection.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

impl Default for MockCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionService for MockCompletionClient {
    async fn complete(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
        let mut count = self.call_count.lock().unwrap();
        *count += 1;
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());

        let outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            return Ok(DEFAULT_REPLY.to_string());
        }

        let index = (*count - 1) % outcomes.len();
        match &outcomes[index] {
            MockOutcome::Text(text) => Ok(text.clone()),
            MockOutcome::Timeout => Err(Error::ModelTimeout),
            MockOutcome::ApiError(status) => Err(Error::ModelApi {
                status: *status,
                message: "mock upstream failure".to_string(),
            }),
        }
    }
}
