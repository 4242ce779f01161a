//! Fire-and-forget analytics records for each significant turn step.
//!
//! One record is written per step (user input received, prompt sent, model
//! response received), keyed by user/session/seme and a process-local
//! per-session step counter. Sink failures are downgraded to a console
//! record; they must never abort a turn.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepKind {
    #[serde(rename = "input_utente")]
    UserInput,
    #[serde(rename = "prompt_inviato")]
    PromptSent,
    #[serde(rename = "risposta_modello")]
    ModelResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub user_id: String,
    pub session_id: String,
    pub seme_id: String,
    pub step: u32,
    pub kind: StepKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, record: &StepRecord) -> Result<()>;
}

/// POSTs each record as JSON to a collector endpoint.
pub struct HttpAnalyticsSink {
    client: reqwest::Client,
    url: String,
}

impl HttpAnalyticsSink {
    pub fn new(url: String) -> Self {
        Self::new_with_client(url, reqwest::Client::new())
    }

    pub fn new_with_client(url: String, client: reqwest::Client) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl AnalyticsSink for HttpAnalyticsSink {
    async fn record(&self, record: &StepRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .timeout(Duration::from_secs(10))
            .json(record)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Analytics(format!(
                "collector returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Captures records in memory; can be told to fail every write.
#[derive(Clone, Default)]
pub struct MockAnalyticsSink {
    records: Arc<Mutex<Vec<StepRecord>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MockAnalyticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_writes(self) -> Self {
        *self.fail_writes.lock().unwrap() = true;
        self
    }

    pub fn records(&self) -> Vec<StepRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalyticsSink for MockAnalyticsSink {
    async fn record(&self, record: &StepRecord) -> Result<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(Error::Analytics("mock sink failure".to_string()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Owns the per-session step counter and shields callers from sink errors.
pub struct AnalyticsLogger {
    sink: Option<Box<dyn AnalyticsSink>>,
    steps: Mutex<HashMap<(String, String), u32>>,
}

impl AnalyticsLogger {
    pub fn new(sink: Box<dyn AnalyticsSink>) -> Self {
        Self {
            sink: Some(sink),
            steps: Mutex::new(HashMap::new()),
        }
    }

    /// Console-only logger used when no collector is configured.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            steps: Mutex::new(HashMap::new()),
        }
    }

    /// Record one step. The counter increments once per logged event,
    /// whether or not the sink write succeeds.
    pub async fn log_step(
        &self,
        user_id: &str,
        session_id: &str,
        seme_id: &str,
        kind: StepKind,
        content: &str,
    ) {
        let step = self.next_step(user_id, session_id);
        let record = StepRecord {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            seme_id: seme_id.to_string(),
            step,
            kind,
            content: content.to_string(),
            timestamp: Utc::now(),
        };

        match &self.sink {
            Some(sink) => {
                if let Err(e) = sink.record(&record).await {
                    warn!(
                        "Analytics write failed for session {} step {} ({:?}): {}",
                        session_id, step, kind, e
                    );
                }
            }
            None => debug!(
                "Analytics (no sink) session {} step {} {:?}",
                session_id, step, kind
            ),
        }
    }

    fn next_step(&self, user_id: &str, session_id: &str) -> u32 {
        let mut steps = self.steps.lock().expect("step counter lock poisoned");
        let counter = steps
            .entry((user_id.to_string(), session_id.to_string()))
            .or_insert(0);
        *counter += 1;
        *counter
    }
}
