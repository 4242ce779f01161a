//! Data models and structures
//!
//! Defines the core data structures for semi, sigilli, turn requests and
//! responses exchanged with the routing layer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Structured "badge" record attached to a terminal response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sigillo {
    pub simbolo_dominante: String,
    pub immagine: String,
    pub colore: String,
    pub forma: String,
    pub codice_sigillo: String,
}

/// Static conversation archetype loaded once at startup.
///
/// Unknown keys in the data file (`icona`, `prompt_base`, ...) are ignored;
/// the default `sigillo` is mandatory so terminal turns always have a seal
/// to fall back on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seme {
    pub id: String,
    pub nome: String,
    pub frase_finale: String,
    pub sigillo: Sigillo,
}

/// Model output that may be a single paragraph or an ordered list of lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OutputText {
    Text(String),
    Lines(Vec<String>),
}

impl OutputText {
    pub fn empty() -> Self {
        OutputText::Text(String::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            OutputText::Text(text) => text.is_empty(),
            OutputText::Lines(lines) => lines.iter().all(|line| line.is_empty()),
        }
    }

    /// Flatten to a single string, joining lines with newlines.
    pub fn joined(&self) -> String {
        match self {
            OutputText::Text(text) => text.clone(),
            OutputText::Lines(lines) => lines.join("\n"),
        }
    }
}

impl Default for OutputText {
    fn default() -> Self {
        OutputText::empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

/// One prior exchange in the session, as replayed by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: OutputText,
}

/// A single conversation-turn request submitted for background processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnRequest {
    pub user_id: String,
    pub session_id: String,
    pub seme_id: String,
    #[serde(default)]
    pub interaction_number: u32,
    pub user_input: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub last_assistant_question: Option<String>,
    #[serde(default)]
    pub is_eco_request: bool,
}

/// The assembled outcome of one turn.
///
/// `sigillo` is present only on the terminal turn of a normal seme, or on
/// every turn of the unbounded seme.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnResponse {
    pub output: OutputText,
    pub eco: Vec<String>,
    pub frase_finale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigillo: Option<Sigillo>,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub semi_data_path: PathBuf,
    pub analytics_url: Option<String>,
    pub model_timeout: Duration,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let model_timeout_secs = match std::env::var("MODEL_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                crate::Error::Config(format!("MODEL_TIMEOUT_SECS is not a number: {}", raw))
            })?,
            Err(_) => 45,
        };

        Ok(Self {
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .map_err(|_| crate::Error::Config("GEMINI_API_KEY not set".to_string()))?,
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-1.5-flash".to_string()),
            semi_data_path: PathBuf::from(
                std::env::var("SEMI_DATA_PATH")
                    .unwrap_or_else(|_| "data/semi_data.json".to_string()),
            ),
            analytics_url: std::env::var("ANALYTICS_URL").ok(),
            model_timeout: Duration::from_secs(model_timeout_secs),
        })
    }
}
