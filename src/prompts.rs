//! Prompt templates and the per-phase template selector.
//!
//! Rendering is a pure function of the seme, the request, and the phase, so
//! it can be tested without the network.

use crate::models::{HistoryEntry, HistoryRole, Seme, TurnRequest};
use crate::seeds::SEME_FLUSSO_ID;

pub const OPENING: &str = include_str!("../data/prompts/opening.txt");
pub const INTERMEDIATE: &str = include_str!("../data/prompts/intermediate.txt");
pub const CLOSING: &str = include_str!("../data/prompts/closing.txt");
pub const FREE_ECHO: &str = include_str!("../data/prompts/free_echo.txt");

/// Default question shown on the closing turn when the client did not replay
/// the assistant's previous question.
pub const DEFAULT_OPENING_QUESTION: &str =
    "Quale voce antica sussurra nel silenzio tra un passo e l'altro?";
/// Placeholder used on intermediate turns when the previous question is missing.
pub const DEFAULT_MISSING_QUESTION: &str = "La tua domanda precedente non è stata fornita.";

/// Replace `{{key}}` placeholders in a template string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

/// The four prompt shapes a turn can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Opening,
    Intermediate,
    Closing,
    FreeEcho,
}

impl TurnPhase {
    /// Classify a turn.
    ///
    /// The unbounded seme's explicit echo request wins regardless of turn
    /// index; normal semi close on turn 1.
    pub fn classify(seme_id: &str, interaction_number: u32, is_eco_request: bool) -> Self {
        if seme_id == SEME_FLUSSO_ID && is_eco_request {
            TurnPhase::FreeEcho
        } else if interaction_number == 0 {
            TurnPhase::Opening
        } else if seme_id != SEME_FLUSSO_ID && interaction_number == 1 {
            TurnPhase::Closing
        } else {
            TurnPhase::Intermediate
        }
    }

    /// Terminal turns and the unbounded flow must carry a sigillo.
    pub fn wants_sigillo(self) -> bool {
        matches!(self, TurnPhase::Closing | TurnPhase::FreeEcho)
    }
}

/// Render the prompt for one turn. Pure function of its inputs.
pub fn build_prompt(phase: TurnPhase, seme: &Seme, request: &TurnRequest) -> String {
    match phase {
        TurnPhase::Opening => render(
            OPENING,
            &[
                ("seme_id", &seme.id),
                ("seme_nome", &seme.nome),
                ("user_input", &request.user_input),
            ],
        ),
        TurnPhase::Intermediate => {
            let question = request
                .last_assistant_question
                .as_deref()
                .unwrap_or(DEFAULT_MISSING_QUESTION);
            render(
                INTERMEDIATE,
                &[
                    ("seme_id", &seme.id),
                    ("seme_nome", &seme.nome),
                    ("contesto", &first_assistant_content(&request.history)),
                    ("domanda_precedente", question),
                    ("user_input", &request.user_input),
                ],
            )
        }
        TurnPhase::Closing => {
            let question = request
                .last_assistant_question
                .as_deref()
                .unwrap_or(DEFAULT_OPENING_QUESTION);
            render(
                CLOSING,
                &[
                    ("seme_id", &seme.id),
                    ("seme_nome", &seme.nome),
                    ("prima_riflessione", &last_user_reflection(request)),
                    ("domanda_precedente", question),
                    ("user_input", &request.user_input),
                    ("contesto", &first_assistant_content(&request.history)),
                ],
            )
        }
        TurnPhase::FreeEcho => render(
            FREE_ECHO,
            &[
                ("user_input", &request.user_input),
                ("frase_finale", &seme.frase_finale),
            ],
        ),
    }
}

/// Symbolic context from the assistant's first reply, if the client
/// replayed it. List content is joined into one block.
fn first_assistant_content(history: &[HistoryEntry]) -> String {
    history
        .first()
        .filter(|entry| entry.role == HistoryRole::Assistant)
        .map(|entry| entry.content.joined())
        .unwrap_or_default()
}

/// The user's previous reflection: the trailing user entry in the history,
/// or the current input when the history does not end with one.
fn last_user_reflection(request: &TurnRequest) -> String {
    request
        .history
        .last()
        .filter(|entry| entry.role == HistoryRole::User)
        .map(|entry| entry.content.joined())
        .unwrap_or_else(|| request.user_input.clone())
}
