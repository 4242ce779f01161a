//! Turn orchestration: validate, classify, render, call the model, extract,
//! assemble.
//!
//! Each stage runs once; the only retries live inside the model gateway.
//! Any failure propagates to the dispatch layer, which records it on the
//! task — the orchestrator never re-enters an earlier stage.

use crate::ai::{CompletionService, GenerationOptions};
use crate::analytics::{AnalyticsLogger, StepKind};
use crate::extract::{self, Extracted};
use crate::models::{OutputText, Seme, TurnRequest, TurnResponse};
use crate::prompts::{self, TurnPhase};
use crate::seeds::SemeRegistry;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

pub struct TurnOrchestrator {
    completion: Box<dyn CompletionService>,
    semi: Arc<SemeRegistry>,
    analytics: Arc<AnalyticsLogger>,
}

impl TurnOrchestrator {
    pub fn new(
        completion: Box<dyn CompletionService>,
        semi: Arc<SemeRegistry>,
        analytics: Arc<AnalyticsLogger>,
    ) -> Self {
        Self {
            completion,
            semi,
            analytics,
        }
    }

    /// Run one conversation turn to a response.
    pub async fn run_turn(&self, request: &TurnRequest) -> Result<TurnResponse> {
        let seme = self
            .semi
            .get(&request.seme_id)
            .ok_or_else(|| Error::UnknownSeme(request.seme_id.clone()))?;

        let phase = TurnPhase::classify(
            &request.seme_id,
            request.interaction_number,
            request.is_eco_request,
        );
        info!(
            "Turn {:?} for seme {} (session {})",
            phase, request.seme_id, request.session_id
        );

        self.log_step(request, StepKind::UserInput, &request.user_input)
            .await;

        let prompt = prompts::build_prompt(phase, seme, request);
        self.log_step(request, StepKind::PromptSent, &prompt).await;

        let options = match phase {
            TurnPhase::FreeEcho => GenerationOptions::concise(),
            _ => GenerationOptions::creative(),
        };
        let raw = self.completion.complete(&prompt, &options).await?;
        debug!("Raw model reply ({} chars)", raw.len());
        self.log_step(request, StepKind::ModelResponse, &raw).await;

        let extracted = extract::extract(&raw);
        Ok(assemble(phase, seme, extracted))
    }

    async fn log_step(&self, request: &TurnRequest, kind: StepKind, content: &str) {
        self.analytics
            .log_step(
                &request.user_id,
                &request.session_id,
                &request.seme_id,
                kind,
                content,
            )
            .await;
    }
}

/// Build the response record, applying the sigillo fallback policy.
///
/// Terminal turns and the unbounded flow always carry a sigillo: the
/// model's when it parsed, the seme's default otherwise. A malformed model
/// sigillo therefore degrades silently instead of failing the turn.
fn assemble(phase: TurnPhase, seme: &Seme, extracted: Extracted) -> TurnResponse {
    let sigillo = if phase.wants_sigillo() {
        Some(extracted.sigillo.unwrap_or_else(|| {
            debug!("Model sigillo missing or malformed; using default for {}", seme.id);
            seme.sigillo.clone()
        }))
    } else {
        None
    };

    match phase {
        TurnPhase::FreeEcho => TurnResponse {
            // The unbounded flow carries no main output, only echo + sigillo.
            output: OutputText::empty(),
            eco: extracted.eco,
            frase_finale: if extracted.frase_finale.is_empty() {
                seme.frase_finale.clone()
            } else {
                extracted.frase_finale
            },
            sigillo,
        },
        _ => TurnResponse {
            output: extracted.output,
            eco: extracted.eco,
            frase_finale: extracted.frase_finale,
            sigillo,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockCompletionClient;
    use crate::analytics::MockAnalyticsSink;
    use crate::models::{Seme, Sigillo};
    use crate::seeds::SEME_FLUSSO_ID;
    use pretty_assertions::assert_eq;

    fn seme_prova() -> Seme {
        Seme {
            id: "sem_01".to_string(),
            nome: "Prova".to_string(),
            frase_finale: "Così scorre il fiume del cambiamento.".to_string(),
            sigillo: Sigillo {
                simbolo_dominante: "✨".to_string(),
                immagine: "Un orizzonte che si svela.".to_string(),
                colore: "#FFCC00".to_string(),
                forma: "spirale".to_string(),
                codice_sigillo: "SIG-PROVA-01".to_string(),
            },
        }
    }

    fn seme_flusso() -> Seme {
        Seme {
            id: SEME_FLUSSO_ID.to_string(),
            nome: "L'Eco Universale".to_string(),
            frase_finale: "La verità si manifesta nella scrittura libera.".to_string(),
            sigillo: Sigillo {
                simbolo_dominante: "🕳️".to_string(),
                immagine: "Un eco che si propaga in un vuoto sereno.".to_string(),
                colore: "#C0C0C0".to_string(),
                forma: "cerchio perfetto".to_string(),
                codice_sigillo: "SIG-ECO-99".to_string(),
            },
        }
    }

    fn request(seme_id: &str, interaction_number: u32) -> TurnRequest {
        TurnRequest {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            seme_id: seme_id.to_string(),
            interaction_number,
            user_input: "ciao".to_string(),
            history: Vec::new(),
            last_assistant_question: None,
            is_eco_request: false,
        }
    }

    fn build(mock: MockCompletionClient, sink: MockAnalyticsSink) -> TurnOrchestrator {
        TurnOrchestrator::new(
            Box::new(mock),
            Arc::new(SemeRegistry::from_semi(vec![seme_prova(), seme_flusso()])),
            Arc::new(AnalyticsLogger::new(Box::new(sink))),
        )
    }

    #[tokio::test]
    async fn test_opening_turn_unwraps_singleton_output_and_has_no_sigillo() {
        let mock = MockCompletionClient::new().with_response(
            r#"{"output":["un'immagine"],"eco":["eco breve"],"frase_finale":"Domanda?"}"#,
        );
        let orchestrator = build(mock, MockAnalyticsSink::new());

        let response = orchestrator.run_turn(&request("sem_01", 0)).await.unwrap();

        assert_eq!(response.output, OutputText::Text("un'immagine".to_string()));
        assert_eq!(response.eco, vec!["eco breve".to_string()]);
        assert_eq!(response.frase_finale, "Domanda?");
        assert!(response.sigillo.is_none());
    }

    #[tokio::test]
    async fn test_closing_turn_with_malformed_sigillo_uses_seme_default() {
        let mock = MockCompletionClient::new().with_response(
            r#"{"output":"tessitura","eco":["apice"],"frase_finale":"Titolo.","sigillo":"non un oggetto"}"#,
        );
        let orchestrator = build(mock, MockAnalyticsSink::new());

        let response = orchestrator.run_turn(&request("sem_01", 1)).await.unwrap();

        let sigillo = response.sigillo.expect("closing turn must carry a sigillo");
        assert_eq!(sigillo.codice_sigillo, "SIG-PROVA-01");
    }

    #[tokio::test]
    async fn test_closing_turn_prefers_model_sigillo() {
        let mock = MockCompletionClient::new().with_response(
            r##"{"output":"testo","eco":["eco"],"frase_finale":"Fine.","sigillo":{
                "simbolo_dominante":"🌊","immagine":"onda","colore":"#3366FF",
                "forma":"cerchio","codice_sigillo":"SIG-MODELLO"}}"##,
        );
        let orchestrator = build(mock, MockAnalyticsSink::new());

        let response = orchestrator.run_turn(&request("sem_01", 1)).await.unwrap();
        assert_eq!(response.sigillo.unwrap().codice_sigillo, "SIG-MODELLO");
    }

    #[tokio::test]
    async fn test_unknown_seme_fails_with_client_error() {
        let orchestrator = build(MockCompletionClient::new(), MockAnalyticsSink::new());

        let err = orchestrator.run_turn(&request("sem_42", 0)).await.unwrap_err();
        assert!(matches!(err, Error::UnknownSeme(id) if id == "sem_42"));
    }

    #[tokio::test]
    async fn test_free_echo_flow_fills_defaults_from_seme() {
        // Model returns only an eco and omits frase_finale and sigillo.
        let mock = MockCompletionClient::new()
            .with_response(r#"{"output":"","eco":["un'eco sola"],"frase_finale":""}"#);
        let mock_probe = mock.clone();
        let orchestrator = build(mock, MockAnalyticsSink::new());

        let mut req = request(SEME_FLUSSO_ID, 7);
        req.is_eco_request = true;
        req.user_input = "scrittura libera".to_string();

        let response = orchestrator.run_turn(&req).await.unwrap();

        assert!(response.output.is_empty());
        assert_eq!(response.eco, vec!["un'eco sola".to_string()]);
        assert_eq!(
            response.frase_finale,
            "La verità si manifesta nella scrittura libera."
        );
        assert_eq!(response.sigillo.unwrap().codice_sigillo, "SIG-ECO-99");
        // The single-shot prompt is built from the raw input.
        assert!(mock_probe.last_prompt().unwrap().contains("scrittura libera"));
    }

    #[tokio::test]
    async fn test_model_failure_propagates_without_retry() {
        let mock = MockCompletionClient::new().with_timeout();
        let mock_probe = mock.clone();
        let orchestrator = build(mock, MockAnalyticsSink::new());

        let err = orchestrator.run_turn(&request("sem_01", 0)).await.unwrap_err();

        assert!(matches!(err, Error::ModelTimeout));
        assert_eq!(mock_probe.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_analytics_records_three_steps_per_turn() {
        let sink = MockAnalyticsSink::new();
        let orchestrator = build(MockCompletionClient::new(), sink.clone());

        orchestrator.run_turn(&request("sem_01", 0)).await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].kind, StepKind::UserInput);
        assert_eq!(records[1].kind, StepKind::PromptSent);
        assert_eq!(records[2].kind, StepKind::ModelResponse);
        assert_eq!(
            records.iter().map(|r| r.step).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_failing_analytics_sink_does_not_fail_the_turn() {
        let sink = MockAnalyticsSink::new().with_failing_writes();
        let orchestrator = build(MockCompletionClient::new(), sink);

        assert!(orchestrator.run_turn(&request("sem_01", 0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_prose_reply_degrades_to_raw_output() {
        let mock =
            MockCompletionClient::new().with_response("nessun JSON, solo una frase poetica");
        let orchestrator = build(mock, MockAnalyticsSink::new());

        let response = orchestrator.run_turn(&request("sem_01", 0)).await.unwrap();

        assert_eq!(
            response.output,
            OutputText::Text("nessun JSON, solo una frase poetica".to_string())
        );
        assert!(response.eco.is_empty());
    }
}
