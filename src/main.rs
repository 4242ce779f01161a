use anyhow::Result;
use clap::Parser;
use sibilla::ai::GeminiClient;
use sibilla::analytics::{AnalyticsLogger, HttpAnalyticsSink};
use sibilla::dispatch::{Dispatcher, TaskSnapshot};
use sibilla::models::{Config, TurnRequest};
use sibilla::orchestrator::TurnOrchestrator;
use sibilla::seeds::SemeRegistry;
use sibilla::tasks::TaskStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "sibilla")]
#[command(about = "Submit one poetic turn and poll it to completion")]
struct CliArgs {
    /// Seme id to converse with.
    #[arg(long, default_value = "sem_01")]
    seme: String,

    /// The user's free-text reflection.
    #[arg(long)]
    input: String,

    /// Turn index within the session (0 = opening).
    #[arg(long, default_value_t = 0)]
    turn: u32,

    /// Request the unbounded seme's single-shot echo flow.
    #[arg(long)]
    eco: bool,

    /// The assistant's previous question, if replaying a session.
    #[arg(long)]
    question: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sibilla=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    let config = Config::from_env()?;

    let semi = Arc::new(SemeRegistry::load(&config.semi_data_path));
    info!("Seme registry ready ({} semi)", semi.len());

    let completion = GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.model_timeout,
    );

    let analytics = match &config.analytics_url {
        Some(url) => {
            info!("Analytics collector: {}", url);
            Arc::new(AnalyticsLogger::new(Box::new(HttpAnalyticsSink::new(
                url.clone(),
            ))))
        }
        None => Arc::new(AnalyticsLogger::disabled()),
    };

    let orchestrator = Arc::new(TurnOrchestrator::new(
        Box::new(completion),
        semi,
        analytics,
    ));
    let dispatcher = Dispatcher::new(orchestrator, Arc::new(TaskStore::new()));

    let request = TurnRequest {
        user_id: "cli".to_string(),
        session_id: Uuid::new_v4().to_string(),
        seme_id: args.seme,
        interaction_number: args.turn,
        user_input: args.input,
        history: Vec::new(),
        last_assistant_question: args.question,
        is_eco_request: args.eco,
    };

    let ack = dispatcher.submit(request);
    info!("Task {} submitted, polling...", ack.task_id);

    loop {
        match dispatcher.poll(ack.task_id) {
            Some(TaskSnapshot::Processing) => {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Some(snapshot @ TaskSnapshot::Completed { .. }) => {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
                return Ok(());
            }
            Some(snapshot @ TaskSnapshot::Failed { .. }) => {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
                std::process::exit(1);
            }
            None => {
                error!("Task disappeared before a terminal state was observed");
                std::process::exit(1);
            }
        }
    }
}
