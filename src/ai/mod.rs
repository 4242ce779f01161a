//! Model gateway: the seam between the orchestrator and the external
//! completion endpoint.

pub mod gemini;
pub mod mock;

pub use gemini::GeminiClient;
pub use mock::MockCompletionClient;

use crate::Result;
use async_trait::async_trait;

/// Sampling parameters for one completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl GenerationOptions {
    /// Budget for opening, intermediate, and closing turns.
    pub fn creative() -> Self {
        Self {
            temperature: 0.88,
            top_p: 0.9,
            max_output_tokens: 700,
        }
    }

    /// Tighter budget for the unbounded-seme echo path.
    pub fn concise() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.8,
            max_output_tokens: 300,
        }
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send a rendered prompt and return the model's raw text reply.
    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}
