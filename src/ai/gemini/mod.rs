pub mod client;
pub mod completion;

pub use completion::GeminiClient;
