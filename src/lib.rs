pub mod config;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod server;

pub use config::{Config, ConfigManager, GenerationParams};
pub use llm::{CopyGenerationError, CopyProvider};
pub use prompt::CopyBrief;
pub use server::AppState;
