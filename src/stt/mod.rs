//! Speech-to-text backends behind a single engine trait.

pub mod interface;
pub mod openai;
pub mod whisper_server;

use std::sync::Arc;

pub use interface::{SttEngine, SttError};

use crate::config::{Config, SttBackend};

/// Construct the engine for this run. Called once; the pipeline holds the
/// same engine for its whole lifetime.
pub fn create_engine(config: &Config) -> Arc<dyn SttEngine> {
    match config.whisper_backend {
        SttBackend::WhisperServer => {
            Arc::new(whisper_server::WhisperServerEngine::new(&config.whisper_server_url))
        }
        SttBackend::OpenAiCompat => Arc::new(openai::OpenAiCompatEngine::new(
            &config.whisper_server_url,
            &config.whisper_model,
        )),
    }
}
