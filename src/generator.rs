//! Text generation seam. One prompt in, one raw text answer out.
//!
//! Provider selection happens once at startup from `LLM_PROVIDER`; when unset,
//! whichever provider has an API key wins (Gemini first).

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::gemini::GeminiClient;
use crate::openai::OpenAI;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
  /// The request never produced an HTTP response (DNS, TLS, timeout...).
  #[error("transport error: {0}")]
  Transport(String),
  #[error("HTTP {status}: {message}")]
  Http { status: u16, message: String },
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
  fn name(&self) -> &str;
  fn model(&self) -> &str;
  async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Build the configured generator. `None` means AI features answer with a provider error.
pub fn generator_from_env(timeout: Duration) -> Option<Arc<dyn TextGenerator>> {
  let wanted = std::env::var("LLM_PROVIDER").ok().map(|s| s.trim().to_lowercase());
  let gen: Option<Arc<dyn TextGenerator>> = match wanted.as_deref() {
    Some("gemini") => GeminiClient::from_env(timeout).map(|g| Arc::new(g) as Arc<dyn TextGenerator>),
    Some("openai") => OpenAI::from_env(timeout).map(|o| Arc::new(o) as Arc<dyn TextGenerator>),
    Some(other) => {
      warn!(target: "studymate_backend", provider = %other, "Unknown LLM_PROVIDER (expected gemini|openai)");
      None
    }
    None => GeminiClient::from_env(timeout)
      .map(|g| Arc::new(g) as Arc<dyn TextGenerator>)
      .or_else(|| OpenAI::from_env(timeout).map(|o| Arc::new(o) as Arc<dyn TextGenerator>)),
  };
  if let Some(g) = &gen {
    info!(target: "studymate_backend", provider = %g.name(), model = %g.model(), "Text generation enabled.");
  }
  gen
}

/// Clean error message from a `{"error": {"message": ...}}` body, the shape both
/// supported providers use.
pub fn extract_provider_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
