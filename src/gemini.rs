//! Gemini `generateContent` client. Same contract as the OpenAI client: one
//! prompt, one raw text answer, no structured-output mode.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::generator::{extract_provider_error, GenerationError, TextGenerator};

#[derive(Clone)]
pub struct GeminiClient {
  pub client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
}

impl GeminiClient {
  /// Construct the client if we find GEMINI_API_KEY; otherwise return None.
  pub fn from_env(timeout: Duration) -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok()?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".into());
    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
    Some(Self { client, api_key, base_url, model })
  }

  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn generate_content(&self, prompt: &str) -> Result<String, GenerationError> {
    let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
    let req = GenerateRequest {
      contents: vec![Content { parts: vec![Part { text: prompt.to_string() }] }],
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "studymate-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(&req).send().await.map_err(|e| GenerationError::Transport(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_provider_error(&body).unwrap_or(body);
      error!(elapsed = ?start.elapsed(), %status, "Gemini call failed");
      return Err(GenerationError::Http { status: status.as_u16(), message });
    }

    let body: GenerateResponse =
      res.json().await.map_err(|e| GenerationError::Transport(e.to_string()))?;
    if let Some(usage) = &body.usage_metadata {
      info!(prompt_tokens = ?usage.prompt_token_count, completion_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, "Gemini usage");
    }
    let text = body.text();
    info!(elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");
    Ok(text)
  }
}

#[async_trait]
impl TextGenerator for GeminiClient {
  fn name(&self) -> &str {
    "gemini"
  }

  fn model(&self) -> &str {
    &self.model
  }

  async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
    self.generate_content(prompt).await
  }
}

// --- generateContent DTOs ---

#[derive(Serialize)]
struct GenerateRequest { contents: Vec<Content> }
#[derive(Serialize, Deserialize)]
struct Content {
  #[serde(default)] parts: Vec<Part>,
}
#[derive(Serialize, Deserialize)]
struct Part {
  #[serde(default)] text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
  #[serde(default)] candidates: Vec<Candidate>,
  #[serde(default)] usage_metadata: Option<UsageMetadata>,
}
#[derive(Deserialize)]
struct Candidate {
  #[serde(default)] content: Option<Content>,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

impl GenerateResponse {
  /// Concatenated text parts of the first candidate; empty when the model returned none.
  fn text(&self) -> String {
    self.candidates.first()
      .and_then(|c| c.content.as_ref())
      .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect::<String>())
      .unwrap_or_default()
  }
}
