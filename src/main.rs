//! StudyMate · AI Study Assistant Backend
//!
//! - Axum HTTP + WebSocket API
//! - Gemini or OpenAI text generation (via environment variables)
//! - Supabase (GoTrue) accounts and sessions
//! - Static SPA fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   LLM_PROVIDER       : "gemini" | "openai" (default: whichever has a key, Gemini first)
//!   GEMINI_API_KEY     : enables Gemini
//!   GEMINI_MODEL       : default "gemini-1.5-flash"
//!   GEMINI_BASE_URL    : default "https://generativelanguage.googleapis.com/v1beta"
//!   OPENAI_API_KEY     : enables OpenAI
//!   OPENAI_BASE_URL    : default "https://api.openai.com/v1"
//!   OPENAI_MODEL       : default "gpt-4o-mini"
//!   LLM_TIMEOUT_SECS   : text generation HTTP timeout (default 30)
//!   AUTH_TIMEOUT_SECS  : identity provider HTTP timeout (default 10)
//!   SUPABASE_URL       : enables accounts together with SUPABASE_ANON_KEY
//!   SUPABASE_ANON_KEY  : public anon key
//!   AUTH_REDIRECT_URL  : where confirmation emails send the user back to
//!   REQUIRE_AUTH       : require a session for AI features (default: on iff Supabase is set)
//!   STATIC_DIR         : built SPA (default "./static")
//!   STUDY_CONFIG_PATH  : path to TOML config (prompt template overrides)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default), "compact" or "json"

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::info;

use studymate_backend::config::Settings;
use studymate_backend::routes::build_router;
use studymate_backend::state::AppState;
use studymate_backend::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let settings = Settings::from_env();

  // Shared application state (prompts, provider clients, sessions).
  let state = Arc::new(AppState::from_settings(&settings));

  // HTTP router with routes, CORS and tracing layers.
  let app = build_router(state, &settings.static_dir);

  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "studymate_backend", %addr, static_dir = %settings.static_dir.display(), "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "studymate_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "studymate_backend", error = %e, "Failed to listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
  info!(target: "studymate_backend", "Shutdown signal received");
}
