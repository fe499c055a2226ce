//! StudyMate backend: AI study assistant over HTTP + WebSocket.
//!
//! Essay review, study schedules, quizzes, topic explanations and flashcards are
//! generated by a text model and normalized into typed results; accounts and
//! sessions go through an identity provider.

pub mod config;
pub mod domain;
pub mod errors;
pub mod gemini;
pub mod generator;
pub mod identity;
pub mod inflight;
pub mod logic;
pub mod normalize;
pub mod openai;
pub mod prompt;
pub mod protocol;
pub mod routes;
pub mod schema;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod util;
