//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Running an AI feature: validate, guard, prompt, generate, normalize
//!   - Wrapping each feature's result with its success notice
//!   - Sign-up, sign-in and sign-out against the identity provider

use chrono::Local;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
  AnalysisRequest, EssayReview, Explanation, FeatureKind, FlashcardDeck, Quiz, StudyPlan, StudySchedule,
};
use crate::errors::{AppError, AppResult};
use crate::identity::Session;
use crate::normalize::normalize_as;
use crate::prompt::build_prompt;
use crate::protocol::{FeatureOut, Notice};
use crate::schema::schema_for;
use crate::session::DEFAULT_SESSION_TTL;
use crate::state::AppState;
use crate::util::{preview, trunc_for_log};

const RAW_LOG_LIMIT: usize = 2000;

/// One full round trip for `req` on behalf of `owner`.
///
/// Validation runs before anything else, so an invalid request never reaches the
/// provider. The in-flight slot is held until this future completes or is dropped.
#[instrument(level = "info", skip(state, req), fields(kind = %req.kind(), %owner, body_len = req.body().len()))]
pub async fn run_feature<T: DeserializeOwned>(state: &AppState, owner: &str, req: &AnalysisRequest) -> AppResult<T> {
  let kind = req.kind();
  req.validate()?;

  let _guard = state.in_flight.try_begin(owner, kind).ok_or(AppError::Busy(kind))?;

  let generator = state.generator.as_ref().ok_or_else(|| AppError::Provider {
    title: kind.failure_title().to_string(),
    message: "No text generation provider configured. Set GEMINI_API_KEY or OPENAI_API_KEY.".into(),
  })?;

  let prompt = build_prompt(&state.prompts, req);
  let request_id = Uuid::new_v4().to_string();
  debug!(%request_id, prompt_len = prompt.len(), provider = %generator.name(), "Prompt built");

  let raw = generator.generate(&prompt).await.map_err(|e| {
    warn!(%request_id, error = %e, "Generation failed");
    AppError::Provider { title: kind.failure_title().to_string(), message: e.to_string() }
  })?;

  match normalize_as::<T>(&raw, schema_for(kind)) {
    Ok(result) => {
      info!(%request_id, raw_len = raw.len(), "Response normalized");
      Ok(result)
    }
    Err(failure) => {
      warn!(target: "normalizer", %request_id, %kind, raw = %trunc_for_log(&raw, RAW_LOG_LIMIT), "Could not parse model response");
      Err(AppError::Parse { failure, request_id })
    }
  }
}

pub async fn review_essay(state: &AppState, owner: &str, req: AnalysisRequest) -> AppResult<FeatureOut<EssayReview>> {
  let review: EssayReview = run_feature(state, owner, &req).await?;
  Ok(FeatureOut::new(FeatureKind::Essay, review, Notice::essay_reviewed()))
}

pub async fn plan_schedule(state: &AppState, owner: &str, req: AnalysisRequest) -> AppResult<FeatureOut<StudyPlan>> {
  let schedule: StudySchedule = run_feature(state, owner, &req).await?;
  let AnalysisRequest::Schedule { today, target_date, .. } = req else {
    return Err(AppError::Internal("schedule result for a non-schedule request".into()));
  };
  let plan = StudyPlan { schedule, start_date: today, end_date: target_date.unwrap_or(today) };
  Ok(FeatureOut::new(FeatureKind::Schedule, plan, Notice::schedule_ready()))
}

pub async fn generate_quiz(state: &AppState, owner: &str, req: AnalysisRequest) -> AppResult<FeatureOut<Quiz>> {
  let quiz: Quiz = run_feature(state, owner, &req).await?;
  for (i, q) in quiz.questions.iter().enumerate() {
    if !q.is_well_formed() {
      warn!(index = i, options = q.options.len(), correct_index = q.correct_index, "Quiz question is malformed");
    }
  }
  let notice = Notice::quiz_ready(quiz.questions.len(), req.body().trim());
  Ok(FeatureOut::new(FeatureKind::Quiz, quiz, notice))
}

pub async fn explain_topic(state: &AppState, owner: &str, req: AnalysisRequest) -> AppResult<FeatureOut<Explanation>> {
  let mut explanation: Explanation = run_feature(state, owner, &req).await?;
  if explanation.topic.trim().is_empty() {
    explanation.topic = req.body().trim().to_string();
  }
  Ok(FeatureOut::new(FeatureKind::Explanation, explanation, Notice::explanation_ready()))
}

pub async fn generate_flashcards(
  state: &AppState,
  owner: &str,
  req: AnalysisRequest,
) -> AppResult<FeatureOut<FlashcardDeck>> {
  let deck: FlashcardDeck = run_feature(state, owner, &req).await?;
  let notice = Notice::flashcards_ready(deck.cards.len(), req.body().trim());
  Ok(FeatureOut::new(FeatureKind::Flashcards, deck, notice))
}

/// Today on the server clock, for schedule requests that do not send their own.
pub fn server_today() -> chrono::NaiveDate {
  Local::now().date_naive()
}

// --- Auth ---

fn identity_unavailable(title: &str) -> AppError {
  AppError::Provider { title: title.to_string(), message: "Sign-in is not available on this server.".into() }
}

#[instrument(level = "info", skip(state, password, display_name), fields(email_len = email.len()))]
pub async fn sign_up(state: &AppState, email: &str, password: &str, display_name: &str) -> AppResult<Notice> {
  const TITLE: &str = "Sign Up Error";
  if email.trim().is_empty() || password.is_empty() {
    return Err(AppError::validation(TITLE, "Email and password are required."));
  }
  let identity = state.identity.as_ref().ok_or_else(|| identity_unavailable(TITLE))?;
  identity
    .register(email.trim(), password, display_name.trim(), state.auth_redirect_url.as_deref())
    .await
    .map_err(|error| AppError::Identity { title: TITLE.into(), error })?;
  Ok(Notice::signed_up())
}

#[instrument(level = "info", skip(state, password), fields(email_len = email.len()))]
pub async fn sign_in(state: &AppState, email: &str, password: &str) -> AppResult<(Session, Notice)> {
  const TITLE: &str = "Sign In Error";
  if email.trim().is_empty() || password.is_empty() {
    return Err(AppError::validation(TITLE, "Email and password are required."));
  }
  let identity = state.identity.as_ref().ok_or_else(|| identity_unavailable(TITLE))?;
  let session = identity
    .authenticate(email.trim(), password)
    .await
    .map_err(|error| AppError::Identity { title: TITLE.into(), error })?;
  let ttl = session.lifetime().unwrap_or(DEFAULT_SESSION_TTL);
  state.sessions.sign_in(&session.access_token, session.user.clone(), ttl).await;
  info!(user = %preview(&session.user.display_name, 32), "Session started");
  Ok((session, Notice::signed_in()))
}

/// The local session always ends, even when the provider call fails.
#[instrument(level = "info", skip_all)]
pub async fn sign_out(state: &AppState, access_token: &str) -> AppResult<Notice> {
  if let Some(identity) = &state.identity {
    if let Err(e) = identity.terminate_session(access_token).await {
      warn!(error = %e, "Provider sign-out failed; dropping local session anyway");
    }
  }
  state.sessions.sign_out(access_token).await;
  Ok(Notice::signed_out())
}
