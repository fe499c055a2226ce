//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented with input sizes (never contents).
//!
//! Feature requests run on behalf of the bearer token's user when signed in,
//! else the `x-client-id` header the SPA sends.

use std::sync::Arc;

use axum::{
  extract::State,
  http::{header::AUTHORIZATION, HeaderMap},
  Json,
};
use tracing::{info, instrument};

use crate::domain::{EssayReview, Explanation, FlashcardDeck, Quiz, StudyPlan};
use crate::errors::{AppError, AppResult};
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// `Authorization: Bearer <token>`, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
  let (scheme, token) = value.split_once(' ')?;
  let token = token.trim();
  (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

async fn owner_of(state: &AppState, headers: &HeaderMap) -> AppResult<String> {
  let client_id = headers.get(CLIENT_ID_HEADER).and_then(|v| v.to_str().ok());
  state.resolve_owner(bearer_token(headers), client_id).await
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  Json(HealthOut {
    ok: true,
    generator: state.generator.as_ref().map(|g| g.name().to_string()),
    auth: state.identity.is_some(),
  })
}

#[instrument(level = "info", skip(state, body), fields(email_len = body.email.len()))]
pub async fn http_sign_up(State(state): State<Arc<AppState>>, Json(body): Json<SignUpIn>) -> AppResult<Json<SignUpOut>> {
  let notice = sign_up(&state, &body.email, &body.password, &body.name).await?;
  Ok(Json(SignUpOut { notice }))
}

#[instrument(level = "info", skip(state, body), fields(email_len = body.email.len()))]
pub async fn http_sign_in(State(state): State<Arc<AppState>>, Json(body): Json<SignInIn>) -> AppResult<Json<SignInOut>> {
  let (session, notice) = sign_in(&state, &body.email, &body.password).await?;
  Ok(Json(SignInOut { session, notice }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_sign_out(State(state): State<Arc<AppState>>, headers: HeaderMap) -> AppResult<Json<SignOutOut>> {
  let token = bearer_token(&headers).ok_or_else(|| AppError::Unauthorized("No active session.".into()))?;
  let notice = sign_out(&state, token).await?;
  Ok(Json(SignOutOut { notice }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_session(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<SessionOut> {
  let user = match bearer_token(&headers) {
    Some(token) => state.session_user(token).await,
    None => None,
  };
  Json(SessionOut { user })
}

#[instrument(level = "info", skip_all, fields(essay_len = body.essay.len()))]
pub async fn http_review_essay(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<EssayIn>,
) -> AppResult<Json<FeatureOut<EssayReview>>> {
  let owner = owner_of(&state, &headers).await?;
  let out = review_essay(&state, &owner, body.into_request()).await?;
  info!(score = out.result.score, grammar = out.result.grammar_issues.len(), "HTTP essay reviewed");
  Ok(Json(out))
}

#[instrument(level = "info", skip_all, fields(syllabus_len = body.syllabus.len(), daily_hours = body.daily_hours))]
pub async fn http_plan_schedule(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<ScheduleIn>,
) -> AppResult<Json<FeatureOut<StudyPlan>>> {
  let owner = owner_of(&state, &headers).await?;
  let req = body.into_request(server_today())?;
  let out = plan_schedule(&state, &owner, req).await?;
  info!(topics = out.result.schedule.topics.len(), days = out.result.schedule.days_needed, "HTTP schedule planned");
  Ok(Json(out))
}

#[instrument(level = "info", skip_all, fields(topic_len = body.topic.len(), count = body.question_count))]
pub async fn http_generate_quiz(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<QuizIn>,
) -> AppResult<Json<FeatureOut<Quiz>>> {
  let owner = owner_of(&state, &headers).await?;
  let out = generate_quiz(&state, &owner, body.into_request()).await?;
  info!(questions = out.result.questions.len(), "HTTP quiz generated");
  Ok(Json(out))
}

#[instrument(level = "info", skip_all, fields(topic_len = body.topic.len()))]
pub async fn http_explain_topic(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<TopicIn>,
) -> AppResult<Json<FeatureOut<Explanation>>> {
  let owner = owner_of(&state, &headers).await?;
  let out = explain_topic(&state, &owner, body.into_request()).await?;
  Ok(Json(out))
}

#[instrument(level = "info", skip_all, fields(topic_len = body.topic.len(), count = body.card_count))]
pub async fn http_generate_flashcards(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<FlashcardsIn>,
) -> AppResult<Json<FeatureOut<FlashcardDeck>>> {
  let owner = owner_of(&state, &headers).await?;
  let out = generate_flashcards(&state, &owner, body.into_request()).await?;
  info!(cards = out.result.cards.len(), "HTTP flashcards generated");
  Ok(Json(out))
}
