use std::{
  path::Path,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  },
};

use async_trait::async_trait;
use axum::{
  body::{to_bytes, Body},
  http::{Request, StatusCode},
  Router,
};
use serde_json::{json, Value};
use tokio::sync::{Notify, Semaphore};
use tower::ServiceExt;

use studymate_backend::config::Prompts;
use studymate_backend::domain::{AnalysisRequest, FeatureKind, Quiz};
use studymate_backend::errors::AppError;
use studymate_backend::generator::{GenerationError, TextGenerator};
use studymate_backend::identity::{IdentityError, IdentityProvider, Session, SessionUser};
use studymate_backend::logic::run_feature;
use studymate_backend::routes::build_router;
use studymate_backend::state::AppState;

struct FakeGenerator {
  reply: Result<String, GenerationError>,
  calls: AtomicUsize,
}

impl FakeGenerator {
  fn replying(text: &str) -> Arc<Self> {
    Arc::new(Self { reply: Ok(text.to_string()), calls: AtomicUsize::new(0) })
  }

  fn failing(err: GenerationError) -> Arc<Self> {
    Arc::new(Self { reply: Err(err), calls: AtomicUsize::new(0) })
  }

  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
  fn name(&self) -> &str {
    "fake"
  }

  fn model(&self) -> &str {
    "fake-1"
  }

  async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.reply.clone()
  }
}

struct FakeIdentity;

fn ada() -> SessionUser {
  SessionUser { id: "user-ada".into(), email: "ada@example.com".into(), display_name: "Ada".into() }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
  fn name(&self) -> &str {
    "fake"
  }

  async fn register(&self, email: &str, _: &str, _: &str, _: Option<&str>) -> Result<(), IdentityError> {
    if email == "taken@example.com" {
      return Err(IdentityError::from_provider_message("User already registered"));
    }
    Ok(())
  }

  async fn authenticate(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
    match (email, password) {
      ("unconfirmed@example.com", _) => Err(IdentityError::from_provider_message("Email not confirmed")),
      ("lapsed@example.com", _) => Ok(Session {
        access_token: "tok-lapsed".into(),
        refresh_token: None,
        expires_in: Some(0),
        user: SessionUser { id: "user-lapsed".into(), email: "lapsed@example.com".into(), display_name: "Lapsed".into() },
      }),
      ("ada@example.com", "correct horse") => Ok(Session {
        access_token: "tok-ada".into(),
        refresh_token: None,
        expires_in: Some(3600),
        user: ada(),
      }),
      _ => Err(IdentityError::from_provider_message("Invalid login credentials")),
    }
  }

  async fn terminate_session(&self, _access_token: &str) -> Result<(), IdentityError> {
    Ok(())
  }

  async fn user_for_token(&self, _access_token: &str) -> Result<SessionUser, IdentityError> {
    Err(IdentityError::Other("invalid JWT".into()))
  }
}

fn app(generator: Arc<FakeGenerator>, require_auth: bool) -> Router {
  let identity: Option<Arc<dyn IdentityProvider>> = Some(Arc::new(FakeIdentity));
  let state = AppState::with_parts(Prompts::default(), Some(generator), identity, require_auth);
  build_router(Arc::new(state), Path::new("./static-does-not-exist"))
}

fn post(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
  let mut req = Request::builder()
    .method("POST")
    .uri(uri)
    .header("content-type", "application/json")
    .header("x-client-id", "client-1");
  if let Some(t) = token {
    req = req.header("authorization", format!("Bearer {t}"));
  }
  req.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
  let res = app.clone().oneshot(req).await.unwrap();
  let status = res.status();
  let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
  let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
  (status, body)
}

#[tokio::test]
async fn health_reports_providers() {
  let app = app(FakeGenerator::replying("{}"), false);
  let req = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
  let (status, body) = send(&app, req).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({"ok": true, "generator": "fake", "auth": true}));
}

#[tokio::test]
async fn fenced_essay_review_is_normalized() {
  let gen = FakeGenerator::replying(
    "```json\n{\"score\":82,\"summary\":\"Good\",\"strengths\":[\"Clear thesis\"],\"improvements\":[]}\n```",
  );
  let app = app(gen.clone(), false);
  let (status, body) = send(&app, post("/api/v1/essay/review", json!({"essay": "My essay."}), None)).await;

  assert_eq!(status, StatusCode::OK);
  assert_eq!(gen.calls(), 1);
  let result = &body["result"];
  assert_eq!(result["score"], 82);
  assert_eq!(result["summary"], "Good");
  assert_eq!(result["strengths"], json!(["Clear thesis"]));
  assert_eq!(result["improvements"], json!([]));
  assert_eq!(result["grammarIssues"], json!([]));
  assert_eq!(result["styleIssues"], json!([]));
  assert_eq!(result["structure"], json!([]));
  assert_eq!(body["notice"]["title"], "Analysis Complete!");
  assert_eq!(body["legend"]["severity"][2], json!({"value": "high", "emphasis": "destructive"}));
}

#[tokio::test]
async fn empty_essay_never_reaches_the_provider() {
  let gen = FakeGenerator::replying("{}");
  let app = app(gen.clone(), false);
  let (status, body) = send(&app, post("/api/v1/essay/review", json!({"essay": "   "}), None)).await;

  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["title"], "Please enter some text");
  assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
  assert_eq!(gen.calls(), 0);
}

#[tokio::test]
async fn quiz_with_aliased_keys() {
  let gen = FakeGenerator::replying(
    r#"{"que":[{"question":"Q1?","options":["A","B","C","D"],"correct":1,"explanation":"B"}]}"#,
  );
  let app = app(gen, false);
  let (status, body) = send(&app, post("/api/v1/quiz", json!({"topic": "Graphs", "questionCount": 1}), None)).await;

  assert_eq!(status, StatusCode::OK);
  let q = &body["result"]["questions"][0];
  assert_eq!(q["question"], "Q1?");
  assert_eq!(q["options"], json!(["A", "B", "C", "D"]));
  assert_eq!(q["correctIndex"], 1);
  assert_eq!(q["explanation"], "B");
  assert_eq!(body["notice"]["description"], "1 questions ready for Graphs.");
}

#[tokio::test]
async fn unparseable_output_is_422_without_raw_text() {
  let gen = FakeGenerator::replying("Sorry, something went sideways.");
  let app = app(gen, false);
  let (status, body) = send(&app, post("/api/v1/flashcards", json!({"topic": "Cells"}), None)).await;

  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["error"]["title"], "AI response invalid");
  assert_eq!(body["error"]["description"], "Could not parse AI response.");
  assert!(body["error"]["requestId"].is_string());
  assert!(!body.to_string().contains("sideways"));
}

#[tokio::test]
async fn provider_failure_is_502() {
  let gen = FakeGenerator::failing(GenerationError::Http { status: 503, message: "overloaded".into() });
  let app = app(gen, false);
  let (status, body) = send(&app, post("/api/v1/explanation", json!({"topic": "Recursion"}), None)).await;

  assert_eq!(status, StatusCode::BAD_GATEWAY);
  assert_eq!(body["error"]["title"], "Error generating explanation");
  assert_eq!(body["error"]["code"], "PROVIDER_ERROR");
}

#[tokio::test]
async fn schedule_requires_a_target_date() {
  let gen = FakeGenerator::replying("12\n30");
  let app = app(gen.clone(), false);
  let (status, body) = send(&app, post("/api/v1/schedule", json!({"syllabus": "Ch 1"}), None)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["title"], "Please set a target date");

  let input = json!({"syllabus": "Ch 1", "dailyHours": 2, "today": "2025-03-01", "targetDate": "2025-03-31"});
  let (status, body) = send(&app, post("/api/v1/schedule", input, None)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["result"]["totalHours"], 12.0);
  assert_eq!(body["result"]["daysNeeded"], 30);
  assert_eq!(body["result"]["topics"], json!([]));
  assert_eq!(body["result"]["endDate"], "2025-03-31");
  assert_eq!(gen.calls(), 1);
}

#[tokio::test]
async fn auth_required_until_signed_in() {
  let gen = FakeGenerator::replying(r#"{"cards": [{"front": "A", "back": "B", "difficulty": "Easy"}]}"#);
  let app = app(gen.clone(), true);

  let (status, body) = send(&app, post("/api/v1/flashcards", json!({"topic": "Cells"}), None)).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["error"]["code"], "UNAUTHORIZED");
  assert_eq!(gen.calls(), 0);

  let creds = json!({"email": "ada@example.com", "password": "correct horse"});
  let (status, body) = send(&app, post("/api/v1/auth/signin", creds, None)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["notice"]["title"], "Welcome back!");
  let token = body["session"]["accessToken"].as_str().unwrap().to_string();

  let (status, body) = send(&app, post("/api/v1/flashcards", json!({"topic": "Cells"}), Some(&token))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["result"]["cards"][0]["front"], "A");

  let session_req = Request::builder()
    .uri("/api/v1/auth/session")
    .header("authorization", format!("Bearer {token}"))
    .body(Body::empty())
    .unwrap();
  let (_, body) = send(&app, session_req).await;
  assert_eq!(body["user"]["displayName"], "Ada");

  let (status, _) = send(&app, post("/api/v1/auth/signout", json!({}), Some(&token))).await;
  assert_eq!(status, StatusCode::OK);
  let (status, _) = send(&app, post("/api/v1/flashcards", json!({"topic": "Cells"}), Some(&token))).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_session_no_longer_authorizes() {
  let gen = FakeGenerator::replying(r#"{"cards": [{"front": "A", "back": "B"}]}"#);
  let app = app(gen.clone(), true);

  let creds = json!({"email": "lapsed@example.com", "password": "pw"});
  let (status, body) = send(&app, post("/api/v1/auth/signin", creds, None)).await;
  assert_eq!(status, StatusCode::OK);
  let token = body["session"]["accessToken"].as_str().unwrap().to_string();

  let (status, _) = send(&app, post("/api/v1/flashcards", json!({"topic": "Cells"}), Some(&token))).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(gen.calls(), 0);
}

#[tokio::test]
async fn unconfirmed_email_gets_friendly_message() {
  let app = app(FakeGenerator::replying("{}"), false);
  let creds = json!({"email": "unconfirmed@example.com", "password": "pw"});
  let (status, body) = send(&app, post("/api/v1/auth/signin", creds, None)).await;

  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["error"]["title"], "Sign In Error");
  assert_eq!(
    body["error"]["description"],
    "Please check your email and confirm your account before signing in."
  );
}

#[tokio::test]
async fn sign_up_passes_provider_message_through() {
  let app = app(FakeGenerator::replying("{}"), false);
  let (status, body) = send(
    &app,
    post("/api/v1/auth/signup", json!({"email": "new@example.com", "password": "pw", "name": "New"}), None),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["notice"]["title"], "Account created successfully!");

  let (status, body) = send(
    &app,
    post("/api/v1/auth/signup", json!({"email": "taken@example.com", "password": "pw"}), None),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["description"], "User already registered");
}

/// Blocks inside `generate` until released, so a second request can race it.
struct GatedGenerator {
  entered: Notify,
  release: Notify,
}

#[async_trait]
impl TextGenerator for GatedGenerator {
  fn name(&self) -> &str {
    "gated"
  }

  fn model(&self) -> &str {
    "gated-1"
  }

  async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
    self.entered.notify_one();
    self.release.notified().await;
    Ok(r#"{"questions": []}"#.into())
  }
}

#[tokio::test]
async fn concurrent_same_feature_is_busy() {
  let gen = Arc::new(GatedGenerator { entered: Notify::new(), release: Notify::new() });
  let state = AppState::with_parts(Prompts::default(), Some(gen.clone()), None, false);
  let req = AnalysisRequest::Quiz { topic: "Graphs".into(), question_count: 3 };

  let first = {
    let state = state.clone();
    let req = req.clone();
    tokio::spawn(async move { run_feature::<Quiz>(&state, "alice", &req).await })
  };
  gen.entered.notified().await;

  let err = run_feature::<Quiz>(&state, "alice", &req).await.unwrap_err();
  assert!(matches!(err, AppError::Busy(FeatureKind::Quiz)));
  assert_eq!(err.status_code(), StatusCode::CONFLICT);

  gen.release.notify_one();
  let quiz = first.await.unwrap().unwrap();
  assert!(quiz.questions.is_empty());
  assert!(!state.in_flight.is_active("alice", FeatureKind::Quiz));
}

/// Holds every `generate` call until permits are added.
struct HeldGenerator {
  entered: Notify,
  permits: Semaphore,
}

#[async_trait]
impl TextGenerator for HeldGenerator {
  fn name(&self) -> &str {
    "held"
  }

  fn model(&self) -> &str {
    "held-1"
  }

  async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
    self.entered.notify_one();
    let permit = self.permits.acquire().await.map_err(|e| GenerationError::Transport(e.to_string()))?;
    permit.forget();
    Ok(r#"{"questions": [{"question": "Q?", "options": ["a", "b"]}]}"#.into())
  }
}

fn post_without_client_id(uri: &str, body: Value) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri(uri)
    .header("content-type", "application/json")
    .body(Body::from(body.to_string()))
    .unwrap()
}

#[tokio::test]
async fn unrelated_anonymous_clients_do_not_block_each_other() {
  let gen = Arc::new(HeldGenerator { entered: Notify::new(), permits: Semaphore::new(0) });
  let state = AppState::with_parts(Prompts::default(), Some(gen.clone()), None, false);
  let app = build_router(Arc::new(state), Path::new("./static-does-not-exist"));
  let input = json!({"topic": "Graphs", "questionCount": 1});

  let first = {
    let app = app.clone();
    let req = post_without_client_id("/api/v1/quiz", input.clone());
    tokio::spawn(async move { send(&app, req).await })
  };
  gen.entered.notified().await;

  let second = {
    let app = app.clone();
    let req = post_without_client_id("/api/v1/quiz", input);
    tokio::spawn(async move { send(&app, req).await })
  };
  gen.permits.add_permits(2);

  let (first_status, _) = first.await.unwrap();
  let (second_status, body) = second.await.unwrap();
  assert_eq!(first_status, StatusCode::OK);
  assert_eq!(second_status, StatusCode::OK);
  assert_eq!(body["result"]["questions"][0]["question"], "Q?");
}
