//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{
    AnalysisRequest, Difficulty, Emphasis, EssayReview, Explanation, FeatureKind, FlashcardDeck,
    Priority, Quiz, Severity, StudyPlan, DEFAULT_CARD_COUNT, DEFAULT_DAILY_HOURS,
    DEFAULT_QUESTION_COUNT,
};
use crate::errors::{AppError, ErrorBody};
use crate::identity::{Session, SessionUser};
use crate::session::SessionEvent;

/// Short user-facing message, rendered by the SPA as a toast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { title: title.into(), description: description.into() }
    }

    pub fn essay_reviewed() -> Self {
        Self::new("Analysis Complete!", "Your essay has been analyzed. Check the feedback below.")
    }

    pub fn schedule_ready() -> Self {
        Self::new("Schedule generated successfully!", "Your personalized study plan is ready.")
    }

    pub fn quiz_ready(count: usize, topic: &str) -> Self {
        Self::new("Quiz generated!", format!("{count} questions ready for {topic}."))
    }

    pub fn explanation_ready() -> Self {
        Self::new("Explanation generated!", "Your topic explanation is ready.")
    }

    pub fn flashcards_ready(count: usize, topic: &str) -> Self {
        Self::new("Flashcards generated!", format!("{count} flashcards ready for {topic}."))
    }

    pub fn signed_up() -> Self {
        Self::new(
            "Account created successfully!",
            "Please check your email to verify your account before signing in.",
        )
    }

    pub fn signed_in() -> Self {
        Self::new("Welcome back!", "You have successfully signed in.")
    }

    pub fn signed_out() -> Self {
        Self::new("Signed out", "You have been signed out.")
    }
}

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Bind this socket to a signed-in session; session events for that user follow.
    Authenticate {
        #[serde(rename = "accessToken")]
        access_token: String,
    },
    ReviewEssay(EssayIn),
    PlanSchedule(ScheduleIn),
    GenerateQuiz(QuizIn),
    ExplainTopic(TopicIn),
    GenerateFlashcards(FlashcardsIn),
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Authenticated { user: SessionUser },
    Session { event: SessionEvent },
    EssayReview(FeatureOut<EssayReview>),
    Schedule(FeatureOut<StudyPlan>),
    Quiz(FeatureOut<Quiz>),
    Explanation(FeatureOut<Explanation>),
    Flashcards(FeatureOut<FlashcardDeck>),
    Error { error: ErrorBody },
}

impl ServerWsMessage {
    pub fn error(err: &AppError) -> Self {
        ServerWsMessage::Error { error: crate::errors::ErrorResponse::from(err).error }
    }
}

/// One UI emphasis per legal value, so the SPA never guesses badge colours.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LegendEntry {
    pub value: &'static str,
    pub emphasis: Emphasis,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Legend {
    pub severity: Vec<LegendEntry>,
    pub difficulty: Vec<LegendEntry>,
    pub priority: Vec<LegendEntry>,
}

impl Legend {
    pub fn standard() -> Self {
        Self {
            severity: Severity::ALL
                .iter()
                .map(|s| LegendEntry { value: s.as_str(), emphasis: s.emphasis() })
                .collect(),
            difficulty: Difficulty::ALL
                .iter()
                .map(|d| LegendEntry { value: d.as_str(), emphasis: d.emphasis() })
                .collect(),
            priority: Priority::ALL
                .iter()
                .map(|p| LegendEntry { value: p.as_str(), emphasis: p.emphasis() })
                .collect(),
        }
    }
}

/// Successful feature result, shared by HTTP and WS.
#[derive(Debug, Serialize)]
pub struct FeatureOut<T> {
    pub kind: FeatureKind,
    pub result: T,
    pub notice: Notice,
    pub legend: Legend,
}

impl<T> FeatureOut<T> {
    pub fn new(kind: FeatureKind, result: T, notice: Notice) -> Self {
        Self { kind, result, notice, legend: Legend::standard() }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    /// Name of the configured text generator, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    pub auth: bool,
}

#[derive(Debug, Deserialize)]
pub struct SignUpIn {
    pub email: String,
    pub password: String,
    #[serde(default, alias = "fullName", alias = "displayName")]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInIn {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SignUpOut {
    pub notice: Notice,
}

#[derive(Serialize)]
pub struct SignInOut {
    pub session: Session,
    pub notice: Notice,
}

#[derive(Serialize)]
pub struct SignOutOut {
    pub notice: Notice,
}

#[derive(Serialize)]
pub struct SessionOut {
    pub user: Option<SessionUser>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EssayIn {
    #[serde(default)]
    pub essay: String,
}

impl EssayIn {
    pub fn into_request(self) -> AnalysisRequest {
        AnalysisRequest::Essay { essay: self.essay }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleIn {
    #[serde(default)]
    pub syllabus: String,
    #[serde(default = "default_daily_hours", alias = "studyHours")]
    pub daily_hours: u32,
    #[serde(default)]
    pub target_date: Option<String>,
    /// The client's local date; the server date is used when absent.
    #[serde(default)]
    pub today: Option<String>,
}

fn default_daily_hours() -> u32 {
    DEFAULT_DAILY_HOURS
}

impl ScheduleIn {
    /// Dates are `YYYY-MM-DD`. A blank target date counts as missing.
    pub fn into_request(self, server_today: NaiveDate) -> Result<AnalysisRequest, AppError> {
        let target_date = match self.target_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(parse_date(s, "Please set a target date")?),
        };
        let today = match self.today.as_deref().map(str::trim) {
            None | Some("") => server_today,
            Some(s) => parse_date(s, "Invalid date")?,
        };
        Ok(AnalysisRequest::Schedule {
            syllabus: self.syllabus,
            daily_hours: self.daily_hours,
            today,
            target_date,
        })
    }
}

fn parse_date(s: &str, title: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::validation(title, format!("'{s}' is not a date in YYYY-MM-DD format.")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizIn {
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_question_count")]
    pub question_count: u32,
}

fn default_question_count() -> u32 {
    DEFAULT_QUESTION_COUNT
}

impl QuizIn {
    pub fn into_request(self) -> AnalysisRequest {
        AnalysisRequest::Quiz { topic: self.topic, question_count: self.question_count }
    }
}

#[derive(Debug, Deserialize)]
pub struct TopicIn {
    #[serde(default)]
    pub topic: String,
}

impl TopicIn {
    pub fn into_request(self) -> AnalysisRequest {
        AnalysisRequest::Explanation { topic: self.topic }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardsIn {
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_card_count")]
    pub card_count: u32,
}

fn default_card_count() -> u32 {
    DEFAULT_CARD_COUNT
}

impl FlashcardsIn {
    pub fn into_request(self) -> AnalysisRequest {
        AnalysisRequest::Flashcards { topic: self.topic, card_count: self.card_count }
    }
}
