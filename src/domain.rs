//! Domain models: feature kinds, analysis requests, and the normalized results
//! handed back to the SPA.
//!
//! Every result type here is the typed target of the response normalizer, so all
//! list fields are plain `Vec`s (never optional) and all numbers are concrete.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub const DEFAULT_DAILY_HOURS: u32 = 2;
pub const DEFAULT_QUESTION_COUNT: u32 = 5;
pub const DEFAULT_CARD_COUNT: u32 = 6;

const MAX_DAILY_HOURS: u32 = 24;
const MAX_QUESTION_COUNT: u32 = 20;
const MAX_CARD_COUNT: u32 = 30;

/// Which AI-backed feature a request belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
  Essay,
  Schedule,
  Quiz,
  Explanation,
  Flashcards,
}

impl FeatureKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      FeatureKind::Essay => "essay",
      FeatureKind::Schedule => "schedule",
      FeatureKind::Quiz => "quiz",
      FeatureKind::Explanation => "explanation",
      FeatureKind::Flashcards => "flashcards",
    }
  }

  /// Notice title shown when the provider call for this feature fails.
  pub fn failure_title(&self) -> &'static str {
    match self {
      FeatureKind::Essay => "Error analyzing essay",
      FeatureKind::Schedule => "Error generating schedule",
      FeatureKind::Quiz => "Error generating quiz",
      FeatureKind::Explanation => "Error generating explanation",
      FeatureKind::Flashcards => "Error generating flashcards",
    }
  }
}

impl std::fmt::Display for FeatureKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One user submission. Lives for a single round trip.
#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisRequest {
  Essay {
    essay: String,
  },
  Schedule {
    syllabus: String,
    daily_hours: u32,
    today: NaiveDate,
    target_date: Option<NaiveDate>,
  },
  Quiz {
    topic: String,
    question_count: u32,
  },
  Explanation {
    topic: String,
  },
  Flashcards {
    topic: String,
    card_count: u32,
  },
}

impl AnalysisRequest {
  pub fn kind(&self) -> FeatureKind {
    match self {
      AnalysisRequest::Essay { .. } => FeatureKind::Essay,
      AnalysisRequest::Schedule { .. } => FeatureKind::Schedule,
      AnalysisRequest::Quiz { .. } => FeatureKind::Quiz,
      AnalysisRequest::Explanation { .. } => FeatureKind::Explanation,
      AnalysisRequest::Flashcards { .. } => FeatureKind::Flashcards,
    }
  }

  /// The free-text body embedded in the prompt (essay, syllabus or topic).
  pub fn body(&self) -> &str {
    match self {
      AnalysisRequest::Essay { essay } => essay,
      AnalysisRequest::Schedule { syllabus, .. } => syllabus,
      AnalysisRequest::Quiz { topic, .. }
      | AnalysisRequest::Explanation { topic }
      | AnalysisRequest::Flashcards { topic, .. } => topic,
    }
  }

  /// Local checks run before any provider call. A failure here never reaches the model.
  pub fn validate(&self) -> Result<(), AppError> {
    match self {
      AnalysisRequest::Essay { essay } => {
        if essay.trim().is_empty() {
          return Err(AppError::validation(
            "Please enter some text",
            "Write or paste your essay to get AI-powered feedback.",
          ));
        }
      }
      AnalysisRequest::Schedule { syllabus, daily_hours, today, target_date } => {
        if syllabus.trim().is_empty() {
          return Err(AppError::validation(
            "Please add syllabus content",
            "Enter your syllabus text manually.",
          ));
        }
        let Some(target) = target_date else {
          return Err(AppError::validation(
            "Please set a target date",
            "Select when you want to complete your studies.",
          ));
        };
        if target < today {
          return Err(AppError::validation(
            "Please set a target date",
            "The target date cannot be in the past.",
          ));
        }
        if *daily_hours == 0 || *daily_hours > MAX_DAILY_HOURS {
          return Err(AppError::validation(
            "Invalid study hours",
            format!("Study hours per day must be between 1 and {MAX_DAILY_HOURS}."),
          ));
        }
      }
      AnalysisRequest::Quiz { topic, question_count } => {
        require_topic(topic, "Type a topic to generate quiz questions.")?;
        require_count(*question_count, MAX_QUESTION_COUNT, "questions")?;
      }
      AnalysisRequest::Explanation { topic } => {
        require_topic(topic, "Type a topic you'd like to learn about.")?;
      }
      AnalysisRequest::Flashcards { topic, card_count } => {
        require_topic(topic, "Type a topic to generate flashcards.")?;
        require_count(*card_count, MAX_CARD_COUNT, "flashcards")?;
      }
    }
    Ok(())
  }
}

fn require_topic(topic: &str, description: &str) -> Result<(), AppError> {
  if topic.trim().is_empty() {
    return Err(AppError::validation("Please enter a topic", description));
  }
  Ok(())
}

fn require_count(count: u32, max: u32, what: &str) -> Result<(), AppError> {
  if count == 0 || count > max {
    return Err(AppError::validation(
      "Invalid count",
      format!("Ask for between 1 and {max} {what}."),
    ));
  }
  Ok(())
}

/// Visual emphasis the SPA applies to a badge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emphasis {
  Destructive,
  Warning,
  Success,
}

// --- Essay review ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Low,
  Medium,
  High,
}

impl Severity {
  pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

  /// Higher severity reads as more alarming: high is destructive, low is success.
  pub fn emphasis(&self) -> Emphasis {
    match self {
      Severity::High => Emphasis::Destructive,
      Severity::Medium => Emphasis::Warning,
      Severity::Low => Emphasis::Success,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Severity::Low => "low",
      Severity::Medium => "medium",
      Severity::High => "high",
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleKind {
  Clarity,
  Flow,
  Vocabulary,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrammarIssue {
  pub text: String,
  pub suggestion: String,
  pub severity: Severity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StyleIssue {
  pub text: String,
  pub suggestion: String,
  #[serde(rename = "type")]
  pub kind: StyleKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionFeedback {
  pub section: String,
  pub feedback: String,
  pub score: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EssayReview {
  pub score: i64,
  pub summary: String,
  pub strengths: Vec<String>,
  pub improvements: Vec<String>,
  pub grammar_issues: Vec<GrammarIssue>,
  pub style_issues: Vec<StyleIssue>,
  pub structure: Vec<SectionFeedback>,
  pub enhanced_version: String,
}

// --- Study schedule ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

  pub fn emphasis(&self) -> Emphasis {
    match self {
      Difficulty::Easy => Emphasis::Success,
      Difficulty::Medium => Emphasis::Warning,
      Difficulty::Hard => Emphasis::Destructive,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "Easy",
      Difficulty::Medium => "Medium",
      Difficulty::Hard => "Hard",
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
  Low,
  Medium,
  High,
}

impl Priority {
  pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

  pub fn emphasis(&self) -> Emphasis {
    match self {
      Priority::High => Emphasis::Destructive,
      Priority::Medium => Emphasis::Warning,
      Priority::Low => Emphasis::Success,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Priority::Low => "Low",
      Priority::Medium => "Medium",
      Priority::High => "High",
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
  pub name: String,
  pub estimated_hours: f64,
  pub difficulty: Difficulty,
  pub priority: Priority,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySchedule {
  pub total_hours: f64,
  pub days_needed: i64,
  pub topics: Vec<Topic>,
}

/// A schedule plus the date range it was requested for.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlan {
  #[serde(flatten)]
  pub schedule: StudySchedule,
  pub start_date: NaiveDate,
  pub end_date: NaiveDate,
}

// --- Quiz ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub question: String,
  pub options: Vec<String>,
  pub correct_index: i64,
  pub explanation: String,
}

impl Question {
  /// The option `correct_index` points at, if it points anywhere.
  pub fn correct_option(&self) -> Option<&str> {
    usize::try_from(self.correct_index)
      .ok()
      .and_then(|i| self.options.get(i))
      .map(String::as_str)
  }

  /// At least two options and an in-range answer index.
  pub fn is_well_formed(&self) -> bool {
    self.options.len() >= 2 && self.correct_option().is_some()
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
  pub questions: Vec<Question>,
}

// --- Explanation ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
  pub topic: String,
  pub summary: String,
  pub key_points: Vec<String>,
  pub examples: Vec<String>,
  pub content: String,
}

// --- Flashcards ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
  pub front: String,
  pub back: String,
  pub difficulty: Difficulty,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlashcardDeck {
  pub cards: Vec<Flashcard>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
  }

  fn schedule(syllabus: &str, hours: u32, target: Option<NaiveDate>) -> AnalysisRequest {
    AnalysisRequest::Schedule { syllabus: syllabus.into(), daily_hours: hours, today: today(), target_date: target }
  }

  fn title_of(err: AppError) -> String {
    err.notice().title
  }

  #[test]
  fn empty_essay_is_rejected() {
    let err = AnalysisRequest::Essay { essay: "   \n".into() }.validate().unwrap_err();
    assert_eq!(title_of(err), "Please enter some text");
  }

  #[test]
  fn schedule_requires_syllabus_and_target_date() {
    let err = schedule("", 2, Some(today())).validate().unwrap_err();
    assert_eq!(title_of(err), "Please add syllabus content");

    let err = schedule("Chapter 1", 2, None).validate().unwrap_err();
    assert_eq!(title_of(err), "Please set a target date");

    let past = NaiveDate::from_ymd_opt(2025, 2, 1);
    assert!(schedule("Chapter 1", 2, past).validate().is_err());

    assert!(schedule("Chapter 1", 0, Some(today())).validate().is_err());
    assert!(schedule("Chapter 1", 2, Some(today())).validate().is_ok());
  }

  #[test]
  fn topic_features_require_topic() {
    let err = AnalysisRequest::Explanation { topic: " ".into() }.validate().unwrap_err();
    assert_eq!(title_of(err), "Please enter a topic");
    assert!(AnalysisRequest::Quiz { topic: "Graphs".into(), question_count: 0 }.validate().is_err());
    assert!(AnalysisRequest::Flashcards { topic: "Graphs".into(), card_count: 4 }.validate().is_ok());
  }

  #[test]
  fn severity_mapping_is_consistent() {
    assert_eq!(Severity::High.emphasis(), Emphasis::Destructive);
    assert_eq!(Severity::Medium.emphasis(), Emphasis::Warning);
    assert_eq!(Severity::Low.emphasis(), Emphasis::Success);
    assert_eq!(Difficulty::Hard.emphasis(), Emphasis::Destructive);
    assert_eq!(Priority::Low.emphasis(), Emphasis::Success);
  }

  #[test]
  fn every_emphasis_is_used_by_some_value() {
    let used: Vec<Emphasis> = Severity::ALL
      .iter()
      .map(Severity::emphasis)
      .chain(Difficulty::ALL.iter().map(Difficulty::emphasis))
      .chain(Priority::ALL.iter().map(Priority::emphasis))
      .collect();
    for emphasis in [Emphasis::Destructive, Emphasis::Warning, Emphasis::Success] {
      assert!(used.contains(&emphasis));
    }
    let names: Vec<String> = used.iter().map(|e| serde_json::to_value(e).unwrap().to_string()).collect();
    assert!(names.iter().all(|n| ["\"destructive\"", "\"warning\"", "\"success\""].contains(&n.as_str())));
  }

  #[test]
  fn correct_option_is_bounds_checked() {
    let mut q = Question {
      question: "Q?".into(),
      options: vec!["A".into(), "B".into()],
      correct_index: 1,
      explanation: String::new(),
    };
    assert_eq!(q.correct_option(), Some("B"));
    assert!(q.is_well_formed());

    q.correct_index = 4;
    assert_eq!(q.correct_option(), None);
    q.correct_index = -1;
    assert!(!q.is_well_formed());
  }

  #[test]
  fn study_plan_flattens_schedule() {
    let plan = StudyPlan {
      schedule: StudySchedule { total_hours: 10.0, days_needed: 5, topics: vec![] },
      start_date: today(),
      end_date: NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
    };
    let v = serde_json::to_value(&plan).unwrap();
    assert_eq!(v["totalHours"], 10.0);
    assert_eq!(v["daysNeeded"], 5);
    assert_eq!(v["startDate"], "2025-03-01");
    assert_eq!(v["endDate"], "2025-03-06");
  }
}
