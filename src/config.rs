//! Runtime configuration: environment settings plus optional TOML prompt overrides.
//!
//! See `StudyConfig` and `Prompts` for the TOML schema. Every prompt template may be
//! overridden individually; missing ones keep their defaults.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct StudyConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

const NO_FENCES: &str = "Do not format your response as code or use code blocks. Return only the raw JSON text without any markdown formatting or additional explanation.";

/// Prompt templates, one per feature. Placeholders are `{name}` slots filled once.
///
/// * essay: `{essay}`
/// * schedule: `{syllabus}`, `{daily_hours}`, `{today}`, `{target_date}`
/// * quiz: `{topic}`, `{question_count}`
/// * explanation: `{topic}`
/// * flashcards: `{topic}`, `{card_count}`
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub essay_template: String,
  pub schedule_template: String,
  pub quiz_template: String,
  pub explanation_template: String,
  pub flashcards_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      essay_template: format!(
        r#"You are an AI essay reviewer. Analyze the following essay and provide feedback as a JSON response. {NO_FENCES}

Essay: "{{essay}}"

Provide your analysis in this exact JSON structure:

{{
  "score": <overall score from 0 to 100>,
  "summary": "<one or two sentence overall assessment>",
  "strengths": ["<strength>", ...],
  "improvements": ["<area to improve>", ...],
  "grammarIssues": [
    {{ "text": "<excerpt>", "suggestion": "<correction>", "severity": "low|medium|high" }}
  ],
  "styleIssues": [
    {{ "text": "<excerpt>", "suggestion": "<suggestion>", "type": "clarity|flow|vocabulary" }}
  ],
  "structure": [
    {{ "section": "<Introduction|Body Paragraphs|Conclusion>", "feedback": "<feedback>", "score": <0-100> }}
  ],
  "enhancedVersion": "<the full essay rewritten with the improvements applied>"
}}"#
      ),
      schedule_template: format!(
        r#"You are an AI schedule generator for a given syllabus. Analyze the following details (syllabus of the subject, study hours per day and the target date by which study should be completed) and provide a study plan as a JSON response. {NO_FENCES}

Syllabus: "{{syllabus}}"

Study hours per day: {{daily_hours}}

Today's date: {{today}} (YYYY-MM-DD)
Target date: {{target_date}} (YYYY-MM-DD)

Provide your analysis in this exact JSON structure:

{{
  "totalHours": <total number of hours required>,
  "daysNeeded": <number of days required>,
  "topics": [
    {{ "name": "<chapter name>", "difficulty": "Easy|Medium|Hard", "priority": "Low|Medium|High", "estimatedHours": <study hours for this chapter> }}
  ]
}}

Notes:
- If the time available is more than needed, suggest "totalHours" and "daysNeeded" according to the study hours the chapters actually need.
- The goal is an overview of every chapter, not deep study of each.
- Base "totalHours" and "daysNeeded" on the time remaining until the target date at the given hours per day."#
      ),
      quiz_template: format!(
        r#"You are an AI quiz generator. Write {{question_count}} multiple-choice questions about the following topic and return them as a JSON response. {NO_FENCES}

Topic: "{{topic}}"

Provide the quiz in this exact JSON structure:

{{
  "questions": [
    {{ "question": "<question text>", "options": ["<option A>", "<option B>", "<option C>", "<option D>"], "correctIndex": <0-based index of the correct option>, "explanation": "<why that option is correct>" }}
  ]
}}"#
      ),
      explanation_template: format!(
        r#"You are an AI tutor. Explain the following topic clearly for a student and return the explanation as a JSON response. {NO_FENCES}

Topic: "{{topic}}"

Provide the explanation in this exact JSON structure:

{{
  "topic": "<topic title>",
  "summary": "<two or three sentence overview>",
  "keyPoints": ["<key point>", ...],
  "examples": ["<short worked example>", ...],
  "content": "<full explanation as markdown>"
}}"#
      ),
      flashcards_template: format!(
        r#"You are an AI flashcard generator. Write {{card_count}} study flashcards about the following topic and return them as a JSON response. {NO_FENCES}

Topic: "{{topic}}"

Provide the flashcards in this exact JSON structure:

{{
  "cards": [
    {{ "front": "<question or term>", "back": "<answer or definition>", "difficulty": "Easy|Medium|Hard" }}
  ]
}}"#
      ),
    }
  }
}

/// Attempt to load `StudyConfig` from STUDY_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_study_config_from_env() -> Option<StudyConfig> {
  let path = std::env::var("STUDY_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<StudyConfig>(&s) {
      Ok(cfg) => {
        info!(target: "studymate_backend", %path, "Loaded study config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "studymate_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "studymate_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// Process settings read once at startup.
#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub static_dir: PathBuf,
  /// Explicit REQUIRE_AUTH; when unset, auth is required iff an identity provider is configured.
  pub require_auth: Option<bool>,
  pub auth_redirect_url: Option<String>,
  /// HTTP timeout for text generation calls.
  pub llm_timeout: Duration,
  /// HTTP timeout for identity provider calls.
  pub auth_timeout: Duration,
  pub prompts: Prompts,
}

impl Settings {
  pub fn from_env() -> Self {
    let port = env_parse("PORT").unwrap_or(3000);
    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".into()).into();
    let require_auth = std::env::var("REQUIRE_AUTH").ok().and_then(|v| parse_bool(&v));
    let auth_redirect_url = std::env::var("AUTH_REDIRECT_URL").ok().filter(|s| !s.trim().is_empty());
    let llm_timeout = timeout_from_env("LLM_TIMEOUT_SECS", 30);
    let auth_timeout = timeout_from_env("AUTH_TIMEOUT_SECS", 10);
    let prompts = load_study_config_from_env().map(|c| c.prompts).unwrap_or_default();
    Self { port, static_dir, require_auth, auth_redirect_url, llm_timeout, auth_timeout, prompts }
  }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
  let raw = std::env::var(key).ok()?;
  match raw.trim().parse() {
    Ok(v) => Some(v),
    Err(_) => {
      error!(target: "studymate_backend", key, value = %raw, "Ignoring unparseable environment value");
      None
    }
  }
}

fn timeout_from_env(key: &str, default_secs: u64) -> Duration {
  Duration::from_secs(env_parse(key).unwrap_or(default_secs))
}

fn parse_bool(v: &str) -> Option<bool> {
  match v.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Some(true),
    "0" | "false" | "no" | "off" => Some(false),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_other_defaults() {
    let cfg: StudyConfig = toml::from_str(
      r#"
      [prompts]
      quiz_template = "Quiz about {topic}, {question_count} questions"
      "#,
    )
    .unwrap();
    assert_eq!(cfg.prompts.quiz_template, "Quiz about {topic}, {question_count} questions");
    assert_eq!(cfg.prompts.essay_template, Prompts::default().essay_template);
  }

  #[test]
  fn empty_toml_is_all_defaults() {
    let cfg: StudyConfig = toml::from_str("").unwrap();
    assert!(cfg.prompts.schedule_template.contains("{syllabus}"));
  }

  #[test]
  fn default_templates_carry_their_placeholders() {
    let p = Prompts::default();
    assert!(p.essay_template.contains("{essay}"));
    for slot in ["{syllabus}", "{daily_hours}", "{today}", "{target_date}"] {
      assert!(p.schedule_template.contains(slot), "missing {slot}");
    }
    assert!(p.quiz_template.contains("{question_count}"));
    assert!(p.flashcards_template.contains("{card_count}"));
    assert!(p.explanation_template.contains("{topic}"));
    assert!(p.essay_template.contains("\"severity\": \"low|medium|high\""));
    assert!(p.quiz_template.contains(NO_FENCES));
  }

  #[test]
  fn timeouts_read_seconds_or_default() {
    std::env::set_var("STUDYMATE_TEST_TIMEOUT_SECS", " 7 ");
    assert_eq!(timeout_from_env("STUDYMATE_TEST_TIMEOUT_SECS", 30), Duration::from_secs(7));
    std::env::set_var("STUDYMATE_TEST_BAD_TIMEOUT_SECS", "soon");
    assert_eq!(timeout_from_env("STUDYMATE_TEST_BAD_TIMEOUT_SECS", 10), Duration::from_secs(10));
    assert_eq!(timeout_from_env("STUDYMATE_TEST_UNSET_TIMEOUT_SECS", 10), Duration::from_secs(10));
  }

  #[test]
  fn bool_values() {
    assert_eq!(parse_bool("TRUE"), Some(true));
    assert_eq!(parse_bool("off"), Some(false));
    assert_eq!(parse_bool("maybe"), None);
  }
}
