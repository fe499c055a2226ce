//! Expected shapes of model output, one per feature.
//!
//! Field names match the serialized (camelCase) form of the result types in
//! `domain`; aliases cover the spellings models tend to drift to.

use crate::domain::FeatureKind;
use crate::normalize::{Field, FieldKind, LineFallback, Schema};

const SEVERITIES: &[&str] = &["low", "medium", "high"];
const STYLE_KINDS: &[&str] = &["clarity", "flow", "vocabulary"];
const DIFFICULTIES: &[&str] = &["Easy", "Medium", "Hard"];
const PRIORITIES: &[&str] = &["Low", "Medium", "High"];

const fn text(name: &'static str, aliases: &'static [&'static str]) -> Field {
  Field::new(name, aliases, FieldKind::Text { default: "" })
}

const fn list(name: &'static str, aliases: &'static [&'static str]) -> Field {
  Field::new(name, aliases, FieldKind::StringList)
}

pub static GRAMMAR_ISSUE: Schema = Schema {
  name: "grammar_issue",
  fields: &[
    text("text", &["issue", "excerpt"]),
    text("suggestion", &["fix", "correction"]),
    Field::new("severity", &["level"], FieldKind::Choice { allowed: SEVERITIES, default: "medium" }),
  ],
  line_fallback: LineFallback::None,
};

pub static STYLE_ISSUE: Schema = Schema {
  name: "style_issue",
  fields: &[
    text("text", &["issue", "excerpt"]),
    text("suggestion", &["fix"]),
    Field::new("type", &["kind", "category"], FieldKind::Choice { allowed: STYLE_KINDS, default: "clarity" }),
  ],
  line_fallback: LineFallback::None,
};

pub static SECTION_FEEDBACK: Schema = Schema {
  name: "section_feedback",
  fields: &[
    text("section", &["name", "title"]),
    text("feedback", &["comment", "comments"]),
    Field::new("score", &[], FieldKind::Integer { default: 0 }),
  ],
  line_fallback: LineFallback::None,
};

pub static ESSAY_REVIEW: Schema = Schema {
  name: "essay_review",
  fields: &[
    Field::new("score", &["overallScore"], FieldKind::Integer { default: 0 }),
    text("summary", &["overview"]),
    list("strengths", &[]),
    list("improvements", &["weaknesses", "areasForImprovement"]),
    Field::new("grammarIssues", &["grammar"], FieldKind::Records(&GRAMMAR_ISSUE)),
    Field::new("styleIssues", &["style"], FieldKind::Records(&STYLE_ISSUE)),
    Field::new("structure", &["structureFeedback", "sections"], FieldKind::Records(&SECTION_FEEDBACK)),
    text("enhancedVersion", &["enhanced", "improvedVersion", "rewrite"]),
  ],
  line_fallback: LineFallback::None,
};

pub static TOPIC: Schema = Schema {
  name: "topic",
  fields: &[
    text("name", &["chapterName", "chapter", "title", "topic"]),
    Field::new("estimatedHours", &["hours"], FieldKind::Number { default: 0.0 }),
    Field::new("difficulty", &[], FieldKind::Choice { allowed: DIFFICULTIES, default: "Medium" }),
    Field::new("priority", &[], FieldKind::Choice { allowed: PRIORITIES, default: "Medium" }),
  ],
  line_fallback: LineFallback::None,
};

/// Besides JSON, a schedule may come back as two bare lines: total hours, then days.
pub static STUDY_SCHEDULE: Schema = Schema {
  name: "study_schedule",
  fields: &[
    Field::new("totalHours", &["hours"], FieldKind::Number { default: 0.0 }),
    Field::new("daysNeeded", &["days"], FieldKind::Integer { default: 0 }),
    Field::new("topics", &["studyTopics", "chapters"], FieldKind::Records(&TOPIC)),
  ],
  line_fallback: LineFallback::Positional(&["totalHours", "daysNeeded"]),
};

pub static QUESTION: Schema = Schema {
  name: "question",
  fields: &[
    text("question", &["prompt", "text"]),
    list("options", &["choices", "answers"]),
    Field::new("correctIndex", &["correct", "answerIndex"], FieldKind::Integer { default: 0 }),
    text("explanation", &[]),
  ],
  line_fallback: LineFallback::None,
};

pub static QUIZ: Schema = Schema {
  name: "quiz",
  fields: &[Field::new("questions", &["que", "quiz", "items"], FieldKind::Records(&QUESTION))],
  line_fallback: LineFallback::None,
};

/// Plain prose is still useful here: each line becomes a key point.
pub static EXPLANATION: Schema = Schema {
  name: "explanation",
  fields: &[
    text("topic", &["title"]),
    text("summary", &["overview"]),
    list("keyPoints", &["points", "highlights"]),
    list("examples", &[]),
    text("content", &["markdown", "body", "explanation"]),
  ],
  line_fallback: LineFallback::Collect("keyPoints"),
};

pub static FLASHCARD: Schema = Schema {
  name: "flashcard",
  fields: &[
    text("front", &["question", "term"]),
    text("back", &["answer", "definition"]),
    Field::new("difficulty", &[], FieldKind::Choice { allowed: DIFFICULTIES, default: "Medium" }),
  ],
  line_fallback: LineFallback::None,
};

pub static FLASHCARD_DECK: Schema = Schema {
  name: "flashcard_deck",
  fields: &[Field::new("cards", &["flashcards", "deck"], FieldKind::Records(&FLASHCARD))],
  line_fallback: LineFallback::None,
};

pub fn schema_for(kind: FeatureKind) -> &'static Schema {
  match kind {
    FeatureKind::Essay => &ESSAY_REVIEW,
    FeatureKind::Schedule => &STUDY_SCHEDULE,
    FeatureKind::Quiz => &QUIZ,
    FeatureKind::Explanation => &EXPLANATION,
    FeatureKind::Flashcards => &FLASHCARD_DECK,
  }
}
