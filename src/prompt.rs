//! Prompt construction. Pure: same templates and request, same prompt.

use crate::config::Prompts;
use crate::domain::AnalysisRequest;
use crate::util::fill_template;

/// Fill the feature's template with the request's fields.
///
/// User text is embedded verbatim; braces inside it are never treated as placeholders.
pub fn build_prompt(prompts: &Prompts, req: &AnalysisRequest) -> String {
  match req {
    AnalysisRequest::Essay { essay } => fill_template(&prompts.essay_template, &[("essay", essay.as_str())]),
    AnalysisRequest::Schedule { syllabus, daily_hours, today, target_date } => {
      let hours = daily_hours.to_string();
      let today = today.to_string();
      let target = target_date.map(|d| d.to_string()).unwrap_or_default();
      fill_template(
        &prompts.schedule_template,
        &[
          ("syllabus", syllabus.as_str()),
          ("daily_hours", hours.as_str()),
          ("today", today.as_str()),
          ("target_date", target.as_str()),
        ],
      )
    }
    AnalysisRequest::Quiz { topic, question_count } => {
      let count = question_count.to_string();
      fill_template(&prompts.quiz_template, &[("topic", topic.as_str()), ("question_count", count.as_str())])
    }
    AnalysisRequest::Explanation { topic } => fill_template(&prompts.explanation_template, &[("topic", topic.as_str())]),
    AnalysisRequest::Flashcards { topic, card_count } => {
      let count = card_count.to_string();
      fill_template(&prompts.flashcards_template, &[("topic", topic.as_str()), ("card_count", count.as_str())])
    }
  }
}
