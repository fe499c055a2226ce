use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::FeatureKind;
use crate::identity::IdentityError;
use crate::normalize::ParseFailure;
use crate::protocol::Notice;

pub const PARSE_NOTICE_TITLE: &str = "AI response invalid";
pub const PARSE_NOTICE_DESCRIPTION: &str = "Could not parse AI response.";

#[derive(Debug, Clone, Error)]
pub enum AppError {
  /// A required field was missing or out of range. Caught before any provider call.
  #[error("Validation error: {title}: {description}")]
  Validation { title: String, description: String },

  /// The generation provider rejected or failed the call.
  #[error("Provider error: {message}")]
  Provider { title: String, message: String },

  /// The identity provider rejected a sign-up, sign-in or sign-out.
  #[error("Identity error: {error}")]
  Identity { title: String, error: IdentityError },

  /// The model answered but nothing usable could be extracted.
  #[error("Parse error ({request_id}): {failure}")]
  Parse { failure: ParseFailure, request_id: String },

  #[error("Unauthorized: {0}")]
  Unauthorized(String),

  #[error("Request already in progress: {0}")]
  Busy(FeatureKind),

  #[error("Internal server error: {0}")]
  Internal(String),
}

impl AppError {
  pub fn validation(title: impl Into<String>, description: impl Into<String>) -> Self {
    AppError::Validation { title: title.into(), description: description.into() }
  }

  fn error_code(&self) -> &'static str {
    match self {
      AppError::Validation { .. } => "VALIDATION_ERROR",
      AppError::Provider { .. } => "PROVIDER_ERROR",
      AppError::Identity { .. } => "IDENTITY_ERROR",
      AppError::Parse { .. } => "PARSE_ERROR",
      AppError::Unauthorized(_) => "UNAUTHORIZED",
      AppError::Busy(_) => "BUSY",
      AppError::Internal(_) => "INTERNAL_ERROR",
    }
  }

  pub fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation { .. } => StatusCode::BAD_REQUEST,
      AppError::Provider { .. } => StatusCode::BAD_GATEWAY,
      AppError::Identity { error, .. } => match error {
        IdentityError::EmailUnconfirmed | IdentityError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        IdentityError::Other(_) => StatusCode::BAD_REQUEST,
      },
      AppError::Parse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
      AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      AppError::Busy(_) => StatusCode::CONFLICT,
      AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// The user-facing notice. Raw model output is never part of it.
  pub fn notice(&self) -> Notice {
    match self {
      AppError::Validation { title, description } => Notice::new(title.clone(), description.clone()),
      AppError::Provider { title, message } => Notice::new(title.clone(), message.clone()),
      AppError::Identity { title, error } => Notice::new(title.clone(), error.user_message()),
      AppError::Parse { .. } => Notice::new(PARSE_NOTICE_TITLE, PARSE_NOTICE_DESCRIPTION),
      AppError::Unauthorized(msg) => Notice::new("Please sign in", msg.clone()),
      AppError::Busy(kind) => Notice::new(
        "Please wait",
        format!("Your {kind} request is still in progress."),
      ),
      AppError::Internal(msg) => Notice::new("Something went wrong", msg.clone()),
    }
  }

  fn request_id(&self) -> Option<String> {
    match self {
      AppError::Parse { request_id, .. } => Some(request_id.clone()),
      _ => None,
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
  pub title: String,
  pub description: String,
  pub code: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub request_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: ErrorBody,
}

impl From<&AppError> for ErrorResponse {
  fn from(err: &AppError) -> Self {
    let Notice { title, description } = err.notice();
    ErrorResponse {
      error: ErrorBody { title, description, code: err.error_code(), request_id: err.request_id() },
    }
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    (self.status_code(), Json(ErrorResponse::from(&self))).into_response()
  }
}

impl From<IdentityError> for AppError {
  fn from(error: IdentityError) -> Self {
    AppError::Identity { title: "Error".to_string(), error }
  }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_status_codes() {
    assert_eq!(AppError::validation("t", "d").status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
      AppError::Provider { title: "t".into(), message: "m".into() }.status_code(),
      StatusCode::BAD_GATEWAY
    );
    assert_eq!(AppError::Busy(FeatureKind::Quiz).status_code(), StatusCode::CONFLICT);
    assert_eq!(
      AppError::Identity { title: "Sign In Error".into(), error: IdentityError::InvalidCredentials }.status_code(),
      StatusCode::UNAUTHORIZED
    );
  }

  #[test]
  fn test_parse_error_hides_raw_text() {
    let err = AppError::Parse {
      failure: ParseFailure::new("secret model output"),
      request_id: "req-1".into(),
    };
    let body = serde_json::to_string(&ErrorResponse::from(&err)).unwrap();
    assert!(!body.contains("secret model output"));
    assert!(body.contains("AI response invalid"));
    assert!(body.contains("Could not parse AI response."));
    assert!(body.contains("\"requestId\":\"req-1\""));
  }

  #[test]
  fn test_identity_notice_uses_reworded_message() {
    let err = AppError::Identity { title: "Sign In Error".into(), error: IdentityError::EmailUnconfirmed };
    let notice = err.notice();
    assert_eq!(notice.title, "Sign In Error");
    assert_eq!(
      notice.description,
      "Please check your email and confirm your account before signing in."
    );
  }

  #[test]
  fn test_error_messages() {
    let err = AppError::Busy(FeatureKind::Essay);
    assert_eq!(err.to_string(), "Request already in progress: essay");
    assert_eq!(err.notice().description, "Your essay request is still in progress.");
  }
}
