//! Identity provider seam: account creation, password sign-in and sign-out.
//!
//! `SupabaseAuth` talks to a GoTrue REST endpoint. Provider failures are
//! classified into the few cases the SPA words differently; everything else
//! carries the provider's own message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, instrument, warn};

const EMAIL_UNCONFIRMED: &str = "Email not confirmed";
const INVALID_CREDENTIALS: &str = "Invalid login credentials";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
  pub id: String,
  pub email: String,
  pub display_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
  pub access_token: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub refresh_token: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub expires_in: Option<u64>,
  pub user: SessionUser,
}

impl Session {
  /// Token lifetime as reported by the provider.
  pub fn lifetime(&self) -> Option<Duration> {
    self.expires_in.map(Duration::from_secs)
  }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
  #[error("Email not confirmed")]
  EmailUnconfirmed,
  #[error("Invalid login credentials")]
  InvalidCredentials,
  #[error("{0}")]
  Other(String),
}

impl IdentityError {
  pub fn from_provider_message(msg: &str) -> Self {
    if msg.contains(EMAIL_UNCONFIRMED) {
      IdentityError::EmailUnconfirmed
    } else if msg.contains(INVALID_CREDENTIALS) {
      IdentityError::InvalidCredentials
    } else {
      IdentityError::Other(msg.trim().to_string())
    }
  }

  /// Message shown to the user in place of the provider's wording.
  pub fn user_message(&self) -> String {
    match self {
      IdentityError::EmailUnconfirmed => {
        "Please check your email and confirm your account before signing in.".into()
      }
      IdentityError::InvalidCredentials => "Invalid email or password. Please check your credentials.".into(),
      IdentityError::Other(msg) if msg.trim().is_empty() => "An error occurred during sign in".into(),
      IdentityError::Other(msg) => msg.clone(),
    }
  }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
  fn name(&self) -> &str;

  /// Create an account. The provider sends the confirmation email; no session is returned.
  async fn register(
    &self,
    email: &str,
    password: &str,
    display_name: &str,
    redirect_to: Option<&str>,
  ) -> Result<(), IdentityError>;

  async fn authenticate(&self, email: &str, password: &str) -> Result<Session, IdentityError>;

  async fn terminate_session(&self, access_token: &str) -> Result<(), IdentityError>;

  /// Look up the user behind an access token issued earlier.
  async fn user_for_token(&self, access_token: &str) -> Result<SessionUser, IdentityError>;
}

#[derive(Clone)]
pub struct SupabaseAuth {
  pub client: reqwest::Client,
  pub base_url: String,
  anon_key: String,
}

impl SupabaseAuth {
  /// Construct the client if SUPABASE_URL and SUPABASE_ANON_KEY are both set.
  pub fn from_env(timeout: Duration) -> Option<Self> {
    let base_url = std::env::var("SUPABASE_URL").ok()?.trim_end_matches('/').to_string();
    let anon_key = std::env::var("SUPABASE_ANON_KEY").ok()?;
    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
    Some(Self { client, base_url, anon_key })
  }

  fn post(&self, path: &str) -> reqwest::RequestBuilder {
    self
      .client
      .post(format!("{}/auth/v1/{}", self.base_url, path))
      .header(USER_AGENT, "studymate-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("apikey", &self.anon_key)
  }

  async fn read_json(res: reqwest::Response) -> Result<Value, IdentityError> {
    let status = res.status();
    let body = res.text().await.map_err(|e| IdentityError::Other(e.to_string()))?;
    if !status.is_success() {
      let msg = extract_auth_error(&body).unwrap_or_else(|| format!("Auth HTTP {status}"));
      warn!(target: "identity", %status, error = %msg, "Identity provider rejected the request");
      return Err(IdentityError::from_provider_message(&msg));
    }
    if body.trim().is_empty() {
      return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| IdentityError::Other(format!("Malformed auth response: {e}")))
  }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
  fn name(&self) -> &str {
    "supabase"
  }

  #[instrument(level = "info", skip(self, password, display_name), fields(email_len = email.len()))]
  async fn register(
    &self,
    email: &str,
    password: &str,
    display_name: &str,
    redirect_to: Option<&str>,
  ) -> Result<(), IdentityError> {
    let mut req = self.post("signup");
    if let Some(url) = redirect_to {
      req = req.query(&[("redirect_to", url)]);
    }
    let body = json!({
      "email": email,
      "password": password,
      "data": { "full_name": display_name },
    });
    let res = req.json(&body).send().await.map_err(|e| IdentityError::Other(e.to_string()))?;
    Self::read_json(res).await?;
    info!(target: "identity", "Account registered; confirmation pending");
    Ok(())
  }

  #[instrument(level = "info", skip(self, password), fields(email_len = email.len()))]
  async fn authenticate(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
    let res = self
      .post("token")
      .query(&[("grant_type", "password")])
      .json(&json!({ "email": email, "password": password }))
      .send()
      .await
      .map_err(|e| IdentityError::Other(e.to_string()))?;
    let body = Self::read_json(res).await?;
    session_from_token_response(&body)
  }

  #[instrument(level = "info", skip_all)]
  async fn terminate_session(&self, access_token: &str) -> Result<(), IdentityError> {
    let res = self
      .post("logout")
      .header(AUTHORIZATION, format!("Bearer {access_token}"))
      .send()
      .await
      .map_err(|e| IdentityError::Other(e.to_string()))?;
    Self::read_json(res).await.map(|_| ())
  }

  #[instrument(level = "debug", skip_all)]
  async fn user_for_token(&self, access_token: &str) -> Result<SessionUser, IdentityError> {
    let res = self
      .client
      .get(format!("{}/auth/v1/user", self.base_url))
      .header(USER_AGENT, "studymate-backend/0.1")
      .header("apikey", &self.anon_key)
      .header(AUTHORIZATION, format!("Bearer {access_token}"))
      .send()
      .await
      .map_err(|e| IdentityError::Other(e.to_string()))?;
    let body = Self::read_json(res).await?;
    user_from_value(&body)
  }
}

fn session_from_token_response(body: &Value) -> Result<Session, IdentityError> {
  let access_token = body
    .get("access_token")
    .and_then(Value::as_str)
    .ok_or_else(|| IdentityError::Other("Auth response carried no access token".into()))?;
  let user = body
    .get("user")
    .map(user_from_value)
    .transpose()?
    .ok_or_else(|| IdentityError::Other("Auth response carried no user".into()))?;
  Ok(Session {
    access_token: access_token.to_string(),
    refresh_token: body.get("refresh_token").and_then(Value::as_str).map(str::to_string),
    expires_in: body.get("expires_in").and_then(Value::as_u64),
    user,
  })
}

/// GoTrue user object. Display name comes from the sign-up metadata, else the
/// local part of the email.
fn user_from_value(user: &Value) -> Result<SessionUser, IdentityError> {
  let id = user
    .get("id")
    .and_then(Value::as_str)
    .ok_or_else(|| IdentityError::Other("Auth user carried no id".into()))?;
  let email = user.get("email").and_then(Value::as_str).unwrap_or_default();
  let display_name = user
    .pointer("/user_metadata/full_name")
    .and_then(Value::as_str)
    .filter(|s| !s.trim().is_empty())
    .map(str::to_string)
    .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
  Ok(SessionUser { id: id.to_string(), email: email.to_string(), display_name })
}

/// GoTrue reports errors under several keys depending on the endpoint.
fn extract_auth_error(body: &str) -> Option<String> {
  let v: Value = serde_json::from_str(body).ok()?;
  ["msg", "error_description", "message", "error"]
    .iter()
    .find_map(|k| v.get(*k).and_then(Value::as_str))
    .map(str::to_string)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unconfirmed_email_is_reworded() {
    let err = IdentityError::from_provider_message("Email not confirmed");
    assert_eq!(err, IdentityError::EmailUnconfirmed);
    assert_eq!(err.user_message(), "Please check your email and confirm your account before signing in.");
  }

  #[test]
  fn invalid_credentials_are_reworded() {
    let err = IdentityError::from_provider_message("AuthApiError: Invalid login credentials");
    assert_eq!(err.user_message(), "Invalid email or password. Please check your credentials.");
  }

  #[test]
  fn other_messages_pass_through() {
    let err = IdentityError::from_provider_message("User already registered");
    assert_eq!(err.user_message(), "User already registered");
    assert_eq!(IdentityError::Other(String::new()).user_message(), "An error occurred during sign in");
  }

  #[test]
  fn error_text_is_found_under_any_key() {
    assert_eq!(extract_auth_error(r#"{"msg":"a"}"#).as_deref(), Some("a"));
    assert_eq!(
      extract_auth_error(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#).as_deref(),
      Some("Invalid login credentials")
    );
    assert_eq!(extract_auth_error("not json"), None);
  }

  #[test]
  fn token_response_maps_to_session() {
    let body = json!({
      "access_token": "tok",
      "refresh_token": "ref",
      "expires_in": 3600,
      "user": { "id": "u1", "email": "ada@example.com", "user_metadata": { "full_name": "Ada Lovelace" } }
    });
    let s = session_from_token_response(&body).unwrap();
    assert_eq!(s.access_token, "tok");
    assert_eq!(s.expires_in, Some(3600));
    assert_eq!(s.user.display_name, "Ada Lovelace");
  }

  #[test]
  fn display_name_falls_back_to_email_prefix() {
    let user = user_from_value(&json!({ "id": "u2", "email": "grace@example.com" })).unwrap();
    assert_eq!(user.display_name, "grace");
    assert!(user_from_value(&json!({ "email": "x@y" })).is_err());
  }
}
