//! Application state: prompts, provider clients, sessions and the in-flight table.
//!
//! This module owns:
//!   - the prompts struct (from TOML or defaults)
//!   - the optional text generator and identity provider
//!   - the session store and its event channel
//!   - the per-(owner, feature) in-flight guard table
//!
//! Nothing user-submitted is stored here beyond the current sessions.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{Prompts, Settings};
use crate::errors::AppError;
use crate::generator::{generator_from_env, TextGenerator};
use crate::identity::{IdentityProvider, SessionUser, SupabaseAuth};
use crate::inflight::InFlight;
use crate::session::{SessionStore, DEFAULT_SESSION_TTL};

/// Prefix of the one-off owner minted for a request that carries no identity.
pub const ONE_OFF_OWNER_PREFIX: &str = "anon-";

#[derive(Clone)]
pub struct AppState {
    pub prompts: Prompts,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub sessions: SessionStore,
    pub in_flight: InFlight,
    pub require_auth: bool,
    pub auth_redirect_url: Option<String>,
}

impl AppState {
    /// Build state from settings: init the generator and identity clients from env.
    #[instrument(level = "info", skip_all)]
    pub fn from_settings(settings: &Settings) -> Self {
        let generator = generator_from_env(settings.llm_timeout);
        if generator.is_none() {
            warn!(target: "studymate_backend", "No text generator configured (set GEMINI_API_KEY or OPENAI_API_KEY). AI features will report a provider error.");
        }

        let identity = SupabaseAuth::from_env(settings.auth_timeout)
            .map(|s| Arc::new(s) as Arc<dyn IdentityProvider>);
        match &identity {
            Some(id) => info!(target: "studymate_backend", provider = %id.name(), "Identity provider enabled."),
            None => info!(target: "studymate_backend", "Identity provider disabled (no SUPABASE_URL/SUPABASE_ANON_KEY)."),
        }

        let require_auth = settings.require_auth.unwrap_or(identity.is_some());
        if require_auth && identity.is_none() {
            warn!(target: "studymate_backend", "REQUIRE_AUTH is on but no identity provider is configured; AI features will be unreachable.");
        }
        info!(target: "studymate_backend", require_auth, "Auth policy");

        let mut state = Self::with_parts(settings.prompts.clone(), generator, identity, require_auth);
        state.auth_redirect_url = settings.auth_redirect_url.clone();
        state
    }

    /// Assemble state from explicit parts.
    pub fn with_parts(
        prompts: Prompts,
        generator: Option<Arc<dyn TextGenerator>>,
        identity: Option<Arc<dyn IdentityProvider>>,
        require_auth: bool,
    ) -> Self {
        Self {
            prompts,
            generator,
            identity,
            sessions: SessionStore::new(),
            in_flight: InFlight::new(),
            require_auth,
            auth_redirect_url: None,
        }
    }

    /// The signed-in user behind `access_token`, if any.
    ///
    /// Tokens issued before a restart are not in the local table; those are
    /// checked once with the identity provider and remembered.
    #[instrument(level = "debug", skip_all)]
    pub async fn session_user(&self, access_token: &str) -> Option<SessionUser> {
        if let Some(user) = self.sessions.current(access_token).await {
            return Some(user);
        }
        let identity = self.identity.as_ref()?;
        match identity.user_for_token(access_token).await {
            Ok(user) => {
                self.sessions.remember(access_token, user.clone(), DEFAULT_SESSION_TTL).await;
                Some(user)
            }
            Err(e) => {
                info!(target: "session", error = %e, "Access token not recognized");
                None
            }
        }
    }

    /// Who a feature request runs on behalf of: the session user, else the
    /// client id the browser sent, else an owner minted for this request alone,
    /// so unrelated anonymous clients never share an in-flight slot.
    pub async fn resolve_owner(
        &self,
        access_token: Option<&str>,
        client_id: Option<&str>,
    ) -> Result<String, AppError> {
        if let Some(token) = access_token {
            if let Some(user) = self.session_user(token).await {
                return Ok(user.id);
            }
        }
        if self.require_auth {
            return Err(AppError::Unauthorized("Please sign in to use this feature.".into()));
        }
        Ok(match client_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => format!("{ONE_OFF_OWNER_PREFIX}{}", Uuid::new_v4()),
        })
    }
}
