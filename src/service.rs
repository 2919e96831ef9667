//! Application operations shared by the HTTP gateway and the CLI.
//!
//! Everything here is synchronous and may block on storage locks; async
//! callers run it on the blocking thread pool.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{AuthContext, TokenGenerator, authenticate};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::scoring::{ProgressSummary, compute_total};
use crate::store::Store;
use crate::syllabus::Syllabus;
use crate::types::*;

const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_EMAIL_LEN: usize = 254;

/// Input to [`StudyService::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// A user's per-topic records plus the aggregate computed from them.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    pub topics: UserProgress,
    #[serde(flatten)]
    pub summary: ProgressSummary,
}

pub struct StudyService {
    store: Arc<dyn Store>,
    syllabus: Arc<Syllabus>,
    tokens: TokenGenerator,
    session_ttl: chrono::Duration,
    leaderboard_limit: usize,
}

impl StudyService {
    pub fn new(store: Arc<dyn Store>, syllabus: Arc<Syllabus>, config: &ServerConfig) -> Self {
        Self {
            store,
            syllabus,
            tokens: TokenGenerator::new(),
            session_ttl: config.session_ttl(),
            leaderboard_limit: config.leaderboard_limit,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn syllabus(&self) -> &Syllabus {
        &self.syllabus
    }

    // Accounts

    pub fn register(&self, registration: Registration) -> Result<User> {
        let username = Username::parse(&registration.username)?;
        let email = registration.email.trim().to_string();
        validate_email(&email)?;
        validate_password(&registration.password)?;
        if registration.password != registration.confirm_password {
            return Err(Error::Validation("passwords do not match".to_string()));
        }

        let user = User {
            username,
            email,
            password_hash: self.tokens.hash(&registration.password)?,
            registered_at: Utc::now(),
        };
        self.store.create_user(&user)?;

        tracing::info!("Registered user {}", user.username);
        Ok(user)
    }

    /// Signs in by username or email. Returns the raw session token, which
    /// is never stored.
    pub fn login(&self, identifier: &str, password: &str) -> Result<(String, Session)> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(Error::Validation(
                "username/email and password are required".to_string(),
            ));
        }

        let user = match Username::parse(identifier) {
            Ok(username) => self.store.get_user(&username)?,
            Err(_) => None,
        };
        let user = match user {
            Some(user) => Some(user),
            None => self.store.get_user_by_email(identifier)?,
        };

        // Unknown user and wrong password are indistinguishable to the caller.
        let Some(user) = user else {
            return Err(Error::Unauthorized);
        };
        if !self.tokens.verify(password, &user.password_hash)? {
            return Err(Error::Unauthorized);
        }

        let (raw_token, lookup, hash) = self.tokens.generate()?;
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            username: user.username,
            created_at: now,
            expires_at: now + self.session_ttl,
        };
        self.store.create_session(&session)?;

        tracing::info!("User {} logged in", session.username);
        Ok((raw_token, session))
    }

    pub fn authenticate(&self, raw_token: &str) -> Result<AuthContext> {
        authenticate(self.store.as_ref(), &self.tokens, raw_token)
    }

    pub fn logout(&self, auth: &AuthContext) -> Result<()> {
        self.store.delete_session(&auth.session.id)?;
        Ok(())
    }

    // Progress

    pub fn progress(&self, auth: &AuthContext) -> Result<ProgressView> {
        let topics = self.store.get_progress(auth.username())?;
        let summary = ProgressSummary::new(&self.syllabus, &topics);
        Ok(ProgressView { topics, summary })
    }

    /// Records a status change, recomputes the user's total and offers it
    /// to the ledger.
    ///
    /// The ledger only ever moves up: a regression lowers the computed total
    /// but leaves the ledger score where it was.
    pub fn update_topic_status(
        &self,
        auth: &AuthContext,
        topic_id: &str,
        status: TopicStatus,
    ) -> Result<UpsertOutcome> {
        if !self.syllabus.contains(topic_id) {
            return Err(Error::Validation(format!("unknown topic '{topic_id}'")));
        }

        let username = auth.username();
        self.store.set_topic_status(username, topic_id, status)?;

        let progress = self.store.get_progress(username)?;
        let total = compute_total(&self.syllabus, &progress);
        self.store.upsert_if_higher(username, total)
    }

    // Ledger

    pub fn submit_score(&self, auth: &AuthContext, score: i64) -> Result<UpsertOutcome> {
        self.store.upsert_if_higher(auth.username(), score)
    }

    /// Ranked entries, capped at the configured limit.
    pub fn leaderboard(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>> {
        let limit = limit
            .unwrap_or(self.leaderboard_limit)
            .min(self.leaderboard_limit);
        self.store.read_all(Some(limit))
    }

    pub fn my_entry(&self, auth: &AuthContext) -> Result<LeaderboardEntry> {
        self.store
            .get_entry(auth.username())?
            .ok_or(Error::NotFound)
    }
}

fn validate_email(email: &str) -> Result<()> {
    let invalid = || Error::Validation("invalid email format".to_string());

    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "password cannot exceed {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
