//! Per-(identity, role) onboarding progress.
//!
//! ```text
//! NotStarted --save_step--> InProgress --mark_complete--> Complete
//!      ^                                                      |
//!      +----------------------- reset ------------------------+
//! ```
//!
//! Onboarding bookkeeping is advisory for users who are already
//! authenticated: reads degrade to "not complete" and step saves swallow
//! storage errors. `mark_complete` and `reset` are explicit user/admin actions
//! and surface storage failures.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rolegate_core::{Clock, Identity};

use crate::redirect::{DEFAULT_DASHBOARD_PATH, landing_path, onboarding_path};
use crate::roles::Role;
use crate::store::{OnboardingStore, StoreError};

pub const MAX_STEP_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRecord {
    pub identity: Identity,
    pub role: Role,
    pub current_step: Option<String>,
    pub is_complete: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OnboardingState {
    NotStarted,
    InProgress { step: String },
    Complete { completed_at: DateTime<Utc> },
}

impl OnboardingRecord {
    pub fn new(identity: Identity, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            identity,
            role,
            current_step: None,
            is_complete: false,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn state(&self) -> OnboardingState {
        match (self.is_complete, self.completed_at, &self.current_step) {
            (true, Some(completed_at), _) => OnboardingState::Complete { completed_at },
            // Completed rows written without a timestamp still count as complete.
            (true, None, _) => OnboardingState::Complete {
                completed_at: self.updated_at,
            },
            (false, _, Some(step)) => OnboardingState::InProgress { step: step.clone() },
            (false, _, None) => OnboardingState::NotStarted,
        }
    }

    /// Returns false (and leaves the record untouched) once complete.
    fn record_step(&mut self, step: &str, now: DateTime<Utc>) -> bool {
        if self.is_complete {
            return false;
        }
        self.current_step = Some(step.to_string());
        self.updated_at = now;
        true
    }

    /// Returns whether this call performed the false→true transition.
    fn complete(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_complete {
            return false;
        }
        self.is_complete = true;
        self.completed_at = Some(now);
        self.updated_at = now;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OnboardingError {
    #[error("invalid onboarding step: {0}")]
    InvalidStep(String),

    #[error("onboarding storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<StoreError> for OnboardingError {
    fn from(value: StoreError) -> Self {
        OnboardingError::StorageUnavailable(value.to_string())
    }
}

pub struct OnboardingTracker<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: OnboardingStore> OnboardingTracker<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_complete(&self, identity: &Identity, role: Role) -> bool {
        matches!(self.state(identity, role), OnboardingState::Complete { .. })
    }

    pub fn state(&self, identity: &Identity, role: Role) -> OnboardingState {
        match self.store.get(identity, role) {
            Ok(Some(record)) => record.state(),
            Ok(None) => OnboardingState::NotStarted,
            Err(err) => {
                tracing::warn!(identity = %identity, role = %role, error = %err, "onboarding read failed; treating as not started");
                OnboardingState::NotStarted
            }
        }
    }

    /// All records for an identity (empty on storage failure).
    pub fn progress(&self, identity: &Identity) -> Vec<OnboardingRecord> {
        self.store.list(identity).unwrap_or_else(|err| {
            tracing::warn!(identity = %identity, error = %err, "onboarding list failed");
            Vec::new()
        })
    }

    /// Record the last step reached. Never fails the caller; returns whether
    /// the step was recorded.
    pub fn save_step(&self, identity: &Identity, role: Role, step: &str) -> bool {
        match self.try_save_step(identity, role, step) {
            Ok(recorded) => recorded,
            Err(err) => {
                tracing::warn!(identity = %identity, role = %role, error = %err, "onboarding step not recorded");
                false
            }
        }
    }

    fn try_save_step(&self, identity: &Identity, role: Role, step: &str) -> Result<bool, OnboardingError> {
        let step = validate_step(step)?;
        let now = self.clock.now();

        let mut record = self
            .store
            .get(identity, role)?
            .unwrap_or_else(|| OnboardingRecord::new(identity.clone(), role, now));

        if !record.record_step(step, now) {
            tracing::debug!(identity = %identity, role = %role, step, "onboarding already complete; step ignored");
            return Ok(false);
        }

        self.store.upsert(record)?;
        Ok(true)
    }

    /// Idempotent: a second call keeps the original completion time.
    pub fn mark_complete(&self, identity: &Identity, role: Role) -> Result<OnboardingState, OnboardingError> {
        let now = self.clock.now();
        let mut record = self
            .store
            .get(identity, role)
            .inspect_err(|err| {
                tracing::warn!(identity = %identity, role = %role, error = %err, "onboarding completion not recorded");
            })?
            .unwrap_or_else(|| OnboardingRecord::new(identity.clone(), role, now));

        if record.complete(now) {
            self.store.upsert(record.clone()).inspect_err(|err| {
                tracing::warn!(identity = %identity, role = %role, error = %err, "onboarding completion not recorded");
            })?;
            tracing::info!(identity = %identity, role = %role, "onboarding completed");
        }

        Ok(record.state())
    }

    /// Clear one role's record, or every record for the identity when `role`
    /// is `None`. Returns how many records were removed.
    pub fn reset(&self, identity: &Identity, role: Option<Role>) -> Result<usize, OnboardingError> {
        let removed = match role {
            Some(role) => usize::from(self.store.delete(identity, role)?),
            None => self.store.delete_all(identity)?,
        };
        tracing::info!(identity = %identity, role = ?role, removed, "onboarding reset");
        Ok(removed)
    }

    /// Where to send the user right after login.
    ///
    /// `role` is the raw role string from the request. Unparseable roles go to
    /// the generic dashboard.
    pub fn post_login_redirect(&self, identity: &Identity, role: &str) -> String {
        let Ok(role) = role.parse::<Role>() else {
            return DEFAULT_DASHBOARD_PATH.to_string();
        };

        if self.is_complete(identity, role) {
            landing_path(role).to_string()
        } else {
            onboarding_path(role, self.clock.now())
        }
    }
}

fn validate_step(step: &str) -> Result<&str, OnboardingError> {
    let step = step.trim();
    if step.is_empty() {
        return Err(OnboardingError::InvalidStep("step cannot be empty".to_string()));
    }
    if step.len() > MAX_STEP_LEN {
        return Err(OnboardingError::InvalidStep(format!(
            "step longer than {MAX_STEP_LEN} bytes"
        )));
    }
    Ok(step)
}
