//! Per-domain admission policy and runtime state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{add_seconds, seconds_to_duration};

/// Longest delay, cooldown or window a policy may configure (one year).
pub const MAX_POLICY_SECONDS: f64 = 365.0 * 24.0 * 3600.0;

/// Admission limits for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainPolicy {
    /// Maximum acquired-but-not-released requests
    pub concurrency_cap: u32,
    /// Minimum spacing between consecutive admissions
    pub min_delay_seconds: f64,
    /// Cooldown after the first consecutive error; doubles per further error
    pub error_backoff_seconds: f64,
    pub max_backoff_seconds: f64,
    /// Admissions allowed per window
    pub budget_per_window: u32,
    pub window_seconds: f64,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            concurrency_cap: 1,
            min_delay_seconds: 1.0,
            error_backoff_seconds: 5.0,
            max_backoff_seconds: 60.0,
            budget_per_window: 60,
            window_seconds: 60.0,
        }
    }
}

impl DomainPolicy {
    /// Check the policy is internally consistent
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency_cap == 0 {
            return Err("concurrency_cap must be at least 1".to_string());
        }
        if self.budget_per_window == 0 {
            return Err("budget_per_window must be at least 1".to_string());
        }
        for (name, value) in [
            ("min_delay_seconds", self.min_delay_seconds),
            ("error_backoff_seconds", self.error_backoff_seconds),
            ("max_backoff_seconds", self.max_backoff_seconds),
            ("window_seconds", self.window_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a non-negative number, got {value}"));
            }
            if value > MAX_POLICY_SECONDS {
                return Err(format!(
                    "{name} must not exceed {MAX_POLICY_SECONDS} seconds, got {value}"
                ));
            }
        }
        if self.window_seconds <= 0.0 {
            return Err(format!(
                "window_seconds must be positive, got {}",
                self.window_seconds
            ));
        }
        if self.max_backoff_seconds < self.error_backoff_seconds {
            return Err("max_backoff_seconds must not be below error_backoff_seconds".to_string());
        }
        Ok(())
    }

    /// Cooldown length after `error_count` consecutive errors (1-based).
    pub fn backoff_seconds(&self, error_count: u32) -> f64 {
        let exponent = error_count.saturating_sub(1).min(62) as i32;
        (self.error_backoff_seconds * 2f64.powi(exponent)).min(self.max_backoff_seconds)
    }
}

/// Mutable admission state for one domain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainState {
    pub inflight: u32,
    pub last_request_at: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_count: u32,
}

impl DomainState {
    /// Open the first window, or start a new one once the current has elapsed.
    pub(crate) fn refresh_window(&mut self, policy: &DomainPolicy, now: DateTime<Utc>) {
        match self.window_start {
            None => {
                self.window_start = Some(now);
                self.window_count = 0;
            }
            Some(start) if now - start >= seconds_to_duration(policy.window_seconds) => {
                self.window_start = Some(now);
                self.window_count = 0;
            }
            Some(_) => {}
        }
    }

    /// Earliest instant spacing, cooldown and window budget all allow.
    pub(crate) fn next_available(&mut self, policy: &DomainPolicy, now: DateTime<Utc>) -> DateTime<Utc> {
        self.refresh_window(policy, now);

        let mut candidate = now;
        if let Some(last) = self.last_request_at {
            candidate = candidate.max(add_seconds(last, policy.min_delay_seconds));
        }
        if let Some(cooldown) = self.cooldown_until {
            candidate = candidate.max(cooldown);
        }
        if self.window_count >= policy.budget_per_window {
            if let Some(start) = self.window_start {
                candidate = candidate.max(add_seconds(start, policy.window_seconds));
            }
        }
        candidate
    }

    pub(crate) fn admits(&mut self, policy: &DomainPolicy, now: DateTime<Utc>) -> bool {
        if self.inflight >= policy.concurrency_cap {
            return false;
        }
        now >= self.next_available(policy, now)
    }
}
