//! # Domain Rate Limiter
//!
//! Per-domain admission control: concurrency caps, minimum spacing,
//! window budgets and error-driven cooldown.
//!
//! Admission and error backoff are independent constraints; the earliest
//! admissible instant is the maximum over all of them. Each domain's state
//! sits behind its own lock, so a check-and-admit is atomic per domain and
//! different domains never contend. Waiting for capacity is never a sleep:
//! callers get an instant back and defer the work themselves.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::domain_policy::{DomainPolicy, DomainState};
use crate::clock::{add_seconds, Clock};
use crate::config::RateLimitConfig;
use crate::logging::log_rate_limit_operation;

#[derive(Debug, Default)]
struct DomainEntry {
    policy: Option<DomainPolicy>,
    state: DomainState,
}

pub struct DomainRateLimiter {
    clock: Arc<dyn Clock>,
    default_policy: DomainPolicy,
    domains: DashMap<String, Arc<Mutex<DomainEntry>>>,
}

impl std::fmt::Debug for DomainRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainRateLimiter")
            .field("default_policy", &self.default_policy)
            .field("domains", &self.domains.len())
            .finish()
    }
}

impl DomainRateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_default_policy(clock, DomainPolicy::default())
    }

    pub fn with_default_policy(clock: Arc<dyn Clock>, default_policy: DomainPolicy) -> Self {
        Self {
            clock,
            default_policy,
            domains: DashMap::new(),
        }
    }

    /// Build a limiter with every configured domain policy installed
    pub fn from_config(clock: Arc<dyn Clock>, config: &RateLimitConfig) -> Self {
        let limiter = Self::with_default_policy(clock, config.default.clone());
        for entry in &config.domains {
            limiter.set_policy(&entry.domain, entry.policy.clone());
        }
        info!(
            domains = config.domains.len(),
            default_concurrency_cap = config.default.concurrency_cap,
            "🚦 Domain rate limiter initialized"
        );
        limiter
    }

    fn entry(&self, domain: &str) -> Arc<Mutex<DomainEntry>> {
        if let Some(entry) = self.domains.get(domain) {
            return Arc::clone(entry.value());
        }
        Arc::clone(
            self.domains
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(DomainEntry::default())))
                .value(),
        )
    }

    /// Run `f` against the domain's policy and state under its lock
    fn with_domain<T>(&self, domain: &str, f: impl FnOnce(&DomainPolicy, &mut DomainState) -> T) -> T {
        let entry = self.entry(domain);
        let mut guard = entry.lock();
        let DomainEntry { policy, state } = &mut *guard;
        let policy = policy.as_ref().unwrap_or(&self.default_policy);
        f(policy, state)
    }

    pub fn set_policy(&self, domain: &str, policy: DomainPolicy) {
        let details = format!(
            "concurrency_cap={} min_delay_seconds={} budget_per_window={} window_seconds={}",
            policy.concurrency_cap, policy.min_delay_seconds, policy.budget_per_window, policy.window_seconds
        );
        log_rate_limit_operation("set_policy", domain, Some(&details));
        self.entry(domain).lock().policy = Some(policy);
    }

    pub fn policy_for(&self, domain: &str) -> DomainPolicy {
        self.with_domain(domain, |policy, _| policy.clone())
    }

    /// Copy of the domain's current state
    pub fn state_snapshot(&self, domain: &str) -> DomainState {
        self.with_domain(domain, |_, state| state.clone())
    }

    /// Mutate a domain's state directly (seeding and operator tooling)
    pub fn update_state<T>(&self, domain: &str, f: impl FnOnce(&mut DomainState) -> T) -> T {
        self.with_domain(domain, |_, state| f(state))
    }

    pub fn next_available_time(&self, domain: &str) -> DateTime<Utc> {
        let now = self.clock.now();
        self.with_domain(domain, |policy, state| state.next_available(policy, now))
    }

    pub fn can_acquire(&self, domain: &str) -> bool {
        let now = self.clock.now();
        self.with_domain(domain, |policy, state| state.admits(policy, now))
    }

    /// Try to take one unit of capacity.
    ///
    /// Returns `None` when admitted, otherwise the instant to retry at.
    pub fn acquire(&self, domain: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.with_domain(domain, |policy, state| {
            if !state.admits(policy, now) {
                let retry_at = state.next_available(policy, now);
                debug!(
                    domain = %domain,
                    inflight = state.inflight,
                    window_count = state.window_count,
                    retry_at = %retry_at,
                    "Admission deferred"
                );
                return Some(retry_at);
            }

            state.refresh_window(policy, now);
            state.inflight += 1;
            state.window_count += 1;
            state.last_request_at = Some(now);
            debug!(
                domain = %domain,
                inflight = state.inflight,
                window_count = state.window_count,
                "Admission granted"
            );
            None
        })
    }

    pub fn release(&self, domain: &str, success: bool) {
        self.with_domain(domain, |_, state| {
            state.inflight = state.inflight.saturating_sub(1);
            if success {
                state.error_count = 0;
                state.cooldown_until = None;
            }
            debug!(domain = %domain, success, inflight = state.inflight, "Capacity released");
        })
    }

    /// Record an upstream error and return the end of the resulting cooldown
    pub fn register_error(&self, domain: &str) -> DateTime<Utc> {
        let now = self.clock.now();
        self.with_domain(domain, |policy, state| {
            state.error_count = state.error_count.saturating_add(1);
            let backoff = policy.backoff_seconds(state.error_count);
            let cooldown_until = add_seconds(now, backoff);
            state.cooldown_until = Some(cooldown_until);
            warn!(
                domain = %domain,
                error_count = state.error_count,
                backoff_seconds = backoff,
                cooldown_until = %cooldown_until,
                "⏳ Domain cooling down after error"
            );
            cooldown_until
        })
    }

    /// Domains with state or an explicit policy
    pub fn known_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.domains.iter().map(|e| e.key().clone()).collect();
        domains.sort();
        domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use chrono::{Duration, TimeZone};

    fn setup() -> (Arc<FrozenClock>, DomainRateLimiter) {
        let clock = Arc::new(FrozenClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ));
        let limiter = DomainRateLimiter::new(clock.clone());
        (clock, limiter)
    }

    #[test]
    fn test_first_acquire_is_admitted() {
        let (clock, limiter) = setup();

        assert!(limiter.can_acquire("example.com"));
        assert_eq!(limiter.acquire("example.com"), None);

        let state = limiter.state_snapshot("example.com");
        assert_eq!(state.inflight, 1);
        assert_eq!(state.window_count, 1);
        assert_eq!(state.last_request_at, Some(clock.now()));
    }

    #[test]
    fn test_concurrency_cap_denies_without_mutation() {
        let (clock, limiter) = setup();
        limiter.update_state("example.com", |s| s.inflight = 1);
        let before = limiter.state_snapshot("example.com");

        assert!(!limiter.can_acquire("example.com"));
        assert_eq!(limiter.acquire("example.com"), Some(clock.now()));

        let after = limiter.state_snapshot("example.com");
        assert_eq!(after.inflight, before.inflight);
        assert_eq!(after.window_count, 0);
        assert_eq!(after.last_request_at, None);
    }

    #[test]
    fn test_min_delay_spacing() {
        let (clock, limiter) = setup();
        limiter.set_policy(
            "example.com",
            DomainPolicy {
                concurrency_cap: 5,
                min_delay_seconds: 10.0,
                ..DomainPolicy::default()
            },
        );

        assert_eq!(limiter.acquire("example.com"), None);
        let retry_at = limiter.acquire("example.com").unwrap();
        assert_eq!(retry_at, clock.now() + Duration::seconds(10));

        clock.advance(10.0);
        assert_eq!(limiter.acquire("example.com"), None);
    }

    #[test]
    fn test_register_error_backoff_is_exponential_and_capped() {
        let (clock, limiter) = setup();
        limiter.set_policy(
            "example.com",
            DomainPolicy {
                error_backoff_seconds: 5.0,
                max_backoff_seconds: 30.0,
                ..DomainPolicy::default()
            },
        );

        let now = clock.now();
        assert_eq!(limiter.register_error("example.com"), now + Duration::seconds(5));
        assert_eq!(limiter.register_error("example.com"), now + Duration::seconds(10));
        assert_eq!(limiter.register_error("example.com"), now + Duration::seconds(20));
        assert_eq!(limiter.register_error("example.com"), now + Duration::seconds(30));
        assert_eq!(limiter.state_snapshot("example.com").inflight, 0);
    }

    #[test]
    fn test_oversized_policy_saturates_instead_of_overflowing() {
        let (_clock, limiter) = setup();
        limiter.set_policy(
            "example.com",
            DomainPolicy {
                min_delay_seconds: 1e13,
                error_backoff_seconds: 1e13,
                max_backoff_seconds: 1e13,
                ..DomainPolicy::default()
            },
        );

        for _ in 0..3 {
            assert_eq!(limiter.register_error("example.com"), DateTime::<Utc>::MAX_UTC);
        }
        assert!(limiter.acquire("example.com").is_some());
        assert_eq!(limiter.next_available_time("example.com"), DateTime::<Utc>::MAX_UTC);

        limiter.release("example.com", true);
        assert_eq!(limiter.acquire("example.com"), None);
        assert_eq!(limiter.next_available_time("example.com"), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_release_floors_and_resets_on_success() {
        let (_clock, limiter) = setup();
        limiter.register_error("example.com");
        limiter.release("example.com", false);

        let state = limiter.state_snapshot("example.com");
        assert_eq!(state.inflight, 0);
        assert_eq!(state.error_count, 1);
        assert!(state.cooldown_until.is_some());

        limiter.release("example.com", true);
        let state = limiter.state_snapshot("example.com");
        assert_eq!(state.error_count, 0);
        assert_eq!(state.cooldown_until, None);
    }

    #[test]
    fn test_budget_window() {
        let (clock, limiter) = setup();
        limiter.set_policy(
            "example.com",
            DomainPolicy {
                concurrency_cap: 10,
                min_delay_seconds: 0.0,
                budget_per_window: 1,
                window_seconds: 60.0,
                ..DomainPolicy::default()
            },
        );

        let window_start = clock.now();
        assert_eq!(limiter.acquire("example.com"), None);
        limiter.release("example.com", true);

        clock.advance(15.0);
        assert_eq!(
            limiter.acquire("example.com"),
            Some(window_start + Duration::seconds(60))
        );

        clock.advance(45.0);
        assert_eq!(limiter.acquire("example.com"), None);
        assert_eq!(limiter.state_snapshot("example.com").window_count, 1);
    }

    #[test]
    fn test_domains_are_independent() {
        let (_clock, limiter) = setup();
        assert_eq!(limiter.acquire("a.example"), None);
        assert_eq!(limiter.acquire("b.example"), None);
        assert!(!limiter.can_acquire("a.example"));
        assert_eq!(limiter.known_domains(), vec!["a.example", "b.example"]);
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_cap() {
        let (_clock, limiter) = setup();
        let limiter = Arc::new(limiter);
        limiter.set_policy(
            "example.com",
            DomainPolicy {
                concurrency_cap: 3,
                min_delay_seconds: 0.0,
                ..DomainPolicy::default()
            },
        );

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.acquire("example.com").is_none())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();

        assert_eq!(admitted, 3);
        assert_eq!(limiter.state_snapshot("example.com").inflight, 3);
    }
}
