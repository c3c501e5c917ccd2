//! # Resilience Module
//!
//! Admission control for upstream domains.
//!
//! ## Architecture
//!
//! - **Domain Policies**: concurrency cap, spacing, window budget and backoff
//!   limits, one per domain with a configurable default
//! - **Domain State**: inflight count, last admission, error streak, cooldown
//!   and window counters, created lazily per domain
//! - **Rate Limiter**: atomic check-and-admit per domain, returning a retry
//!   instant instead of blocking
//!
//! ## Usage
//!
//! ```rust
//! use acquisition_core::clock::SystemClock;
//! use acquisition_core::resilience::{DomainPolicy, DomainRateLimiter};
//! use std::sync::Arc;
//!
//! let limiter = DomainRateLimiter::new(Arc::new(SystemClock));
//! limiter.set_policy("example.com", DomainPolicy { concurrency_cap: 2, ..DomainPolicy::default() });
//!
//! match limiter.acquire("example.com") {
//!     None => {
//!         // fetch, then give the capacity back
//!         limiter.release("example.com", true);
//!     }
//!     Some(retry_at) => println!("try again at {retry_at}"),
//! }
//! ```

pub mod domain_policy;
pub mod rate_limiter;

pub use domain_policy::{DomainPolicy, DomainState};
pub use rate_limiter::DomainRateLimiter;
