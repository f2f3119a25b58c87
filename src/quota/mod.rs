mod input_builder;

pub use input_builder::{QuotaInputFunctionBuilder, QuotaInputFuture};

use crate::identity::Identity;
use crate::store::TtlStore;
use std::time::Duration;

/// Conventional ceiling shared by general-purpose call sites.
pub const DEFAULT_MAX_REQUESTS: u64 = 30;
/// Conventional window shared by general-purpose call sites.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// The limits applied at a call site.
///
/// A policy is plain configuration; nothing is persisted per policy. Each
/// call site supplies its own values, typically starting from
/// [QuotaPolicy::default].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPolicy {
    /// The total requests to be allowed within the window.
    pub max_requests: u64,
    /// The rate limiting window.
    pub window: Duration,
    /// Namespace prepended to every store key, so unrelated features sharing
    /// one store cannot collide.
    pub key_prefix: String,
}

impl QuotaPolicy {
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            key_prefix: String::new(),
        }
    }

    pub fn with_key_prefix(mut self, key_prefix: &str) -> Self {
        self.key_prefix = key_prefix.to_owned();
        self
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

/// One quota check: who is asking, what they are doing, and the limits that
/// apply.
#[derive(Debug, Clone)]
pub struct CheckInput {
    /// The protected operation, e.g. `"posts"`. Distinct actions count
    /// independently.
    pub action: String,
    /// The subject being counted.
    pub identity: Identity,
    pub policy: QuotaPolicy,
}

impl CheckInput {
    pub fn new(action: &str, identity: Identity, policy: QuotaPolicy) -> Self {
        Self {
            action: action.to_owned(),
            identity,
            policy,
        }
    }

    /// The store key for this check: `{prefix}{action}_{identity}`.
    pub fn store_key(&self) -> String {
        format!(
            "{}{}_{}",
            self.policy.key_prefix, self.action, self.identity
        )
    }
}

/// The result of a quota check.
///
/// A denial is an expected outcome of normal operation, not a fault, which is
/// why it is a variant here rather than an error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Allowed,
    Denied {
        /// How long the caller should wait before retrying. Always the full
        /// policy window: the store exposes no remaining TTL, so no attempt
        /// is made to compute the actual time left.
        retry_after: Duration,
    },
}

impl Outcome {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn is_denied(self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

/// A fixed-window request limiter over a [TtlStore].
///
/// The limiter holds no state of its own; every counter lives in the store
/// and is evicted by the store's TTL, never deleted explicitly.
#[derive(Clone)]
pub struct Limiter<S> {
    store: S,
}

impl<S: TtlStore> Limiter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Decide whether this request may proceed, and record it if so.
    ///
    /// Performs exactly one store read, and exactly one store write when the
    /// request is allowed. The write replaces the counter with a fresh TTL,
    /// so steady traffic below the ceiling keeps extending the window rather
    /// than ever seeing a calendar-aligned reset.
    ///
    /// The read and the write are two separate store operations: concurrent
    /// checks for the same key can both observe the same count and both be
    /// allowed, so the ceiling is a soft bound under contention. Callers
    /// needing a hard bound must serialize checks per key themselves.
    pub async fn check(&self, input: CheckInput) -> Result<Outcome, S::Error> {
        let key = input.store_key();
        let count = self.store.get(&key).await?.unwrap_or(0);
        if count >= input.policy.max_requests {
            return Ok(Outcome::Denied {
                retry_after: input.policy.window,
            });
        }
        self.store.set(&key, count + 1, input.policy.window).await?;
        Ok(Outcome::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    const MINUTE: Duration = Duration::from_secs(60);

    fn limiter() -> Limiter<InMemoryStore> {
        Limiter::new(InMemoryStore::builder().with_gc_interval(None).build())
    }

    fn input(action: &str, identity: Identity, max_requests: u64) -> CheckInput {
        CheckInput::new(action, identity, QuotaPolicy::new(max_requests, MINUTE))
    }

    #[test]
    fn test_store_key() {
        let input = CheckInput::new(
            "posts",
            Identity::User(7),
            QuotaPolicy::default().with_key_prefix("cb_rl_"),
        );
        assert_eq!(input.store_key(), "cb_rl_posts_user_7");

        let input = CheckInput::new(
            "posts",
            Identity::Ip("203.0.113.9".to_string()),
            QuotaPolicy::default(),
        );
        assert_eq!(input.store_key(), "posts_ip_203.0.113.9");
    }

    #[actix_web::test]
    async fn test_window_ceiling() {
        tokio::time::pause();
        let limiter = limiter();
        for _ in 0..5 {
            // First 5 should be allowed
            let outcome = limiter
                .check(input("posts", Identity::User(1), 5))
                .await
                .unwrap();
            assert!(outcome.is_allowed());
        }
        // Sixth should be denied
        let outcome = limiter
            .check(input("posts", Identity::User(1), 5))
            .await
            .unwrap();
        assert!(outcome.is_denied());
    }

    #[actix_web::test]
    async fn test_identities_independent() {
        tokio::time::pause();
        let limiter = limiter();
        let outcome = limiter
            .check(input("posts", Identity::User(1), 1))
            .await
            .unwrap();
        assert!(outcome.is_allowed());
        let outcome = limiter
            .check(input("posts", Identity::User(1), 1))
            .await
            .unwrap();
        assert!(outcome.is_denied());
        // A different identity still has its full allowance.
        let outcome = limiter
            .check(input("posts", Identity::User(2), 1))
            .await
            .unwrap();
        assert!(outcome.is_allowed());
    }

    #[actix_web::test]
    async fn test_actions_independent() {
        tokio::time::pause();
        let limiter = limiter();
        let outcome = limiter
            .check(input("posts", Identity::User(1), 1))
            .await
            .unwrap();
        assert!(outcome.is_allowed());
        let outcome = limiter
            .check(input("posts", Identity::User(1), 1))
            .await
            .unwrap();
        assert!(outcome.is_denied());
        // Exhausting "posts" must not touch "templates".
        let outcome = limiter
            .check(input("templates", Identity::User(1), 1))
            .await
            .unwrap();
        assert!(outcome.is_allowed());
    }

    #[actix_web::test]
    async fn test_window_reset_on_expiry() {
        tokio::time::pause();
        let store = InMemoryStore::builder().with_gc_interval(None).build();
        let limiter = Limiter::new(store.clone());
        let outcome = limiter
            .check(input("posts", Identity::User(1), 1))
            .await
            .unwrap();
        assert!(outcome.is_allowed());
        let outcome = limiter
            .check(input("posts", Identity::User(1), 1))
            .await
            .unwrap();
        assert!(outcome.is_denied());
        // Let the counter expire with no intervening calls.
        tokio::time::advance(MINUTE + Duration::from_secs(1)).await;
        let outcome = limiter
            .check(input("posts", Identity::User(1), 1))
            .await
            .unwrap();
        assert!(outcome.is_allowed());
        // The counter restarted at 1.
        assert_eq!(store.get("posts_user_1").await.unwrap(), Some(1));
    }

    #[actix_web::test]
    async fn test_allowed_writes_extend_window() {
        tokio::time::pause();
        let limiter = limiter();
        let make = || input("posts", Identity::User(1), 2);
        let outcome = limiter.check(make()).await.unwrap();
        assert!(outcome.is_allowed());
        // 40s later: second allowed call rewrites the counter with a fresh TTL.
        tokio::time::advance(Duration::from_secs(40)).await;
        let outcome = limiter.check(make()).await.unwrap();
        assert!(outcome.is_allowed());
        // 80s after the first call the window would have lapsed had the TTL
        // not been extended, but the count of 2 is still live.
        tokio::time::advance(Duration::from_secs(40)).await;
        let outcome = limiter.check(make()).await.unwrap();
        assert!(outcome.is_denied());
        // Denials write nothing, so the counter finally expires on its own.
        tokio::time::advance(MINUTE).await;
        let outcome = limiter.check(make()).await.unwrap();
        assert!(outcome.is_allowed());
    }

    #[actix_web::test]
    async fn test_retry_hint_is_full_window() {
        tokio::time::pause();
        let limiter = limiter();
        let policy = QuotaPolicy::new(1, Duration::from_secs(45));
        let make = || CheckInput::new("posts", Identity::User(1), policy.clone());
        assert!(limiter.check(make()).await.unwrap().is_allowed());
        // 30s into the window the hint is still the full 45s.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(
            limiter.check(make()).await.unwrap(),
            Outcome::Denied {
                retry_after: Duration::from_secs(45)
            }
        );
    }

    #[actix_web::test]
    async fn test_sections_scenario() {
        tokio::time::pause();
        let store = InMemoryStore::builder().with_gc_interval(None).build();
        let limiter = Limiter::new(store.clone());
        let make = || input("sections", Identity::User(42), 3);

        for expected_count in 1..=3u64 {
            let outcome = limiter.check(make()).await.unwrap();
            assert!(outcome.is_allowed());
            assert_eq!(
                store.get("sections_user_42").await.unwrap(),
                Some(expected_count)
            );
        }
        // Fourth call within the same window is denied with the full window
        // as the retry hint, and the counter is untouched.
        let outcome = limiter.check(make()).await.unwrap();
        assert_eq!(outcome, Outcome::Denied { retry_after: MINUTE });
        assert_eq!(store.get("sections_user_42").await.unwrap(), Some(3));

        tokio::time::advance(Duration::from_secs(61)).await;
        let outcome = limiter.check(make()).await.unwrap();
        assert!(outcome.is_allowed());
        assert_eq!(store.get("sections_user_42").await.unwrap(), Some(1));
    }
}
