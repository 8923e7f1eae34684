//! Rate Limiter
//!
//! Binds one [`LimitPolicy`] to one [`WindowStore`]. Each deployed call-site
//! (general API, auth, reporting) builds its own limiter; whether two
//! limiters share a per-client budget is decided by whether they are handed
//! the same store.

use super::config::LimitPolicy;
use super::store::WindowStore;

/// Outcome of gating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    /// Request may proceed
    Allowed {
        /// Budget left in the current window after this request
        remaining: u32,
    },
    /// Request exceeds the window budget
    Rejected {
        /// Whole seconds until the window resets, rounded up
        retry_after_secs: u64,
    },
}

impl LimitDecision {
    /// Whether the request was allowed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// A request gate for one endpoint class.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    policy: LimitPolicy,
    store: WindowStore,
}

impl RateLimiter {
    /// Create a limiter over an explicit store.
    ///
    /// Pass the same store to several limiters to pool their per-client
    /// budgets; pass fresh stores to keep budgets independent.
    pub fn new(policy: LimitPolicy, store: WindowStore) -> Self {
        Self { policy, store }
    }

    /// Create a limiter with its own isolated store
    pub fn with_policy(policy: LimitPolicy) -> Self {
        Self::new(policy, WindowStore::new())
    }

    /// Gate one request from `key`
    pub async fn check(&self, key: &str) -> LimitDecision {
        self.store.check(key, &self.policy).await
    }

    /// The limiter's policy
    pub fn policy(&self) -> &LimitPolicy {
        &self.policy
    }

    /// The limiter's backing store
    pub fn store(&self) -> &WindowStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_auth_policy_scenario() {
        // Deployed auth policy: 5 requests per 60s window.
        let limiter = RateLimiter::with_policy(LimitPolicy::new(5, 60_000));

        for _ in 0..5 {
            assert!(limiter.check("1.2.3.4").await.is_allowed());
        }

        let decision = limiter.check("1.2.3.4").await;
        assert_eq!(
            decision,
            LimitDecision::Rejected {
                retry_after_secs: 60
            }
        );

        // After the window lapses the budget is fresh, not carried over.
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(
            limiter.check("1.2.3.4").await,
            LimitDecision::Allowed { remaining: 4 }
        );
        assert_eq!(limiter.store().window("1.2.3.4").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_limiters_sharing_a_store_share_budget() {
        let store = WindowStore::new();
        let first = RateLimiter::new(LimitPolicy::new(2, 60_000), store.clone());
        let second = RateLimiter::new(LimitPolicy::new(2, 60_000), store);

        assert!(first.check("x").await.is_allowed());
        assert!(second.check("x").await.is_allowed());
        assert!(!first.check("x").await.is_allowed());
    }

    #[tokio::test]
    async fn test_limiters_with_own_stores_are_independent() {
        let first = RateLimiter::with_policy(LimitPolicy::new(1, 60_000));
        let second = RateLimiter::with_policy(LimitPolicy::new(1, 60_000));

        assert!(first.check("x").await.is_allowed());
        assert!(second.check("x").await.is_allowed());
    }
}
