//! Per-(signal, target) idempotency claims.
//!
//! A claim is a set-if-absent key with a 24 hour TTL. Numeric key parts
//! are formatted with fixed 8-place precision: any drift between the
//! producer's and the consumer's formatting would invalidate the claim.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ExistenceCheck, SetExpiry, SetOptions};
use rust_decimal::Decimal;
use thiserror::Error;

/// How long a claim suppresses duplicates.
pub const CLAIM_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from the claim backend.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// The key-value store is unreachable or misbehaving.
    #[error("idempotency backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

/// Deterministic claim key for one attempt on one target.
///
/// `quantity` must be the original (unscaled) source quantity.
#[must_use]
pub fn claim_key(target: &str, signal_id: &str, quantity: Decimal, price: Decimal) -> String {
    format!("signal:{target}:{signal_id}:{quantity:.8}:{price:.8}")
}

/// Claim store contract.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically claim the key for `(target, signal_id, quantity, price)`.
    ///
    /// Returns `true` iff the claim is new; `false` means a duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyError`] when the backend is unreachable;
    /// callers treat that as non-duplicate and proceed (fail-open).
    async fn claim(
        &self,
        target: &str,
        signal_id: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<bool, IdempotencyError>;

    /// Drop a claim so a redelivery may retry the target.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyError`] when the backend is unreachable.
    async fn release(
        &self,
        target: &str,
        signal_id: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<(), IdempotencyError>;
}

/// Redis-backed claim store (`SET NX EX`).
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisIdempotencyStore {
    /// Wrap a pooled connection with the default 24 h TTL.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            ttl: CLAIM_TTL,
        }
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn claim(
        &self,
        target: &str,
        signal_id: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<bool, IdempotencyError> {
        let key = claim_key(target, signal_id, quantity, price);
        let options = SetOptions::default()
            .conditional_set(ExistenceCheck::NX)
            .with_expiration(SetExpiry::EX(self.ttl.as_secs() as usize));

        let mut conn = self.conn.clone();
        let reply: Option<String> = conn.set_options(&key, "1", options).await?;
        Ok(reply.is_some())
    }

    async fn release(
        &self,
        target: &str,
        signal_id: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<(), IdempotencyError> {
        let key = claim_key(target, signal_id, quantity, price);
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&key).await?;
        Ok(())
    }
}

/// In-memory claim store with TTL, for tests and single-process runs.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Option<Duration>,
}

impl InMemoryIdempotencyStore {
    /// Store with the default 24 h TTL.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Some(CLAIM_TTL),
        }
    }

    /// Store with a custom TTL, for expiry tests.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn claim(
        &self,
        target: &str,
        signal_id: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<bool, IdempotencyError> {
        let key = claim_key(target, signal_id, quantity, price);
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(claimed_at) = entries.get(&key)
            && self.ttl.is_none_or(|ttl| now.duration_since(*claimed_at) < ttl)
        {
            return Ok(false);
        }
        entries.insert(key, now);
        Ok(true)
    }

    async fn release(
        &self,
        target: &str,
        signal_id: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<(), IdempotencyError> {
        let key = claim_key(target, signal_id, quantity, price);
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn key_uses_fixed_precision() {
        let key = claim_key(
            "okx",
            "42",
            Decimal::from_str("1").unwrap(),
            Decimal::from_str("30000.5").unwrap(),
        );
        assert_eq!(key, "signal:okx:42:1.00000000:30000.50000000");
    }

    #[test]
    fn key_is_stable_across_representations() {
        // 1 and 1.0 format identically at 8 places.
        let a = claim_key("okx", "42", Decimal::from_str("1").unwrap(), Decimal::ZERO);
        let b = claim_key("okx", "42", Decimal::from_str("1.0").unwrap(), Decimal::ZERO);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn first_claim_wins_second_is_duplicate() {
        let store = InMemoryIdempotencyStore::new();
        let qty = Decimal::ONE;
        assert!(store.claim("okx", "42", qty, Decimal::ZERO).await.unwrap());
        assert!(!store.claim("okx", "42", qty, Decimal::ZERO).await.unwrap());
        // Different target namespaces do not collide.
        assert!(store.claim("bybit", "42", qty, Decimal::ZERO).await.unwrap());
    }

    #[tokio::test]
    async fn release_allows_a_new_claim() {
        let store = InMemoryIdempotencyStore::new();
        let qty = Decimal::ONE;
        assert!(store.claim("okx", "42", qty, Decimal::ZERO).await.unwrap());
        store.release("okx", "42", qty, Decimal::ZERO).await.unwrap();
        assert!(store.claim("okx", "42", qty, Decimal::ZERO).await.unwrap());
    }

    #[tokio::test]
    async fn expired_claim_can_be_retaken() {
        let store = InMemoryIdempotencyStore::with_ttl(Duration::from_millis(5));
        let qty = Decimal::ONE;
        assert!(store.claim("okx", "42", qty, Decimal::ZERO).await.unwrap());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.claim("okx", "42", qty, Decimal::ZERO).await.unwrap());
    }
}
