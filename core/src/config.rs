//! Tunables for the flash-sale pipeline.
//!
//! Request throttling is declared as a static table of
//! [`Endpoint`] → [`AccessPolicy`] entries that the runtime applies before a
//! handler executes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Entry points of the purchase surface that carry an access policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// `POST /challenge`
    Challenge,
    /// `POST /challenge/verify`
    VerifyChallenge,
    /// `POST /purchase-path`
    PurchasePath,
    /// `POST /purchase`
    Purchase,
    /// `GET /purchase-result`
    PurchaseResult,
    /// `GET /purchase/check/{item}`
    PurchaseCheck,
    /// `GET /items`, `GET /items/{id}`
    Catalog,
    /// `GET /orders`, `GET /orders/{id}`
    Orders,
}

impl Endpoint {
    /// All endpoints, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Challenge,
        Self::VerifyChallenge,
        Self::PurchasePath,
        Self::Purchase,
        Self::PurchaseResult,
        Self::PurchaseCheck,
        Self::Catalog,
        Self::Orders,
    ];

    /// Stable name used in rate-limit keys, logs and metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Challenge => "challenge",
            Self::VerifyChallenge => "challenge_verify",
            Self::PurchasePath => "purchase_path",
            Self::Purchase => "purchase",
            Self::PurchaseResult => "purchase_result",
            Self::PurchaseCheck => "purchase_check",
            Self::Catalog => "catalog",
            Self::Orders => "orders",
        }
    }
}

/// Throttle applied to one endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Length of the fixed counting window.
    pub window: Duration,
    /// Requests allowed per identity per window.
    pub max_count: u32,
    /// Whether an anonymous caller is rejected outright.
    pub requires_auth: bool,
}

impl AccessPolicy {
    /// An authenticated policy of `max_count` requests per `window`.
    #[must_use]
    pub const fn per_window(max_count: u32, window: Duration) -> Self {
        Self {
            window,
            max_count,
            requires_auth: true,
        }
    }
}

/// Settings shared by every stage of the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlashSaleSettings {
    /// Lifetime of an issued challenge answer.
    pub challenge_ttl: Duration,
    /// Lifetime of an issued purchase path token.
    pub path_ttl: Duration,
    /// Lifetime of the per-item lock; bounds how long a crashed holder blocks others.
    pub lock_ttl: Duration,
    /// Pause before the single lock acquisition retry.
    pub lock_retry_delay: Duration,
    /// Lifetime of dispatch outcome markers.
    pub outcome_ttl: Duration,
    /// Deliveries of one message before it is dead-lettered.
    pub max_deliveries: u32,
    /// Number of dispatch workers.
    pub workers: usize,
    /// Deliveries buffered between the queue consumer and the workers.
    pub queue_buffer: usize,
    /// Per-endpoint throttles.
    pub access_policies: HashMap<Endpoint, AccessPolicy>,
}

impl Default for FlashSaleSettings {
    fn default() -> Self {
        let second = Duration::from_secs(1);
        let five = Duration::from_secs(5);

        let access_policies = HashMap::from([
            (Endpoint::Challenge, AccessPolicy::per_window(5, five)),
            (Endpoint::VerifyChallenge, AccessPolicy::per_window(5, five)),
            (Endpoint::PurchasePath, AccessPolicy::per_window(5, five)),
            (Endpoint::Purchase, AccessPolicy::per_window(10, second)),
            (Endpoint::PurchaseResult, AccessPolicy::per_window(1, second)),
            (Endpoint::PurchaseCheck, AccessPolicy::per_window(10, second)),
            (Endpoint::Catalog, AccessPolicy {
                window: second,
                max_count: 50,
                requires_auth: false,
            }),
            (Endpoint::Orders, AccessPolicy::per_window(50, second)),
        ]);

        Self {
            challenge_ttl: Duration::from_secs(100),
            path_ttl: Duration::from_secs(60),
            lock_ttl: Duration::from_secs(5),
            lock_retry_delay: Duration::from_millis(10),
            outcome_ttl: Duration::from_secs(60),
            max_deliveries: 3,
            workers: 8,
            queue_buffer: 1000,
            access_policies,
        }
    }
}

impl FlashSaleSettings {
    /// Policy for `endpoint`, if one is configured.
    #[must_use]
    pub fn policy(&self, endpoint: Endpoint) -> Option<AccessPolicy> {
        self.access_policies.get(&endpoint).copied()
    }

    /// Replace the policy for one endpoint.
    #[must_use]
    pub fn with_policy(mut self, endpoint: Endpoint, policy: AccessPolicy) -> Self {
        self.access_policies.insert(endpoint, policy);
        self
    }
}
