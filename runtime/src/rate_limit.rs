//! Per-identity, per-endpoint request throttling.
//!
//! The [`AccessGuard`] applies the static [`Endpoint`] → [`AccessPolicy`]
//! table from [`FlashSaleSettings`] as the first step of every entry point.

use crate::metrics::AccessMetrics;
use flashgate_core::providers::RateCounter;
use flashgate_core::{
    AccessPolicy, Endpoint, FlashSaleError, FlashSaleSettings, ItemId, RequestContext, Result,
    UserId,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Bucket shared by all anonymous callers of an endpoint.
const ANONYMOUS: &str = "anonymous";

/// Fixed-window limiter driven by the access-policy table.
#[derive(Clone)]
pub struct AccessGuard {
    counter: Arc<dyn RateCounter>,
    policies: HashMap<Endpoint, AccessPolicy>,
}

impl AccessGuard {
    /// Create a guard over `counter` with the policies in `settings`.
    #[must_use]
    pub fn new(counter: Arc<dyn RateCounter>, settings: &FlashSaleSettings) -> Self {
        Self {
            counter,
            policies: settings.access_policies.clone(),
        }
    }

    /// Count one request from `identity` to `endpoint` and reject it once
    /// more than `max_count` have been seen in the current window.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::RateLimited`] when over the limit, or
    /// [`FlashSaleError::Infrastructure`] if the counter store fails.
    pub async fn allow(&self, identity: &str, endpoint: Endpoint, policy: AccessPolicy) -> Result<()> {
        let key = format!("{}:{identity}", endpoint.as_str());
        let window = self.counter.increment(&key, policy.window).await?;

        if window.count > u64::from(policy.max_count) {
            tracing::debug!(
                endpoint = endpoint.as_str(),
                identity,
                count = window.count,
                max = policy.max_count,
                "Request rate limited"
            );
            AccessMetrics::record_rejection(endpoint.as_str(), "rate_limited");
            return Err(FlashSaleError::RateLimited {
                retry_after: window.resets_in,
            });
        }
        Ok(())
    }

    /// Apply the endpoint's policy to the caller.
    ///
    /// Returns the caller's identity (`None` for anonymous callers of an
    /// endpoint that allows them).
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Unauthenticated`] for an anonymous caller of
    /// an authenticated endpoint, [`FlashSaleError::RateLimited`] when over
    /// the limit, or [`FlashSaleError::Infrastructure`] if the counter store
    /// fails.
    pub async fn check(&self, ctx: &RequestContext, endpoint: Endpoint) -> Result<Option<UserId>> {
        self.enforce(ctx, endpoint, None).await
    }

    /// Like [`check`](Self::check) but counting per (caller, item), used to
    /// enforce a minimum interval between result polls for one purchase.
    ///
    /// # Errors
    ///
    /// Same as [`check`](Self::check).
    pub async fn check_for_item(
        &self,
        ctx: &RequestContext,
        endpoint: Endpoint,
        item: ItemId,
    ) -> Result<Option<UserId>> {
        self.enforce(ctx, endpoint, Some(item)).await
    }

    async fn enforce(
        &self,
        ctx: &RequestContext,
        endpoint: Endpoint,
        item: Option<ItemId>,
    ) -> Result<Option<UserId>> {
        let Some(policy) = self.policies.get(&endpoint).copied() else {
            return Ok(ctx.user);
        };

        if policy.requires_auth && ctx.user.is_none() {
            AccessMetrics::record_rejection(endpoint.as_str(), "unauthenticated");
            return Err(FlashSaleError::Unauthenticated);
        }

        let caller = ctx
            .user
            .map_or_else(|| ANONYMOUS.to_string(), |user| user.to_string());
        let identity = match item {
            Some(item) => format!("{caller}:{item}"),
            None => caller,
        };

        self.allow(&identity, endpoint, policy).await?;
        Ok(ctx.user)
    }
}
