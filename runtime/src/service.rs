//! The `FlashSale` facade: one method per entry point of the purchase
//! surface.
//!
//! Every method takes the request-scoped [`RequestContext`] and starts by
//! applying the endpoint's access policy. The purchase methods then run
//! sale window → path token → stock gate → commit (or enqueue).

use crate::challenge::{Challenge, ChallengeGate};
use crate::committer::OrderCommitter;
use crate::dispatcher::{DispatchDeps, Dispatcher};
use crate::lock::LockManager;
use crate::rate_limit::AccessGuard;
use crate::stock_gate::StockGate;
use dashmap::DashMap;
use flashgate_core::providers::{
    ChallengeStore, DeadLetterSink, DispatchQueue, InventoryStore, LockStore, MarkerStore,
    RateCounter, StockCounter,
};
use flashgate_core::{
    Clock, Endpoint, FlashSaleError, FlashSaleSettings, Item, ItemId, Order, OrderId,
    PurchaseRequest, PurchaseResult, RequestContext, Result, SaleStatus, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Every backing store the pipeline needs.
#[derive(Clone)]
pub struct Providers {
    /// Rate-limit counters.
    pub rate_counter: Arc<dyn RateCounter>,
    /// Challenge answers and path tokens.
    pub challenges: Arc<dyn ChallengeStore>,
    /// Advisory stock counters.
    pub stock: Arc<dyn StockCounter>,
    /// Per-item locks.
    pub locks: Arc<dyn LockStore>,
    /// Purchase and outcome markers.
    pub markers: Arc<dyn MarkerStore>,
    /// Authoritative items and orders.
    pub inventory: Arc<dyn InventoryStore>,
    /// Purchase queue.
    pub queue: Arc<dyn DispatchQueue>,
    /// Dead-letter destination.
    pub dead_letters: Arc<dyn DeadLetterSink>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

/// An item together with where the current time falls in its sale window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    /// The item.
    #[serde(flatten)]
    pub item: Item,
    /// Sale status at read time.
    pub sale_status: SaleStatus,
}

/// Flash-sale purchase pipeline.
pub struct FlashSale {
    clock: Arc<dyn Clock>,
    inventory: Arc<dyn InventoryStore>,
    markers: Arc<dyn MarkerStore>,
    access: AccessGuard,
    challenges: ChallengeGate,
    stock_gate: Arc<StockGate>,
    committer: Arc<OrderCommitter>,
    dispatcher: Arc<Dispatcher>,
    catalog: DashMap<ItemId, Item>,
}

impl FlashSale {
    /// Wire the pipeline over `providers`.
    #[must_use]
    pub fn new(providers: Providers, settings: &FlashSaleSettings) -> Self {
        let stock_gate = Arc::new(StockGate::new(
            Arc::clone(&providers.stock),
            Arc::clone(&providers.markers),
            Arc::clone(&providers.inventory),
        ));
        let committer = Arc::new(OrderCommitter::new(
            Arc::clone(&providers.inventory),
            Arc::clone(&providers.markers),
            LockManager::new(Arc::clone(&providers.locks), settings),
            Arc::clone(&stock_gate),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            DispatchDeps {
                queue: Arc::clone(&providers.queue),
                dead_letters: Arc::clone(&providers.dead_letters),
                markers: Arc::clone(&providers.markers),
                inventory: Arc::clone(&providers.inventory),
                clock: Arc::clone(&providers.clock),
            },
            Arc::clone(&committer),
            settings,
        ));

        Self {
            access: AccessGuard::new(Arc::clone(&providers.rate_counter), settings),
            challenges: ChallengeGate::new(Arc::clone(&providers.challenges), settings),
            clock: providers.clock,
            inventory: providers.inventory,
            markers: providers.markers,
            stock_gate,
            committer,
            dispatcher,
            catalog: DashMap::new(),
        }
    }

    /// The dispatcher, for running the worker pool.
    #[must_use]
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Load the catalog and seed stock counters.
    ///
    /// Returns how many counters were seeded by this call.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`] if a store fails.
    pub async fn warm_up(&self) -> Result<usize> {
        let items = self.inventory.items().await?;
        for item in &items {
            self.catalog.insert(item.id, item.clone());
        }
        self.stock_gate.warm_up(&items).await
    }

    // ═══════════════════════════════════════════════════════════
    // Challenge
    // ═══════════════════════════════════════════════════════════

    /// `POST /challenge`
    ///
    /// # Errors
    ///
    /// Access-guard rejections, [`FlashSaleError::ItemNotFound`], or
    /// [`FlashSaleError::Infrastructure`].
    pub async fn issue_challenge(&self, ctx: &RequestContext, item: ItemId) -> Result<Challenge> {
        let user = self.require_user(ctx, Endpoint::Challenge).await?;
        self.catalog_item(item).await?;
        self.challenges.issue_challenge(user, item).await
    }

    /// `POST /challenge/verify`
    ///
    /// # Errors
    ///
    /// Access-guard rejections, [`FlashSaleError::InvalidChallenge`], or
    /// [`FlashSaleError::Infrastructure`].
    pub async fn verify_challenge(&self, ctx: &RequestContext, item: ItemId, answer: &str) -> Result<()> {
        let user = self.require_user(ctx, Endpoint::VerifyChallenge).await?;
        if self.challenges.verify_challenge(user, item, answer).await? {
            Ok(())
        } else {
            tracing::debug!(user_id = %user, item_id = %item, "Challenge answer rejected");
            Err(FlashSaleError::InvalidChallenge)
        }
    }

    /// `POST /purchase-path`
    ///
    /// # Errors
    ///
    /// Access-guard rejections, [`FlashSaleError::ItemNotFound`],
    /// [`FlashSaleError::SaleNotActive`], [`FlashSaleError::InvalidChallenge`],
    /// or [`FlashSaleError::Infrastructure`].
    pub async fn issue_purchase_path(&self, ctx: &RequestContext, item: ItemId) -> Result<String> {
        let user = self.require_user(ctx, Endpoint::PurchasePath).await?;
        self.on_sale_item(item).await?;
        self.challenges.issue_purchase_path(user, item).await
    }

    // ═══════════════════════════════════════════════════════════
    // Purchase
    // ═══════════════════════════════════════════════════════════

    /// `POST /purchase`, committing inline.
    ///
    /// # Errors
    ///
    /// Any rejection of the taxonomy in [`FlashSaleError`].
    pub async fn purchase(&self, ctx: &RequestContext, item: ItemId, token: &str) -> Result<Order> {
        let user = self.pass_gates(ctx, item, token).await?;
        self.committer.purchase(user, item).await
    }

    /// `POST /purchase`, enqueueing for a dispatch worker.
    ///
    /// Returns [`PurchaseResult::Pending`] once queued. A repeated request
    /// while the first is still pending is not queued again.
    ///
    /// # Errors
    ///
    /// Any admission rejection, or [`FlashSaleError::Infrastructure`] if the
    /// request could not be queued.
    pub async fn purchase_queued(
        &self,
        ctx: &RequestContext,
        item: ItemId,
        token: &str,
    ) -> Result<PurchaseResult> {
        let user = self.pass_gates(ctx, item, token).await?;
        if self.dispatcher.is_pending(user, item).await? {
            return Ok(PurchaseResult::Pending);
        }
        let _reservation = self.stock_gate.admit(user, item).await?;

        let request = PurchaseRequest::new(user, item, self.clock.now());
        if let Err(err) = self.dispatcher.enqueue(&request).await {
            self.committer.abandon(user, item, "enqueue_failed").await;
            return Err(err);
        }
        Ok(PurchaseResult::Pending)
    }

    /// `GET /purchase-result`
    ///
    /// # Errors
    ///
    /// Access-guard rejections (including the per-item poll interval) or
    /// [`FlashSaleError::Infrastructure`].
    pub async fn purchase_result(&self, ctx: &RequestContext, item: ItemId) -> Result<PurchaseResult> {
        let user = self
            .access
            .check_for_item(ctx, Endpoint::PurchaseResult, item)
            .await?
            .ok_or(FlashSaleError::Unauthenticated)?;
        self.dispatcher.poll_result(user, item).await
    }

    /// `GET /purchase/check/{item}`: the caller's order for `item`, if any.
    ///
    /// # Errors
    ///
    /// Access-guard rejections or [`FlashSaleError::Infrastructure`].
    pub async fn check_purchase(&self, ctx: &RequestContext, item: ItemId) -> Result<Option<OrderId>> {
        let user = self.require_user(ctx, Endpoint::PurchaseCheck).await?;
        if let Some(order_id) = self.markers.purchase_marker(user, item).await? {
            return Ok(Some(order_id));
        }
        Ok(self.inventory.purchase_of(user, item).await?)
    }

    // ═══════════════════════════════════════════════════════════
    // Catalog and orders
    // ═══════════════════════════════════════════════════════════

    /// `GET /items`
    ///
    /// # Errors
    ///
    /// Access-guard rejections or [`FlashSaleError::Infrastructure`].
    pub async fn items(&self, ctx: &RequestContext) -> Result<Vec<ItemView>> {
        self.access.check(ctx, Endpoint::Catalog).await?;
        let now = self.clock.now();
        Ok(self
            .inventory
            .items()
            .await?
            .into_iter()
            .map(|item| ItemView {
                sale_status: item.sale_window.status_at(now),
                item,
            })
            .collect())
    }

    /// `GET /items/{id}`
    ///
    /// # Errors
    ///
    /// Access-guard rejections, [`FlashSaleError::ItemNotFound`], or
    /// [`FlashSaleError::Infrastructure`].
    pub async fn item(&self, ctx: &RequestContext, item: ItemId) -> Result<ItemView> {
        self.access.check(ctx, Endpoint::Catalog).await?;
        let item = self
            .inventory
            .item(item)
            .await?
            .ok_or(FlashSaleError::ItemNotFound)?;
        Ok(ItemView {
            sale_status: item.sale_window.status_at(self.clock.now()),
            item,
        })
    }

    /// `GET /orders`
    ///
    /// # Errors
    ///
    /// Access-guard rejections or [`FlashSaleError::Infrastructure`].
    pub async fn orders(&self, ctx: &RequestContext) -> Result<Vec<Order>> {
        let user = self.require_user(ctx, Endpoint::Orders).await?;
        Ok(self.inventory.orders_for(user).await?)
    }

    /// `GET /orders/{id}`. Another user's order is reported as not found.
    ///
    /// # Errors
    ///
    /// Access-guard rejections, [`FlashSaleError::OrderNotFound`], or
    /// [`FlashSaleError::Infrastructure`].
    pub async fn order(&self, ctx: &RequestContext, order: OrderId) -> Result<Order> {
        let user = self.require_user(ctx, Endpoint::Orders).await?;
        self.inventory
            .order(order)
            .await?
            .filter(|o| o.user_id == user)
            .ok_or(FlashSaleError::OrderNotFound)
    }

    // ═══════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════

    async fn require_user(&self, ctx: &RequestContext, endpoint: Endpoint) -> Result<UserId> {
        self.access
            .check(ctx, endpoint)
            .await?
            .ok_or(FlashSaleError::Unauthenticated)
    }

    /// Access guard, sale window and path token, in that order.
    async fn pass_gates(&self, ctx: &RequestContext, item: ItemId, token: &str) -> Result<UserId> {
        let user = self.require_user(ctx, Endpoint::Purchase).await?;
        self.on_sale_item(item).await?;

        if !self.challenges.verify_purchase_path(user, item, token).await? {
            tracing::debug!(user_id = %user, item_id = %item, "Purchase path rejected");
            return Err(FlashSaleError::InvalidPath);
        }
        Ok(user)
    }

    /// Read-through catalog lookup. Only the immutable parts of the cached
    /// row (name, price, sale window) are ever read from the cache.
    async fn catalog_item(&self, item: ItemId) -> Result<Item> {
        if let Some(cached) = self.catalog.get(&item) {
            return Ok(cached.clone());
        }
        let row = self
            .inventory
            .item(item)
            .await?
            .ok_or(FlashSaleError::ItemNotFound)?;
        self.catalog.insert(item, row.clone());
        Ok(row)
    }

    async fn on_sale_item(&self, item: ItemId) -> Result<Item> {
        let row = self.catalog_item(item).await?;
        if row.sale_window.is_open_at(self.clock.now()) {
            Ok(row)
        } else {
            Err(FlashSaleError::SaleNotActive)
        }
    }
}
