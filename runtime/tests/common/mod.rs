//! Shared harness for pipeline tests: a `FlashSale` wired over in-memory
//! providers, with handles to every mock for assertions and fault injection.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)] // Test code

use flashgate_core::{
    AccessPolicy, Endpoint, FlashSaleSettings, Item, ItemId, RequestContext, UserId,
};
use flashgate_runtime::{FlashSale, Providers};
use flashgate_testing::mocks::{
    InMemoryChallengeStore, InMemoryDispatchQueue, InMemoryInventory, InMemoryLockStore,
    InMemoryMarkerStore, InMemoryRateCounter, InMemoryStockCounter, RecordingDeadLetterSink,
};
use flashgate_testing::test_clock;
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub sale: Arc<FlashSale>,
    pub challenges: InMemoryChallengeStore,
    pub stock: InMemoryStockCounter,
    pub locks: InMemoryLockStore,
    pub markers: InMemoryMarkerStore,
    pub inventory: InMemoryInventory,
    pub queue: InMemoryDispatchQueue,
    pub dead_letters: RecordingDeadLetterSink,
}

/// Settings whose access policies never get in the way of a test.
pub fn relaxed_settings() -> FlashSaleSettings {
    Endpoint::ALL
        .into_iter()
        .fold(FlashSaleSettings::default(), |settings, endpoint| {
            let requires_auth = settings
                .policy(endpoint)
                .is_none_or(|p| p.requires_auth);
            settings.with_policy(
                endpoint,
                AccessPolicy {
                    window: Duration::from_secs(1),
                    max_count: 100_000,
                    requires_auth,
                },
            )
        })
}

impl Harness {
    pub fn new(items: Vec<Item>) -> Self {
        Self::with_settings(items, &relaxed_settings())
    }

    pub fn with_settings(items: Vec<Item>, settings: &FlashSaleSettings) -> Self {
        let inventory = InMemoryInventory::new();
        for item in items {
            inventory.insert_item(item);
        }
        let challenges = InMemoryChallengeStore::new();
        let stock = InMemoryStockCounter::new();
        let locks = InMemoryLockStore::new();
        let markers = InMemoryMarkerStore::new();
        let queue = InMemoryDispatchQueue::new();
        let dead_letters = RecordingDeadLetterSink::new();

        let providers = Providers {
            rate_counter: Arc::new(InMemoryRateCounter::new()),
            challenges: Arc::new(challenges.clone()),
            stock: Arc::new(stock.clone()),
            locks: Arc::new(locks.clone()),
            markers: Arc::new(markers.clone()),
            inventory: Arc::new(inventory.clone()),
            queue: Arc::new(queue.clone()),
            dead_letters: Arc::new(dead_letters.clone()),
            clock: Arc::new(test_clock()),
        };

        Self {
            sale: Arc::new(FlashSale::new(providers, settings)),
            challenges,
            stock,
            locks,
            markers,
            inventory,
            queue,
            dead_letters,
        }
    }

    /// Walk the challenge flow and return a purchase path token.
    pub async fn path_token(&self, user: UserId, item: ItemId) -> String {
        let ctx = RequestContext::authenticated(user);
        self.sale.issue_challenge(&ctx, item).await.unwrap();
        let answer = self.challenges.peek_answer(user, item).unwrap();
        self.sale.verify_challenge(&ctx, item, &answer).await.unwrap();
        self.sale.issue_purchase_path(&ctx, item).await.unwrap()
    }
}
