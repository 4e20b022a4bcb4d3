//! Property tests for the two purchase invariants.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

mod common;

use common::Harness;
use flashgate_core::{FlashSaleError, FlashSaleSettings, ItemId, RequestContext};
use flashgate_testing::fixtures::open_item;
use flashgate_testing::strategies;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

const ITEM: ItemId = ItemId(1);

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn stock_never_goes_negative_and_each_buyer_buys_at_most_once(
        stock in 0_i64..8,
        buyers in strategies::crowd(1..24, 2),
    ) {
        let rt = runtime();
        let (remaining, orders_per_user, errors) = rt.block_on(async {
            let settings = FlashSaleSettings {
                lock_retry_delay: Duration::from_millis(200),
                ..common::relaxed_settings()
            };
            let h = Harness::with_settings(vec![open_item(ITEM, stock)], &settings);

            let mut attempts = Vec::new();
            for user in &buyers {
                attempts.push((*user, h.path_token(*user, ITEM).await));
            }

            let handles: Vec<_> = attempts
                .into_iter()
                .map(|(user, token)| {
                    let sale = Arc::clone(&h.sale);
                    tokio::spawn(async move {
                        sale.purchase(&RequestContext::authenticated(user), ITEM, &token).await
                    })
                })
                .collect();

            let mut errors = Vec::new();
            for handle in handles {
                if let Err(e) = handle.await.unwrap() {
                    errors.push(e);
                }
            }

            let mut per_user: HashMap<_, usize> = HashMap::new();
            for order in h.inventory.all_orders() {
                *per_user.entry(order.user_id).or_default() += 1;
            }
            (h.inventory.remaining_stock(ITEM).unwrap(), per_user, errors)
        });

        // Each buyer shows up twice with the same live token, so exactly one
        // attempt per buyer gets past the path check.
        let distinct = buyers.iter().collect::<HashSet<_>>().len();
        let expected = usize::try_from(stock).unwrap().min(distinct);
        let committed: usize = orders_per_user.values().sum();

        prop_assert_eq!(committed, expected);
        prop_assert_eq!(remaining, stock - i64::try_from(committed).unwrap());
        if distinct >= usize::try_from(stock).unwrap() {
            prop_assert_eq!(remaining, 0);
        }
        prop_assert!(orders_per_user.values().all(|&n| n == 1));
        prop_assert_eq!(
            errors.iter().filter(|e| e.is_sold_out()).count(),
            distinct - committed
        );
        let all_expected = errors.iter().all(|e| matches!(
            e,
            FlashSaleError::NoStock
                | FlashSaleError::CommitFailure
                | FlashSaleError::AlreadyPurchased { .. }
                | FlashSaleError::InvalidPath
        ));
        prop_assert!(all_expected);
    }
}
