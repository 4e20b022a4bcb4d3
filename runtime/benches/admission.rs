//! Admission hot-path benchmarks.
//!
//! Measures the stock gate against in-memory stores: the seeded-counter
//! decrement path and the local sold-out short circuit.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)] // Benchmark code

use criterion::{Criterion, criterion_group, criterion_main};
use flashgate_core::{ItemId, UserId};
use flashgate_runtime::StockGate;
use flashgate_testing::fixtures::open_item;
use flashgate_testing::mocks::{InMemoryInventory, InMemoryMarkerStore, InMemoryStockCounter};
use std::hint::black_box;
use std::sync::Arc;

fn gate(stock: i64) -> StockGate {
    let inventory = InMemoryInventory::new();
    inventory.insert_item(open_item(ItemId(1), stock));
    StockGate::new(
        Arc::new(InMemoryStockCounter::new()),
        Arc::new(InMemoryMarkerStore::new()),
        Arc::new(inventory),
    )
}

fn admission(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("admit_with_stock", |b| {
        let gate = gate(i64::MAX / 2);
        let mut user = 0_i64;
        b.to_async(&rt).iter(|| {
            user += 1;
            let gate = &gate;
            let user = UserId(user);
            async move { black_box(gate.admit(user, ItemId(1)).await.is_ok()) }
        });
    });

    c.bench_function("admit_sold_out_local_flag", |b| {
        let gate = gate(0);
        gate.mark_sold_out(ItemId(1));
        b.to_async(&rt).iter(|| async {
            black_box(gate.admit(UserId(1), ItemId(1)).await.is_err())
        });
    });
}

criterion_group!(benches, admission);
criterion_main!(benches);
