//! Property-based testing strategies.

use flashgate_core::{ItemId, UserId};
use proptest::prelude::*;

/// Arbitrary buyer id.
pub fn user_id() -> impl Strategy<Value = UserId> {
    (1_i64..100_000).prop_map(UserId)
}

/// Arbitrary item id.
pub fn item_id() -> impl Strategy<Value = ItemId> {
    (1_i64..1_000).prop_map(ItemId)
}

/// Buyers of one sale: `len` distinct user ids, each listed `repeats` times
/// in a row.
pub fn crowd(len: std::ops::Range<usize>, repeats: usize) -> impl Strategy<Value = Vec<UserId>> {
    proptest::collection::btree_set(user_id(), len).prop_map(move |users| {
        users
            .into_iter()
            .flat_map(|u| std::iter::repeat_n(u, repeats))
            .collect()
    })
}
