//! One-time challenge and purchase path tokens.
//!
//! A buyer must first answer an arithmetic puzzle, then exchange the passed
//! challenge for an opaque path token, and finally present that token on the
//! purchase call. Every step consumes the record of the previous one.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use flashgate_core::providers::ChallengeStore;
use flashgate_core::{FlashSaleError, FlashSaleSettings, ItemId, Result, UserId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Random bytes in a purchase path token.
const PATH_TOKEN_BYTES: usize = 32;

/// A puzzle the client must render and answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Item the challenge was issued for.
    pub item_id: ItemId,
    /// Human-readable puzzle, e.g. `7 + 2 * 3 = ?`.
    pub question: String,
    /// Seconds until the answer expires.
    pub expires_in_secs: u64,
}

/// A generated puzzle and its expected answer.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Puzzle {
    question: String,
    answer: i64,
}

impl Puzzle {
    /// Three single digits joined by `+`, `-` or `*`, evaluated with the
    /// usual precedence.
    fn generate(rng: &mut impl Rng) -> Self {
        let digits: [i64; 3] = [rng.gen_range(0..10), rng.gen_range(1..10), rng.gen_range(1..10)];
        let ops: [char; 2] = [
            ['+', '-', '*'][rng.gen_range(0..3)],
            ['+', '-', '*'][rng.gen_range(0..3)],
        ];
        Self {
            question: format!(
                "{} {} {} {} {} = ?",
                digits[0], ops[0], digits[1], ops[1], digits[2]
            ),
            answer: evaluate(digits, ops),
        }
    }
}

fn apply(lhs: i64, op: char, rhs: i64) -> i64 {
    match op {
        '+' => lhs + rhs,
        '-' => lhs - rhs,
        _ => lhs * rhs,
    }
}

fn evaluate(digits: [i64; 3], ops: [char; 2]) -> i64 {
    if ops[1] == '*' && ops[0] != '*' {
        apply(digits[0], ops[0], digits[1] * digits[2])
    } else {
        apply(apply(digits[0], ops[0], digits[1]), ops[1], digits[2])
    }
}

fn new_path_token() -> String {
    let mut bytes = [0_u8; PATH_TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Issues and validates challenges and purchase path tokens.
#[derive(Clone)]
pub struct ChallengeGate {
    store: Arc<dyn ChallengeStore>,
    challenge_ttl: Duration,
    path_ttl: Duration,
}

impl ChallengeGate {
    /// Create a gate over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ChallengeStore>, settings: &FlashSaleSettings) -> Self {
        Self {
            store,
            challenge_ttl: settings.challenge_ttl,
            path_ttl: settings.path_ttl,
        }
    }

    /// Generate a puzzle for (user, item), replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`] if the store fails.
    pub async fn issue_challenge(&self, user: UserId, item: ItemId) -> Result<Challenge> {
        let puzzle = Puzzle::generate(&mut rand::thread_rng());

        self.store
            .store_answer(user, item, &puzzle.answer.to_string(), self.challenge_ttl)
            .await?;

        tracing::debug!(user_id = %user, item_id = %item, "Challenge issued");

        Ok(Challenge {
            item_id: item,
            question: puzzle.question,
            expires_in_secs: self.challenge_ttl.as_secs(),
        })
    }

    /// Check `answer` against the stored one. The stored answer is consumed
    /// whether or not it matches.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`] if the store fails.
    pub async fn verify_challenge(&self, user: UserId, item: ItemId, answer: &str) -> Result<bool> {
        let Some(expected) = self.store.take_answer(user, item).await? else {
            tracing::debug!(user_id = %user, item_id = %item, "No live challenge");
            return Ok(false);
        };

        let ok = constant_time_eq::constant_time_eq(answer.trim().as_bytes(), expected.as_bytes());
        if ok {
            self.store.mark_verified(user, item, self.path_ttl).await?;
        }
        Ok(ok)
    }

    /// Exchange a passed challenge for a purchase path token.
    ///
    /// If a live token already exists for (user, item) it is returned instead
    /// of minting a new one.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::InvalidChallenge`] if (user, item) has no
    /// unconsumed challenge pass, or [`FlashSaleError::Infrastructure`] if
    /// the store fails.
    pub async fn issue_purchase_path(&self, user: UserId, item: ItemId) -> Result<String> {
        if !self.store.take_verified(user, item).await? {
            return Err(FlashSaleError::InvalidChallenge);
        }

        let token = new_path_token();
        match self
            .store
            .store_path_if_absent(user, item, &token, self.path_ttl)
            .await?
        {
            Some(existing) => Ok(existing),
            None => Ok(token),
        }
    }

    /// Consume the path token if it matches. A missing or expired token is a
    /// mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`] if the store fails.
    pub async fn verify_purchase_path(&self, user: UserId, item: ItemId, token: &str) -> Result<bool> {
        if token.is_empty() {
            return Ok(false);
        }
        Ok(self.store.consume_path(user, item, token).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use flashgate_testing::mocks::InMemoryChallengeStore;
    use proptest::prelude::*;

    fn gate() -> (ChallengeGate, InMemoryChallengeStore) {
        let store = InMemoryChallengeStore::new();
        let gate = ChallengeGate::new(Arc::new(store.clone()), &FlashSaleSettings::default());
        (gate, store)
    }

    #[test]
    fn evaluation_respects_precedence() {
        assert_eq!(evaluate([2, 3, 4], ['+', '*']), 14);
        assert_eq!(evaluate([2, 3, 4], ['*', '+']), 10);
        assert_eq!(evaluate([2, 3, 4], ['-', '-']), -5);
        assert_eq!(evaluate([2, 3, 4], ['*', '*']), 24);
    }

    proptest! {
        #[test]
        fn question_digits_reproduce_answer(seed in any::<u64>()) {
            use rand::SeedableRng;
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let puzzle = Puzzle::generate(&mut rng);
            let parts: Vec<&str> = puzzle.question.split(' ').collect();
            let digits = [parts[0], parts[2], parts[4]].map(|d| d.parse::<i64>().unwrap());
            let ops = [parts[1], parts[3]].map(|o| o.chars().next().unwrap());
            prop_assert_eq!(evaluate(digits, ops), puzzle.answer);
        }
    }

    #[tokio::test]
    async fn answer_is_single_use() {
        let (gate, store) = gate();
        gate.issue_challenge(UserId(1), ItemId(1)).await.unwrap();
        let answer = store.peek_answer(UserId(1), ItemId(1)).unwrap();

        assert!(gate.verify_challenge(UserId(1), ItemId(1), &answer).await.unwrap());
        assert!(!gate.verify_challenge(UserId(1), ItemId(1), &answer).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_answer_burns_the_challenge() {
        let (gate, store) = gate();
        gate.issue_challenge(UserId(1), ItemId(1)).await.unwrap();
        let answer = store.peek_answer(UserId(1), ItemId(1)).unwrap();

        assert!(!gate.verify_challenge(UserId(1), ItemId(1), "nope").await.unwrap());
        assert!(!gate.verify_challenge(UserId(1), ItemId(1), &answer).await.unwrap());
    }

    #[tokio::test]
    async fn path_requires_verified_challenge() {
        let (gate, _) = gate();
        assert_eq!(
            gate.issue_purchase_path(UserId(1), ItemId(1)).await,
            Err(FlashSaleError::InvalidChallenge)
        );
    }

    #[tokio::test]
    async fn path_token_is_consumed_on_match() {
        let (gate, store) = gate();
        gate.issue_challenge(UserId(1), ItemId(1)).await.unwrap();
        let answer = store.peek_answer(UserId(1), ItemId(1)).unwrap();
        gate.verify_challenge(UserId(1), ItemId(1), &answer).await.unwrap();
        let token = gate.issue_purchase_path(UserId(1), ItemId(1)).await.unwrap();

        assert!(!gate.verify_purchase_path(UserId(1), ItemId(1), "forged").await.unwrap());
        assert!(!gate.verify_purchase_path(UserId(2), ItemId(1), &token).await.unwrap());
        assert!(gate.verify_purchase_path(UserId(1), ItemId(1), &token).await.unwrap());
        assert!(!gate.verify_purchase_path(UserId(1), ItemId(1), &token).await.unwrap());
    }

    #[tokio::test]
    async fn live_path_token_is_not_reissued() {
        let (gate, store) = gate();
        let mut tokens = Vec::new();
        for _ in 0..2 {
            gate.issue_challenge(UserId(1), ItemId(1)).await.unwrap();
            let answer = store.peek_answer(UserId(1), ItemId(1)).unwrap();
            gate.verify_challenge(UserId(1), ItemId(1), &answer).await.unwrap();
            tokens.push(gate.issue_purchase_path(UserId(1), ItemId(1)).await.unwrap());
        }
        assert_eq!(tokens[0], tokens[1]);
    }

    #[tokio::test]
    async fn missing_token_is_a_mismatch_not_a_fault() {
        let (gate, _) = gate();
        assert_eq!(gate.verify_purchase_path(UserId(1), ItemId(1), "").await, Ok(false));
        assert_eq!(gate.verify_purchase_path(UserId(1), ItemId(1), "abc").await, Ok(false));
    }
}
