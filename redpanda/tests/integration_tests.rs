//! Integration tests for [`RedpandaDispatchQueue`] with a real Kafka instance.
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they:
//! - Require Docker to be running (for testcontainers)
//! - Take 15-60 seconds per test to spin up Kafka
//!
//! To run explicitly:
//! ```bash
//! cargo test -p flashgate-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use chrono::Utc;
use flashgate_core::providers::{DeadLetter, DeadLetterSink, DispatchQueue};
use flashgate_core::{ItemId, PurchaseRequest, UserId};
use flashgate_redpanda::RedpandaDispatchQueue;
use futures::StreamExt;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

/// Start Kafka and return the container (to keep it alive) and a broker list.
async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

/// Publish until the topic exists and the broker accepts writes.
async fn queue_ready(brokers: &str, topic: &str) -> RedpandaDispatchQueue {
    let queue = RedpandaDispatchQueue::builder()
        .brokers(brokers)
        .topic(topic)
        .consumer_group(format!("{topic}-group"))
        .build()
        .expect("Failed to create queue");

    let warmup = PurchaseRequest::new(UserId(0), ItemId(0), Utc::now());
    for attempt in 1..=60 {
        if queue.publish(&warmup).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(2)).await;
            return queue;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(attempt != 60, "Kafka failed to become ready");
    }
    queue
}

#[tokio::test]
#[ignore]
async fn test_published_request_is_delivered() {
    let (_kafka, brokers) = start_kafka().await;
    let queue = queue_ready(&brokers, "purchases-roundtrip").await;
    let mut deliveries = queue.subscribe().await.expect("Failed to subscribe");

    let request = PurchaseRequest::new(UserId(7), ItemId(1), Utc::now());
    queue.publish(&request).await.expect("Failed to publish");

    let received = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            let delivery = deliveries
                .next()
                .await
                .expect("stream ended")
                .expect("Failed to receive delivery");
            let decoded = delivery.decode().expect("Failed to decode");
            if decoded.user_id == UserId(0) {
                delivery.ack();
                continue;
            }
            assert_eq!(delivery.delivery_count(), 1);
            delivery.ack();
            return decoded;
        }
    })
    .await
    .expect("Timeout waiting for delivery");

    assert_eq!(received, request);
}

#[tokio::test]
#[ignore]
async fn test_unacknowledged_delivery_comes_back() {
    let (_kafka, brokers) = start_kafka().await;
    let queue = queue_ready(&brokers, "purchases-redelivery").await;
    let mut deliveries = queue.subscribe().await.expect("Failed to subscribe");

    let request = PurchaseRequest::new(UserId(8), ItemId(1), Utc::now());
    queue.publish(&request).await.expect("Failed to publish");

    let counts = tokio::time::timeout(Duration::from_secs(30), async {
        let mut counts = Vec::new();
        while counts.len() < 2 {
            let delivery = deliveries
                .next()
                .await
                .expect("stream ended")
                .expect("Failed to receive delivery");
            if delivery.decode().expect("Failed to decode").user_id == UserId(0) {
                delivery.ack();
                continue;
            }
            counts.push(delivery.delivery_count());
            if counts.len() == 1 {
                drop(delivery);
            } else {
                delivery.ack();
            }
        }
        counts
    })
    .await
    .expect("Timeout waiting for redelivery");

    assert_eq!(counts, vec![1, 2]);
}

#[tokio::test]
#[ignore]
async fn test_dead_letter_topic_accepts_letters() {
    let (_kafka, brokers) = start_kafka().await;
    let queue = queue_ready(&brokers, "purchases-dlq-source").await;
    let dead_letters = queue.dead_letter_topic("purchases-dlq");

    let letter = DeadLetter {
        payload: b"{broken".to_vec(),
        request: None,
        reason: "undecodable payload".into(),
        delivery_count: 1,
        failed_at: Utc::now(),
    };

    let mut recorded = false;
    for _ in 0..30 {
        if dead_letters.record(&letter).await.is_ok() {
            recorded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    assert!(recorded, "dead letter was never accepted");
}
