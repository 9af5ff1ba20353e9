//! Integration tests for the partition consumer
//!
//! These tests verify that:
//! - Messages of one partition are handled in offset order
//! - A bad message is skipped and the partition keeps moving
//! - Cancellation stops every worker

use std::time::Duration;

use fleetlog::{
    ingest::{Consumer, DeadLetter},
    storage::Page,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

#[tokio::test]
async fn test_partitions_drain_and_commit_last_offset() {
    let hub = TestHub::new();
    let (tx0, rx0) = mpsc::channel(16);
    let (tx1, rx1) = mpsc::channel(16);

    let handle = Consumer::new(hub.pipeline.clone()).spawn(vec![(0, rx0), (1, rx1)]);
    let stats = handle.stats();

    for offset in 0..5 {
        let host = format!("p0-h{offset}");
        tx0.send(message("system-metrics", 0, offset, &agent_payload("acme", &host, 10.0)))
            .await
            .unwrap();
    }
    for offset in 0..3 {
        let host = format!("p1-h{offset}");
        tx1.send(message("system-metrics", 1, offset, &agent_payload("acme", &host, 10.0)))
            .await
            .unwrap();
    }
    drop(tx0);
    drop(tx1);

    tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("consumer did not stop after channels closed");

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.processed, 8);
    assert_eq!(stats.committed_offset(0), Some(4));
    assert_eq!(stats.committed_offset(1), Some(2));
    assert_eq!(hub.backend.log_count().await, 8);
}

#[tokio::test]
async fn test_bad_message_is_skipped_and_dead_lettered() {
    let hub = TestHub::new();
    let (tx, rx) = mpsc::channel(16);
    let (dead_tx, mut dead_rx) = mpsc::channel::<DeadLetter>(16);

    let handle = Consumer::new(hub.pipeline.clone())
        .with_dead_letter(dead_tx)
        .spawn(vec![(0, rx)]);
    let stats = handle.stats();

    tx.send(message("system-metrics", 0, 0, &agent_payload("acme", "h1", 10.0)))
        .await
        .unwrap();
    tx.send(message("system-metrics", 0, 1, &json!({ "tenant_id": "acme" })))
        .await
        .unwrap();
    tx.send(message("system-metrics", 0, 2, &agent_payload("acme", "h3", 10.0)))
        .await
        .unwrap();
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.processed, 2);
    assert_eq!(snapshot.rejected, 1);
    assert_eq!(snapshot.failed, 0);
    assert_eq!(stats.committed_offset(0), Some(2));

    let letter = dead_rx.recv().await.unwrap();
    assert_eq!(letter.message.coordinates.unwrap().offset, 1);
    assert!(letter.reason.contains("host"));

    let hosts: Vec<String> = hub
        .queries
        .list_logs("acme", Page::default())
        .await
        .unwrap()
        .into_iter()
        .map(|log| log.host)
        .collect();
    assert_eq!(hosts.len(), 2);
    assert!(hosts.contains(&"h1".to_string()));
    assert!(hosts.contains(&"h3".to_string()));
}

#[tokio::test]
async fn test_cancellation_stops_idle_workers() {
    let hub = TestHub::new();
    let token = CancellationToken::new();
    let (_tx, rx) = mpsc::channel(16);

    let handle = Consumer::new(hub.pipeline.clone())
        .with_cancellation(token.clone())
        .spawn(vec![(0, rx)]);

    token.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("consumer ignored cancellation");
}

#[tokio::test]
async fn test_shutdown_through_handle() {
    let hub = TestHub::new();
    let (tx, rx) = mpsc::channel(16);

    let handle = Consumer::new(hub.pipeline.clone()).spawn(vec![(3, rx)]);
    let stats = handle.stats();

    tx.send(message("system-metrics", 3, 40, &agent_payload("acme", "h1", 95.0)))
        .await
        .unwrap();

    // wait for the one message to land before shutting down
    for _ in 0..100 {
        if stats.committed_offset(3).is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.processed, 1);
    assert_eq!(snapshot.alerts_raised, 1);
    assert_eq!(snapshot.committed.get(&3), Some(&40));
}
