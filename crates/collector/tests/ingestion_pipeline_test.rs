use async_trait::async_trait;
use collector::IngestionService;
use chrono::{DateTime, Utc};
use common::domain::{
    PayloadEncoding, RawUplink, Reading, ReadingRepository, StorageError, UplinkMetadata,
};
use redenv_payload::TimestampReconciler;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

/// Stores readings in memory. With a barrier set, every insert waits until
/// the expected number of inserts are in progress at once.
#[derive(Default)]
struct InMemoryReadingRepository {
    readings: Mutex<Vec<Reading>>,
    barrier: Option<Barrier>,
}

impl InMemoryReadingRepository {
    fn with_barrier(parties: usize) -> Self {
        Self {
            readings: Mutex::new(Vec::new()),
            barrier: Some(Barrier::new(parties)),
        }
    }

    fn stored(&self) -> Vec<Reading> {
        self.readings.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadingRepository for InMemoryReadingRepository {
    async fn insert(&self, reading: &Reading) -> Result<(), StorageError> {
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        let mut readings = self.readings.lock().unwrap();
        if readings.iter().any(|r| r.id == reading.id) {
            return Err(StorageError::msg(format!("duplicate id {}", reading.id)));
        }
        readings.push(reading.clone());
        Ok(())
    }

    async fn latest_recorded_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let readings = self.readings.lock().unwrap();
        Ok(readings.iter().map(|r| r.recorded_at).max())
    }
}

fn uplink(device_id: &str, hex_payload: &str) -> RawUplink {
    RawUplink {
        device_id: device_id.to_string(),
        payload: hex_payload.to_string(),
        encoding: PayloadEncoding::Hex,
        received_at: "2019-10-30T02:10:27.094175318Z".to_string(),
        app_id: "redenv".to_string(),
        port: 1,
        counter: 1,
        metadata: UplinkMetadata::default(),
    }
}

const BACKYARD_V2: &str =
    "e3070a1d100f170d000000007b14d2410000000000d8984107f7c547ffffffffffffffffccff00";
const CALIBRATED_V3: &str =
    "e3070a1d0b1e040fab080000af479d411c85f34000aaf441c27bc6473f0200001a000000fd00010000";

#[tokio::test]
async fn test_concurrent_uplinks_get_distinct_ids_and_are_both_stored() {
    let repo = Arc::new(InMemoryReadingRepository::with_barrier(2));
    let service = IngestionService::new(repo.clone(), TimestampReconciler::default());

    // Both inserts must be in flight at the same time to get past the barrier.
    let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(
            service.on_uplink(uplink("backyard", BACKYARD_V2)),
            service.on_uplink(uplink("porch", CALIBRATED_V3)),
        )
    })
    .await
    .expect("uplinks did not run concurrently");

    first.unwrap();
    second.unwrap();

    let stored = repo.stored();
    assert_eq!(stored.len(), 2);
    let ids: HashSet<_> = stored.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids.len(), 2);
    let devices: HashSet<_> = stored.iter().map(|r| r.device_id.as_str()).collect();
    assert_eq!(devices, HashSet::from(["backyard", "porch"]));
}

#[tokio::test]
async fn test_uplinks_from_spawned_tasks() {
    let repo = Arc::new(InMemoryReadingRepository::default());
    let service = Arc::new(IngestionService::new(
        repo.clone(),
        TimestampReconciler::default(),
    ));

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16 {
        let service = Arc::clone(&service);
        tasks.spawn(async move {
            service
                .on_uplink(uplink(&format!("node-{}", i), BACKYARD_V2))
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let stored = repo.stored();
    assert_eq!(stored.len(), 16);
    let ids: HashSet<_> = stored.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids.len(), 16);
}

#[tokio::test]
async fn test_failed_uplink_does_not_affect_the_next() {
    let repo = Arc::new(InMemoryReadingRepository::default());
    let service = IngestionService::new(repo.clone(), TimestampReconciler::default());

    assert!(service
        .on_uplink(uplink("backyard", "e3070a1d100f"))
        .await
        .is_err());
    service
        .on_uplink(uplink("backyard", BACKYARD_V2))
        .await
        .unwrap();

    let stored = repo.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].payload, hex_bytes(BACKYARD_V2));
    assert_ne!(stored[0].arrived_at, stored[0].recorded_at);
    assert_eq!(
        repo.latest_recorded_at().await.unwrap(),
        Some(stored[0].recorded_at)
    );
}

fn hex_bytes(text: &str) -> Vec<u8> {
    redenv_payload::decode_hex(text).unwrap()
}
