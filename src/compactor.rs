use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::store::WalStore;

const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}

/// One compactor pass. Returns whether the WAL was rewritten.
pub async fn compact_if_due(store: &WalStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            info!(
                "compacted {} after {appends} appends, {} reservations kept",
                store.path().display(),
                store.len()
            );
            metrics::gauge!(crate::observability::RESERVATIONS_STORED).set(store.len() as f64);
            true
        }
        Err(e) => {
            error!("compaction of {} failed: {e}", store.path().display());
            debug!("will retry on next tick");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::store::ReservationStore;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("cafebook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn booking(table: &str) -> NewReservation {
        NewReservation {
            table_id: table.into(),
            name: "guest".into(),
            phone: None,
            email: Some("guest@example.com".into()),
            arrival_time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn below_threshold_is_left_alone() {
        let store = WalStore::open(&test_wal_path("below.wal")).unwrap();
        store.insert(booking("1")).await.unwrap();
        assert!(!compact_if_due(&store, 10).await);
        assert_eq!(store.appends_since_compact().await, 1);
    }

    #[tokio::test]
    async fn threshold_triggers_compaction() {
        let path = test_wal_path("due.wal");
        let store = WalStore::open(&path).unwrap();
        for i in 0..5 {
            let id = store.insert(booking(&i.to_string())).await.unwrap();
            if i % 2 == 0 {
                store.delete(id).await.unwrap();
            }
        }
        assert!(compact_if_due(&store, 5).await);
        assert_eq!(store.appends_since_compact().await, 0);

        drop(store);
        let reopened = WalStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
    }
}
