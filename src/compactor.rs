use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that rewrites the WAL as a snapshot once enough
/// appends have accumulated since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("parkd_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn append_counter_resets_after_compaction() {
        let path = test_wal_path("counter_reset.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify, false).unwrap());

        engine
            .create_location(1, "Main Lot".into(), "123 Main St".into())
            .await
            .unwrap();
        engine
            .create_location(2, "Annex".into(), "456 Side St".into())
            .await
            .unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 2);

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }
}
