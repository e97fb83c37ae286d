use crate::config::HistoryConfig;
use crate::detection::DetectionResult;
use crate::error::StorageError;
use crate::records::RecordStatus;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const HISTORY_FILE: &str = "history.json";
const OVERRIDES_FILE: &str = "status_overrides.json";

/// Bounded local log of detection results, most-recent-first, persisted
/// as JSON. A best-effort cache: load and write failures degrade to an
/// empty or stale file, never to a crashed session.
pub struct DetectionHistory {
    capacity: usize,
    path: PathBuf,
    entries: RwLock<VecDeque<DetectionResult>>,
}

impl DetectionHistory {
    /// Open (or create) the history at the configured path
    pub async fn open(config: &HistoryConfig) -> Self {
        let path = Path::new(&config.path).join(HISTORY_FILE);
        let entries = Self::load(&path, config.capacity).await;

        info!(
            "Detection history opened with {} entries (capacity {})",
            entries.len(),
            config.capacity
        );

        Self {
            capacity: config.capacity,
            path,
            entries: RwLock::new(entries),
        }
    }

    async fn load(path: &Path, capacity: usize) -> VecDeque<DetectionResult> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No history file at {}", path.display());
                return VecDeque::new();
            }
            Err(err) => {
                warn!("Failed to read history file: {}", err);
                return VecDeque::new();
            }
        };

        match serde_json::from_slice::<Vec<DetectionResult>>(&raw) {
            Ok(mut list) => {
                list.truncate(capacity);
                list.into()
            }
            Err(err) => {
                warn!("History file is corrupt, starting empty: {}", err);
                VecDeque::new()
            }
        }
    }

    /// Append a result at the front, evicting the oldest past capacity,
    /// and persist the new list.
    pub async fn append(&self, result: DetectionResult) -> Result<(), StorageError> {
        {
            let mut entries = self.entries.write().await;
            entries.push_front(result);
            entries.truncate(self.capacity);
        }
        self.persist().await
    }

    /// Entries ordered most-recent-first
    pub async fn entries(&self) -> Vec<DetectionResult> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.entries.write().await.clear();
        self.persist().await
    }

    async fn persist(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(StorageError::Write)?;
        }

        let list: Vec<DetectionResult> = self.entries.read().await.iter().cloned().collect();
        let raw = serde_json::to_vec_pretty(&list).map_err(|err| StorageError::Corrupt {
            details: err.to_string(),
        })?;

        fs::write(&self.path, raw).await.map_err(StorageError::Write)
    }
}

/// Locally applied status overrides for records the backend may not yet
/// reflect. Like the history, a best-effort cache keyed by record id.
pub struct StatusOverrides {
    path: PathBuf,
    map: RwLock<HashMap<String, RecordStatus>>,
}

impl StatusOverrides {
    pub async fn open(config: &HistoryConfig) -> Self {
        let path = Path::new(&config.path).join(OVERRIDES_FILE);

        let map = match fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|err| {
                warn!("Status override file is corrupt, starting empty: {}", err);
                HashMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                warn!("Failed to read status overrides: {}", err);
                HashMap::new()
            }
        };

        Self {
            path,
            map: RwLock::new(map),
        }
    }

    pub async fn set(&self, record_id: &str, status: RecordStatus) -> Result<(), StorageError> {
        self.map
            .write()
            .await
            .insert(record_id.to_string(), status);
        self.persist().await
    }

    pub async fn get(&self, record_id: &str) -> Option<RecordStatus> {
        self.map.read().await.get(record_id).copied()
    }

    /// Drop an override once the backend reflects it
    pub async fn remove(&self, record_id: &str) -> Result<(), StorageError> {
        self.map.write().await.remove(record_id);
        self.persist().await
    }

    pub async fn all(&self) -> HashMap<String, RecordStatus> {
        self.map.read().await.clone()
    }

    async fn persist(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(StorageError::Write)?;
        }

        let map = self.map.read().await.clone();
        let raw = serde_json::to_vec_pretty(&map).map_err(|err| StorageError::Corrupt {
            details: err.to_string(),
        })?;

        fs::write(&self.path, raw).await.map_err(StorageError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn result(frame_id: u64) -> DetectionResult {
        DetectionResult {
            frame_id,
            timestamp: Utc::now(),
            accident_detected: frame_id % 2 == 0,
            confidence: 0.5,
            predicted_class: "normal".to_string(),
        }
    }

    fn config_in(dir: &TempDir, capacity: usize) -> HistoryConfig {
        HistoryConfig {
            capacity,
            path: dir.path().to_string_lossy().to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let history = DetectionHistory::open(&config_in(&dir, 100)).await;

        for i in 1..=5 {
            history.append(result(i)).await.unwrap();
        }

        let entries = history.entries().await;
        assert_eq!(entries.len(), 5);
        // Most recent first
        assert_eq!(entries[0].frame_id, 5);
        assert_eq!(entries[4].frame_id, 1);
    }

    #[tokio::test]
    async fn test_history_round_trip_across_reopen() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 100);

        {
            let history = DetectionHistory::open(&config).await;
            for i in 1..=10 {
                history.append(result(i)).await.unwrap();
            }
        }

        let reopened = DetectionHistory::open(&config).await;
        let entries = reopened.entries().await;
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0].frame_id, 10);
    }

    #[tokio::test]
    async fn test_capacity_bound_drops_oldest() {
        let dir = TempDir::new().unwrap();
        let history = DetectionHistory::open(&config_in(&dir, 100)).await;

        for i in 1..=105 {
            history.append(result(i)).await.unwrap();
        }

        let entries = history.entries().await;
        assert_eq!(entries.len(), 100);
        // Only the oldest five are gone
        assert_eq!(entries[0].frame_id, 105);
        assert_eq!(entries[99].frame_id, 6);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 100);
        tokio::fs::write(dir.path().join(HISTORY_FILE), b"{ not json")
            .await
            .unwrap();

        let history = DetectionHistory::open(&config).await;
        assert!(history.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_persists() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 100);

        let history = DetectionHistory::open(&config).await;
        history.append(result(1)).await.unwrap();
        history.clear().await.unwrap();

        let reopened = DetectionHistory::open(&config).await;
        assert!(reopened.is_empty().await);
    }

    #[tokio::test]
    async fn test_status_overrides_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 100);

        {
            let overrides = StatusOverrides::open(&config).await;
            overrides.set("rec-1", RecordStatus::Reviewed).await.unwrap();
            overrides.set("rec-2", RecordStatus::Dismissed).await.unwrap();
            overrides.remove("rec-2").await.unwrap();
        }

        let reopened = StatusOverrides::open(&config).await;
        assert_eq!(reopened.get("rec-1").await, Some(RecordStatus::Reviewed));
        assert_eq!(reopened.get("rec-2").await, None);
        assert_eq!(reopened.all().await.len(), 1);
    }
}
