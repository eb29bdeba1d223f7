//! JSON file snapshot store

use crate::error_ext::ErrorContext;
use async_trait::async_trait;
use mesh_domain::CacheEntry;
use mesh_domain::error::Result;
use mesh_domain::ports::CacheSnapshotStore;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

/// Stores cache snapshots as a JSON document
///
/// Writes go to a sibling temporary file that is then renamed over the
/// snapshot, so a crash mid-write leaves the previous snapshot intact.
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<snapshot file name>.tmp` next to the snapshot
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("snapshot"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CacheSnapshotStore for JsonFileSnapshotStore {
    async fn save(&self, entries: &[CacheEntry]) -> Result<()> {
        let document = SnapshotFile {
            version: SNAPSHOT_VERSION,
            entries: entries.to_vec(),
        };
        let bytes = serde_json::to_vec(&document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .io_context(format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, bytes)
            .await
            .io_context(format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .io_context(format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), entries = entries.len(), "Cache snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<Vec<CacheEntry>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let bytes = tokio::fs::read(&self.path)
            .await
            .io_context(format!("Failed to read {}", self.path.display()))?;
        let document: SnapshotFile = serde_json::from_slice(&bytes)?;
        Ok(document.entries)
    }
}
