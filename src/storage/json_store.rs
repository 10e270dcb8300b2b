use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::engine::types::FlowSnapshot;
use crate::storage::StateStore;

/// File-based JSON state store. Each conversation's snapshot is stored as a
/// separate JSON file; writes go through a tmp file and a rename so a
/// crashed write never leaves a half-written snapshot behind.
pub struct JsonStateStore {
    base_dir: PathBuf,
    lock: RwLock<()>,
}

impl JsonStateStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        }
    }

    fn snapshot_path(&self, conversation_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", conversation_id))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<FlowSnapshot>> {
        let _lock = self.lock.read().await;

        let path = self.snapshot_path(conversation_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read snapshot file: {}", path.display()));
            }
        };

        let snapshot: FlowSnapshot = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse snapshot: {}", conversation_id))?;
        Ok(Some(snapshot))
    }

    async fn save(&self, conversation_id: &str, snapshot: &FlowSnapshot) -> Result<()> {
        let _lock = self.lock.write().await;

        tokio::fs::create_dir_all(&self.base_dir).await?;

        let path = self.snapshot_path(conversation_id);
        let tmp_path = path.with_extension("json.tmp");

        let data = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        let _lock = self.lock.write().await;

        let path = self.snapshot_path(conversation_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to remove snapshot file: {}", path.display())),
        }
    }
}
