use std::path::PathBuf;

use async_trait::async_trait;
use cdc_common::{CResult, Position, ReError};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::warn;

use crate::store::OffsetStore;

/// One JSON file per `sourcePartition` under `dir`. `save` writes a
/// sibling `.tmp` file and renames it into place so a reader never
/// observes a partial write (spec §4.2).
pub struct FileOffsetStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileOffsetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileOffsetStore { dir: dir.into(), lock: RwLock::new(()) }
    }

    pub async fn ensure_dir(&self) -> CResult<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| ReError::OffsetStoreError(format!("cannot create offset dir: {e}")))?;
        Ok(())
    }

    fn path_for(&self, source_partition: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(source_partition)))
    }

    fn tmp_path_for(&self, source_partition: &str) -> PathBuf {
        self.dir.join(format!("{}.json.tmp-{}", sanitize(source_partition), std::process::id()))
    }
}

fn sanitize(source_partition: &str) -> String {
    source_partition.chars().map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' }).collect()
}

#[async_trait]
impl OffsetStore for FileOffsetStore {
    async fn save(&self, position: &Position) -> CResult<()> {
        let _guard = self.lock.write().await;

        let body = serde_json::to_vec_pretty(position)
            .map_err(|e| ReError::OffsetStoreError(format!("cannot serialize position: {e}")))?;

        let tmp_path = self.tmp_path_for(&position.source_partition);
        let final_path = self.path_for(&position.source_partition);

        fs::write(&tmp_path, &body).await.map_err(|e| ReError::OffsetStoreError(format!("cannot write temp offset file: {e}")))?;

        fs::rename(&tmp_path, &final_path).await.map_err(|e| {
            warn!(partition = %position.source_partition, error = %e, "atomic rename of offset file failed");
            ReError::OffsetStoreError(format!("cannot rename offset file into place: {e}"))
        })?;

        Ok(())
    }

    async fn load(&self, source_partition: &str) -> CResult<Option<Position>> {
        let _guard = self.lock.read().await;

        let path = self.path_for(source_partition);
        match fs::read(&path).await {
            Ok(bytes) => {
                let position = serde_json::from_slice(&bytes)
                    .map_err(|e| ReError::OffsetStoreError(format!("corrupt offset file {}: {e}", path.display())))?;
                Ok(Some(position))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReError::OffsetStoreError(format!("cannot read offset file {}: {e}", path.display()))),
        }
    }

    async fn delete(&self, source_partition: &str) -> CResult<()> {
        let _guard = self.lock.write().await;

        let path = self.path_for(source_partition);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReError::OffsetStoreError(format!("cannot delete offset file {}: {e}", path.display()))),
        }
    }

    async fn exists(&self, source_partition: &str) -> CResult<bool> {
        let _guard = self.lock.read().await;
        Ok(fs::metadata(self.path_for(source_partition)).await.is_ok())
    }
}
