use async_trait::async_trait;
use cdc_common::{CResult, Position};

/// Durable, per-`sourcePartition` position storage (spec §4.2). A single
/// writer is assumed; `save`/`delete` are exclusive with every other
/// operation, while concurrent `load`s are safe.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    async fn save(&self, position: &Position) -> CResult<()>;

    async fn load(&self, source_partition: &str) -> CResult<Option<Position>>;

    async fn delete(&self, source_partition: &str) -> CResult<()>;

    async fn exists(&self, source_partition: &str) -> CResult<bool>;
}
