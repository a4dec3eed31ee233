use async_trait::async_trait;

use crate::err::CResult;
use crate::model::RawChange;

/// The database-specific half of the source adapter (spec §4.4). A
/// `SourceStrategy` owns the driver connection and decodes raw records;
/// everything else — schema tracking, normalization, `ChangeEvent`
/// construction, publishing, offset persistence — is driver-agnostic and
/// lives in the adapter that drives this trait.
#[async_trait]
pub trait SourceStrategy: Send {
    /// Opens the connection and, if no offset is stored for any of this
    /// strategy's partitions, requests an initial snapshot (spec §4.4).
    /// Called once before the first `poll`.
    async fn connect(&mut self, resume_from: Option<&crate::model::Position>) -> CResult<()>;

    /// Returns the next decoded record, or `None` if the stream ended
    /// cleanly (never expected in steady state; only on deliberate stop).
    /// A transient error should be retried by the caller with backoff; a
    /// fatal error (`ReError::DriverFatal`) moves the engine to `FAILED`.
    async fn poll(&mut self) -> CResult<Option<RawChange>>;

    /// Releases the driver connection. Idempotent.
    async fn disconnect(&mut self) -> CResult<()>;

    /// A stable identifier for this strategy's logical stream, used as
    /// `Position.sourcePartition` (spec §3).
    fn source_partition(&self) -> &str;
}
