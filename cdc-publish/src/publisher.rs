use async_trait::async_trait;
use cdc_common::{CResult, ChangeEvent};

/// Serializes a `ChangeEvent` and hands it to the broker (spec §4.5). A
/// `Publisher` implementation owns delivery order, retry, and backpressure;
/// callers only learn whether the event is safely acknowledged.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// `key_columns` names the row's primary/composite key, in stable
    /// order; an empty slice means "no key" (best-effort ordering, spec
    /// §4.5).
    async fn publish(&self, event: &ChangeEvent, key_columns: &[String]) -> CResult<()>;
}
