//! Sequence carry-over.

use std::sync::Arc;

use tracing::info;

use crate::core::{SourceReader, TargetWriter};
use crate::error::Result;
use crate::plan::SequenceMigrationSpec;

/// Carries a source sequence's position over to a target sequence.
pub struct SequenceSynchronizer {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
}

impl SequenceSynchronizer {
    pub fn new(source: Arc<dyn SourceReader>, target: Arc<dyn TargetWriter>) -> Self {
        Self { source, target }
    }

    /// Advance the source sequence once and mark that value as used in the
    /// target sequence, so the target's next value is greater than it.
    ///
    /// Not idempotent: every call consumes a source value. Returns the value
    /// carried over.
    pub async fn sync(&self, spec: &SequenceMigrationSpec) -> Result<i64> {
        let value = self.source.next_sequence_value(spec.source_sequence()).await?;
        self.target
            .set_sequence_value(spec.target_sequence(), value)
            .await?;
        info!(
            "sequence {} -> {}: carried over value {}",
            spec.source_sequence(),
            spec.target_sequence(),
            value
        );
        Ok(value)
    }
}
