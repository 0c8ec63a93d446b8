//! Shadow pipeline errors

use crate::compute::ReadbackError;
use crate::core::IncompleteTable;

/// Errors raised by the cascaded shadow map pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ShadowError {
    /// A setting is outside its valid range.
    #[error("invalid shadow setting `{name}`: {reason}")]
    InvalidSetting {
        name: &'static str,
        reason: String,
    },

    /// More draw calls were submitted than the batch was sized for.
    #[error("draw call capacity exceeded: {requested} requested, capacity {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    /// A shader permutation table is missing variants.
    #[error(transparent)]
    Incomplete(#[from] IncompleteTable),

    /// Settings changed in a way that needs new shadow resources.
    #[error("shadow resources are stale: apply the new settings before rendering")]
    StaleResources,

    /// Reading the depth bounds back from the GPU failed.
    #[error(transparent)]
    Readback(#[from] ReadbackError),
}

impl ShadowError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name,
            reason: reason.into(),
        }
    }
}
