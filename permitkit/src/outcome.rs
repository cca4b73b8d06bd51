//! Batch results.

use alloy_primitives::Bytes;

use crate::error::{CODE_SUCCESS, FlowStage, PermitError, PermitStatus, StageError};

/// The result of authorizing a batch of tokens.
///
/// A batch is not atomic: on failure, `permits` holds the packed payloads
/// already produced for the tokens before the failing one, in batch order,
/// so a caller can tell which tokens succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Coarse status.
    pub status: PermitStatus,
    /// Numeric code, [`CODE_SUCCESS`] on success.
    pub code: u32,
    /// Stage that failed, if any.
    pub stage: Option<FlowStage>,
    /// Error that aborted the batch, if any.
    pub error: Option<PermitError>,
    /// Packed permit data, one entry per processed token.
    pub permits: Vec<Bytes>,
}

impl BatchOutcome {
    /// Builds a successful outcome.
    #[must_use]
    pub const fn success(permits: Vec<Bytes>) -> Self {
        Self {
            status: PermitStatus::Success,
            code: CODE_SUCCESS,
            stage: None,
            error: None,
            permits,
        }
    }

    /// Builds a failed outcome carrying the partial results gathered so far.
    #[must_use]
    pub fn failed(failure: StageError, partial: Vec<Bytes>) -> Self {
        Self {
            status: failure.error.status(),
            code: failure.error.code(),
            stage: Some(failure.stage),
            error: Some(failure.error),
            permits: partial,
        }
    }

    /// Returns `true` if every token was authorized.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == PermitStatus::Success
    }
}
