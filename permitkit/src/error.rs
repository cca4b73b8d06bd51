//! Error taxonomy for authorization flows.
//!
//! Failures inside a flow are reported as data: a [`PermitStatus`], a numeric
//! code from [`PermitError::code`] and the [`FlowStage`] that failed. Only
//! caller bugs that make the batch itself malformed surface as an
//! [`InvariantViolation`] and abort before any token is processed.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scheme::PermitScheme;

/// Code reported for a fully successful batch.
pub const CODE_SUCCESS: u32 = 0;
/// Capability probe found no support for a forced scheme.
pub const CODE_CAPABILITY_NOT_SUPPORTED: u32 = 1001;
/// Nonce could not be resolved (RPC failure or scan ceiling reached).
pub const CODE_NONCE_RESOLUTION_FAILED: u32 = 1002;
/// Wallet or signer failed for a reason other than user rejection.
pub const CODE_SIGNING_FAILED: u32 = 1003;
/// Payload could not be packed.
pub const CODE_PACKING_INVARIANT_VIOLATED: u32 = 1004;
/// A token read needed to build the signing domain failed.
pub const CODE_CHAIN_READ_FAILED: u32 = 1005;
/// The user declined the signature request (EIP-1193 code).
pub const CODE_USER_REJECTED: u32 = 4001;

/// Coarse result status of an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermitStatus {
    /// Every token was authorized.
    Success,
    /// The user declined a signature request.
    Rejected,
    /// Some other step failed.
    Error,
}

/// The step of a per-token flow in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowStage {
    /// Token capability probing and signing-domain reads.
    CapabilityProbe,
    /// Permit2 or proxy nonce lookup.
    NonceResolution,
    /// Wallet signature acquisition.
    Signing,
    /// Binary packing of the signed payload.
    Packing,
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CapabilityProbe => "capability_probe",
            Self::NonceResolution => "nonce_resolution",
            Self::Signing => "signing",
            Self::Packing => "packing",
        };
        f.write_str(s)
    }
}

/// A failure of one per-token authorization step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermitError {
    /// The wallet or user explicitly declined. Never retried automatically.
    #[error("user rejected the signature request: {0}")]
    UserRejected(String),
    /// The token lacks the interface the forced scheme needs.
    #[error("token {token} does not support {scheme}")]
    CapabilityNotSupported {
        /// Token that was probed.
        token: Address,
        /// Scheme the caller required.
        scheme: PermitScheme,
    },
    /// RPC failure or iteration ceiling while resolving a nonce.
    #[error("nonce resolution failed: {0}")]
    NonceResolutionFailed(String),
    /// Generic wallet or provider failure.
    #[error("signing failed: {0}")]
    SigningFailed(String),
    /// Payload fields do not fit the packed layout.
    #[error("packing invariant violated: {0}")]
    PackingInvariantViolated(String),
    /// Reading the token name or owner nonce failed.
    #[error("chain read failed: {0}")]
    ChainRead(String),
}

impl PermitError {
    /// Returns the stable numeric code for this error.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::UserRejected(_) => CODE_USER_REJECTED,
            Self::CapabilityNotSupported { .. } => CODE_CAPABILITY_NOT_SUPPORTED,
            Self::NonceResolutionFailed(_) => CODE_NONCE_RESOLUTION_FAILED,
            Self::SigningFailed(_) => CODE_SIGNING_FAILED,
            Self::PackingInvariantViolated(_) => CODE_PACKING_INVARIANT_VIOLATED,
            Self::ChainRead(_) => CODE_CHAIN_READ_FAILED,
        }
    }

    /// Returns the status a caller should surface for this error.
    #[must_use]
    pub const fn status(&self) -> PermitStatus {
        match self {
            Self::UserRejected(_) => PermitStatus::Rejected,
            _ => PermitStatus::Error,
        }
    }

    /// Returns `true` when resubmitting the whole flow may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NonceResolutionFailed(_) | Self::ChainRead(_))
    }
}

/// A [`PermitError`] tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage}: {error}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: FlowStage,
    /// What went wrong.
    #[source]
    pub error: PermitError,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub const fn new(stage: FlowStage, error: PermitError) -> Self {
        Self { stage, error }
    }
}

/// A malformed batch. Signaled before any token is processed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// Per-token selectors and token list differ in length.
    #[error("{selectors} permit selectors for {tokens} tokens")]
    LengthMismatch {
        /// Number of tokens.
        tokens: usize,
        /// Number of selectors.
        selectors: usize,
    },
    /// A request's `position_index` does not match its place in the batch.
    #[error("token at position {expected} declares position index {found}")]
    PositionMismatch {
        /// Actual position in the list.
        expected: usize,
        /// Declared position index.
        found: usize,
    },
    /// A request targets a different chain than the configured one.
    #[error("token at position {position} is on chain {found}, expected {expected}")]
    ChainMismatch {
        /// Position of the offending token.
        position: usize,
        /// Configured chain.
        expected: u64,
        /// Declared chain.
        found: u64,
    },
}
