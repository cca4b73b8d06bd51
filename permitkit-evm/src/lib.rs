#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-2612 and Permit2 signature negotiation for EVM chains.
//!
//! Given a batch of [`TokenAuthorizationRequest`](permitkit::request::TokenAuthorizationRequest)s,
//! this crate decides per token which authorization scheme applies, reads the
//! on-chain state the scheme needs, builds the EIP-712 payload, asks a wallet
//! for a signature and packs the result into the bytes the spender contract
//! decodes.
//!
//! # Architecture
//!
//! - [`contract`] - `sol!` bindings for tokens, Permit2 and the nonce proxy
//! - [`chain`] - Read-only chain access behind the [`ChainReader`] trait
//! - [`capability`] - EIP-2612 capability probing
//! - [`nonce`] - Permit2 nonce resolution (bitmap scan, proxy, allowance)
//! - [`typed_data`] - EIP-712 domains, messages and witness types
//! - [`signer`] - Local key and wallet signing behind one handle
//! - [`packer`] - Wire encoding of signed permits
//! - [`orchestrator`] - Per-token scheme selection and batch driving
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

/// Awaits a future, optionally instrumenting it with a tracing span.
macro_rules! traced {
    ($fut:expr, $span:expr) => {{
        #[cfg(feature = "telemetry")]
        {
            use tracing::Instrument;
            $fut.instrument($span).await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            $fut.await
        }
    }};
}

pub mod capability;
pub mod chain;
pub mod contract;
pub mod nonce;
pub mod orchestrator;
pub mod packer;
pub mod signer;
pub mod typed_data;

#[cfg(test)]
mod testing;

pub use capability::{Capability, CapabilityProber};
pub use chain::{ChainReader, ReadClient, ReadError};
pub use nonce::NonceResolver;
pub use orchestrator::{AuthorizationBatch, PermitAuthorizer};
pub use packer::{PackError, PermitPayload, decode_packed, pack};
pub use signer::{SignerError, SignerHandle, SignerLike, TypedDataWallet};
pub use typed_data::Witness;
