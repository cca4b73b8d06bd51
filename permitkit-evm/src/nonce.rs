//! Permit2 nonce resolution.
//!
//! Permit2 signature transfers use unordered nonces stored as a bitmap: word
//! `w` holds the 256 nonces `(w << 8) | bit`. The next free nonce is the
//! lowest clear bit of the first word that is not all ones. Some deployments
//! route through a proxy exposing `nextNonce(owner)` instead, and allowance
//! approvals use the sequential `uint48` nonce stored alongside the allowance.
//!
//! All reads of one resolution are pinned to a single block so the scan sees a
//! consistent snapshot and repeated calls within a block agree.

use alloy_primitives::aliases::U48;
use alloy_primitives::{Address, U256};
use permitkit::config::{ChainConfig, NonceSource};
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::chain::{ChainReader, ReadError, read};
use crate::contract::{INonceProxy, IPermit2};

/// Errors raised while resolving a nonce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NonceError {
    /// A read failed.
    #[error(transparent)]
    Read(#[from] ReadError),
    /// Every word up to the ceiling is fully used.
    #[error("no free nonce in the first {0} bitmap words")]
    CeilingReached(u32),
}

/// Returns the lowest clear bit of `word`, or `None` if every bit is set.
#[must_use]
pub fn first_unset_bit(word: U256) -> Option<usize> {
    if word == U256::MAX {
        None
    } else {
        Some((!word).trailing_zeros())
    }
}

/// Composes a bitmap nonce from its word index and bit position.
#[must_use]
pub fn compose_nonce(word: u64, bit: usize) -> U256 {
    (U256::from(word) << 8) | U256::from(bit)
}

/// Derives the nonce of the token at `position` from the nonce resolved for
/// the first signing token of the batch, at `first_position`.
///
/// Assumes the caller reserves the contiguous range `first..first + n`.
#[must_use]
pub fn derive_batch_nonce(first: U256, first_position: usize, position: usize) -> U256 {
    first.saturating_add(U256::from(position.saturating_sub(first_position)))
}

/// Resolves Permit2 nonces for one chain.
#[derive(Debug)]
pub struct NonceResolver<'a, R: ?Sized> {
    reader: &'a R,
    permit2: Address,
    source: NonceSource,
    ceiling: u32,
}

impl<'a, R: ChainReader + ?Sized> NonceResolver<'a, R> {
    /// Creates a resolver.
    pub const fn new(reader: &'a R, permit2: Address, source: NonceSource, ceiling: u32) -> Self {
        Self {
            reader,
            permit2,
            source,
            ceiling,
        }
    }

    /// Creates a resolver using the chain's Permit2 address, nonce source and
    /// scan ceiling.
    pub const fn for_chain(reader: &'a R, chain: &ChainConfig) -> Self {
        Self::new(
            reader,
            chain.permit2_address,
            chain.nonce_source,
            chain.nonce_scan_ceiling,
        )
    }

    /// Returns the next unused signature-transfer nonce for `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`NonceError`] on read failure or when the bitmap scan hits
    /// the ceiling.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(owner = %owner)))]
    pub async fn next_nonce(&self, owner: Address) -> Result<U256, NonceError> {
        let block = traced!(
            self.reader.block_number(),
            tracing::info_span!("fetch_block_number", otel.kind = "client")
        )?;
        match self.source {
            NonceSource::Bitmap => self.scan_bitmap(owner, block).await,
            NonceSource::Proxy { address } => {
                let call = INonceProxy::nextNonceCall { owner };
                Ok(read(self.reader, address, &call, Some(block)).await?)
            }
        }
    }

    async fn scan_bitmap(&self, owner: Address, block: u64) -> Result<U256, NonceError> {
        for word_pos in 0..u64::from(self.ceiling) {
            let call = IPermit2::nonceBitmapCall {
                owner,
                wordPos: U256::from(word_pos),
            };
            let word = traced!(
                read(self.reader, self.permit2, &call, Some(block)),
                tracing::info_span!("fetch_nonce_bitmap", word_pos, otel.kind = "client")
            )?;
            if let Some(bit) = first_unset_bit(word) {
                return Ok(compose_nonce(word_pos, bit));
            }
            #[cfg(feature = "telemetry")]
            tracing::debug!(word_pos, "nonce word fully used, advancing");
        }
        Err(NonceError::CeilingReached(self.ceiling))
    }

    /// Returns the current allowance nonce for `(owner, token, spender)`.
    ///
    /// # Errors
    ///
    /// Returns [`NonceError::Read`] if the allowance read fails.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(owner = %owner, token = %token)))]
    pub async fn allowance_nonce(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
    ) -> Result<U48, NonceError> {
        let block = self.reader.block_number().await?;
        let call = IPermit2::allowanceCall {
            owner,
            token,
            spender,
        };
        let allowance = read(self.reader, self.permit2, &call, Some(block)).await?;
        Ok(allowance.nonce)
    }
}
