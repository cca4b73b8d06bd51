//! Typed-data signing behind one handle.
//!
//! Two calling conventions are supported and picked by an explicit sum type
//! rather than by inspecting the signer:
//!
//! - [`SignerHandle::Local`] hashes the typed data itself and signs the hash
//!   with a [`SignerLike`] key (e.g. [`PrivateKeySigner`]).
//! - [`SignerHandle::Wallet`] hands the typed data to a [`TypedDataWallet`]
//!   speaking `eth_signTypedData_v4`, such as an alloy [`RpcClient`]
//!   connected to a browser or remote wallet.
//!
//! A wallet rejection (EIP-1193 code `4001`) is reported as
//! [`SignerError::Rejected`]; every other failure is [`SignerError::Failed`].
//! Nothing is retried.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use alloy_dyn_abi::TypedData;
use alloy_primitives::{Address, B256, Bytes, Signature};
use alloy_rpc_client::RpcClient;
use alloy_signer_local::PrivateKeySigner;
use permitkit::error::PermitError;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::typed_data::wallet_payload;

/// EIP-1193 "user rejected request" error code.
pub const USER_REJECTED_CODE: i64 = 4001;

/// Length of an `(r, s, v)` ECDSA signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// Errors produced while obtaining a signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    /// The user declined the prompt.
    #[error("user rejected the request: {0}")]
    Rejected(String),
    /// The wallet or key failed.
    #[error("{0}")]
    Failed(String),
    /// The handle signs for a different account than the token owner.
    #[error("signer address {actual} does not match owner {expected}")]
    AccountMismatch {
        /// Owner the request was made for.
        expected: Address,
        /// Address of the signer.
        actual: Address,
    },
    /// The wallet returned something that is not a 65-byte signature.
    #[error("malformed signature of {0} bytes")]
    MalformedSignature(usize),
}

impl From<SignerError> for PermitError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::Rejected(msg) => Self::UserRejected(msg),
            other => Self::SigningFailed(other.to_string()),
        }
    }
}

/// A trait that abstracts hash signing, allowing both owned signers and Arc-wrapped signers.
///
/// Alloy's `Signer` trait is not implemented for `Arc<T>`, and `PrivateKeySigner`
/// is shared via `Arc` when one key serves several flows.
pub trait SignerLike: Send + Sync {
    /// Returns the address of the signer.
    fn address(&self) -> Address;

    /// Signs the given hash.
    fn sign_hash(
        &self,
        hash: &B256,
    ) -> impl Future<Output = Result<Signature, alloy_signer::Error>> + Send;
}

impl SignerLike for PrivateKeySigner {
    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

impl<T: SignerLike> SignerLike for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// A wallet that signs EIP-712 typed data on the user's behalf.
#[async_trait::async_trait]
pub trait TypedDataWallet: Send + Sync + fmt::Debug {
    /// Requests an `eth_signTypedData_v4` signature from `account`.
    async fn sign_typed_data_v4(
        &self,
        account: Address,
        typed_data: &TypedData,
    ) -> Result<Bytes, SignerError>;
}

#[async_trait::async_trait]
impl TypedDataWallet for RpcClient {
    async fn sign_typed_data_v4(
        &self,
        account: Address,
        typed_data: &TypedData,
    ) -> Result<Bytes, SignerError> {
        let payload = wallet_payload(typed_data)
            .map(|value| value.to_string())
            .map_err(|e| SignerError::Failed(e.to_string()))?;
        self.request::<_, Bytes>("eth_signTypedData_v4", (account, payload))
            .await
            .map_err(|e| match e.as_error_resp() {
                Some(resp) if resp.code == USER_REJECTED_CODE => {
                    SignerError::Rejected(resp.message.to_string())
                }
                _ => SignerError::Failed(e.to_string()),
            })
    }
}

/// The signer supplied by the caller.
#[derive(Debug)]
pub enum SignerHandle<S = PrivateKeySigner> {
    /// A local key; typed data is hashed and the hash signed.
    Local(S),
    /// A wallet that receives the full typed data.
    Wallet(Arc<dyn TypedDataWallet>),
}

impl<S: SignerLike> SignerHandle<S> {
    /// Signs `typed_data` on behalf of `account`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] if the user rejects, the signer fails, the
    /// local key belongs to another account, or the result is not 65 bytes.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
        account = %account,
        primary_type = %typed_data.primary_type
    )))]
    pub async fn sign(
        &self,
        account: Address,
        typed_data: &TypedData,
    ) -> Result<Signature, SignerError> {
        match self {
            Self::Local(signer) => {
                if signer.address() != account {
                    return Err(SignerError::AccountMismatch {
                        expected: account,
                        actual: signer.address(),
                    });
                }
                let hash = typed_data
                    .eip712_signing_hash()
                    .map_err(|e| SignerError::Failed(e.to_string()))?;
                signer
                    .sign_hash(&hash)
                    .await
                    .map_err(|e| SignerError::Failed(format!("{e:?}")))
            }
            Self::Wallet(wallet) => {
                let raw = traced!(
                    wallet.sign_typed_data_v4(account, typed_data),
                    tracing::info_span!("eth_signTypedData_v4", otel.kind = "client")
                )?;
                if raw.len() != SIGNATURE_LENGTH {
                    return Err(SignerError::MalformedSignature(raw.len()));
                }
                Signature::from_raw(&raw).map_err(|e| SignerError::Failed(e.to_string()))
            }
        }
    }
}
