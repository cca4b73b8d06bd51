//! Read-only chain access.
//!
//! The negotiation engine only ever needs two things from a chain: an
//! `eth_call` against a contract and the current block number. Both sit
//! behind [`ChainReader`], so any client can drive the flow. [`ReadClient`]
//! adapts an alloy [`Provider`]; tests use in-memory readers.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{BlockId, TransactionInput, TransactionRequest};
use alloy_sol_types::SolCall;
use alloy_transport::TransportError;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport_http::Http;
use permitkit::config::RpcEndpoint;
use tower::ServiceBuilder;
use url::Url;

/// Errors from read-only chain access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// The call reverted or the function does not exist on the target.
    #[error("call reverted: {0}")]
    Reverted(String),
    /// The RPC transport failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// Return data did not match the expected ABI.
    #[error("failed to decode return data: {0}")]
    Decode(String),
    /// No usable HTTP endpoint was configured.
    #[error("no HTTP(S) RPC endpoint configured for chain {0}")]
    NoTransports(u64),
}

impl From<TransportError> for ReadError {
    fn from(e: TransportError) -> Self {
        if e.as_error_resp().is_some() {
            Self::Reverted(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Read-only chain capability needed by the negotiation engine.
pub trait ChainReader: Send + Sync {
    /// Executes an `eth_call` against `to` with the given calldata, at `block`
    /// or at the latest block when `None`.
    fn call(
        &self,
        to: Address,
        input: Bytes,
        block: Option<u64>,
    ) -> impl Future<Output = Result<Bytes, ReadError>> + Send;

    /// Returns the latest block number.
    fn block_number(&self) -> impl Future<Output = Result<u64, ReadError>> + Send;
}

impl<T: ChainReader> ChainReader for Arc<T> {
    async fn call(&self, to: Address, input: Bytes, block: Option<u64>) -> Result<Bytes, ReadError> {
        (**self).call(to, input, block).await
    }

    async fn block_number(&self) -> Result<u64, ReadError> {
        (**self).block_number().await
    }
}

/// Calls a typed contract function and decodes its return value.
///
/// # Errors
///
/// Returns [`ReadError`] if the call fails or the return data cannot be decoded.
pub async fn read<R, C>(
    reader: &R,
    to: Address,
    call: &C,
    block: Option<u64>,
) -> Result<C::Return, ReadError>
where
    R: ChainReader + ?Sized,
    C: SolCall + Sync,
{
    let output = reader.call(to, call.abi_encode().into(), block).await?;
    C::abi_decode_returns(&output).map_err(|e| ReadError::Decode(e.to_string()))
}

/// [`ChainReader`] over an alloy [`Provider`].
#[derive(Debug, Clone)]
pub struct ReadClient<P> {
    provider: P,
}

impl<P> ReadClient<P> {
    /// Wraps a provider.
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Returns the wrapped provider.
    pub const fn provider(&self) -> &P {
        &self.provider
    }
}

impl ReadClient<RootProvider> {
    /// Builds a read client from a chain's RPC endpoints.
    ///
    /// Every HTTP(S) endpoint becomes a throttled transport; the transports are
    /// then combined behind a fallback layer. Other URL schemes are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::NoTransports`] if no HTTP(S) endpoint remains.
    pub fn from_endpoints(chain_id: u64, endpoints: &[RpcEndpoint]) -> Result<Self, ReadError> {
        let client = rpc_client(chain_id, endpoints)?;
        Ok(Self::new(RootProvider::new(client)))
    }
}

#[allow(unused_variables)] // chain_id is needed for tracing only
fn rpc_client(chain_id: u64, endpoints: &[RpcEndpoint]) -> Result<RpcClient, ReadError> {
    let transports = endpoints
        .iter()
        .filter_map(|endpoint| {
            let url = Url::parse(&endpoint.url).ok()?;
            if !matches!(url.scheme(), "http" | "https") {
                #[cfg(feature = "telemetry")]
                tracing::warn!(chain_id, rpc_url = %url, "Skipping non-HTTP RPC endpoint");
                return None;
            }
            #[cfg(feature = "telemetry")]
            tracing::info!(chain_id, rpc_url = %url, rate_limit = ?endpoint.rate_limit, "Using HTTP transport");
            let service = ServiceBuilder::new()
                .layer(ThrottleLayer::new(endpoint.rate_limit.unwrap_or(u32::MAX)))
                .service(Http::new(url));
            Some(service)
        })
        .collect::<Vec<_>>();
    let count = NonZeroUsize::new(transports.len()).ok_or(ReadError::NoTransports(chain_id))?;
    let fallback = ServiceBuilder::new()
        .layer(FallbackLayer::default().with_active_transport_count(count))
        .service(transports);
    Ok(RpcClient::new(fallback, false))
}

impl<P: Provider> ChainReader for ReadClient<P> {
    async fn call(&self, to: Address, input: Bytes, block: Option<u64>) -> Result<Bytes, ReadError> {
        let tx = TransactionRequest::default()
            .to(to)
            .input(TransactionInput::new(input));
        let call = self.provider.call(tx);
        let call = match block {
            Some(number) => call.block(BlockId::number(number)),
            None => call,
        };
        Ok(call.await?)
    }

    async fn block_number(&self) -> Result<u64, ReadError> {
        Ok(self.provider.get_block_number().await?)
    }
}
