//! Per-token authorization requests.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// One token that must be authorized for the spender to pull.
///
/// Requests are immutable inputs built fresh for every authorization call.
/// `position_index` is the token's 0-based order inside its batch and must
/// match its position in the list handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAuthorizationRequest {
    /// ERC-20 token contract, or the chain's native-currency sentinel.
    pub token_address: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
    /// EIP-155 chain ID the token lives on.
    pub chain_id: u64,
    /// Token owner, i.e. the account that signs.
    pub owner_address: Address,
    /// Contract that will pull the funds.
    pub spender_address: Address,
    /// 0-based order among the batch.
    pub position_index: usize,
}

impl TokenAuthorizationRequest {
    /// Returns `true` if this request refers to the given native-currency sentinel.
    #[must_use]
    pub fn is_native(&self, native_sentinel: Address) -> bool {
        self.token_address == native_sentinel
    }
}

/// Returns `true` when the batch is a one-to-many swap: several legs funded by
/// the same source token.
///
/// Only the first two entries are compared.
#[must_use]
pub fn is_one_to_many(requests: &[TokenAuthorizationRequest]) -> bool {
    match requests {
        [first, second, ..] => first.token_address == second.token_address,
        _ => false,
    }
}

/// Sums the amounts of all legs, saturating at `U256::MAX`.
#[must_use]
pub fn total_amount(requests: &[TokenAuthorizationRequest]) -> U256 {
    requests
        .iter()
        .fold(U256::ZERO, |acc, r| acc.saturating_add(r.amount))
}
