//! EIP-712 payload construction.
//!
//! [`build`] turns a [`PermitMessage`] into the `alloy-dyn-abi` [`TypedData`]
//! that is hashed locally or handed to a wallet as `eth_signTypedData_v4`
//! JSON. It performs no I/O.
//!
//! Witness types are `sol!` structs. Their EIP-712 `encodeType` string is
//! the single source for both the types map sent to wallets and the Permit2
//! `witnessTypeString`, so the declared type and the signed fields cannot
//! drift apart.

use alloy_dyn_abi::eip712::Resolver;
use alloy_dyn_abi::TypedData;
use alloy_primitives::{Address, U256};
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain, sol};
use permitkit::scheme::PermitScheme;
use serde::{Deserialize, Serialize};

use crate::contract::{Permit, PermitSingle, TokenPermissions};

/// Name of the Permit2 EIP-712 domain.
pub const PERMIT2_DOMAIN_NAME: &str = "Permit2";

const WITNESS_TRANSFER_TYPE: &str = "PermitWitnessTransferFrom";
const BATCH_WITNESS_TRANSFER_TYPE: &str = "PermitBatchWitnessTransferFrom";

sol! {
    /// Binds a plain transfer to its owner and recipient.
    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct TransferWitness {
        address owner;
        address recipient;
    }

    /// Binds a gasless swap to its transaction and fee/route commitments.
    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct SwapWitness {
        bytes32 transactionId;
        address user;
        bytes32 executorFeesHash;
        bytes32 swapDataHash;
    }

    /// Binds a gasless bridge; a swap witness plus the bridge adapter data.
    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct BridgeWitness {
        bytes32 transactionId;
        address user;
        bytes32 executorFeesHash;
        bytes32 swapDataHash;
        bytes32 adapterDataHash;
    }
}

/// Application context embedded in a Permit2 witness signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Witness {
    /// Plain transfer.
    Transfer(TransferWitness),
    /// Gasless swap.
    Swap(SwapWitness),
    /// Gasless bridge.
    Bridge(BridgeWitness),
}

impl Witness {
    /// Returns the EIP-712 struct name of the witness.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Transfer(_) => TransferWitness::NAME,
            Self::Swap(_) => SwapWitness::NAME,
            Self::Bridge(_) => BridgeWitness::NAME,
        }
    }

    /// Returns the witness `encodeType`, e.g.
    /// `TransferWitness(address owner,address recipient)`.
    #[must_use]
    pub fn encode_type(&self) -> String {
        match self {
            Self::Transfer(_) => TransferWitness::eip712_encode_type(),
            Self::Swap(_) => SwapWitness::eip712_encode_type(),
            Self::Bridge(_) => BridgeWitness::eip712_encode_type(),
        }
        .into_owned()
    }

    /// Returns the witness as an EIP-712 message value.
    ///
    /// # Errors
    ///
    /// Returns [`TypedDataError`] if serialization fails.
    pub fn to_json(&self) -> Result<serde_json::Value, TypedDataError> {
        let value = match self {
            Self::Transfer(w) => serde_json::to_value(w),
            Self::Swap(w) => serde_json::to_value(w),
            Self::Bridge(w) => serde_json::to_value(w),
        }?;
        Ok(value)
    }

    /// Returns the `witnessTypeString` argument the Permit2 contract expects:
    /// `"<Name> witness)"` followed by every referenced type in alphabetical
    /// order.
    #[must_use]
    pub fn witness_type_string(&self) -> String {
        let mut referenced = [self.encode_type(), TokenPermissions::eip712_encode_type().into_owned()];
        referenced.sort();
        format!("{} witness){}", self.type_name(), referenced.concat())
    }
}

/// Errors raised while building typed data.
#[derive(Debug, thiserror::Error)]
pub enum TypedDataError {
    /// Message serialization failed.
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The type definitions could not be resolved.
    #[error("invalid EIP-712 types: {0}")]
    Types(#[from] alloy_dyn_abi::Error),
}

/// A fully specified message, ready to be turned into typed data.
#[derive(Debug, Clone)]
pub enum PermitMessage {
    /// EIP-2612 permit against the token's domain.
    Native {
        /// Token contract, the verifying contract.
        token: Address,
        /// Token `name()`.
        token_name: String,
        /// Domain version.
        version: String,
        /// Signed message.
        permit: Permit,
    },
    /// Permit2 allowance approval.
    Single(PermitSingle),
    /// Permit2 single-token witness transfer.
    WitnessTransfer {
        /// Token and amount.
        permitted: TokenPermissions,
        /// Contract allowed to pull.
        spender: Address,
        /// Permit2 nonce.
        nonce: U256,
        /// Signature deadline.
        deadline: U256,
        /// Bound context.
        witness: Witness,
    },
    /// Permit2 multi-token witness transfer.
    BatchWitnessTransfer {
        /// Tokens and amounts.
        permitted: Vec<TokenPermissions>,
        /// Contract allowed to pull.
        spender: Address,
        /// Permit2 nonce.
        nonce: U256,
        /// Signature deadline.
        deadline: U256,
        /// Bound context.
        witness: Witness,
    },
}

impl PermitMessage {
    /// Returns the scheme this message is signed under.
    #[must_use]
    pub const fn scheme(&self) -> PermitScheme {
        match self {
            Self::Native { .. } => PermitScheme::NativePermit,
            Self::Single(_) => PermitScheme::Permit2Single,
            Self::WitnessTransfer { .. } => PermitScheme::Permit2WitnessTransfer,
            Self::BatchWitnessTransfer { .. } => PermitScheme::Permit2BatchWitnessTransfer,
        }
    }
}

/// Returns the Permit2 domain: `{ name: "Permit2", chainId, verifyingContract }`.
#[must_use]
pub fn permit2_domain(chain_id: u64, permit2: Address) -> Eip712Domain {
    eip712_domain! {
        name: PERMIT2_DOMAIN_NAME,
        chain_id: chain_id,
        verifying_contract: permit2,
    }
}

/// Returns an EIP-2612 token domain.
#[must_use]
pub fn token_domain(name: String, version: String, chain_id: u64, token: Address) -> Eip712Domain {
    eip712_domain! {
        name: name,
        version: version,
        chain_id: chain_id,
        verifying_contract: token,
    }
}

/// Builds the typed data for `message` on `chain_id`.
///
/// # Errors
///
/// Returns [`TypedDataError`] if the witness types cannot be resolved.
pub fn build(
    chain_id: u64,
    permit2: Address,
    message: &PermitMessage,
) -> Result<TypedData, TypedDataError> {
    match message {
        PermitMessage::Native {
            token,
            token_name,
            version,
            permit,
        } => {
            let domain = token_domain(token_name.clone(), version.clone(), chain_id, *token);
            Ok(TypedData::from_struct(permit, Some(domain)))
        }
        PermitMessage::Single(single) => Ok(TypedData::from_struct(
            single,
            Some(permit2_domain(chain_id, permit2)),
        )),
        PermitMessage::WitnessTransfer {
            permitted,
            spender,
            nonce,
            deadline,
            witness,
        } => witness_typed_data(
            permit2_domain(chain_id, permit2),
            WITNESS_TRANSFER_TYPE,
            "TokenPermissions permitted",
            serde_json::to_value(permitted)?,
            *spender,
            *nonce,
            *deadline,
            witness,
        ),
        PermitMessage::BatchWitnessTransfer {
            permitted,
            spender,
            nonce,
            deadline,
            witness,
        } => witness_typed_data(
            permit2_domain(chain_id, permit2),
            BATCH_WITNESS_TRANSFER_TYPE,
            "TokenPermissions[] permitted",
            serde_json::to_value(permitted)?,
            *spender,
            *nonce,
            *deadline,
            witness,
        ),
    }
}

/// Returns the `EIP712Domain` type entries for the fields present in `domain`,
/// in canonical order.
#[must_use]
pub fn domain_type_fields(domain: &Eip712Domain) -> serde_json::Value {
    let present = [
        ("name", "string", domain.name.is_some()),
        ("version", "string", domain.version.is_some()),
        ("chainId", "uint256", domain.chain_id.is_some()),
        ("verifyingContract", "address", domain.verifying_contract.is_some()),
        ("salt", "bytes32", domain.salt.is_some()),
    ];
    present
        .into_iter()
        .filter(|(_, _, set)| *set)
        .map(|(name, ty, _)| serde_json::json!({ "name": name, "type": ty }))
        .collect()
}

/// Serializes `typed_data` as the `eth_signTypedData_v4` payload.
///
/// Wallets hash the domain with the `EIP712Domain` entry of `types`; it is
/// added from the domain's populated fields when missing.
///
/// # Errors
///
/// Returns [`serde_json::Error`] if serialization fails.
pub fn wallet_payload(typed_data: &TypedData) -> Result<serde_json::Value, serde_json::Error> {
    let mut payload = serde_json::to_value(typed_data)?;
    if let Some(types) = payload.get_mut("types").and_then(serde_json::Value::as_object_mut) {
        types
            .entry("EIP712Domain")
            .or_insert_with(|| domain_type_fields(&typed_data.domain));
    }
    Ok(payload)
}

#[allow(clippy::too_many_arguments)]
fn witness_typed_data(
    domain: Eip712Domain,
    primary_type: &str,
    permitted_field: &str,
    permitted: serde_json::Value,
    spender: Address,
    nonce: U256,
    deadline: U256,
    witness: &Witness,
) -> Result<TypedData, TypedDataError> {
    let mut referenced = [
        witness.encode_type(),
        TokenPermissions::eip712_encode_type().into_owned(),
    ];
    referenced.sort();
    let encode_type = format!(
        "{primary_type}({permitted_field},address spender,uint256 nonce,uint256 deadline,{} witness){}",
        witness.type_name(),
        referenced.concat()
    );
    let mut resolver = Resolver::default();
    resolver.ingest_string(&encode_type)?;

    let message = serde_json::json!({
        "permitted": permitted,
        "spender": spender,
        "nonce": nonce,
        "deadline": deadline,
        "witness": witness.to_json()?,
    });
    Ok(TypedData {
        domain,
        resolver,
        primary_type: primary_type.to_owned(),
        message,
    })
}
