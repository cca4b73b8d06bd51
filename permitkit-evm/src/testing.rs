//! In-memory test doubles.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy_dyn_abi::TypedData;
use alloy_primitives::{Address, Bytes};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;

use crate::chain::{ChainReader, ReadError};
use crate::signer::{SignerError, TypedDataWallet};

/// Well-known test key (anvil account 0).
pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcaf784d7bf4f2ff80";

pub fn test_signer() -> PrivateKeySigner {
    TEST_KEY.parse().unwrap()
}

/// Chain reader answering from a table keyed by `(to, calldata)`.
///
/// Unknown calls revert, like a missing function on a real contract.
#[derive(Debug, Default)]
pub struct MockReader {
    responses: Mutex<HashMap<(Address, Bytes), Result<Bytes, ReadError>>>,
    calls: AtomicUsize,
    blocks: Mutex<Vec<Option<u64>>>,
}

impl MockReader {
    pub fn respond<C: SolCall>(&self, to: Address, call: &C, output: Vec<u8>) {
        self.responses
            .lock()
            .unwrap()
            .insert((to, call.abi_encode().into()), Ok(output.into()));
    }

    pub fn fail<C: SolCall>(&self, to: Address, call: &C, error: ReadError) {
        self.responses
            .lock()
            .unwrap()
            .insert((to, call.abi_encode().into()), Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn blocks_seen(&self) -> Vec<Option<u64>> {
        self.blocks.lock().unwrap().clone()
    }
}

impl ChainReader for MockReader {
    async fn call(&self, to: Address, input: Bytes, block: Option<u64>) -> Result<Bytes, ReadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.blocks.lock().unwrap().push(block);
        self.responses
            .lock()
            .unwrap()
            .get(&(to, input))
            .cloned()
            .unwrap_or_else(|| Err(ReadError::Reverted("execution reverted".into())))
    }

    async fn block_number(&self) -> Result<u64, ReadError> {
        Ok(100)
    }
}

/// Wallet that signs with a local key, or rejects every prompt.
#[derive(Debug)]
pub struct MockWallet {
    key: PrivateKeySigner,
    reject: bool,
    prompts: AtomicUsize,
}

impl MockWallet {
    pub fn new(key: PrivateKeySigner) -> Self {
        Self {
            key,
            reject: false,
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(key: PrivateKeySigner) -> Self {
        Self {
            reject: true,
            ..Self::new(key)
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TypedDataWallet for MockWallet {
    async fn sign_typed_data_v4(
        &self,
        _account: Address,
        typed_data: &TypedData,
    ) -> Result<Bytes, SignerError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(SignerError::Rejected("User denied message signature.".into()));
        }
        let hash = typed_data
            .eip712_signing_hash()
            .map_err(|e| SignerError::Failed(e.to_string()))?;
        let signature = alloy_signer::Signer::sign_hash(&self.key, &hash)
            .await
            .map_err(|e| SignerError::Failed(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}
