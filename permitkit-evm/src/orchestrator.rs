//! Per-token scheme selection and batch driving.
//!
//! [`PermitAuthorizer::authorize`] walks a batch in order. Each token runs
//! through a small state machine:
//!
//! ```text
//! Start ─┬─▶ ProbeNative ─┬─▶ UseNative ──────┬─▶ BuildSignature ─▶ Packed
//!        │                └─▶ ProbePermit2 ───┘
//!        ├─▶ ProbePermit2
//!        └─▶ Packed (native currency)
//! ```
//!
//! Any failing step ends the token with a [`StageError`]; the batch stops
//! there and returns the permits packed so far.
//!
//! Batches whose first two tokens are equal are one-to-many: only the first
//! leg is signed, covering every leg, and the remaining legs get the
//! [`PermitScheme::DefaultPermit`] payload. Other multi-token batches sign
//! each token separately, deriving later nonces from the first one.

use alloy_primitives::aliases::{U48, U160};
use alloy_primitives::{Address, Bytes, U256};
use alloy_signer_local::PrivateKeySigner;
use permitkit::config::ChainConfig;
use permitkit::error::{FlowStage, InvariantViolation, PermitError, StageError};
use permitkit::outcome::BatchOutcome;
use permitkit::request::{TokenAuthorizationRequest, is_one_to_many, total_amount};
use permitkit::scheme::{PermitMode, PermitScheme};
use permitkit::timestamp::UnixTimestamp;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::capability::{Capability, CapabilityProber};
use crate::chain::{ChainReader, ReadError, read};
use crate::contract::{IERC20Permit, Permit, PermitDetails, PermitSingle, TokenPermissions};
use crate::nonce::{NonceError, NonceResolver, derive_batch_nonce};
use crate::packer::{PermitPayload, pack};
use crate::signer::{SignerHandle, SignerLike};
use crate::typed_data::{PermitMessage, TransferWitness, Witness, build};

/// A batch of tokens to authorize for one spender call.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationBatch {
    /// Tokens in batch order; `position_index` must equal the list index.
    pub tokens: Vec<TokenAuthorizationRequest>,
    /// Requested mode per token, same length as `tokens`.
    pub modes: Vec<PermitMode>,
    /// Witness bound into Permit2 signatures. Defaults to a transfer witness
    /// of `(owner, spender)`.
    pub witness: Option<Witness>,
    /// Signature deadline. Defaults to now plus the chain's deadline window.
    pub deadline: Option<UnixTimestamp>,
}

impl AuthorizationBatch {
    /// Creates a batch using the same mode for every token.
    #[must_use]
    pub fn uniform(tokens: Vec<TokenAuthorizationRequest>, mode: PermitMode) -> Self {
        let modes = vec![mode; tokens.len()];
        Self {
            tokens,
            modes,
            witness: None,
            deadline: None,
        }
    }

    /// Sets the witness.
    #[must_use]
    pub fn with_witness(mut self, witness: Witness) -> Self {
        self.witness = Some(witness);
        self
    }

    /// Sets the signature deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: UnixTimestamp) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn validate(&self, chain_id: u64) -> Result<(), InvariantViolation> {
        if self.modes.len() != self.tokens.len() {
            return Err(InvariantViolation::LengthMismatch {
                tokens: self.tokens.len(),
                selectors: self.modes.len(),
            });
        }
        for (position, token) in self.tokens.iter().enumerate() {
            if token.position_index != position {
                return Err(InvariantViolation::PositionMismatch {
                    expected: position,
                    found: token.position_index,
                });
            }
            if token.chain_id != chain_id {
                return Err(InvariantViolation::ChainMismatch {
                    position,
                    expected: chain_id,
                    found: token.chain_id,
                });
            }
        }
        Ok(())
    }
}

/// States of one token's authorization.
#[derive(Debug)]
enum FlowState {
    Start,
    ProbeNative,
    UseNative(Capability),
    ProbePermit2,
    BuildSignature(PermitMessage),
    Packed(Bytes),
}

/// Per-batch facts shared by the tokens of one [`AuthorizationBatch`].
#[derive(Debug)]
struct BatchContext<'b> {
    legs: &'b [TokenAuthorizationRequest],
    one_to_many: bool,
    witness: Option<&'b Witness>,
    deadline: UnixTimestamp,
    /// First resolved nonce and the position it was resolved for.
    first_nonce: Option<(U256, usize)>,
}

impl BatchContext<'_> {
    fn witness_for(&self, request: &TokenAuthorizationRequest) -> Witness {
        self.witness.cloned().unwrap_or_else(|| {
            Witness::Transfer(TransferWitness {
                owner: request.owner_address,
                recipient: request.spender_address,
            })
        })
    }

    /// Amount the signature must cover: every leg for a one-to-many batch.
    fn covered_amount(&self, request: &TokenAuthorizationRequest) -> U256 {
        if self.one_to_many {
            total_amount(self.legs)
        } else {
            request.amount
        }
    }
}

/// Negotiates and signs permits for one chain.
#[derive(Debug)]
pub struct PermitAuthorizer<R, S = PrivateKeySigner> {
    reader: R,
    signer: SignerHandle<S>,
    chain: ChainConfig,
}

impl<R, S> PermitAuthorizer<R, S>
where
    R: ChainReader,
    S: SignerLike,
{
    /// Creates an authorizer for `chain`.
    pub const fn new(reader: R, signer: SignerHandle<S>, chain: ChainConfig) -> Self {
        Self {
            reader,
            signer,
            chain,
        }
    }

    /// Returns the chain configuration.
    pub const fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    /// Authorizes every token of `batch`, in order.
    ///
    /// Flow failures are reported in the returned [`BatchOutcome`] together
    /// with the permits packed before the failure.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation`] before touching the chain if the batch
    /// is malformed.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
        chain_id = self.chain.chain_id,
        tokens = batch.tokens.len()
    )))]
    pub async fn authorize(
        &self,
        batch: &AuthorizationBatch,
    ) -> Result<BatchOutcome, InvariantViolation> {
        batch.validate(self.chain.chain_id)?;

        let mut ctx = BatchContext {
            legs: &batch.tokens,
            one_to_many: is_one_to_many(&batch.tokens),
            witness: batch.witness.as_ref(),
            deadline: batch.deadline.unwrap_or_else(|| {
                UnixTimestamp::now() + self.chain.signature_deadline_secs
            }),
            first_nonce: None,
        };

        let mut permits = Vec::with_capacity(batch.tokens.len());
        for (request, mode) in batch.tokens.iter().zip(&batch.modes) {
            if ctx.one_to_many && request.position_index > 0 {
                permits.push(pack(&PermitPayload::Default));
                continue;
            }
            match self.authorize_token(request, *mode, &mut ctx).await {
                Ok(packed) => permits.push(packed),
                Err(failure) => {
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(
                        position = request.position_index,
                        stage = %failure.stage,
                        error = %failure.error,
                        "token authorization failed"
                    );
                    return Ok(BatchOutcome::failed(failure, permits));
                }
            }
        }
        Ok(BatchOutcome::success(permits))
    }

    async fn authorize_token(
        &self,
        request: &TokenAuthorizationRequest,
        mode: PermitMode,
        ctx: &mut BatchContext<'_>,
    ) -> Result<Bytes, StageError> {
        let mut state = FlowState::Start;
        loop {
            state = match state {
                FlowState::Start => {
                    if request.is_native(self.chain.native_token) {
                        FlowState::Packed(pack(&PermitPayload::Default))
                    } else {
                        match mode {
                            PermitMode::Auto | PermitMode::NativePermit => FlowState::ProbeNative,
                            PermitMode::Permit2 | PermitMode::Permit2Allowance => {
                                FlowState::ProbePermit2
                            }
                        }
                    }
                }
                FlowState::ProbeNative => {
                    let capability =
                        CapabilityProber::new(&self.reader, &self.chain)
                            .probe(request.token_address)
                            .await;
                    if capability.supports_native_permit {
                        FlowState::UseNative(capability)
                    } else if mode == PermitMode::NativePermit {
                        return Err(StageError::new(
                            FlowStage::CapabilityProbe,
                            PermitError::CapabilityNotSupported {
                                token: request.token_address,
                                scheme: PermitScheme::NativePermit,
                            },
                        ));
                    } else {
                        FlowState::ProbePermit2
                    }
                }
                FlowState::UseNative(capability) => {
                    FlowState::BuildSignature(self.native_message(request, &capability, ctx).await?)
                }
                FlowState::ProbePermit2 => {
                    FlowState::BuildSignature(self.permit2_message(request, mode, ctx).await?)
                }
                FlowState::BuildSignature(message) => {
                    FlowState::Packed(self.sign_and_pack(request, message).await?)
                }
                FlowState::Packed(bytes) => return Ok(bytes),
            };
        }
    }

    async fn native_message(
        &self,
        request: &TokenAuthorizationRequest,
        capability: &Capability,
        ctx: &BatchContext<'_>,
    ) -> Result<PermitMessage, StageError> {
        let chain_read = |e: ReadError| {
            StageError::new(FlowStage::CapabilityProbe, PermitError::ChainRead(e.to_string()))
        };
        let token = request.token_address;
        let name_call = IERC20Permit::nameCall {};
        let nonces_call = IERC20Permit::noncesCall {
            owner: request.owner_address,
        };
        let (token_name, nonce) = traced!(
            futures_util::future::try_join(
                read(&self.reader, token, &name_call, None),
                read(&self.reader, token, &nonces_call, None),
            ),
            tracing::info_span!("fetch_eip2612_domain", otel.kind = "client")
        )
        .map_err(chain_read)?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(token = %token, version = capability.version_or_default(), "using native permit");
        Ok(PermitMessage::Native {
            token,
            token_name,
            version: capability.version_or_default().to_owned(),
            permit: Permit {
                owner: request.owner_address,
                spender: request.spender_address,
                value: ctx.covered_amount(request),
                nonce,
                deadline: ctx.deadline.into(),
            },
        })
    }

    async fn permit2_message(
        &self,
        request: &TokenAuthorizationRequest,
        mode: PermitMode,
        ctx: &mut BatchContext<'_>,
    ) -> Result<PermitMessage, StageError> {
        let resolver = NonceResolver::for_chain(&self.reader, &self.chain);
        let nonce_failed = |e: NonceError| {
            StageError::new(
                FlowStage::NonceResolution,
                PermitError::NonceResolutionFailed(e.to_string()),
            )
        };

        if mode == PermitMode::Permit2Allowance {
            let amount = U160::checked_from_uint(ctx.covered_amount(request)).ok_or_else(|| {
                StageError::new(
                    FlowStage::Packing,
                    PermitError::PackingInvariantViolated("amount exceeds uint160".into()),
                )
            })?;
            let nonce = resolver
                .allowance_nonce(request.owner_address, request.token_address, request.spender_address)
                .await
                .map_err(nonce_failed)?;
            let expiration = UnixTimestamp::now() + self.chain.allowance_expiration_secs;
            #[cfg(feature = "telemetry")]
            tracing::debug!(token = %request.token_address, %nonce, "using permit2 allowance");
            return Ok(PermitMessage::Single(PermitSingle {
                details: PermitDetails {
                    token: request.token_address,
                    amount,
                    expiration: U48::saturating_from(expiration.as_secs()),
                    nonce,
                },
                spender: request.spender_address,
                sigDeadline: ctx.deadline.into(),
            }));
        }

        let nonce = match ctx.first_nonce {
            Some((first, first_position)) => {
                derive_batch_nonce(first, first_position, request.position_index)
            }
            None => {
                let nonce = resolver
                    .next_nonce(request.owner_address)
                    .await
                    .map_err(nonce_failed)?;
                ctx.first_nonce = Some((nonce, request.position_index));
                nonce
            }
        };

        let witness = ctx.witness_for(request);
        let deadline = ctx.deadline.into();
        if ctx.one_to_many {
            #[cfg(feature = "telemetry")]
            tracing::debug!(token = %request.token_address, %nonce, legs = ctx.legs.len(), "using permit2 batch witness transfer");
            Ok(PermitMessage::BatchWitnessTransfer {
                permitted: ctx
                    .legs
                    .iter()
                    .map(|leg| TokenPermissions {
                        token: leg.token_address,
                        amount: leg.amount,
                    })
                    .collect(),
                spender: request.spender_address,
                nonce,
                deadline,
                witness,
            })
        } else {
            #[cfg(feature = "telemetry")]
            tracing::debug!(token = %request.token_address, %nonce, "using permit2 witness transfer");
            Ok(PermitMessage::WitnessTransfer {
                permitted: TokenPermissions {
                    token: request.token_address,
                    amount: request.amount,
                },
                spender: request.spender_address,
                nonce,
                deadline,
                witness,
            })
        }
    }

    async fn sign_and_pack(
        &self,
        request: &TokenAuthorizationRequest,
        message: PermitMessage,
    ) -> Result<Bytes, StageError> {
        let typed_data = build(self.chain.chain_id, self.chain.permit2_address, &message)
            .map_err(|e| StageError::new(FlowStage::Signing, PermitError::SigningFailed(e.to_string())))?;
        let signature = self
            .signer
            .sign(request.owner_address, &typed_data)
            .await
            .map_err(|e| StageError::new(FlowStage::Signing, e.into()))?;

        let payload = match message {
            PermitMessage::Native { permit, .. } => PermitPayload::native(
                permit.owner,
                permit.spender,
                permit.value,
                permit.deadline,
                &signature,
            ),
            PermitMessage::Single(single) => PermitPayload::Permit2Single {
                amount: single.details.amount,
                nonce: single.details.nonce,
                expiration: single.details.expiration,
                sig_deadline: single.sigDeadline,
                signature: signature.as_bytes().into(),
            },
            PermitMessage::WitnessTransfer {
                nonce, deadline, ..
            } => PermitPayload::Permit2Witness {
                nonce,
                sig_deadline: deadline,
                signature: signature.as_bytes().into(),
            },
            PermitMessage::BatchWitnessTransfer {
                permitted,
                nonce,
                deadline,
                ..
            } => PermitPayload::Permit2BatchWitness {
                permitted,
                nonce,
                sig_deadline: deadline,
                signature: signature.as_bytes().into(),
            },
        };
        Ok(pack(&payload))
    }
}

/// Returns the addresses that a batch asks to be signed, in order.
///
/// Native-currency legs and the trailing legs of a one-to-many batch need no
/// signature and are skipped.
#[must_use]
pub fn tokens_requiring_signature(
    tokens: &[TokenAuthorizationRequest],
    native_token: Address,
) -> Vec<Address> {
    let one_to_many = is_one_to_many(tokens);
    tokens
        .iter()
        .filter(|t| !(one_to_many && t.position_index > 0))
        .filter(|t| !t.is_native(native_token))
        .map(|t| t.token_address)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::IPermit2;
    use crate::packer::decode_packed;
    use crate::testing::{MockReader, MockWallet, test_signer};
    use alloy_primitives::{B256, address};
    use alloy_sol_types::SolValue;
    use permitkit::error::PermitStatus;
    use std::sync::Arc;

    const TOKEN: Address = address!("0x00000000000000000000000000000000000000a1");
    const OTHER: Address = address!("0x00000000000000000000000000000000000000b2");
    const SPENDER: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

    fn owner() -> Address {
        test_signer().address()
    }

    fn chain() -> ChainConfig {
        ChainConfig::new(1)
    }

    fn leg(token: Address, amount: u64, position_index: usize) -> TokenAuthorizationRequest {
        TokenAuthorizationRequest {
            token_address: token,
            amount: U256::from(amount),
            chain_id: 1,
            owner_address: owner(),
            spender_address: SPENDER,
            position_index,
        }
    }

    fn native_capable(reader: &MockReader, token: Address, version: Option<&str>) {
        reader.respond(token, &IERC20Permit::DOMAIN_SEPARATORCall {}, B256::repeat_byte(1).abi_encode());
        reader.respond(
            token,
            &IERC20Permit::noncesCall {
                owner: Address::ZERO,
            },
            U256::ZERO.abi_encode(),
        );
        reader.respond(
            token,
            &IERC20Permit::noncesCall { owner: owner() },
            U256::from(5).abi_encode(),
        );
        reader.respond(token, &IERC20Permit::nameCall {}, "Token".to_owned().abi_encode());
        if let Some(version) = version {
            reader.respond(token, &IERC20Permit::versionCall {}, version.to_owned().abi_encode());
        }
    }

    fn bitmap_word(reader: &MockReader, word_pos: u64, value: U256) {
        let call = IPermit2::nonceBitmapCall {
            owner: owner(),
            wordPos: U256::from(word_pos),
        };
        reader.respond(chain().permit2_address, &call, value.abi_encode());
    }

    fn wallet_authorizer(
        reader: Arc<MockReader>,
        wallet: Arc<MockWallet>,
    ) -> PermitAuthorizer<Arc<MockReader>> {
        PermitAuthorizer::new(reader, SignerHandle::Wallet(wallet), chain())
    }

    #[tokio::test]
    async fn test_auto_uses_native_permit_when_supported() {
        let reader = Arc::new(MockReader::default());
        native_capable(&reader, TOKEN, Some("2"));
        let authorizer = PermitAuthorizer::new(reader, SignerHandle::Local(test_signer()), chain());

        let deadline = UnixTimestamp::now() + 1800;
        let batch = AuthorizationBatch::uniform(vec![leg(TOKEN, 1000, 0)], PermitMode::Auto)
            .with_deadline(deadline);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        assert!(outcome.is_success());

        let PermitPayload::Native {
            owner: signed_owner,
            spender,
            value,
            deadline: signed_deadline,
            v,
            r,
            s,
        } = decode_packed(&outcome.permits[0]).unwrap()
        else {
            panic!("expected native permit");
        };
        assert_eq!(signed_owner, owner());
        assert_eq!(spender, SPENDER);
        assert_eq!(value, U256::from(1000));
        assert_eq!(signed_deadline, U256::from(deadline.as_secs()));

        let permit = Permit {
            owner: owner(),
            spender: SPENDER,
            value: U256::from(1000),
            nonce: U256::from(5),
            deadline: U256::from(deadline.as_secs()),
        };
        let domain = crate::typed_data::token_domain("Token".into(), "2".into(), 1, TOKEN);
        let hash = alloy_sol_types::SolStruct::eip712_signing_hash(&permit, &domain);
        let signature = alloy_primitives::Signature::new(
            U256::from_be_bytes(r.0),
            U256::from_be_bytes(s.0),
            v == 28,
        );
        assert_eq!(signature.recover_address_from_prehash(&hash).unwrap(), owner());
    }

    #[tokio::test]
    async fn test_default_deadline_is_thirty_minutes_out() {
        let reader = Arc::new(MockReader::default());
        native_capable(&reader, TOKEN, None);
        let authorizer = PermitAuthorizer::new(reader, SignerHandle::Local(test_signer()), chain());

        let before = UnixTimestamp::now().as_secs();
        let batch = AuthorizationBatch::uniform(vec![leg(TOKEN, 1, 0)], PermitMode::Auto);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        let after = UnixTimestamp::now().as_secs();

        let PermitPayload::Native { deadline, .. } = decode_packed(&outcome.permits[0]).unwrap() else {
            panic!("expected native permit");
        };
        assert!(deadline >= U256::from(before + 1800) && deadline <= U256::from(after + 1800));
    }

    #[tokio::test]
    async fn test_auto_falls_back_to_permit2_witness() {
        let reader = Arc::new(MockReader::default());
        bitmap_word(&reader, 0, U256::from(0b11));
        let authorizer = PermitAuthorizer::new(reader, SignerHandle::Local(test_signer()), chain());

        let batch = AuthorizationBatch::uniform(vec![leg(TOKEN, 1000, 0)], PermitMode::Auto);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        assert!(outcome.is_success());
        let payload = decode_packed(&outcome.permits[0]).unwrap();
        assert_eq!(payload.scheme(), PermitScheme::Permit2WitnessTransfer);
        let PermitPayload::Permit2Witness { nonce, signature, .. } = payload else {
            panic!("expected witness transfer");
        };
        assert_eq!(nonce, U256::from(2));
        assert_eq!(signature.len(), 65);
    }

    #[tokio::test]
    async fn test_forced_native_on_unsupported_token_fails() {
        let reader = Arc::new(MockReader::default());
        let authorizer = PermitAuthorizer::new(reader, SignerHandle::Local(test_signer()), chain());

        let batch = AuthorizationBatch::uniform(vec![leg(TOKEN, 1000, 0)], PermitMode::NativePermit);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        assert_eq!(outcome.status, PermitStatus::Error);
        assert_eq!(outcome.code, 1001);
        assert_eq!(outcome.stage, Some(FlowStage::CapabilityProbe));
        assert!(outcome.permits.is_empty());
    }

    #[tokio::test]
    async fn test_denylisted_token_uses_permit2() {
        let reader = Arc::new(MockReader::default());
        native_capable(&reader, TOKEN, None);
        bitmap_word(&reader, 0, U256::ZERO);
        let chain = chain().with_permit_denylist(vec![TOKEN]);
        let authorizer = PermitAuthorizer::new(reader, SignerHandle::Local(test_signer()), chain);

        let batch = AuthorizationBatch::uniform(vec![leg(TOKEN, 1, 0)], PermitMode::Auto);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        assert_eq!(
            decode_packed(&outcome.permits[0]).unwrap().scheme(),
            PermitScheme::Permit2WitnessTransfer
        );
    }

    #[tokio::test]
    async fn test_native_currency_needs_no_signature() {
        let reader = Arc::new(MockReader::default());
        let wallet = Arc::new(MockWallet::new(test_signer()));
        let authorizer = wallet_authorizer(reader.clone(), wallet.clone());

        let batch = AuthorizationBatch::uniform(vec![leg(Address::ZERO, 1, 0)], PermitMode::Auto);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        assert_eq!(decode_packed(&outcome.permits[0]).unwrap(), PermitPayload::Default);
        assert_eq!(wallet.prompts(), 0);
        assert_eq!(reader.call_count(), 0);
    }

    #[tokio::test]
    async fn test_one_to_many_signs_once() {
        let reader = Arc::new(MockReader::default());
        bitmap_word(&reader, 0, U256::ZERO);
        let wallet = Arc::new(MockWallet::new(test_signer()));
        let authorizer = wallet_authorizer(reader, wallet.clone());

        let legs = vec![leg(TOKEN, 100, 0), leg(TOKEN, 200, 1), leg(TOKEN, 300, 2)];
        let batch = AuthorizationBatch::uniform(legs, PermitMode::Permit2);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(wallet.prompts(), 1);
        assert_eq!(outcome.permits.len(), 3);

        let PermitPayload::Permit2BatchWitness { permitted, .. } =
            decode_packed(&outcome.permits[0]).unwrap()
        else {
            panic!("expected batch witness transfer");
        };
        let total = permitted.iter().fold(U256::ZERO, |acc, p| acc + p.amount);
        assert_eq!(total, U256::from(600));
        assert_eq!(decode_packed(&outcome.permits[1]).unwrap(), PermitPayload::Default);
        assert_eq!(decode_packed(&outcome.permits[2]).unwrap(), PermitPayload::Default);
    }

    #[tokio::test]
    async fn test_multi_token_batch_derives_nonces_without_extra_reads() {
        let reader = Arc::new(MockReader::default());
        bitmap_word(&reader, 0, U256::MAX);
        bitmap_word(&reader, 1, U256::ZERO);
        let wallet = Arc::new(MockWallet::new(test_signer()));
        let authorizer = wallet_authorizer(reader.clone(), wallet.clone());

        let legs = vec![leg(TOKEN, 1, 0), leg(OTHER, 2, 1), leg(TOKEN, 3, 2)];
        let batch = AuthorizationBatch::uniform(legs, PermitMode::Permit2);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(wallet.prompts(), 3);
        assert_eq!(reader.call_count(), 2);

        let nonces: Vec<U256> = outcome
            .permits
            .iter()
            .map(|p| match decode_packed(p).unwrap() {
                PermitPayload::Permit2Witness { nonce, .. } => nonce,
                other => panic!("unexpected payload {other:?}"),
            })
            .collect();
        assert_eq!(nonces, vec![U256::from(256), U256::from(257), U256::from(258)]);
    }

    #[tokio::test]
    async fn test_nonce_failure_returns_partial_results() {
        let reader = Arc::new(MockReader::default());
        let wallet = Arc::new(MockWallet::new(test_signer()));
        let authorizer = wallet_authorizer(reader, wallet.clone());

        // no bitmap configured: the nonce read reverts before the wallet is asked
        let legs = vec![leg(Address::ZERO, 1, 0), leg(TOKEN, 2, 1), leg(OTHER, 3, 2)];
        let batch = AuthorizationBatch::uniform(legs, PermitMode::Permit2);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        assert_eq!(outcome.status, PermitStatus::Error);
        assert_eq!(outcome.stage, Some(FlowStage::NonceResolution));
        assert_eq!(outcome.code, 1002);
        assert_eq!(outcome.permits.len(), 1);
        assert_eq!(wallet.prompts(), 0);
    }

    #[tokio::test]
    async fn test_user_rejection_status() {
        let reader = Arc::new(MockReader::default());
        bitmap_word(&reader, 0, U256::ZERO);
        let wallet = Arc::new(MockWallet::rejecting(test_signer()));
        let authorizer = wallet_authorizer(reader, wallet.clone());

        let legs = vec![leg(Address::ZERO, 1, 0), leg(TOKEN, 2, 1), leg(OTHER, 3, 2)];
        let batch = AuthorizationBatch::uniform(legs, PermitMode::Permit2);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        assert_eq!(outcome.status, PermitStatus::Rejected);
        assert_eq!(outcome.code, 4001);
        assert_eq!(outcome.stage, Some(FlowStage::Signing));
        assert_eq!(outcome.permits.len(), 1);
        assert_eq!(wallet.prompts(), 1);
    }

    #[tokio::test]
    async fn test_domain_read_failure_is_chain_read() {
        let reader = Arc::new(MockReader::default());
        native_capable(&reader, TOKEN, None);
        reader.fail(
            TOKEN,
            &IERC20Permit::nameCall {},
            ReadError::Transport("connection reset".into()),
        );
        let authorizer = PermitAuthorizer::new(reader, SignerHandle::Local(test_signer()), chain());

        let batch = AuthorizationBatch::uniform(vec![leg(TOKEN, 1, 0)], PermitMode::Auto);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        assert_eq!(outcome.code, 1005);
        assert_eq!(outcome.stage, Some(FlowStage::CapabilityProbe));
    }

    #[tokio::test]
    async fn test_permit2_allowance_mode() {
        let reader = Arc::new(MockReader::default());
        reader.respond(
            chain().permit2_address,
            &IPermit2::allowanceCall {
                owner: owner(),
                token: TOKEN,
                spender: SPENDER,
            },
            (U160::ZERO, U48::ZERO, U48::from(4)).abi_encode_params(),
        );
        let authorizer = PermitAuthorizer::new(reader, SignerHandle::Local(test_signer()), chain());

        let batch = AuthorizationBatch::uniform(vec![leg(TOKEN, 1000, 0)], PermitMode::Permit2Allowance);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        let PermitPayload::Permit2Single {
            amount,
            nonce,
            expiration,
            ..
        } = decode_packed(&outcome.permits[0]).unwrap()
        else {
            panic!("expected permit single");
        };
        assert_eq!(amount, U160::from(1000));
        assert_eq!(nonce, U48::from(4));
        assert!(expiration > U48::from(UnixTimestamp::now().as_secs()));
    }

    #[tokio::test]
    async fn test_allowance_amount_overflow_is_packing_error() {
        let reader = Arc::new(MockReader::default());
        let authorizer = PermitAuthorizer::new(reader, SignerHandle::Local(test_signer()), chain());

        let mut request = leg(TOKEN, 0, 0);
        request.amount = U256::MAX;
        let batch = AuthorizationBatch::uniform(vec![request], PermitMode::Permit2Allowance);
        let outcome = authorizer.authorize(&batch).await.unwrap();
        assert_eq!(outcome.code, 1004);
        assert_eq!(outcome.stage, Some(FlowStage::Packing));
    }

    #[tokio::test]
    async fn test_malformed_batches_are_rejected_up_front() {
        let reader = Arc::new(MockReader::default());
        let authorizer = PermitAuthorizer::new(reader.clone(), SignerHandle::Local(test_signer()), chain());

        let mut batch = AuthorizationBatch::uniform(vec![leg(TOKEN, 1, 0), leg(OTHER, 1, 1)], PermitMode::Auto);
        batch.modes.pop();
        assert_eq!(
            authorizer.authorize(&batch).await.unwrap_err(),
            InvariantViolation::LengthMismatch {
                tokens: 2,
                selectors: 1
            }
        );

        let batch = AuthorizationBatch::uniform(vec![leg(TOKEN, 1, 1)], PermitMode::Auto);
        assert!(matches!(
            authorizer.authorize(&batch).await.unwrap_err(),
            InvariantViolation::PositionMismatch { .. }
        ));

        let mut request = leg(TOKEN, 1, 0);
        request.chain_id = 8453;
        let batch = AuthorizationBatch::uniform(vec![request], PermitMode::Auto);
        assert!(matches!(
            authorizer.authorize(&batch).await.unwrap_err(),
            InvariantViolation::ChainMismatch { .. }
        ));
        assert_eq!(reader.call_count(), 0);
    }

    #[test]
    fn test_tokens_requiring_signature() {
        let legs = vec![leg(TOKEN, 1, 0), leg(TOKEN, 2, 1)];
        assert_eq!(tokens_requiring_signature(&legs, Address::ZERO), vec![TOKEN]);

        let legs = vec![leg(Address::ZERO, 1, 0), leg(OTHER, 2, 1)];
        assert_eq!(tokens_requiring_signature(&legs, Address::ZERO), vec![OTHER]);
    }
}
