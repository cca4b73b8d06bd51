//! Wire encoding of signed permits.
//!
//! Every packed permit is `abi.encode(uint8 schemeTag, bytes innerPayload)`.
//! The spender contract decodes the tag first and branches on it, so the tag
//! values and the field order of each inner payload are a protocol contract:
//!
//! | tag | scheme | inner payload |
//! |-----|--------|---------------|
//! | 0 | native permit | `(address owner, address spender, uint256 value, uint256 deadline, uint8 v, bytes32 r, bytes32 s)` |
//! | 1 | Permit2 allowance | `(uint160 amount, uint48 nonce, uint48 expiration, uint256 sigDeadline, bytes signature)` |
//! | 2 | Permit2 witness transfer | `(uint256 nonce, uint256 sigDeadline, bytes signature)` |
//! | 3 | Permit2 batch witness transfer | `((address token, uint256 amount)[] permitted, uint256 nonce, uint256 sigDeadline, bytes signature)` |
//! | 4 | no signature needed | empty |

use alloy_primitives::aliases::{U48, U160};
use alloy_primitives::{Address, B256, Bytes, Signature, U256};
use alloy_sol_types::{SolType, SolValue};
use permitkit::scheme::PermitScheme;

use crate::contract::{
    NativePermitData, PackedPermit, Permit2BatchWitnessData, Permit2SingleData,
    Permit2WitnessData, TokenPermissions,
};

/// Errors raised while decoding packed permit data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackError {
    /// The envelope or inner payload is not valid ABI for its tag.
    #[error("malformed packed permit: {0}")]
    Malformed(String),
    /// The tag does not name a known scheme.
    #[error("unknown scheme tag {0}")]
    UnknownTag(u8),
}

impl From<alloy_sol_types::Error> for PackError {
    fn from(e: alloy_sol_types::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// A signed, scheme-specific permit ready to be packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermitPayload {
    /// EIP-2612 permit split into `(v, r, s)`.
    Native {
        /// Token owner.
        owner: Address,
        /// Approved spender.
        spender: Address,
        /// Approved value.
        value: U256,
        /// Permit deadline.
        deadline: U256,
        /// Recovery id, 27 or 28.
        v: u8,
        /// Signature `r`.
        r: B256,
        /// Signature `s`.
        s: B256,
    },
    /// Permit2 `PermitSingle` allowance.
    Permit2Single {
        /// Allowance amount.
        amount: U160,
        /// Allowance nonce.
        nonce: U48,
        /// Allowance expiration.
        expiration: U48,
        /// Signature deadline.
        sig_deadline: U256,
        /// Owner signature.
        signature: Bytes,
    },
    /// Permit2 single-token witness transfer.
    Permit2Witness {
        /// Permit2 nonce.
        nonce: U256,
        /// Signature deadline.
        sig_deadline: U256,
        /// Owner signature.
        signature: Bytes,
    },
    /// Permit2 multi-token witness transfer.
    Permit2BatchWitness {
        /// Tokens and amounts covered by the signature.
        permitted: Vec<TokenPermissions>,
        /// Permit2 nonce.
        nonce: U256,
        /// Signature deadline.
        sig_deadline: U256,
        /// Owner signature.
        signature: Bytes,
    },
    /// Nothing to sign.
    Default,
}

impl PermitPayload {
    /// Builds a native permit payload from a signature.
    #[must_use]
    pub fn native(
        owner: Address,
        spender: Address,
        value: U256,
        deadline: U256,
        signature: &Signature,
    ) -> Self {
        Self::Native {
            owner,
            spender,
            value,
            deadline,
            v: 27 + u8::from(signature.v()),
            r: B256::from(signature.r().to_be_bytes::<32>()),
            s: B256::from(signature.s().to_be_bytes::<32>()),
        }
    }

    /// Returns the scheme this payload encodes.
    #[must_use]
    pub const fn scheme(&self) -> PermitScheme {
        match self {
            Self::Native { .. } => PermitScheme::NativePermit,
            Self::Permit2Single { .. } => PermitScheme::Permit2Single,
            Self::Permit2Witness { .. } => PermitScheme::Permit2WitnessTransfer,
            Self::Permit2BatchWitness { .. } => PermitScheme::Permit2BatchWitnessTransfer,
            Self::Default => PermitScheme::DefaultPermit,
        }
    }
}

/// Packs a payload into `abi.encode(uint8 tag, bytes inner)`.
#[must_use]
pub fn pack(payload: &PermitPayload) -> Bytes {
    let inner = match payload.clone() {
        PermitPayload::Native {
            owner,
            spender,
            value,
            deadline,
            v,
            r,
            s,
        } => NativePermitData {
            owner,
            spender,
            value,
            deadline,
            v,
            r,
            s,
        }
        .abi_encode_params(),
        PermitPayload::Permit2Single {
            amount,
            nonce,
            expiration,
            sig_deadline,
            signature,
        } => Permit2SingleData {
            amount,
            nonce,
            expiration,
            sigDeadline: sig_deadline,
            signature,
        }
        .abi_encode_params(),
        PermitPayload::Permit2Witness {
            nonce,
            sig_deadline,
            signature,
        } => Permit2WitnessData {
            nonce,
            sigDeadline: sig_deadline,
            signature,
        }
        .abi_encode_params(),
        PermitPayload::Permit2BatchWitness {
            permitted,
            nonce,
            sig_deadline,
            signature,
        } => Permit2BatchWitnessData {
            permitted,
            nonce,
            sigDeadline: sig_deadline,
            signature,
        }
        .abi_encode_params(),
        PermitPayload::Default => Vec::new(),
    };
    PackedPermit {
        tag: payload.scheme().tag(),
        data: inner.into(),
    }
    .abi_encode_params()
    .into()
}

/// Decodes packed permit data back into its payload.
///
/// # Errors
///
/// Returns [`PackError`] if the tag is unknown or the bytes do not match the
/// tag's layout.
pub fn decode_packed(packed: &[u8]) -> Result<PermitPayload, PackError> {
    let envelope = <PackedPermit as SolType>::abi_decode_params(packed)?;
    let scheme = PermitScheme::from_tag(envelope.tag).ok_or(PackError::UnknownTag(envelope.tag))?;
    let data = envelope.data.as_ref();
    let payload = match scheme {
        PermitScheme::NativePermit => {
            let d = <NativePermitData as SolType>::abi_decode_params(data)?;
            PermitPayload::Native {
                owner: d.owner,
                spender: d.spender,
                value: d.value,
                deadline: d.deadline,
                v: d.v,
                r: d.r,
                s: d.s,
            }
        }
        PermitScheme::Permit2Single => {
            let d = <Permit2SingleData as SolType>::abi_decode_params(data)?;
            PermitPayload::Permit2Single {
                amount: d.amount,
                nonce: d.nonce,
                expiration: d.expiration,
                sig_deadline: d.sigDeadline,
                signature: d.signature,
            }
        }
        PermitScheme::Permit2WitnessTransfer => {
            let d = <Permit2WitnessData as SolType>::abi_decode_params(data)?;
            PermitPayload::Permit2Witness {
                nonce: d.nonce,
                sig_deadline: d.sigDeadline,
                signature: d.signature,
            }
        }
        PermitScheme::Permit2BatchWitnessTransfer => {
            let d = <Permit2BatchWitnessData as SolType>::abi_decode_params(data)?;
            PermitPayload::Permit2BatchWitness {
                permitted: d.permitted,
                nonce: d.nonce,
                sig_deadline: d.sigDeadline,
                signature: d.signature,
            }
        }
        PermitScheme::DefaultPermit => {
            if !data.is_empty() {
                return Err(PackError::Malformed(format!(
                    "default permit carries {} bytes",
                    data.len()
                )));
            }
            PermitPayload::Default
        }
    };
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, hex};

    fn signature() -> Bytes {
        Bytes::from(vec![0xab; 65])
    }

    fn samples() -> Vec<PermitPayload> {
        vec![
            PermitPayload::Native {
                owner: address!("0x1111111111111111111111111111111111111111"),
                spender: address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                value: U256::MAX,
                deadline: U256::from(1_700_001_800u64),
                v: 28,
                r: B256::repeat_byte(0x11),
                s: B256::repeat_byte(0x22),
            },
            PermitPayload::Permit2Single {
                amount: U160::MAX,
                nonce: U48::MAX,
                expiration: U48::from(1_702_592_000u64),
                sig_deadline: U256::ZERO,
                signature: signature(),
            },
            PermitPayload::Permit2Witness {
                nonce: U256::MAX,
                sig_deadline: U256::from(1),
                signature: signature(),
            },
            PermitPayload::Permit2BatchWitness {
                permitted: vec![
                    TokenPermissions {
                        token: address!("0x00000000000000000000000000000000000000a1"),
                        amount: U256::from(100),
                    },
                    TokenPermissions {
                        token: address!("0x00000000000000000000000000000000000000a1"),
                        amount: U256::ZERO,
                    },
                ],
                nonce: U256::from(256),
                sig_deadline: U256::MAX,
                signature: signature(),
            },
            PermitPayload::Default,
        ]
    }

    fn addresses() -> Vec<Address> {
        vec![
            Address::ZERO,
            address!("0x1111111111111111111111111111111111111111"),
            Address::repeat_byte(0xff),
        ]
    }

    fn amounts() -> Vec<U256> {
        vec![U256::ZERO, U256::from(1), U256::from(1_000_000u64), U256::MAX]
    }

    fn signatures() -> Vec<Bytes> {
        (0u8..3)
            .map(|seed| Bytes::from((0..65).map(|i| seed.wrapping_mul(31).wrapping_add(i)).collect::<Vec<u8>>()))
            .collect()
    }

    /// Every scheme across combinations of addresses, amounts and signatures.
    fn variants() -> Vec<PermitPayload> {
        let mut out = samples();
        for (i, owner) in addresses().into_iter().enumerate() {
            for (j, amount) in amounts().into_iter().enumerate() {
                let signature = signatures()[(i + j) % 3].clone();
                let spender = addresses()[(i + 1) % 3];
                out.push(PermitPayload::Native {
                    owner,
                    spender,
                    value: amount,
                    deadline: amounts()[(j + 1) % 4],
                    v: 27 + u8::from(j % 2 == 1),
                    r: B256::from(amount.to_be_bytes::<32>()),
                    s: B256::left_padding_from(owner.as_slice()),
                });
                out.push(PermitPayload::Permit2Single {
                    amount: U160::saturating_from(amount),
                    nonce: U48::saturating_from(amount),
                    expiration: U48::from(j as u64),
                    sig_deadline: amount,
                    signature: signature.clone(),
                });
                out.push(PermitPayload::Permit2Witness {
                    nonce: amount,
                    sig_deadline: amounts()[(j + 2) % 4],
                    signature: signature.clone(),
                });
                out.push(PermitPayload::Permit2BatchWitness {
                    permitted: addresses()
                        .into_iter()
                        .take(i + 1)
                        .map(|token| TokenPermissions { token, amount })
                        .collect(),
                    nonce: amount,
                    sig_deadline: U256::MAX,
                    signature,
                });
            }
        }
        out
    }

    #[test]
    fn test_decode_recovers_every_scheme() {
        let payloads = variants();
        for scheme in PermitScheme::ALL {
            assert!(payloads.iter().any(|p| p.scheme() == scheme));
        }
        for payload in payloads {
            let packed = pack(&payload);
            let decoded = decode_packed(&packed).unwrap();
            assert_eq!(decoded.scheme(), payload.scheme());
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn test_tag_is_first_word() {
        for payload in samples() {
            let packed = pack(&payload);
            assert_eq!(packed[..31], [0u8; 31]);
            assert_eq!(packed[31], payload.scheme().tag());
            // offset of the dynamic `bytes` field
            assert_eq!(U256::from_be_slice(&packed[32..64]), U256::from(64));
        }
    }

    #[test]
    fn test_witness_layout() {
        let packed = pack(&PermitPayload::Permit2Witness {
            nonce: U256::from(1),
            sig_deadline: U256::from(2),
            signature: Bytes::from_static(&[0xff]),
        });
        let expected = hex!(
            "0000000000000000000000000000000000000000000000000000000000000002"
            "0000000000000000000000000000000000000000000000000000000000000040"
            "00000000000000000000000000000000000000000000000000000000000000a0"
            "0000000000000000000000000000000000000000000000000000000000000001"
            "0000000000000000000000000000000000000000000000000000000000000002"
            "0000000000000000000000000000000000000000000000000000000000000060"
            "0000000000000000000000000000000000000000000000000000000000000001"
            "ff00000000000000000000000000000000000000000000000000000000000000"
        );
        assert_eq!(packed.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_unknown_tag() {
        let packed = PackedPermit {
            tag: 9,
            data: Bytes::new(),
        }
        .abi_encode_params();
        assert_eq!(decode_packed(&packed), Err(PackError::UnknownTag(9)));
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let packed = pack(&samples()[0]);
        assert!(matches!(
            decode_packed(&packed[..packed.len() - 32]),
            Err(PackError::Malformed(_))
        ));
    }

    #[test]
    fn test_native_from_signature() {
        let sig = Signature::new(U256::from(1), U256::from(2), true);
        let payload = PermitPayload::native(Address::ZERO, Address::ZERO, U256::ZERO, U256::ZERO, &sig);
        let PermitPayload::Native { v, r, s, .. } = payload else {
            panic!("expected native payload");
        };
        assert_eq!(v, 28);
        assert_eq!(U256::from_be_bytes(r.0), U256::from(1));
        assert_eq!(U256::from_be_bytes(s.0), U256::from(2));
    }
}
