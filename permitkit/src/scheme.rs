//! Authorization schemes and caller-selectable modes.
//!
//! A [`PermitScheme`] is what actually gets signed and packed for one token.
//! A [`PermitMode`] is what the caller asks for; the orchestrator turns a mode
//! into exactly one scheme per token after probing the token and the chain.
//!
//! The numeric [`PermitScheme::tag`] is the first field of every packed
//! payload and is decoded on-chain before anything else. Changing a tag is a
//! breaking protocol change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of authorization schemes a token can be covered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermitScheme {
    /// EIP-2612 `permit` signed against the token's own domain.
    NativePermit,
    /// Permit2 `PermitSingle` allowance approval.
    Permit2Single,
    /// Permit2 `PermitWitnessTransferFrom` for a single token.
    Permit2WitnessTransfer,
    /// Permit2 `PermitBatchWitnessTransferFrom` covering several legs.
    Permit2BatchWitnessTransfer,
    /// No signature needed: native currency, or a leg already covered by an
    /// earlier batch signature.
    DefaultPermit,
}

impl PermitScheme {
    /// All schemes in tag order.
    pub const ALL: [Self; 5] = [
        Self::NativePermit,
        Self::Permit2Single,
        Self::Permit2WitnessTransfer,
        Self::Permit2BatchWitnessTransfer,
        Self::DefaultPermit,
    ];

    /// Returns the on-chain discriminant for this scheme.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::NativePermit => 0,
            Self::Permit2Single => 1,
            Self::Permit2WitnessTransfer => 2,
            Self::Permit2BatchWitnessTransfer => 3,
            Self::DefaultPermit => 4,
        }
    }

    /// Looks a scheme up by its on-chain discriminant.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::NativePermit),
            1 => Some(Self::Permit2Single),
            2 => Some(Self::Permit2WitnessTransfer),
            3 => Some(Self::Permit2BatchWitnessTransfer),
            4 => Some(Self::DefaultPermit),
            _ => None,
        }
    }

    /// Returns `true` if the scheme requires a wallet signature.
    #[must_use]
    pub const fn requires_signature(self) -> bool {
        !matches!(self, Self::DefaultPermit)
    }
}

impl fmt::Display for PermitScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NativePermit => "native-permit",
            Self::Permit2Single => "permit2-single",
            Self::Permit2WitnessTransfer => "permit2-witness-transfer",
            Self::Permit2BatchWitnessTransfer => "permit2-batch-witness-transfer",
            Self::DefaultPermit => "default-permit",
        };
        f.write_str(s)
    }
}

/// The authorization mode requested by the caller for one token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermitMode {
    /// Use EIP-2612 when the token supports it, Permit2 witness transfer otherwise.
    #[default]
    Auto,
    /// Require EIP-2612; fail if the token does not support it.
    NativePermit,
    /// Always use a Permit2 witness transfer (batched for one-to-many swaps).
    Permit2,
    /// Use a Permit2 `PermitSingle` allowance approval.
    Permit2Allowance,
}

impl FromStr for PermitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "nativePermit" | "native-permit" => Ok(Self::NativePermit),
            "permit2" => Ok(Self::Permit2),
            "permit2Allowance" | "permit2-allowance" => Ok(Self::Permit2Allowance),
            other => Err(format!("unknown permit mode '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(PermitScheme::NativePermit.tag(), 0);
        assert_eq!(PermitScheme::Permit2Single.tag(), 1);
        assert_eq!(PermitScheme::Permit2WitnessTransfer.tag(), 2);
        assert_eq!(PermitScheme::Permit2BatchWitnessTransfer.tag(), 3);
        assert_eq!(PermitScheme::DefaultPermit.tag(), 4);
    }

    #[test]
    fn test_from_tag_inverts_tag() {
        for scheme in PermitScheme::ALL {
            assert_eq!(PermitScheme::from_tag(scheme.tag()), Some(scheme));
        }
        assert_eq!(PermitScheme::from_tag(5), None);
    }

    #[test]
    fn test_only_default_skips_signature() {
        let unsigned: Vec<_> = PermitScheme::ALL
            .into_iter()
            .filter(|s| !s.requires_signature())
            .collect();
        assert_eq!(unsigned, vec![PermitScheme::DefaultPermit]);
    }

    #[test]
    fn test_mode_parses_both_spellings() {
        assert_eq!("auto".parse::<PermitMode>(), Ok(PermitMode::Auto));
        assert_eq!(
            "native-permit".parse::<PermitMode>(),
            Ok(PermitMode::NativePermit)
        );
        assert_eq!(
            "permit2Allowance".parse::<PermitMode>(),
            Ok(PermitMode::Permit2Allowance)
        );
        assert!("eip3009".parse::<PermitMode>().is_err());
    }

    #[test]
    fn test_mode_serde_camel_case() {
        let json = serde_json::to_string(&PermitMode::NativePermit).unwrap();
        assert_eq!(json, "\"nativePermit\"");
    }
}
