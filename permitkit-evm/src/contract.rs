//! Solidity interface and struct definitions.
//!
//! Contains the minimal ABI surface needed to negotiate permits:
//! - [`IERC20Permit`] - EIP-2612 subset used for capability probing and domain reads
//! - [`IPermit2`] - Permit2 nonce bitmap and allowance views
//! - [`INonceProxy`] - sequential nonce proxy used on some deployments
//! - EIP-712 message structs signed by the owner
//! - Wire structs making up the packed permit payload

use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};

sol! {
    /// EIP-2612 token surface.
    ///
    /// Reference: <https://eips.ethereum.org/EIPS/eip-2612>
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IERC20Permit {
        function DOMAIN_SEPARATOR() external view returns (bytes32);
        function nonces(address owner) external view returns (uint256);
        function version() external view returns (string);
        function name() external view returns (string);
    }
}

sol! {
    /// Uniswap Permit2 read surface.
    ///
    /// Reference: <https://github.com/Uniswap/permit2/blob/main/src/interfaces/IPermit2.sol>
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IPermit2 {
        function nonceBitmap(address owner, uint256 wordPos) external view returns (uint256);
        function allowance(address owner, address token, address spender)
            external
            view
            returns (uint160 amount, uint48 expiration, uint48 nonce);
    }
}

sol! {
    /// Nonce proxy returning the next sequential Permit2 nonce for an owner.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface INonceProxy {
        function nextNonce(address owner) external view returns (uint256);
    }
}

sol!(
    /// EIP-2612 `Permit` message, signed against the token's own domain.
    #[derive(Debug, Serialize, Deserialize)]
    struct Permit {
        address owner;
        address spender;
        uint256 value;
        uint256 nonce;
        uint256 deadline;
    }

    /// Permit2 token permissions (signature transfer).
    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct TokenPermissions {
        address token;
        uint256 amount;
    }

    /// Permit2 allowance details.
    #[derive(Debug, Serialize, Deserialize)]
    struct PermitDetails {
        address token;
        uint160 amount;
        uint48 expiration;
        uint48 nonce;
    }

    /// Permit2 `PermitSingle` allowance approval.
    #[derive(Debug, Serialize, Deserialize)]
    struct PermitSingle {
        PermitDetails details;
        address spender;
        uint256 sigDeadline;
    }

    /// Outer envelope: `abi.encode(uint8 schemeTag, bytes innerPayload)`.
    #[derive(Debug, PartialEq, Eq)]
    struct PackedPermit {
        uint8 tag;
        bytes data;
    }

    /// Inner payload for tag 0.
    #[derive(Debug, PartialEq, Eq)]
    struct NativePermitData {
        address owner;
        address spender;
        uint256 value;
        uint256 deadline;
        uint8 v;
        bytes32 r;
        bytes32 s;
    }

    /// Inner payload for tag 1.
    #[derive(Debug, PartialEq, Eq)]
    struct Permit2SingleData {
        uint160 amount;
        uint48 nonce;
        uint48 expiration;
        uint256 sigDeadline;
        bytes signature;
    }

    /// Inner payload for tag 2.
    #[derive(Debug, PartialEq, Eq)]
    struct Permit2WitnessData {
        uint256 nonce;
        uint256 sigDeadline;
        bytes signature;
    }

    /// Inner payload for tag 3.
    #[derive(Debug, PartialEq, Eq)]
    struct Permit2BatchWitnessData {
        TokenPermissions[] permitted;
        uint256 nonce;
        uint256 sigDeadline;
        bytes signature;
    }
);
