//! SDK configuration.
//!
//! Loads per-chain settings from a TOML file with support for environment
//! variable expansion in string values. Variables use `$VAR` or `${VAR}`
//! syntax; unresolved variables are left untouched.
//!
//! # Example Configuration
//!
//! ```toml
//! [[chains]]
//! chain_id = 8453
//! rpc = [{ url = "https://mainnet.base.org", rate_limit = 25 }]
//! permit_denylist = ["0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"]
//!
//! [[chains]]
//! chain_id = 324
//! rpc = [{ url = "https://mainnet.era.zksync.io" }]
//! permit2_address = "0x0000000000225e31D15943971F47aD3022F714Fa"
//! nonce_source = { kind = "proxy", address = "$ZKSYNC_NONCE_PROXY" }
//! ```
//!
//! # Environment Variables
//!
//! - `PERMITKIT_CONFIG` - Path to the configuration file (default: `permitkit.toml`)
//! - Any `$VAR` referenced from the file

use std::path::Path;

use alloy_primitives::{Address, address};
use serde::{Deserialize, Serialize};

/// Canonical Uniswap Permit2 deployment (same address on most EVM chains via CREATE2).
pub const CANONICAL_PERMIT2_ADDRESS: Address =
    address!("0x000000000022D473030F116dDEE9F6B43aC78BA3");

/// Default native-currency sentinel address.
pub const NATIVE_TOKEN_SENTINEL: Address = Address::ZERO;

/// Default signature deadline window: 30 minutes.
pub const DEFAULT_SIGNATURE_DEADLINE_SECS: u64 = 30 * 60;

/// Default Permit2 allowance expiration window: 30 days.
pub const DEFAULT_ALLOWANCE_EXPIRATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Default number of 256-bit nonce words scanned before giving up.
pub const DEFAULT_NONCE_SCAN_CEILING: u32 = 1000;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level SDK configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Per-chain configuration.
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

/// How Permit2 nonces are obtained on a chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NonceSource {
    /// Scan the Permit2 `nonceBitmap` for the first unused bit.
    #[default]
    Bitmap,
    /// Ask a nonce proxy contract for `nextNonce(owner)`.
    Proxy {
        /// Proxy contract address.
        address: Address,
    },
}

/// An RPC endpoint with an optional requests-per-second limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEndpoint {
    /// HTTP(S) endpoint URL.
    pub url: String,
    /// Maximum requests per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

/// Per-chain configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// EIP-155 chain ID.
    pub chain_id: u64,

    /// Read-only RPC endpoints, tried in fallback order.
    #[serde(default)]
    pub rpc: Vec<RpcEndpoint>,

    /// Permit2 contract used as the verifying contract.
    #[serde(default = "default_permit2_address")]
    pub permit2_address: Address,

    /// Where Permit2 nonces come from.
    #[serde(default)]
    pub nonce_source: NonceSource,

    /// Sentinel address standing for the chain's native currency.
    #[serde(default = "default_native_token")]
    pub native_token: Address,

    /// Tokens whose EIP-2612 implementation must not be used.
    #[serde(default)]
    pub permit_denylist: Vec<Address>,

    /// Seconds from now until a signature expires.
    #[serde(default = "default_signature_deadline_secs")]
    pub signature_deadline_secs: u64,

    /// Seconds from now until a Permit2 allowance expires.
    #[serde(default = "default_allowance_expiration_secs")]
    pub allowance_expiration_secs: u64,

    /// Maximum nonce words scanned before the bitmap scan gives up.
    #[serde(default = "default_nonce_scan_ceiling")]
    pub nonce_scan_ceiling: u32,
}

const fn default_permit2_address() -> Address {
    CANONICAL_PERMIT2_ADDRESS
}

const fn default_native_token() -> Address {
    NATIVE_TOKEN_SENTINEL
}

const fn default_signature_deadline_secs() -> u64 {
    DEFAULT_SIGNATURE_DEADLINE_SECS
}

const fn default_allowance_expiration_secs() -> u64 {
    DEFAULT_ALLOWANCE_EXPIRATION_SECS
}

const fn default_nonce_scan_ceiling() -> u32 {
    DEFAULT_NONCE_SCAN_CEILING
}

impl ChainConfig {
    /// Creates a configuration for `chain_id` with every other field defaulted.
    #[must_use]
    pub const fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            rpc: Vec::new(),
            permit2_address: CANONICAL_PERMIT2_ADDRESS,
            nonce_source: NonceSource::Bitmap,
            native_token: NATIVE_TOKEN_SENTINEL,
            permit_denylist: Vec::new(),
            signature_deadline_secs: DEFAULT_SIGNATURE_DEADLINE_SECS,
            allowance_expiration_secs: DEFAULT_ALLOWANCE_EXPIRATION_SECS,
            nonce_scan_ceiling: DEFAULT_NONCE_SCAN_CEILING,
        }
    }

    /// Sets the nonce source.
    #[must_use]
    pub const fn with_nonce_source(mut self, source: NonceSource) -> Self {
        self.nonce_source = source;
        self
    }

    /// Sets the permit denylist.
    #[must_use]
    pub fn with_permit_denylist(mut self, tokens: Vec<Address>) -> Self {
        self.permit_denylist = tokens;
        self
    }

    /// Returns `true` if the token's EIP-2612 support must be ignored.
    #[must_use]
    pub fn is_permit_disabled(&self, token: Address) -> bool {
        self.permit_denylist.contains(&token)
    }
}

impl SdkConfig {
    /// Loads configuration from the path given by the `PERMITKIT_CONFIG`
    /// environment variable, falling back to `permitkit.toml` in the current
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("PERMITKIT_CONFIG").unwrap_or_else(|_| "permitkit.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path. A missing file yields
    /// the default (empty) configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            #[cfg(feature = "telemetry")]
            tracing::debug!(path, "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from a TOML string after environment expansion.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        Ok(toml::from_str(&expanded)?)
    }

    /// Returns the configuration for a chain, if present.
    #[must_use]
    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }
}

/// Expands `$VAR` and `${VAR}` patterns from the process environment.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match std::env::var(&name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => {
                out.push('$');
                if braced {
                    out.push('{');
                }
                out.push_str(&name);
                if closed {
                    out.push('}');
                }
            }
        }
    }

    out
}
