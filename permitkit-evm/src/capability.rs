//! EIP-2612 capability probing.
//!
//! The probe is structural: a token that answers `DOMAIN_SEPARATOR()` and
//! `nonces(address)` is treated as permit-capable. The optional `version()`
//! answer becomes the domain version. Any rejected read on the first two calls
//! yields `false`; there are no retries at this layer.

use alloy_primitives::Address;
use futures_util::future::join3;
use permitkit::config::ChainConfig;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::chain::{ChainReader, read};
use crate::contract::IERC20Permit;

/// Domain version used when a token does not expose `version()`.
pub const DEFAULT_DOMAIN_VERSION: &str = "1";

/// Result of probing a token for EIP-2612 support.
///
/// Lives only for the duration of one authorization flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capability {
    /// Whether the token implements the EIP-2612 surface.
    pub supports_native_permit: bool,
    /// Value returned by `version()`, if any.
    pub domain_version: Option<String>,
}

impl Capability {
    /// Returns the domain version to sign with, defaulting to `"1"`.
    #[must_use]
    pub fn version_or_default(&self) -> &str {
        self.domain_version
            .as_deref()
            .unwrap_or(DEFAULT_DOMAIN_VERSION)
    }
}

/// Probes tokens on one chain.
#[derive(Debug)]
pub struct CapabilityProber<'a, R: ?Sized> {
    reader: &'a R,
    chain: &'a ChainConfig,
}

impl<'a, R: ChainReader + ?Sized> CapabilityProber<'a, R> {
    /// Creates a prober over `reader`, skipping tokens the chain's permit
    /// denylist disables.
    pub const fn new(reader: &'a R, chain: &'a ChainConfig) -> Self {
        Self { reader, chain }
    }

    /// Probes `token` for EIP-2612 support.
    ///
    /// Tokens on the denylist short-circuit to "unsupported" without any
    /// network call. Otherwise the three reads run concurrently.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, fields(token = %token)))]
    pub async fn probe(&self, token: Address) -> Capability {
        if self.chain.is_permit_disabled(token) {
            #[cfg(feature = "telemetry")]
            tracing::debug!("token is on the permit denylist");
            return Capability::default();
        }

        let domain_call = IERC20Permit::DOMAIN_SEPARATORCall {};
        let nonces_call = IERC20Permit::noncesCall {
            owner: Address::ZERO,
        };
        let version_call = IERC20Permit::versionCall {};
        let (domain, nonces, version) = traced!(
            join3(
                read(self.reader, token, &domain_call, None),
                read(self.reader, token, &nonces_call, None),
                read(self.reader, token, &version_call, None),
            ),
            tracing::info_span!("probe_eip2612", otel.kind = "client")
        );

        let supports_native_permit = domain.is_ok() && nonces.is_ok();
        #[cfg(feature = "telemetry")]
        tracing::debug!(supports_native_permit, version = ?version.as_ref().ok(), "probed token");
        Capability {
            supports_native_permit,
            domain_version: version.ok(),
        }
    }
}
