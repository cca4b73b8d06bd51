#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP plumbing shared by permitkit integrations.
//!
//! Quote, route and swap-data backends are reached through JSON APIs. This
//! crate keeps one [`ApiClient`] per base URL inside an explicitly
//! constructed [`ClientRegistry`], and every client sends its requests
//! through a [`RetryMiddleware`] that retries transient failures a fixed
//! number of times with a fixed delay.
//!
//! # Example
//!
//! ```rust,no_run
//! use permitkit_http::{ClientRegistry, RetryPolicy};
//!
//! # async fn example() -> Result<(), permitkit_http::HttpError> {
//! let registry = ClientRegistry::new(RetryPolicy::default());
//! let api = registry.client("https://api.example.com")?;
//! let status: serde_json::Value = api.get_json("health").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for requests and retries

pub mod client;
pub mod registry;
pub mod retry;

pub use client::{ApiClient, HttpError};
pub use registry::ClientRegistry;
pub use retry::{RetryMiddleware, RetryPolicy};
