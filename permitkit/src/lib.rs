#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for Permit and Permit2 token authorization flows.
//!
//! This crate holds the chain-agnostic vocabulary shared by the rest of the
//! workspace: the closed set of authorization schemes and their wire tags,
//! the per-token authorization request, the error taxonomy with its stable
//! numeric codes, batch outcomes, and SDK configuration.
//!
//! The signing engine itself (capability probing, nonce resolution, EIP-712
//! construction, wallet signing and packing) lives in `permitkit-evm`.
//!
//! # Modules
//!
//! - [`config`] - SDK and per-chain configuration loaded from TOML
//! - [`error`] - Error taxonomy, status/code pairs and flow stages
//! - [`outcome`] - Batch results with partial permit data
//! - [`request`] - Per-token authorization requests
//! - [`scheme`] - Authorization schemes, wire tags and caller modes
//! - [`timestamp`] - Unix timestamps for deadlines and expirations
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod config;
pub mod error;
pub mod outcome;
pub mod request;
pub mod scheme;
pub mod timestamp;
