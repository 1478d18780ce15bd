//! Core domain types and traits for the shipit release pipeline.
//!
//! This crate contains:
//! - Error taxonomy with per-class exit codes
//! - Run identifiers and the redacting secret wrapper
//! - Version marker resolution
//! - Credential broker, release host, image publisher, and deployer seams
//! - Pipeline stages, run states, and outcomes

pub mod broker;
pub mod deploy;
pub mod error;
pub mod id;
pub mod image;
pub mod pipeline;
pub mod release;
pub mod secret;
pub mod version;

pub use error::{Error, Result};
pub use id::RunId;
