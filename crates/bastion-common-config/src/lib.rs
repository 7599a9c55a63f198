//! Configuration types for Bastion.
//!
//! This crate provides the configuration used by the audit pipeline,
//! the audit storage backends and logging. Configuration is read from
//! `bastion.yaml` and can be overridden with `BASTION_*` environment
//! variables.

pub mod env;
pub mod loader;
pub mod types;

pub use env::*;
pub use loader::*;
pub use types::*;
