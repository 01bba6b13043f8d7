#![deny(unsafe_code)]

//! Shared test utilities for the yggctl workspace.
//!
//! Provides a scripted fake admin daemon, config builders, a fake process
//! table, and tracing helpers so that individual crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! yggctl-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod process;
pub mod tracing_setup;
