//! Assistant providers
//!
//! The only provider is the local command-line assistant, driven as a child
//! process that prints `stream-json` lines.

pub mod cli;

pub use cli::{CliOptions, CliProvider};
