//! quire-ai: streaming layer for the local CLI assistant
//!
//! This crate defines the chunk type every response is delivered as, parses
//! the assistant CLI's `stream-json` output into chunks, and spawns the CLI
//! process itself.

pub mod error;
pub mod probe;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use probe::CliStatus;
pub use stream::ChunkStream;
pub use types::*;
