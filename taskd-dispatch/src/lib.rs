//! Command dispatch (C4): line-buffered streaming subprocess execution and
//! unix privilege drop.
//!
//! This crate knows nothing about agents, the registry, or the wire format;
//! it runs one shell command and reports its output, streamed or aggregated.

#![warn(missing_docs, clippy::pedantic)]

mod command;
mod error;
mod privilege;

pub use command::{run_streaming, run_to_completion, ChunkSink, CommandSpec, CompletedCommand};
pub use error::{DispatchError, DispatchResult};
