//! MXP-backed RPC transport: request/response envelopes plus server-streaming
//! framing over `mxp::Transport`'s connectionless, datagram-style socket.
//!
//! `mxp::Transport::receive` is a blocking, poll-style call (it returns
//! `WouldBlock` when idle); [`Endpoint::spawn`] drives it on a blocking
//! executor thread and bridges replies back to async callers by request id.

#![warn(missing_docs, clippy::pedantic)]

mod endpoint;
mod envelope;
mod error;

pub use endpoint::{Endpoint, RpcHandler, ServeOutcome};
pub use envelope::{Envelope, RpcRequest, RpcResponse, StreamFrame};
pub use error::{TransportError, TransportResult};
