//! JSON-RPC client for the chatmail core server.
//!
//! [`transport::IoTransport`] owns the `deltachat-rpc-server` child process
//! and frames newline-delimited JSON-RPC 2.0 over its stdio. [`rpc::Rpc`] is
//! the typed facade over that link: one thin async wrapper per remote
//! procedure.

pub mod rpc;
pub mod transport;
pub mod types;

pub use rpc::Rpc;
pub use transport::{IoTransport, RpcTransport, ServerConfig, StderrMode};
