/// Error type shared across the workspace.
///
/// Adapter and helper crates map their failures into this type so callers can
/// handle transport, server and precondition failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `open()` was called on a transport that already owns a child process.
    #[error("transport is already started")]
    AlreadyStarted,

    /// A call was issued on a transport that was never opened.
    #[error("transport is not started")]
    NotStarted,

    /// `run()` was called on a bot whose event loop is still active.
    #[error("bot is already running")]
    AlreadyRunning,

    /// The call's scope was cancelled before a response arrived. The
    /// server-side work is not cancelled.
    #[error("call cancelled")]
    Cancelled,

    /// The stdio link to the core server broke: process exit, closed pipe or
    /// an unparseable frame.
    #[error("transport error: {0}")]
    Transport(String),

    /// Domain-specific failure reported by the core server through the
    /// JSON-RPC error channel.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
