use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Prefix applied to every error message produced while rejecting a file
/// edit, so a tool host can style-match these distinctively (§7).
pub const WRITE_DENIED_PREFIX: &str = "[WRITE DENIED] ";

/// Sentinel exit codes surfaced by the runtime that are distinct from any
/// natural 0-255 shell exit status (§3, §6).
pub const EXIT_CODE_ABORTED: i32 = -1000;
pub const EXIT_CODE_TIMEOUT: i32 = -1001;

/// Errors raised by a [`crate::runtime::Runtime`] implementation.
///
/// These are the only errors that cross a tool's public boundary as a Rust
/// `Err`. Everything else — policy rejections, overflow, non-zero exit,
/// timeouts, aborts — is reported as data inside a tool's own
/// success/failure result type; tools never throw across the boundary
/// (§7).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("ssh session error: {0}")]
    Ssh(String),

    #[error("remote command channel closed before the exit status was available")]
    ChannelClosed,

    #[error("path `{0}` could not be resolved by this runtime")]
    InvalidPath(String),
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Top-level crate error. Only returned when a tool cannot even produce a
/// well-formed success/failure result (e.g. a JSON encoding bug in the tool
/// host, or a `todos.json` write racing a concurrent writer in a way that
/// corrupts the file). Ordinary policy rejections and execution failures
/// are reported as data, not as `CoreError`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
