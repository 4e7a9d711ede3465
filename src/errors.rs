//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure in the session record store.
    Store(String),
    /// The agent binary could not be launched.
    Spawn(String),
    /// One-shot call exceeded its wall-clock deadline; the subprocess was killed.
    Timeout {
        /// Seconds elapsed when the deadline fired.
        elapsed_secs: u64,
    },
    /// No stdout bytes arrived within the idle window; the subprocess was killed.
    IdleTimeout {
        /// Configured idle window in seconds.
        idle_secs: u64,
    },
    /// Subprocess exited with a non-zero status.
    NonZeroExit {
        /// Reported exit code.
        code: i32,
        /// Tail of captured stderr, capped at [`crate::engine::stream::STDERR_TAIL_BYTES`].
        stderr_tail: String,
    },
    /// Subprocess exited cleanly but produced no usable output.
    EmptyOutput,
    /// Wire-protocol failure that is not recoverable by skipping a line.
    Protocol(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Store(msg) => write!(f, "store: {msg}"),
            Self::Spawn(msg) => {
                write!(f, "spawn: {msg} (is the agent CLI installed and on PATH?)")
            }
            Self::Timeout { elapsed_secs } => {
                write!(f, "timeout: subprocess killed after {elapsed_secs}s")
            }
            Self::IdleTimeout { idle_secs } => {
                write!(
                    f,
                    "idle timeout: no output for {idle_secs}s, subprocess killed"
                )
            }
            Self::NonZeroExit { code, stderr_tail } => {
                write!(f, "subprocess exited with code {code}: {stderr_tail}")
            }
            Self::EmptyOutput => write!(f, "subprocess exited cleanly but produced no output"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
