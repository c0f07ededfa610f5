//! Error types for segue
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use crate::engine::ListenerProtocol;
use thiserror::Error;

/// Main error type for segue
#[derive(Error, Debug)]
pub enum Error {
    /// Playlist or controller configuration is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// A playlist item references a shared listener that was never pre-created
    ///
    /// Listener-mode SRT and RTMP items bind to listener nodes created at
    /// controller construction; hitting this at runtime means construction
    /// skipped a port the playlist needs.
    #[error("No shared {protocol} listener on port {port}")]
    NoListener {
        protocol: ListenerProtocol,
        port: u16,
    },

    /// The engine rejected creation of an input node
    #[error("Input node creation failed: {0}")]
    Factory(String),

    /// Any other engine-side failure (switcher, silence chain, overrides)
    #[error("Engine error: {0}")]
    Engine(String),

    /// Controller driven into an operation its state cannot honour
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Convenience Result type using segue Error
pub type Result<T> = std::result::Result<T, Error>;
