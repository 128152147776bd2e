//! Error types for the engine.
//!
//! The set of error kinds is closed: every failure the engine can report
//! maps onto exactly one variant. Codec and queue errors are local (the
//! caller decides what to do, the engine keeps running); `InvalidConfig`
//! is the only fatal outcome and is raised once, at construction.

use thiserror::Error;

/// All failure conditions surfaced by the engine and its components.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A received byte buffer does not decode to a well-formed frame.
    #[error("malformed frame")]
    MalformedFrame,

    /// A caller-supplied output buffer is too small for the frame.
    #[error("buffer too small: needed {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    /// The local node id already appears in the frame's path.
    #[error("forwarding loop: own id present in path")]
    Loop,

    /// The frame's message id is already in the seen cache.
    #[error("duplicate message")]
    Duplicate,

    /// A bounded structure (forward queue, neighbor table, hop path) is full.
    #[error("capacity exhausted")]
    Overflow,

    /// A state transition outside the allowed graph was requested.
    #[error("invalid state transition")]
    InvalidTransition,

    /// Engine configuration failed validation at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The host's send callback reported a failure after all retries.
    #[error("send callback failed")]
    SendFailed,
}
