// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy shared by every subsystem.
//!
//! Mirrors the five-class taxonomy of configuration, resource,
//! transient data-path, fatal data-path, and timing errors: configuration
//! and resource errors are returned synchronously from `create`; transient
//! data-path errors are counted and dropped rather than propagated; fatal
//! errors mark the session unusable; timing errors are no-ops with a
//! specific kind.

/// Errors returned by `mtlrs` operations.
#[derive(Debug)]
pub enum Error {
    // ------------------------------------------------------------------
    // Configuration errors (reported synchronously from `create`)
    // ------------------------------------------------------------------
    /// Session configuration is internally inconsistent (zero frame size,
    /// unsupported codec, mismatched formats).
    InvalidConfig(String),
    /// Framebuffer count below the minimum of 2.
    InvalidFramebufferCount(usize),
    /// Session name exceeds 31 printable ASCII characters.
    InvalidSessionName(String),

    // ------------------------------------------------------------------
    // Resource errors (reported synchronously from `create`)
    // ------------------------------------------------------------------
    /// Allocation of the framebuffer array or a memory region failed.
    OutOfMemory,
    /// RDMA queue pair, completion queue, or memory region setup failed.
    ResourceError(String),

    // ------------------------------------------------------------------
    // Data-path errors (surfaced through call sites, not fatal)
    // ------------------------------------------------------------------
    /// `put_frame` called on a buffer not held in `IN_USER`.
    NotOwned,
    /// RFC 8331 parity or checksum verification failed for one ANC packet.
    ParityFailure,
    /// Operation unsupported in the session's current configuration
    /// (e.g. pacing query on a session without user-pacing).
    NotSupported,

    // ------------------------------------------------------------------
    // Fatal data-path errors
    // ------------------------------------------------------------------
    /// The transport has disconnected or entered an unusable state; the
    /// session is reclaimable only via `free`.
    Disconnected,
    /// A completion-queue entry reported a non-success vendor status.
    CompletionError(String),

    // ------------------------------------------------------------------
    // Timing errors (operation is a no-op)
    // ------------------------------------------------------------------
    /// Pacing requested on a session that was not created with user-pacing.
    PacingNotSupported,
    /// Requested TAI timestamp already elapsed by more than one frame
    /// interval; the frame is sent best-effort and marked late.
    TimestampInPast,

    /// Underlying I/O failure.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid session config: {msg}"),
            Error::InvalidFramebufferCount(n) => {
                write!(f, "framebuffer count {n} is below the minimum of 2")
            }
            Error::InvalidSessionName(name) => write!(f, "invalid session name: {name:?}"),
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::ResourceError(msg) => write!(f, "resource error: {msg}"),
            Error::NotOwned => write!(f, "caller does not hold this frame in IN_USER"),
            Error::ParityFailure => write!(f, "RFC 8331 parity or checksum verification failed"),
            Error::NotSupported => write!(f, "operation not supported by this session"),
            Error::Disconnected => write!(f, "transport disconnected"),
            Error::CompletionError(msg) => write!(f, "completion queue error: {msg}"),
            Error::PacingNotSupported => write!(f, "session was not created with user-pacing"),
            Error::TimestampInPast => write!(f, "requested timestamp already elapsed"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
