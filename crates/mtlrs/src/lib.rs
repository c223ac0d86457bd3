// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `mtlrs` is a user-space media-over-IP transport core implementing the
//! SMPTE ST 2110 suite: uncompressed video, compressed video, audio, and
//! ancillary data over managed IP networks.
//!
//! # Modules
//!
//! - [`session`] — the pipeline session manager: bounded framebuffer
//!   pools with blocking/non-blocking producer/consumer semantics.
//! - [`st40`] — ST 2110-40 ancillary data: RFC 8331 wire parsing, RTP
//!   reassembly, and raw/reserialized output.
//! - [`pacing`] — TAI/media-clock conversion, epoch snapping, and the
//!   pacing-parameter query.
//! - [`transport`] — wire transports: RDMA reliable-connection queue
//!   pairs (`rdma` feature) and a plain UDP/RTP listener.
//! - [`format`] — pixel/audio format tables and frame-size math.
//! - [`stats`] — per-session atomic counters and the process-wide registry.
//! - [`config`] — session configuration, flags, and tunable defaults.
//! - [`callbacks`] — swappable available/done/late/event notifications.
//!
//! Dependency order is leaves-first: shared primitives, then frame-info
//! and format tables, then the session manager, then the RX assembler and
//! pacing discipline, then the RDMA transport.

pub mod callbacks;
pub mod config;
pub mod error;
pub mod format;
pub mod frame_info;
pub mod pacing;
pub mod session;
pub mod st40;
pub mod stats;
pub mod transport;

pub use callbacks::Callbacks;
pub use config::{Direction, SessionConfig, SessionFlags, SessionKind};
pub use error::{Error, Result};
pub use frame_info::{AncMeta, FrameInfo};
pub use session::{FrameHandle, FrameStatus, Session};
