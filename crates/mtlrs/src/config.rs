// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session configuration — Single Source of Truth for session-level tunables.
//!
//! # Architecture
//!
//! - **Static**: compile-time defaults (timeouts, UDW region size, tolerance windows)
//! - **Dynamic**: [`SessionConfig`], the per-session immutable configuration struct
//!
//! **NEVER hardcode these elsewhere!**

use std::net::SocketAddr;

use crate::error::{Error, Result};
use crate::format::{FrameRate, PixelFormat};

// ===========================================================================
// Global defaults (spec §4.1, §4.2, §4.3)
// ===========================================================================

/// Default blocking-get timeout (spec §4.1), configurable per session.
pub const DEFAULT_BLOCK_GET_TIMEOUT_MS: u64 = 1000;

/// Default maximum UDW region size per ANC frame (spec §4.2).
pub const DEFAULT_MAX_UDW_SIZE: usize = 128 * 1024;

/// Default epoch-snapped arrival tolerance (spec §4.3, §8).
pub const DEFAULT_EPOCH_TOLERANCE_NS: u64 = 30_000;

/// Tolerance applied to the first frame after transmitter warm-up (spec §4.3).
pub const COLD_START_EPOCH_TOLERANCE_NS: u64 = 80_000;

/// Arrival window for `EXACT_USER_PACING` (spec §4.3).
pub const EXACT_PACING_TOLERANCE_NS: u64 = 40_000;

/// Media clock rate for video and ANC (spec §4.3).
pub const MEDIA_CLOCK_HZ: u64 = 90_000;

/// Maximum printable-ASCII session name length (spec §6).
pub const MAX_SESSION_NAME_LEN: usize = 31;

/// Minimum framebuffer count (spec §6).
pub const MIN_FRAMEBUFFER_COUNT: usize = 2;

/// Shutdown join deadline for worker threads (spec §5).
pub const SHUTDOWN_JOIN_DEADLINE_MS: u64 = 10_000;

// ===========================================================================
// Session flags (spec §6)
// ===========================================================================

/// Session behavior flags, one bit per entry in spec §6's flag table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SessionFlags(pub u32);

impl SessionFlags {
    /// Wait on the condvar when `get_frame` finds no matching buffer.
    pub const BLOCK_GET: Self = Self(1 << 0);
    /// Per-frame user timestamp used for epoch-snap pacing.
    pub const USER_PACING: Self = Self(1 << 1);
    /// User-supplied 90 kHz RTP timestamp.
    pub const USER_TIMESTAMP: Self = Self(1 << 2);
    /// Skip epoch snapping; send at the literal TAI timestamp.
    pub const EXACT_USER_PACING: Self = Self(1 << 3);
    /// Drop the frame on late detection instead of sending it late.
    pub const DROP_WHEN_LATE: Self = Self(1 << 4);
    /// Split multi-ANC frames across RTP packets (1 ANC per packet).
    pub const SPLIT_ANC_BY_PKT: Self = Self(1 << 5);
    /// Infer interlace from the RTP `F` bits.
    pub const AUTO_DETECT_INTERLACED: Self = Self(1 << 6);
    /// Emit/accept RTCP sender/receiver reports.
    pub const ENABLE_RTCP: Self = Self(1 << 7);
    /// Application manages queue bindings and multicast joins.
    pub const DATA_PATH_ONLY: Self = Self(1 << 8);
    /// Pin session CPU+memory to a given NUMA node.
    pub const FORCE_NUMA: Self = Self(1 << 9);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for SessionFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Media payload carried by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// ST 2110-20 uncompressed video (exterior to this core; interface only).
    Video,
    /// ST 2110-22 compressed video (exterior to this core; interface only).
    CompressedVideo,
    /// ST 2110-30 audio (exterior to this core; interface only).
    Audio,
    /// ST 2110-40 ancillary data.
    Ancillary,
}

/// Transmit or receive direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Tx,
    Rx,
}

/// Immutable per-session configuration (spec §3, §6).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Printable-ASCII name, at most [`MAX_SESSION_NAME_LEN`] characters.
    pub name: String,
    pub kind: SessionKind,
    pub direction: Direction,
    pub width: u32,
    pub height: u32,
    pub fps: FrameRate,
    pub pixel_format: Option<PixelFormat>,
    pub interlaced: bool,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    /// RTP payload type, 0-127.
    pub payload_type: u8,
    /// 7-bit SSRC filter; 0 disables filtering.
    pub ssrc_filter: u8,
    /// Number of ports (redundant paths) feeding this session.
    pub port_count: usize,
    /// Number of pooled framebuffers, at least [`MIN_FRAMEBUFFER_COUNT`].
    pub framebuffer_count: usize,
    pub flags: SessionFlags,
    /// Blocking-get timeout; defaults to [`DEFAULT_BLOCK_GET_TIMEOUT_MS`].
    pub block_get_timeout_ms: u64,
    /// Maximum UDW region size for ST40 sessions.
    pub max_udw_size: usize,
}

impl SessionConfig {
    /// Validates the configuration, per spec §4.1's `create` failure model.
    pub fn validate(&self) -> Result<()> {
        if self.name.len() > MAX_SESSION_NAME_LEN || !self.name.is_ascii() {
            return Err(Error::InvalidSessionName(self.name.clone()));
        }
        if self.framebuffer_count < MIN_FRAMEBUFFER_COUNT {
            return Err(Error::InvalidFramebufferCount(self.framebuffer_count));
        }
        if self.payload_type > 127 {
            return Err(Error::InvalidConfig(format!(
                "payload_type {} out of range 0-127",
                self.payload_type
            )));
        }
        if self.ssrc_filter > 0x7F {
            return Err(Error::InvalidConfig(format!(
                "ssrc_filter {} exceeds 7 bits",
                self.ssrc_filter
            )));
        }
        if matches!(self.kind, SessionKind::Video | SessionKind::CompressedVideo)
            && (self.width == 0 || self.height == 0)
        {
            return Err(Error::InvalidConfig("video session requires non-zero dimensions".into()));
        }
        if self.max_udw_size == 0 {
            return Err(Error::InvalidConfig("max_udw_size must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn sample_config() -> SessionConfig {
        SessionConfig {
            name: "anc0".into(),
            kind: SessionKind::Ancillary,
            direction: Direction::Rx,
            width: 0,
            height: 0,
            fps: FrameRate::Fps25,
            pixel_format: None,
            interlaced: false,
            local_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 1, 1, 1)), 20000),
            remote_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 1, 1, 1)), 20000),
            payload_type: 113,
            ssrc_filter: 0,
            port_count: 1,
            framebuffer_count: 4,
            flags: SessionFlags::AUTO_DETECT_INTERLACED,
            block_get_timeout_ms: DEFAULT_BLOCK_GET_TIMEOUT_MS,
            max_udw_size: DEFAULT_MAX_UDW_SIZE,
        }
    }

    #[test]
    fn valid_anc_config_passes() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn rejects_too_few_framebuffers() {
        let mut c = sample_config();
        c.framebuffer_count = 1;
        assert!(matches!(c.validate(), Err(Error::InvalidFramebufferCount(1))));
    }

    #[test]
    fn rejects_oversized_name() {
        let mut c = sample_config();
        c.name = "x".repeat(32);
        assert!(matches!(c.validate(), Err(Error::InvalidSessionName(_))));
    }

    #[test]
    fn rejects_video_with_zero_dims() {
        let mut c = sample_config();
        c.kind = SessionKind::Video;
        assert!(c.validate().is_err());
    }

    #[test]
    fn flags_union_and_contains() {
        let f = SessionFlags::BLOCK_GET | SessionFlags::USER_PACING;
        assert!(f.contains(SessionFlags::BLOCK_GET));
        assert!(f.contains(SessionFlags::USER_PACING));
        assert!(!f.contains(SessionFlags::EXACT_USER_PACING));
    }
}
