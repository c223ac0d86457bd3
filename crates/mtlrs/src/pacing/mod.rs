// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! User-pacing and timestamp discipline (spec §4.3).
//!
//! Converts between TAI nanoseconds and the 90 kHz media clock, snaps
//! user-provided timestamps to valid frame epochs, and exposes the
//! transport's pacing parameters.

use crate::config::{
    COLD_START_EPOCH_TOLERANCE_NS, DEFAULT_EPOCH_TOLERANCE_NS, EXACT_PACING_TOLERANCE_NS,
    MEDIA_CLOCK_HZ,
};
use crate::error::{Error, Result};
use crate::format::FrameRate;

/// Converts a TAI timestamp (nanoseconds) to the 90 kHz media clock.
///
/// `floor(tai_ns * 90000 / 1e9)`, computed in 128-bit intermediate
/// arithmetic to avoid overflow for any realistic (64-bit) `tai_ns`.
pub fn tai_to_media_clk(tai_ns: u64) -> u64 {
    ((u128::from(tai_ns) * u128::from(MEDIA_CLOCK_HZ)) / 1_000_000_000) as u64
}

/// Converts a 90 kHz media clock tick count back to TAI nanoseconds.
///
/// `ticks * 1e9 / 90000`. This is the exact inverse of [`tai_to_media_clk`]
/// only up to sub-tick loss: `media_clk_to_tai(tai_to_media_clk(t)) == t -
/// (t mod 11111)` (spec §8), since each media-clock tick spans `1e9/90000 =
/// 11111.11...` ns.
pub fn media_clk_to_tai(ticks: u64) -> u64 {
    ((u128::from(ticks) * 1_000_000_000) / u128::from(MEDIA_CLOCK_HZ)) as u64
}

/// The three pacing parameters defined by SMPTE ST 2110-21 (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingDescriptor {
    /// Phase offset in nanoseconds from the epoch boundary.
    pub tr_offset_ns: u64,
    /// Inter-packet interval in nanoseconds.
    pub trs_ns: u64,
    /// VRX packet credit used to pre-position packets before the nominal epoch.
    pub vrx_pkts: u32,
}

impl PacingDescriptor {
    /// All three values must be strictly positive after a successful
    /// session `create` (spec §4.3).
    pub fn is_valid(&self) -> bool {
        self.tr_offset_ns > 0 && self.trs_ns > 0 && self.vrx_pkts > 0
    }
}

/// Whether a session paces by snapping to the nearest frame epoch, or sends
/// at the literal user-supplied TAI timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingMode {
    EpochSnap,
    ExactUserPacing,
}

/// The computed transmit schedule for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSchedule {
    /// The time the frame's first packet must leave the wire, in TAI nanoseconds.
    pub first_packet_tai_ns: u64,
    /// The RTP timestamp (90 kHz media clock) to stamp on the frame, after
    /// epoch snapping but before any `rtp_timestamp_delta` is applied.
    pub rtp_timestamp: u32,
    /// Whether the requested timestamp had already elapsed (spec §4.3 "late").
    pub late: bool,
    /// Arrival window the receiver should enforce for this frame's first packet.
    pub tolerance: ArrivalWindow,
}

/// Receiver-side arrival verification window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrivalWindow {
    pub earliest_ns: u64,
    pub latest_ns: u64,
}

impl ArrivalWindow {
    pub fn contains(&self, observed_ns: u64) -> bool {
        observed_ns >= self.earliest_ns && observed_ns <= self.latest_ns
    }
}

/// Rounds `t_req` to the nearest epoch boundary of width `interval_ns`.
///
/// `round(t_req / T) * T`, computed with round-half-up on the truncating
/// integer division remainder.
fn snap_to_epoch(t_req: u64, interval_ns: u64) -> u64 {
    let epoch_index = (t_req + interval_ns / 2) / interval_ns;
    epoch_index * interval_ns
}

/// Computes the TX schedule for a frame requested at `t_req` (spec §4.3).
///
/// `now_ns` is the current TAI time, used to detect a timestamp already in
/// the past and to select the cold-start (wider) tolerance for the first
/// frame (`is_first_frame`).
#[allow(clippy::too_many_arguments)]
pub fn compute_tx_schedule(
    mode: PacingMode,
    fps: FrameRate,
    pacing: PacingDescriptor,
    t_req: u64,
    now_ns: u64,
    is_first_frame: bool,
) -> TxSchedule {
    let interval_ns = fps.interval_ns();
    let late = now_ns > t_req.saturating_add(interval_ns);

    match mode {
        PacingMode::EpochSnap => {
            let t_snap = snap_to_epoch(t_req, interval_ns);
            let lead_ns = pacing.vrx_pkts as u64 * pacing.trs_ns;
            let first_packet_tai_ns = (t_snap + pacing.tr_offset_ns).saturating_sub(lead_ns);
            let first_packet_tai_ns = if late {
                now_ns.max(first_packet_tai_ns)
            } else {
                first_packet_tai_ns
            };
            let tolerance_ns = if is_first_frame {
                COLD_START_EPOCH_TOLERANCE_NS
            } else {
                DEFAULT_EPOCH_TOLERANCE_NS
            };
            TxSchedule {
                first_packet_tai_ns,
                rtp_timestamp: tai_to_media_clk(t_snap) as u32,
                late,
                tolerance: ArrivalWindow {
                    earliest_ns: first_packet_tai_ns,
                    latest_ns: first_packet_tai_ns + tolerance_ns,
                },
            }
        }
        PacingMode::ExactUserPacing => {
            let first_packet_tai_ns = if late { now_ns } else { t_req };
            TxSchedule {
                first_packet_tai_ns,
                rtp_timestamp: tai_to_media_clk(t_req) as u32,
                late,
                tolerance: ArrivalWindow {
                    earliest_ns: first_packet_tai_ns,
                    latest_ns: first_packet_tai_ns + EXACT_PACING_TOLERANCE_NS,
                },
            }
        }
    }
}

/// Read-only pacing parameter query (spec §4.3).
///
/// Fails with [`Error::PacingNotSupported`] when `user_pacing_enabled` is
/// false.
pub fn query_pacing(user_pacing_enabled: bool, descriptor: PacingDescriptor) -> Result<PacingDescriptor> {
    if !user_pacing_enabled {
        return Err(Error::PacingNotSupported);
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_clock_inversion_loses_only_sub_tick() {
        for t in [0u64, 1, 11110, 11111, 11112, 1_000_000_000, (1u64 << 44) - 1] {
            let roundtrip = media_clk_to_tai(tai_to_media_clk(t));
            assert_eq!(roundtrip, t - (t % 11111), "t={t}");
        }
    }

    #[test]
    fn user_pacing_25fps_scenario() {
        // Scenario 3 (spec §8): 25 fps, three frames one interval apart.
        let fps = FrameRate::Fps25;
        let t0 = 1_000_000_000u64;
        let t1 = 1_040_000_000u64;
        let t2 = 1_080_000_000u64;
        assert_eq!(tai_to_media_clk(t0), 90_000);
        assert_eq!(tai_to_media_clk(t1), 93_600);
        assert_eq!(tai_to_media_clk(t2), 97_200);
        assert_eq!(tai_to_media_clk(t1) - tai_to_media_clk(t0), 3_600);
        let _ = fps;
    }

    #[test]
    fn epoch_snap_schedule_within_tolerance() {
        let pacing = PacingDescriptor { tr_offset_ns: 2000, trs_ns: 100, vrx_pkts: 4 };
        let sched = compute_tx_schedule(
            PacingMode::EpochSnap,
            FrameRate::Fps25,
            pacing,
            1_000_000_000,
            0,
            false,
        );
        assert!(!sched.late);
        assert_eq!(
            sched.tolerance.latest_ns - sched.tolerance.earliest_ns,
            DEFAULT_EPOCH_TOLERANCE_NS
        );
    }

    #[test]
    fn first_frame_gets_cold_start_tolerance() {
        let pacing = PacingDescriptor { tr_offset_ns: 2000, trs_ns: 100, vrx_pkts: 4 };
        let sched = compute_tx_schedule(
            PacingMode::EpochSnap,
            FrameRate::Fps25,
            pacing,
            1_000_000_000,
            0,
            true,
        );
        assert_eq!(
            sched.tolerance.latest_ns - sched.tolerance.earliest_ns,
            COLD_START_EPOCH_TOLERANCE_NS
        );
    }

    #[test]
    fn exact_pacing_leaves_at_literal_tai() {
        let pacing = PacingDescriptor { tr_offset_ns: 2000, trs_ns: 100, vrx_pkts: 4 };
        let t_req = 1_000_125_000u64; // epoch + 125us user offset
        let sched = compute_tx_schedule(PacingMode::ExactUserPacing, FrameRate::Fps25, pacing, t_req, 0, false);
        assert_eq!(sched.first_packet_tai_ns, t_req);
        assert_eq!(sched.tolerance.latest_ns - sched.tolerance.earliest_ns, EXACT_PACING_TOLERANCE_NS);
        assert!(sched.tolerance.contains(t_req));
        assert!(!sched.tolerance.contains(t_req - 1));
    }

    #[test]
    fn timestamp_in_the_past_is_marked_late_and_sent_asap() {
        let pacing = PacingDescriptor { tr_offset_ns: 2000, trs_ns: 100, vrx_pkts: 4 };
        let t_req = 1_000_000_000u64;
        let now = t_req + FrameRate::Fps25.interval_ns() + 1;
        let sched = compute_tx_schedule(PacingMode::EpochSnap, FrameRate::Fps25, pacing, t_req, now, false);
        assert!(sched.late);
        assert_eq!(sched.first_packet_tai_ns, now);
    }

    #[test]
    fn query_pacing_fails_without_user_pacing() {
        let pacing = PacingDescriptor { tr_offset_ns: 1, trs_ns: 1, vrx_pkts: 1 };
        assert!(matches!(query_pacing(false, pacing), Err(Error::PacingNotSupported)));
        assert!(query_pacing(true, pacing).is_ok());
    }

    #[test]
    fn pacing_descriptor_validity() {
        assert!(PacingDescriptor { tr_offset_ns: 1, trs_ns: 1, vrx_pkts: 1 }.is_valid());
        assert!(!PacingDescriptor { tr_offset_ns: 0, trs_ns: 1, vrx_pkts: 1 }.is_valid());
    }
}
