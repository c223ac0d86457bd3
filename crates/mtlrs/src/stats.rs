// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-session statistics (spec §4.5).
//!
//! Counters are incremented lock-free via relaxed atomics; the registry
//! (register/unregister, periodic dump) is guarded separately so structural
//! changes never contend with the hot increment path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use std::sync::OnceLock;

/// Atomic counters for one session.
///
/// All fields use `Relaxed` ordering: counters are monitoring data, not
/// synchronization points, so no ordering beyond atomicity is required.
#[derive(Default)]
pub struct Stats {
    pub packets_in: AtomicU64,
    pub packets_out: AtomicU64,
    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,
    pub frames_complete: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub seq_lost: AtomicU64,
    pub parity_errors: AtomicU64,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn add_packets_in(&self, n: u64) {
        self.packets_in.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_packets_out(&self, n: u64) {
        self.packets_out.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_bytes_in(&self, n: u64) {
        self.bytes_in.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_bytes_out(&self, n: u64) {
        self.bytes_out.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_frames_complete(&self) {
        self.frames_complete.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_frames_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_seq_lost(&self, n: u64) {
        self.seq_lost.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_parity_errors(&self) {
        self.parity_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Zeroes all counters atomically with respect to each individual
    /// counter (the snapshot across counters is best-effort, matching the
    /// teacher's lock-free stats reset convention).
    pub fn reset(&self) {
        self.packets_in.store(0, Ordering::Relaxed);
        self.packets_out.store(0, Ordering::Relaxed);
        self.bytes_in.store(0, Ordering::Relaxed);
        self.bytes_out.store(0, Ordering::Relaxed);
        self.frames_complete.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
        self.seq_lost.store(0, Ordering::Relaxed);
        self.parity_errors.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_in: self.packets_in.load(Ordering::Relaxed),
            packets_out: self.packets_out.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            frames_complete: self.frames_complete.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            seq_lost: self.seq_lost.load(Ordering::Relaxed),
            parity_errors: self.parity_errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time, non-atomic copy of [`Stats`] suitable for a stat dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub frames_complete: u64,
    pub frames_dropped: u64,
    pub seq_lost: u64,
    pub parity_errors: u64,
}

/// Process-wide registry of live session statistics, keyed by session name.
///
/// Structural changes (register/unregister) take the `DashMap` shard lock
/// for their bucket only; counter increments never touch this map.
static REGISTRY: OnceLock<DashMap<String, Arc<Stats>>> = OnceLock::new();

fn registry() -> &'static DashMap<String, Arc<Stats>> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Registers a session's statistics under `name`, replacing any prior entry.
pub fn register(name: &str, stats: Arc<Stats>) {
    registry().insert(name.to_string(), stats);
}

/// Removes a session's statistics from the registry.
pub fn unregister(name: &str) {
    registry().remove(name);
}

/// Dumps a snapshot of every registered session's statistics.
pub fn dump_all() -> Vec<(String, StatsSnapshot)> {
    registry()
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().snapshot()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let s = Stats::new();
        s.add_packets_in(3);
        s.add_bytes_in(1500);
        s.inc_frames_complete();
        s.inc_parity_errors();
        let snap = s.snapshot();
        assert_eq!(snap.packets_in, 3);
        assert_eq!(snap.bytes_in, 1500);
        assert_eq!(snap.frames_complete, 1);
        assert_eq!(snap.parity_errors, 1);
    }

    #[test]
    fn reset_zeroes_everything() {
        let s = Stats::new();
        s.add_packets_in(10);
        s.inc_frames_dropped();
        s.reset();
        let snap = s.snapshot();
        assert_eq!(snap, StatsSnapshot::default());
    }

    #[test]
    fn registry_register_dump_unregister() {
        let s = Stats::new();
        s.add_packets_in(7);
        register("test-session-a", s.clone());
        let dumped = dump_all();
        assert!(dumped.iter().any(|(name, snap)| name == "test-session-a" && snap.packets_in == 7));
        unregister("test-session-a");
        let dumped = dump_all();
        assert!(!dumped.iter().any(|(name, _)| name == "test-session-a"));
    }
}
