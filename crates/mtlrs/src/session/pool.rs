// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framebuffer pool: fixed-size ring of payload slots plus the cursor/status
//! bookkeeping described in spec §4.1 and §3.
//!
//! # Synchronization
//!
//! Slot payloads live in `UnsafeCell<P>` — exclusive access is granted by
//! the status machine, not by a per-access lock, matching the teacher's
//! shared-memory slot design (`transport/shm/slot.rs`): the `state` mutex
//! guards only cursor/status transitions, never the payload bytes
//! themselves. Whoever currently holds a slot's status right (pool,
//! application, or tasklet) has sole access to its payload until the next
//! transition, which always goes through the mutex.

use std::cell::UnsafeCell;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::status::FrameStatus;
use crate::error::{Error, Result};

struct PoolState {
    statuses: Vec<FrameStatus>,
    producer_idx: usize,
    tasklet_idx: usize,
    consumer_idx: usize,
    /// False until every subsystem (transport) has finished initializing;
    /// `get_frame` always returns `None` while this is false.
    ready: bool,
    /// Set once the transport has disconnected; `get_frame` always returns
    /// `None` thereafter (spec §4.1 failure model).
    disconnected: bool,
    /// Number of slots currently claimed by the transport tasklet
    /// (`InTransmission`/`InDecoding`). `free` blocks on this reaching zero
    /// before releasing the framebuffer storage (spec §4.1 `free`: "waits
    /// for any in-flight tasklet to drain").
    tasklet_inflight: usize,
}

/// A bounded ring of `P`-typed framebuffers with the spec §3 status machine.
pub struct Pool<P> {
    slots: Vec<UnsafeCell<P>>,
    state: Mutex<PoolState>,
    cond: Condvar,
    tx_direction: bool,
}

// SAFETY: slot payloads are never aliased across threads — the status
// machine under `state` grants exclusive access to exactly one side (pool,
// application, or tasklet) at a time, and every handoff is published
// through a `state`-guarded transition.
unsafe impl<P: Send> Sync for Pool<P> {}

impl<P> Pool<P> {
    /// Builds a pool from per-slot payloads, seeding every slot's initial
    /// status per spec §4.1: `Free` for TX, `InConsumption` for RX (RX must
    /// receive a done-handshake from the transport before a slot becomes
    /// available for assembly).
    pub fn new(payloads: Vec<P>, tx_direction: bool) -> Self {
        let initial = if tx_direction {
            FrameStatus::Free
        } else {
            FrameStatus::InConsumption
        };
        let n = payloads.len();
        Self {
            slots: payloads.into_iter().map(UnsafeCell::new).collect(),
            state: Mutex::new(PoolState {
                statuses: vec![initial; n],
                producer_idx: 0,
                tasklet_idx: 0,
                consumer_idx: 0,
                ready: false,
                disconnected: false,
                tasklet_inflight: 0,
            }),
            cond: Condvar::new(),
            tx_direction,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Marks the pool ready to serve `get_frame` calls (spec §4.1 `create`).
    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
        self.cond.notify_all();
    }

    /// Marks the transport disconnected; all future `get_frame` calls return
    /// `None` until the session is freed (spec §4.1 failure model).
    pub fn mark_disconnected(&self) {
        self.state.lock().disconnected = true;
        self.cond.notify_all();
    }

    fn scan_from(state: &PoolState, start: usize, want: FrameStatus) -> Option<usize> {
        let n = state.statuses.len();
        if n == 0 {
            return None;
        }
        (0..n)
            .map(|i| (start + i) % n)
            .find(|&idx| state.statuses[idx] == want)
    }

    /// One non-blocking scan attempt (spec §4.1 scan algorithm).
    fn try_get(&self, state: &mut PoolState) -> Option<usize> {
        if !state.ready || state.disconnected {
            return None;
        }
        let (cursor, want) = if self.tx_direction {
            (state.producer_idx, FrameStatus::Free)
        } else {
            (state.consumer_idx, FrameStatus::Ready)
        };
        let idx = Self::scan_from(state, cursor, want)?;
        state.statuses[idx] = FrameStatus::InUser;
        if self.tx_direction {
            state.producer_idx = (idx + 1) % state.statuses.len();
        } else {
            state.consumer_idx = (idx + 1) % state.statuses.len();
        }
        Some(idx)
    }

    /// Scans for a matching buffer, optionally blocking per spec §4.1: on a
    /// miss, if `block` is set the caller waits on the condvar for `timeout`
    /// and re-scans exactly once before giving up.
    pub fn get_frame(&self, block: bool, timeout: Duration) -> Option<usize> {
        let mut state = self.state.lock();
        if let Some(idx) = self.try_get(&mut state) {
            return Some(idx);
        }
        if block {
            // Level-triggered: a spurious wakeup just yields a second `None`
            // on the re-scan below, per spec §4.1 blocking semantics.
            let _ = self.cond.wait_for(&mut state, timeout);
            return self.try_get(&mut state);
        }
        None
    }

    /// Claims a `Ready` buffer for the transport tasklet (TX packetizer or
    /// RX codec), advancing `tasklet_idx` and counting the slot as in-flight
    /// until it is released or published.
    pub fn tasklet_claim(&self) -> Option<usize> {
        let mut state = self.state.lock();
        let idx = Self::scan_from(&state, state.tasklet_idx, FrameStatus::Ready)?;
        let next = if self.tx_direction {
            FrameStatus::InTransmission
        } else {
            FrameStatus::InDecoding
        };
        state.statuses[idx] = next;
        state.tasklet_idx = (idx + 1) % state.statuses.len();
        state.tasklet_inflight += 1;
        Some(idx)
    }

    /// Transitions a tasklet-owned buffer back to `Free` (TX completion, or
    /// a decode/encode failure per spec §4.1 failure model).
    pub fn tasklet_release(&self, idx: usize) {
        let mut state = self.state.lock();
        state.statuses[idx] = FrameStatus::Free;
        state.tasklet_inflight = state.tasklet_inflight.saturating_sub(1);
        drop(state);
        self.cond.notify_all();
    }

    /// Transitions a tasklet-owned RX buffer to `Ready` for consumer pickup
    /// (codec decode complete, or the ST40 assembler directly marking a
    /// reassembled frame ready).
    pub fn tasklet_publish_ready(&self, idx: usize) {
        let mut state = self.state.lock();
        state.statuses[idx] = FrameStatus::Ready;
        state.tasklet_inflight = state.tasklet_inflight.saturating_sub(1);
        drop(state);
        self.cond.notify_all();
    }

    /// Blocks until every claimed tasklet slot has drained (`tasklet_claim`
    /// matched by `tasklet_release`/`tasklet_publish_ready`) or `deadline`
    /// elapses. Returns `true` if the pool drained cleanly. Called from
    /// `Session::free` before the framebuffer storage is released, so a
    /// tasklet cannot hold a `slot_mut` borrow past teardown.
    pub fn drain_tasklets(&self, deadline: Duration) -> bool {
        let mut state = self.state.lock();
        let start = std::time::Instant::now();
        while state.tasklet_inflight > 0 {
            let remaining = deadline.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return state.tasklet_inflight == 0;
            }
            let timed_out = self.cond.wait_for(&mut state, remaining).timed_out();
            if timed_out && state.tasklet_inflight > 0 {
                return false;
            }
        }
        true
    }

    /// Verifies the caller holds `idx` in `InUser`, then advances it to
    /// `Ready` (TX) or `Free` (RX), signaling any waiter (spec §4.1 `put_frame`).
    pub fn put_frame(&self, idx: usize) -> Result<()> {
        let mut state = self.state.lock();
        if state.statuses[idx] != FrameStatus::InUser {
            return Err(Error::NotOwned);
        }
        state.statuses[idx] = if self.tx_direction {
            FrameStatus::Ready
        } else {
            FrameStatus::Free
        };
        drop(state);
        self.cond.notify_all();
        Ok(())
    }

    /// Wakes any thread blocked in `get_frame` (spec §4.1 `wake_block`, used
    /// during shutdown). A no-op if nobody is waiting.
    pub fn wake_block(&self) {
        self.cond.notify_all();
    }

    /// Returns a mutable reference to slot `idx`'s payload.
    ///
    /// # Safety
    ///
    /// Callers must hold the exclusive status right to `idx` (returned by
    /// `get_frame`/`tasklet_claim`) for the duration of the borrow.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot_mut(&self, idx: usize) -> &mut P {
        &mut *self.slots[idx].get()
    }

    /// Current count of slots in each status — used by invariant checks and tests.
    pub fn status_histogram(&self) -> [usize; 6] {
        let state = self.state.lock();
        let mut hist = [0usize; 6];
        for &s in &state.statuses {
            hist[status_index(s)] += 1;
        }
        hist
    }

    pub fn status_of(&self, idx: usize) -> FrameStatus {
        self.state.lock().statuses[idx]
    }
}

fn status_index(s: FrameStatus) -> usize {
    match s {
        FrameStatus::Free => 0,
        FrameStatus::InUser => 1,
        FrameStatus::Ready => 2,
        FrameStatus::InTransmission => 3,
        FrameStatus::InDecoding => 4,
        FrameStatus::InConsumption => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_pool(n: usize) -> Pool<u32> {
        let pool = Pool::new((0..n as u32).collect(), true);
        pool.set_ready(true);
        pool
    }

    #[test]
    fn tx_get_put_round_trip() {
        let pool = tx_pool(4);
        let idx = pool.get_frame(false, Duration::ZERO).expect("slot available");
        assert_eq!(pool.status_of(idx), FrameStatus::InUser);
        pool.put_frame(idx).unwrap();
        assert_eq!(pool.status_of(idx), FrameStatus::Ready);
    }

    #[test]
    fn put_frame_without_ownership_is_eio_equivalent() {
        let pool = tx_pool(2);
        let idx = pool.get_frame(false, Duration::ZERO).unwrap();
        pool.put_frame(idx).unwrap();
        // Already put; a second put must fail without mutating state.
        assert!(matches!(pool.put_frame(idx), Err(Error::NotOwned)));
        assert_eq!(pool.status_of(idx), FrameStatus::Ready);
    }

    #[test]
    fn exhausted_pool_returns_none_without_blocking() {
        let pool = tx_pool(1);
        let idx = pool.get_frame(false, Duration::ZERO).unwrap();
        assert!(pool.get_frame(false, Duration::from_millis(1)).is_none());
        pool.put_frame(idx).unwrap();
    }

    #[test]
    fn sum_over_states_equals_framebuffer_count() {
        let pool = tx_pool(5);
        let idx = pool.get_frame(false, Duration::ZERO).unwrap();
        pool.put_frame(idx).unwrap();
        let claimed = pool.tasklet_claim().unwrap();
        assert_eq!(claimed, idx);
        let hist = pool.status_histogram();
        assert_eq!(hist.iter().sum::<usize>(), 5);
    }

    #[test]
    fn rx_pool_starts_in_consumption_until_freed() {
        let pool = Pool::<u32>::new(vec![0, 1, 2], false);
        pool.set_ready(true);
        // RX slots start InConsumption, not Ready, so no frame is available yet.
        assert!(pool.get_frame(false, Duration::ZERO).is_none());
        for i in 0..3 {
            assert_eq!(pool.status_of(i), FrameStatus::InConsumption);
        }
    }

    #[test]
    fn rx_tasklet_claim_then_publish_then_consumer_get() {
        let pool = Pool::<u32>::new(vec![0, 1], false);
        pool.set_ready(true);
        // Force a slot free so the tasklet (assembler) can fill it.
        {
            let mut state = pool.state.lock();
            state.statuses[0] = FrameStatus::Ready;
        }
        let idx = pool.tasklet_claim().unwrap();
        assert_eq!(pool.status_of(idx), FrameStatus::InDecoding);
        pool.tasklet_publish_ready(idx);
        assert_eq!(pool.status_of(idx), FrameStatus::Ready);
        let got = pool.get_frame(false, Duration::ZERO).unwrap();
        assert_eq!(got, idx);
        assert_eq!(pool.status_of(got), FrameStatus::InUser);
    }

    #[test]
    fn disconnected_pool_never_returns_frames() {
        let pool = tx_pool(2);
        pool.mark_disconnected();
        assert!(pool.get_frame(true, Duration::from_millis(5)).is_none());
    }

    #[test]
    fn wake_block_is_noop_with_no_waiters() {
        let pool = tx_pool(1);
        pool.wake_block(); // must not panic
    }

    #[test]
    fn drain_tasklets_returns_immediately_when_none_claimed() {
        let pool = tx_pool(2);
        assert!(pool.drain_tasklets(Duration::from_millis(50)));
    }

    #[test]
    fn drain_tasklets_waits_for_release() {
        use std::sync::Arc;
        use std::thread;

        let pool = Arc::new(Pool::<u32>::new(vec![0, 1], false));
        pool.set_ready(true);
        {
            let mut state = pool.state.lock();
            state.statuses[0] = FrameStatus::Ready;
        }
        let idx = pool.tasklet_claim().unwrap();
        let pool2 = pool.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            pool2.tasklet_release(idx);
        });
        assert!(pool.drain_tasklets(Duration::from_millis(500)));
        handle.join().unwrap();
    }

    #[test]
    fn drain_tasklets_times_out_when_never_released() {
        let pool = Pool::<u32>::new(vec![0, 1], false);
        pool.set_ready(true);
        {
            let mut state = pool.state.lock();
            state.statuses[0] = FrameStatus::Ready;
        }
        pool.tasklet_claim().unwrap();
        assert!(!pool.drain_tasklets(Duration::from_millis(20)));
    }
}
