// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Optional per-session notification callbacks (spec §6 "Session
//! configuration struct": available/done/late/event notifications).
//!
//! Callbacks are stored behind `ArcSwapOption` so they can be installed or
//! replaced without taking the session mutex — the hot paths (`get_frame`,
//! the RDMA poll thread, the pacing scheduler) only ever need a `load()`.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// A frame became available for consumption (RX `Ready`, spec §3).
pub type AvailableFn = dyn Fn(usize) + Send + Sync;
/// A TX frame finished transmission and its buffer returned to `Free`.
pub type DoneFn = dyn Fn(usize) + Send + Sync;
/// A frame was sent or expected later than its pacing deadline (spec §4.3).
pub type LateFn = dyn Fn(usize, u64) + Send + Sync;
/// A transport-level event fired (connect, disconnect, CQ error).
pub type EventFn = dyn Fn(&str) + Send + Sync;

/// Swappable callback slots for one session.
#[derive(Default)]
pub struct Callbacks {
    available: ArcSwapOption<AvailableFn>,
    done: ArcSwapOption<DoneFn>,
    late: ArcSwapOption<LateFn>,
    event: ArcSwapOption<EventFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, f: Arc<AvailableFn>) {
        self.available.store(Some(f));
    }

    pub fn set_done(&self, f: Arc<DoneFn>) {
        self.done.store(Some(f));
    }

    pub fn set_late(&self, f: Arc<LateFn>) {
        self.late.store(Some(f));
    }

    pub fn set_event(&self, f: Arc<EventFn>) {
        self.event.store(Some(f));
    }

    pub fn fire_available(&self, idx: usize) {
        if let Some(f) = self.available.load().as_ref() {
            f(idx);
        }
    }

    pub fn fire_done(&self, idx: usize) {
        if let Some(f) = self.done.load().as_ref() {
            f(idx);
        }
    }

    pub fn fire_late(&self, idx: usize, lateness_ns: u64) {
        if let Some(f) = self.late.load().as_ref() {
            f(idx, lateness_ns);
        }
    }

    pub fn fire_event(&self, msg: &str) {
        if let Some(f) = self.event.load().as_ref() {
            f(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fire_without_callback_installed_is_a_noop() {
        let cb = Callbacks::new();
        cb.fire_available(0);
        cb.fire_done(0);
        cb.fire_late(0, 0);
        cb.fire_event("x");
    }

    #[test]
    fn installed_callback_observes_the_fired_value() {
        let cb = Callbacks::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        cb.set_available(Arc::new(move |idx| seen2.store(idx, Ordering::SeqCst)));
        cb.fire_available(5);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn callback_can_be_replaced() {
        let cb = Callbacks::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        cb.set_done(Arc::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        cb.fire_done(0);
        let c2 = count.clone();
        cb.set_done(Arc::new(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        }));
        cb.fire_done(0);
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }
}
