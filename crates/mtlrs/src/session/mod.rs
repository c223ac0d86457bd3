// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pipeline session manager (spec §4.1).
//!
//! Bridges application code and wire transport through a bounded
//! framebuffer ring: `create`, blocking/non-blocking `get_frame`,
//! `put_frame`, `wake_block`, and `free`, built on top of [`pool::Pool`].

mod pool;
pub mod status;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use log::warn;

use crate::callbacks::Callbacks;
use crate::config::{Direction, SessionConfig, SHUTDOWN_JOIN_DEADLINE_MS};
use crate::error::Result;
use crate::stats::Stats;

pub use pool::Pool;
pub use status::FrameStatus;

/// A pipeline session: paired producer/consumer access to a framebuffer
/// pool, with coordinated lifecycle and statistics.
pub struct Session<P> {
    config: SessionConfig,
    pool: Pool<P>,
    stats: Arc<Stats>,
    callbacks: Arc<Callbacks>,
}

impl<P> Session<P> {
    /// Creates a session from already-allocated per-slot payloads.
    ///
    /// Fails with [`crate::error::Error::InvalidConfig`] (via
    /// [`SessionConfig::validate`]) on inconsistent configuration. Matches
    /// spec §4.1 `create`: payload slots seed to `Free` (TX) or
    /// `InConsumption` (RX), statistics are registered, and `ready` flips to
    /// `true` only once every field is in place.
    pub fn create(config: SessionConfig, payloads: Vec<P>) -> Result<Self> {
        config.validate()?;
        let tx = matches!(config.direction, Direction::Tx);
        let pool = Pool::new(payloads, tx);
        let stats = Stats::new();
        crate::stats::register(&config.name, stats.clone());
        pool.set_ready(true);
        Ok(Self { config, pool, stats, callbacks: Arc::new(Callbacks::new()) })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn pool(&self) -> &Pool<P> {
        &self.pool
    }

    /// The session's notification callbacks (spec §6): `available`/`done`/
    /// `late`/`event`. Shared with the transport so completions can fire
    /// them directly without routing back through the session.
    pub fn callbacks(&self) -> &Arc<Callbacks> {
        &self.callbacks
    }

    /// Scans for a free (TX) or ready (RX) buffer, optionally blocking when
    /// the session carries `SessionFlags::BLOCK_GET` (spec §4.1 `get_frame`).
    /// Fires `available` on a successful RX pickup.
    pub fn get_frame(&self) -> Option<FrameHandle<'_, P>> {
        let block = self
            .config
            .flags
            .contains(crate::config::SessionFlags::BLOCK_GET);
        let timeout = Duration::from_millis(self.config.block_get_timeout_ms);
        let idx = self.pool.get_frame(block, timeout)?;
        if matches!(self.config.direction, Direction::Rx) {
            self.callbacks.fire_available(idx);
        }
        Some(FrameHandle { session: self, idx })
    }

    /// Advances `handle`'s buffer to `Ready` (TX) or `Free` (RX); fails with
    /// [`crate::error::Error::NotOwned`] if the buffer was already put back.
    /// Fires `done` on a successful TX hand-off.
    pub fn put_frame(&self, handle: FrameHandle<'_, P>) -> Result<()> {
        let idx = handle.idx;
        self.pool.put_frame(idx)?;
        if matches!(self.config.direction, Direction::Tx) {
            self.callbacks.fire_done(idx);
        }
        Ok(())
    }

    /// Wakes any thread blocked in `get_frame` (spec §4.1 `wake_block`).
    pub fn wake_block(&self) {
        self.pool.wake_block();
    }

    /// Tears the session down (spec §4.1 `free`): marks it not-ready, wakes
    /// any blocked caller, waits for in-flight tasklets to drain before
    /// releasing the framebuffer storage, then unregisters statistics and
    /// fires the `event` callback. Waking blocked callers via `wake_block`
    /// before calling `free` is still the caller's responsibility, so a
    /// blocked thread observes `None` promptly rather than waiting out its
    /// full timeout.
    pub fn free(self) {
        self.pool.set_ready(false);
        self.pool.wake_block();
        if !self.pool.drain_tasklets(Duration::from_millis(SHUTDOWN_JOIN_DEADLINE_MS)) {
            warn!(
                "session {} freed with tasklets still in flight after {}ms",
                self.config.name, SHUTDOWN_JOIN_DEADLINE_MS
            );
        }
        crate::stats::unregister(&self.config.name);
        self.callbacks.fire_event("session freed");
    }
}

/// An exclusively-owned, borrowed framebuffer returned by `get_frame`.
///
/// Must be returned via [`Session::put_frame`]; dropping it without
/// returning leaves the slot parked in `InUser` (matching the C library's
/// behavior of never auto-reclaiming a buffer the application forgot to
/// put back — the application is responsible for the handshake).
pub struct FrameHandle<'a, P> {
    session: &'a Session<P>,
    idx: usize,
}

impl<P> FrameHandle<'_, P> {
    pub fn index(&self) -> usize {
        self.idx
    }
}

impl<P> Deref for FrameHandle<'_, P> {
    type Target = P;
    fn deref(&self) -> &P {
        // SAFETY: holding a `FrameHandle` is the exclusive status right to
        // this slot (granted by `Pool::get_frame`'s `InUser` transition).
        unsafe { self.session.pool.slot_mut(self.idx) }
    }
}

impl<P> DerefMut for FrameHandle<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        // SAFETY: see `Deref` above.
        unsafe { self.session.pool.slot_mut(self.idx) }
    }
}
