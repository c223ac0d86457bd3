// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CQ completion dispatch (spec §4.4 "Completion handling").
//!
//! Decoupled from the actual `ibv_poll_cq` FFI call so the dispatch logic
//! is unit-testable: the poll thread in [`super::tx`]/[`super::rx`]
//! translates raw `ibv_wc` entries into [`WorkCompletion`] and hands them
//! here.

use log::{debug, warn};

use super::buffer::{RemoteDescriptor, RxBufferSlot, TxBufferSlot};
use super::message::Message;
use crate::callbacks::Callbacks;
use crate::stats::Stats;

/// The operation a completion corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WcOpcode {
    Send,
    Recv,
    RdmaWrite,
}

/// A CQ completion, already translated out of the vendor `ibv_wc` struct.
#[derive(Debug, Clone, Copy)]
pub struct WorkCompletion {
    /// Echoes the `wr_id` set at post time; TX data-plane completions carry
    /// the buffer index in the low 16 bits.
    pub wr_id: u64,
    pub opcode: WcOpcode,
    /// `true` for `IBV_WC_SUCCESS`; any other vendor status is fatal.
    pub success: bool,
    pub vendor_err: Option<String>,
    /// Immediate data delivered by `RDMA_WRITE_WITH_IMM`, if any.
    pub imm_data: Option<u32>,
    /// The raw control-message bytes, valid for `Recv` completions.
    pub recv_payload: Option<[u8; super::message::CONTROL_MSG_LEN]>,
}

/// Outcome of dispatching one completion, telling the poll loop what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    Continue,
    /// A `BYE` SEND completed, or a fatal error was observed: exit the poll loop.
    Stop,
}

/// Dispatches one TX-side completion (spec §4.4 "Completion handling").
///
/// `repost_recv` is invoked whenever a `DONE` RECV completion is consumed,
/// so the caller can re-post that control-message recv WR.
pub fn handle_tx_completion(
    wc: &WorkCompletion,
    tx_buffers: &mut [TxBufferSlot],
    stats: &Stats,
    callbacks: &Callbacks,
    mut repost_recv: impl FnMut(),
) -> PollAction {
    if !wc.success {
        warn!("rdma tx cq error: {:?}", wc.vendor_err);
        stats.inc_frames_dropped();
        return PollAction::Stop;
    }

    match wc.opcode {
        WcOpcode::Send => {
            // A successful SEND completion for a BYE message signals shutdown.
            if let Some(payload) = wc.recv_payload {
                if matches!(Message::decode(&payload), Ok(Message::Bye)) {
                    return PollAction::Stop;
                }
            }
            PollAction::Continue
        }
        WcOpcode::Recv => {
            if let Some(payload) = wc.recv_payload {
                if let Ok(Message::BufferDone { buf_idx, remote_addr, remote_key, .. }) = Message::decode(&payload) {
                    if let Some(slot) = tx_buffers.get_mut(buf_idx as usize) {
                        if slot.receive_done(RemoteDescriptor { remote_addr, remote_key }) {
                            callbacks.fire_done(buf_idx as usize);
                        }
                    }
                    repost_recv();
                }
            }
            PollAction::Continue
        }
        WcOpcode::RdmaWrite => {
            let buf_idx = (wc.wr_id & 0xffff) as usize;
            if let Some(slot) = tx_buffers.get_mut(buf_idx) {
                match slot.complete_one_wr() {
                    Ok(reclaimed) => {
                        if reclaimed {
                            callbacks.fire_done(buf_idx);
                        }
                    }
                    Err(e) => {
                        warn!("rdma tx completion error on buffer {buf_idx}: {e}");
                        stats.inc_frames_dropped();
                        return PollAction::Stop;
                    }
                }
            }
            stats.add_bytes_out(0); // byte accounting happens at post time
            debug!("rdma_write completion for buffer {buf_idx}");
            PollAction::Continue
        }
    }
}

/// Dispatches one RX-side completion. An inbound `RDMA_WRITE_WITH_IMM`
/// carries `(buf_idx, user_meta_size)` packed in its immediate data (spec
/// §4.4); the buffer transitions straight to `Ready`.
pub fn handle_rx_completion(
    wc: &WorkCompletion,
    rx_buffers: &mut [RxBufferSlot],
    seq_num: u32,
    stats: &Stats,
    callbacks: &Callbacks,
) -> PollAction {
    if !wc.success {
        warn!("rdma rx cq error: {:?}", wc.vendor_err);
        stats.inc_frames_dropped();
        return PollAction::Stop;
    }

    if let Some(imm) = wc.imm_data {
        let (buf_idx, user_meta_size) = Message::decode_imm(imm);
        if let Some(slot) = rx_buffers.get_mut(buf_idx as usize) {
            slot.mark_ready(slot.descriptor.capacity, user_meta_size as usize, seq_num);
            stats.inc_frames_complete();
            stats.add_packets_in(1);
            callbacks.fire_available(buf_idx as usize);
        }
    }
    PollAction::Continue
}
