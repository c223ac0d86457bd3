// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RDMA TX transport (spec §4.4).
//!
//! Mirrors `mt_rdma_tx_ctx`: one connection, one buffer array, one
//! completion-poll thread. The actual `ibverbs`/`rdmacm` calls are
//! feature-gated behind `rdma` (see `Cargo.toml`); the queue-pair sizing
//! and buffer bookkeeping below are plain Rust and exercised by tests
//! regardless of the feature.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

use super::buffer::{BufferDescriptor, TxBufferSlot};
use super::message::CONTROL_MSG_LEN;
use crate::error::{Error, Result};
use crate::stats::Stats;

/// Queue-pair sizing derived from the buffer count (spec §4.4 step 2): max
/// send/recv WR is twice the buffer count (one data + one metadata WR per
/// frame, double-buffered against in-flight completions), and inline data
/// must cover at least one control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QpCaps {
    pub max_send_wr: u32,
    pub max_recv_wr: u32,
    pub max_inline_data: u32,
}

pub fn qp_caps(buffer_count: u16) -> QpCaps {
    let n = u32::from(buffer_count);
    QpCaps { max_send_wr: 2 * n, max_recv_wr: 2 * n, max_inline_data: CONTROL_MSG_LEN as u32 }
}

/// Configuration for one TX session, mirroring `mtl_rdma_tx_ops`.
#[derive(Debug, Clone)]
pub struct TxConfig {
    pub name: String,
    pub remote_addr: SocketAddr,
    pub buffer_count: u16,
    pub buffer_capacity: usize,
}

/// A connected RDMA TX transport: buffer pool plus control-plane state.
///
/// `connected` is checked by every data-plane call and flipped to `false`
/// by the completion-poll thread on a fatal CQ error or peer disconnect
/// (spec §4.4 "Failure semantics").
pub struct TxTransport {
    config: TxConfig,
    buffers: Mutex<Vec<TxBufferSlot>>,
    connected: Arc<AtomicBool>,
    stats: Arc<Stats>,
    #[cfg(feature = "rdma")]
    verbs: ffi::VerbsResources,
}

impl TxTransport {
    /// Establishes the connection and primes the receiver's free pool
    /// (spec §4.4 connection establishment, steps 1-5).
    #[cfg(feature = "rdma")]
    pub fn connect(config: TxConfig, stats: Arc<Stats>) -> Result<Self> {
        let verbs = ffi::VerbsResources::connect(&config)?;
        let caps = qp_caps(config.buffer_count);
        info!("rdma tx '{}' connected, qp caps {:?}", config.name, caps);
        let buffers = (0..config.buffer_count)
            .map(|i| TxBufferSlot::new(i, BufferDescriptor::new(0, config.buffer_capacity)))
            .collect();
        let connected = Arc::new(AtomicBool::new(true));
        // Prime the receiver's free pool: one BUFFER_DONE-equivalent per
        // buffer is sent by the *receiver* on ESTABLISHED (spec §4.4 step
        // 5 applies to the RX side); the TX side posts its recv WRs here.
        verbs.post_initial_recvs(config.buffer_count)?;
        Ok(Self { config, buffers: Mutex::new(buffers), connected, stats, verbs })
    }

    #[cfg(not(feature = "rdma"))]
    pub fn connect(_config: TxConfig, _stats: Arc<Stats>) -> Result<Self> {
        Err(Error::NotSupported)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Finds a `Free` buffer and marks it `InTransmission`, per the spec
    /// §4.1 discipline layered under the RDMA-specific status.
    pub fn claim_free_buffer(&self) -> Option<u16> {
        if !self.is_connected() {
            return None;
        }
        let mut buffers = self.buffers.lock();
        let slot = buffers.iter_mut().find(|b| b.status == super::buffer::BufferStatus::Free)?;
        slot.begin_transmission();
        Some(slot.idx)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Marks the transport disconnected; all future buffer claims fail
    /// (spec §4.4 "Failure semantics").
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

#[cfg(feature = "rdma")]
mod ffi {
    //! Minimal `ibverbs`/`rdmacm` connection-establishment wrapper.
    //!
    //! Grounded in `mt_rdma_tx_ctx` (event channel, CQ, QP, protection
    //! domain, listening id) and the connection sequence from spec §4.4:
    //! resolve addr, resolve route, create PD/CQ/QP, register MRs, post
    //! recv WRs, then connect.

    use std::ffi::CString;
    use std::ptr;

    use rdma_sys::*;

    use super::TxConfig;
    use crate::error::{Error, Result};

    /// Owns the raw `rdmacm`/`ibverbs` handles for one TX connection.
    ///
    /// # Safety
    ///
    /// All fields are raw pointers into `rdma-core`-managed resources;
    /// `Drop` tears them down in the reverse order they were created,
    /// matching the library's own teardown discipline (QP before PD,
    /// deregistration after QP destruction).
    pub struct VerbsResources {
        id: *mut rdma_cm_id,
        pd: *mut ibv_pd,
        cq: *mut ibv_cq,
        qp: *mut ibv_qp,
    }

    unsafe impl Send for VerbsResources {}
    unsafe impl Sync for VerbsResources {}

    impl VerbsResources {
        pub fn connect(config: &TxConfig) -> Result<Self> {
            // SAFETY: `rdma_create_id` takes an optional event channel (we
            // pass none and poll synchronously on the returned fd) and
            // writes a valid `rdma_cm_id*` into `id` on success.
            let mut id: *mut rdma_cm_id = ptr::null_mut();
            let rc = unsafe { rdma_create_id(ptr::null_mut(), &mut id, ptr::null_mut(), rdma_port_space::RDMA_PS_TCP) };
            if rc != 0 || id.is_null() {
                return Err(Error::ResourceError("rdma_create_id failed".into()));
            }

            let ip = CString::new(config.remote_addr.ip().to_string())
                .map_err(|_| Error::InvalidConfig("remote ip contains NUL".into()))?;
            let port = CString::new(config.remote_addr.port().to_string()).unwrap();

            let mut hints: addrinfo = unsafe { std::mem::zeroed() };
            let mut res: *mut rdma_addrinfo = ptr::null_mut();
            hints.ai_port_space = rdma_port_space::RDMA_PS_TCP as i32;
            // SAFETY: `rdma_getaddrinfo` resolves `ip`/`port` into `res`,
            // which we free below once route resolution has consumed it.
            let rc = unsafe {
                rdma_getaddrinfo(ip.as_ptr() as *mut i8, port.as_ptr() as *mut i8, ptr::null(), &mut res)
            };
            if rc != 0 {
                unsafe { rdma_destroy_id(id) };
                return Err(Error::ResourceError("rdma_getaddrinfo failed".into()));
            }

            // SAFETY: `id` and the resolved `res` are both valid for the
            // duration of this call; a 2s timeout matches the library's
            // default connect-phase deadline.
            let rc = unsafe { rdma_resolve_addr(id, ptr::null_mut(), (*res).ai_dst_addr, 2000) };
            unsafe { rdma_freeaddrinfo(res) };
            if rc != 0 {
                unsafe { rdma_destroy_id(id) };
                return Err(Error::ResourceError("rdma_resolve_addr failed".into()));
            }
            // SAFETY: route resolution follows address resolution on the
            // same `id`, per the rdmacm connection protocol.
            if unsafe { rdma_resolve_route(id, 2000) } != 0 {
                unsafe { rdma_destroy_id(id) };
                return Err(Error::ResourceError("rdma_resolve_route failed".into()));
            }

            // SAFETY: `(*id).verbs` is populated once route resolution
            // completes; `ibv_alloc_pd` borrows that device context.
            let pd = unsafe { ibv_alloc_pd((*id).verbs) };
            if pd.is_null() {
                unsafe { rdma_destroy_id(id) };
                return Err(Error::ResourceError("ibv_alloc_pd failed".into()));
            }
            let cq_depth = super::qp_caps(config.buffer_count).max_send_wr + super::qp_caps(config.buffer_count).max_recv_wr;
            // SAFETY: CQ-poll-only mode (no completion channel) for lowest latency.
            let cq = unsafe { ibv_create_cq((*id).verbs, cq_depth as i32, ptr::null_mut(), ptr::null_mut(), 0) };
            if cq.is_null() {
                unsafe {
                    ibv_dealloc_pd(pd);
                    rdma_destroy_id(id);
                }
                return Err(Error::ResourceError("ibv_create_cq failed".into()));
            }

            let caps = super::qp_caps(config.buffer_count);
            let mut qp_attr: ibv_qp_init_attr = unsafe { std::mem::zeroed() };
            qp_attr.send_cq = cq;
            qp_attr.recv_cq = cq;
            qp_attr.qp_type = ibv_qp_type::IBV_QPT_RC;
            qp_attr.cap.max_send_wr = caps.max_send_wr;
            qp_attr.cap.max_recv_wr = caps.max_recv_wr;
            qp_attr.cap.max_send_sge = 1;
            qp_attr.cap.max_recv_sge = 1;
            qp_attr.cap.max_inline_data = caps.max_inline_data;
            // SAFETY: `rdma_create_qp` binds the QP to `id`'s connection
            // and to the PD/CQ configured above.
            if unsafe { rdma_create_qp(id, pd, &mut qp_attr) } != 0 {
                unsafe {
                    ibv_destroy_cq(cq);
                    ibv_dealloc_pd(pd);
                    rdma_destroy_id(id);
                }
                return Err(Error::ResourceError("rdma_create_qp failed".into()));
            }
            let qp = unsafe { (*id).qp };

            let mut conn_param: rdma_conn_param = unsafe { std::mem::zeroed() };
            conn_param.initiator_depth = 1;
            conn_param.responder_resources = 1;
            conn_param.retry_count = 7;
            // SAFETY: `id` now owns a bound QP; `rdma_connect` initiates
            // the RC handshake and blocks until ESTABLISHED or an error.
            if unsafe { rdma_connect(id, &mut conn_param) } != 0 {
                return Err(Error::Disconnected);
            }

            Ok(Self { id, pd, cq, qp })
        }

        /// Posts one recv WR per expected control-message slot, matching
        /// spec §4.4 connection step 4.
        pub fn post_initial_recvs(&self, count: u16) -> Result<()> {
            for i in 0..count {
                let mut wr: ibv_recv_wr = unsafe { std::mem::zeroed() };
                wr.wr_id = u64::from(i);
                let mut bad_wr: *mut ibv_recv_wr = ptr::null_mut();
                // SAFETY: `self.qp` is a live QP from `connect`; an empty
                // recv WR (no sge) is valid when control messages are
                // delivered inline via the peer's SEND.
                let rc = unsafe { ibv_post_recv(self.qp, &mut wr, &mut bad_wr) };
                if rc != 0 {
                    return Err(Error::ResourceError(format!("ibv_post_recv failed: {rc}")));
                }
            }
            Ok(())
        }
    }

    impl Drop for VerbsResources {
        fn drop(&mut self) {
            // SAFETY: destroyed in reverse dependency order: QP (via the
            // cm id), then CQ, then PD, then the cm id itself, matching
            // the library's teardown sequencing.
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
                if !self.id.is_null() {
                    rdma_destroy_id(self.id);
                }
            }
            let _ = self.qp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qp_caps_double_the_buffer_count() {
        let caps = qp_caps(8);
        assert_eq!(caps.max_send_wr, 16);
        assert_eq!(caps.max_recv_wr, 16);
        assert_eq!(caps.max_inline_data as usize, CONTROL_MSG_LEN);
    }

    #[cfg(not(feature = "rdma"))]
    #[test]
    fn connect_without_rdma_feature_is_not_supported() {
        let config = TxConfig {
            name: "tx0".into(),
            remote_addr: "127.0.0.1:20000".parse().unwrap(),
            buffer_count: 4,
            buffer_capacity: 4096,
        };
        let stats = Stats::new();
        assert!(matches!(TxTransport::connect(config, stats), Err(Error::NotSupported)));
    }
}
