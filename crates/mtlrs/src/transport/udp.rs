// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP/RTP transport for the ST 2110-40 ancillary-data RX path (spec §4.2,
//! §5 "each transport interface owns one polling thread").
//!
//! A dedicated thread owns a non-blocking UDP socket and an `mio::Poll`
//! instance; on readability it drains the socket into an [`Assembler`] and
//! hands completed frames across a bounded `crossbeam` channel to whatever
//! consumes them (typically a loop calling `Session::put_frame`). This is
//! the non-RDMA counterpart to [`super::rdma`]: the assembler and session
//! pool contract are identical, only the wire carrier differs.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, warn};
use mio::net::UdpSocket as MioUdpSocket;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{Error, Result};
use crate::frame_info::FrameInfo;
use crate::st40::{Assembler, AssemblerConfig};
use crate::stats::Stats;

const SOCK_TOKEN: Token = Token(0);
const MAX_EVENTS: usize = 16;
const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const RECV_BUF_LEN: usize = 2048;

/// Configuration for one UDP RX listener.
#[derive(Debug, Clone)]
pub struct UdpRxConfig {
    pub bind_addr: SocketAddr,
    pub recv_buffer_bytes: usize,
    pub assembler: AssemblerConfig,
}

/// Owns the poll thread; dropping it joins the thread after signalling stop.
pub struct UdpRxTransport {
    frames: Receiver<FrameInfo>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl UdpRxTransport {
    /// Binds the socket, applies `SO_RCVBUF`, and spawns the poll thread.
    pub fn spawn(config: UdpRxConfig, stats: Arc<Stats>) -> Result<Self> {
        let socket =
            Socket::new(Domain::for_address(config.bind_addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        if config.recv_buffer_bytes > 0 {
            let _ = socket.set_recv_buffer_size(config.recv_buffer_bytes);
        }
        socket.bind(&config.bind_addr.into())?;
        let std_socket: std::net::UdpSocket = socket.into();
        let mut mio_socket = MioUdpSocket::from_std(std_socket);

        let poll = Poll::new()?;
        poll.registry().register(&mut mio_socket, SOCK_TOKEN, Interest::READABLE)?;

        let (tx, rx) = bounded(config.assembler.port_count.max(1) * 4);
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = running.clone();
        let bind_addr = config.bind_addr;

        let handle = thread::Builder::new()
            .name(format!("mtlrs-udp-rx-{bind_addr}"))
            .spawn(move || run_poll_loop(poll, mio_socket, config.assembler, stats, tx, running_thread))
            .map_err(|e| Error::ResourceError(e.to_string()))?;

        Ok(Self { frames: rx, running, handle: Some(handle) })
    }

    /// Non-blocking pull of the next completed frame, if any has arrived.
    pub fn try_recv_frame(&self) -> Option<FrameInfo> {
        self.frames.try_recv().ok()
    }

    /// Blocking pull with a deadline, for consumers that want to park.
    pub fn recv_frame_timeout(&self, timeout: Duration) -> Option<FrameInfo> {
        self.frames.recv_timeout(timeout).ok()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for UdpRxTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_poll_loop(
    mut poll: Poll,
    socket: MioUdpSocket,
    assembler_config: AssemblerConfig,
    stats: Arc<Stats>,
    frames: Sender<FrameInfo>,
    running: Arc<AtomicBool>,
) {
    let mut assembler = Assembler::new(assembler_config);
    let mut events = Events::with_capacity(MAX_EVENTS);
    let mut buf = vec![0u8; RECV_BUF_LEN];

    while running.load(Ordering::Acquire) {
        if let Err(e) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            warn!("udp rx poll error: {e}");
            break;
        }
        for event in events.iter() {
            if event.token() != SOCK_TOKEN || !event.is_readable() {
                continue;
            }
            loop {
                match socket.recv_from(&mut buf) {
                    Ok((n, _peer)) => {
                        let tai_rx_ns = 0; // a real deployment timestamps at NIC RX; elided here.
                        if let Some(frame) = assembler.ingest_packet(&buf[..n], 0, tai_rx_ns, &stats) {
                            if frames.try_send(frame).is_err() {
                                stats.inc_frames_dropped();
                                debug!("udp rx frame channel full, dropping completed frame");
                            }
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        warn!("udp rx recv_from error: {e}");
                        break;
                    }
                }
            }
        }
    }
}
