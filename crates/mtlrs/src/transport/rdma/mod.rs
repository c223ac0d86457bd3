// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RDMA framed transport (spec §4.4): connection establishment, zero-copy
//! buffer exchange over reliable-connection queue pairs, and completion
//! queue polling.

pub mod buffer;
pub mod message;
pub mod poll;
pub mod rx;
pub mod tx;

pub use buffer::{BufferDescriptor, BufferStatus, RxBufferSlot, TxBufferSlot};
pub use message::Message;
pub use rx::{RxConfig, RxTransport};
pub use tx::{TxConfig, TxTransport};
