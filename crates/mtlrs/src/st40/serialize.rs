// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame-info output serializers (spec §4.2 "Output formats").

use crate::error::{Error, Result};
use crate::frame_info::{AncMeta, FrameInfo};

/// Concatenates the UDW regions of every meta, in meta order.
///
/// Since `FrameInfo::udw` is already the meta-ordered concatenation that
/// `try_append` builds incrementally, this is just a clone of the buffer.
pub fn serialize_raw_udw(frame: &FrameInfo) -> Vec<u8> {
    frame.udw.clone()
}

/// Re-serializes a frame-info into a self-describing byte stream: for each
/// meta, a 9-byte header (line number big-endian, horizontal offset
/// big-endian, a C/S flags byte, a full 7-bit stream-number byte, DID,
/// SDID, UDW size byte) followed by its UDW bytes.
///
/// `stream_num` gets its own byte rather than sharing one with C/S (the
/// original library's RFC 8331 wire header packs C/line_number/
/// horizontal_offset/S/stream_num into a single bitstream; this
/// byte-aligned re-serialization keeps the full 7-bit range instead of
/// reproducing that packing, so it never truncates a value the wire
/// format itself can carry).
///
/// Fails with [`Error::NotSupported`] if any meta's UDW size exceeds 255
/// bytes (spec §4.2).
pub fn serialize_rfc8331(frame: &FrameInfo) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(9 * frame.meta.len() + frame.udw.len());
    for meta in &frame.meta {
        if meta.udw_size as usize > 255 {
            return Err(Error::NotSupported);
        }
        write_meta_record(&mut out, meta);
        let start = meta.udw_offset as usize;
        let end = start + meta.udw_size as usize;
        out.extend_from_slice(&frame.udw[start..end]);
    }
    Ok(out)
}

fn write_meta_record(out: &mut Vec<u8>, meta: &AncMeta) {
    out.extend_from_slice(&meta.line_number.to_be_bytes());
    out.extend_from_slice(&meta.horizontal_offset.to_be_bytes());
    let flags = ((meta.c as u8) << 7) | ((meta.s as u8) << 6);
    out.push(flags);
    out.push(meta.stream_num & 0x7f);
    out.push(meta.did);
    out.push(meta.sdid);
    out.push(meta.udw_size);
}

/// Parses the output of [`serialize_rfc8331`] back into meta records and a
/// contiguous UDW buffer, for the round-trip law in spec §8.
pub fn deserialize_rfc8331(bytes: &[u8]) -> Result<(Vec<AncMeta>, Vec<u8>)> {
    let mut metas = Vec::new();
    let mut udw = Vec::new();
    let mut off = 0usize;
    while off < bytes.len() {
        if off + 9 > bytes.len() {
            return Err(Error::ResourceError("truncated meta record".into()));
        }
        let line_number = u16::from_be_bytes([bytes[off], bytes[off + 1]]) & 0x7ff;
        let horizontal_offset = u16::from_be_bytes([bytes[off + 2], bytes[off + 3]]) & 0xfff;
        let flags = bytes[off + 4];
        let c = (flags & 0x80) != 0;
        let s = (flags & 0x40) != 0;
        let stream_num = bytes[off + 5] & 0x7f;
        let did = bytes[off + 6];
        let sdid = bytes[off + 7];
        let udw_size = bytes[off + 8];
        off += 9;

        let udw_end = off + udw_size as usize;
        if udw_end > bytes.len() {
            return Err(Error::ResourceError("truncated udw region".into()));
        }
        let udw_offset = udw.len() as u32;
        udw.extend_from_slice(&bytes[off..udw_end]);
        off = udw_end;

        metas.push(AncMeta {
            c,
            line_number,
            horizontal_offset,
            s,
            stream_num,
            did,
            sdid,
            udw_size,
            udw_offset,
        });
    }
    Ok((metas, udw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> FrameInfo {
        let mut fi = FrameInfo::new(4096, 1);
        fi.try_append(
            AncMeta {
                c: false,
                line_number: 9,
                horizontal_offset: 0,
                s: true,
                stream_num: 3,
                did: 0x61,
                sdid: 0x01,
                udw_size: 0,
                udw_offset: 0,
            },
            &[10, 20, 30],
        );
        fi.try_append(
            AncMeta {
                c: true,
                line_number: 11,
                horizontal_offset: 20,
                s: false,
                stream_num: 0,
                did: 0x60,
                sdid: 0x02,
                udw_size: 0,
                udw_offset: 0,
            },
            &[1],
        );
        fi
    }

    #[test]
    fn raw_udw_is_the_concatenation() {
        let fi = sample_frame();
        assert_eq!(serialize_raw_udw(&fi), vec![10, 20, 30, 1]);
    }

    #[test]
    fn rfc8331_round_trip_preserves_meta_fields() {
        let fi = sample_frame();
        let bytes = serialize_rfc8331(&fi).unwrap();
        let (metas, udw) = deserialize_rfc8331(&bytes).unwrap();
        assert_eq!(metas.len(), fi.meta.len());
        for (parsed, original) in metas.iter().zip(fi.meta.iter()) {
            assert_eq!(parsed.c, original.c);
            assert_eq!(parsed.s, original.s);
            assert_eq!(parsed.line_number, original.line_number);
            assert_eq!(parsed.horizontal_offset, original.horizontal_offset);
            assert_eq!(parsed.stream_num, original.stream_num);
            assert_eq!(parsed.did, original.did);
            assert_eq!(parsed.sdid, original.sdid);
            assert_eq!(parsed.udw_size, original.udw_size);
        }
        assert_eq!(udw, fi.udw);
    }

    #[test]
    fn stream_num_above_six_bits_round_trips_without_truncation() {
        let mut fi = FrameInfo::new(4096, 1);
        fi.try_append(
            AncMeta {
                c: true,
                line_number: 1,
                horizontal_offset: 0,
                s: false,
                stream_num: 0x7f,
                did: 0x61,
                sdid: 0x01,
                udw_size: 0,
                udw_offset: 0,
            },
            &[42],
        );
        let bytes = serialize_rfc8331(&fi).unwrap();
        let (metas, _) = deserialize_rfc8331(&bytes).unwrap();
        assert_eq!(metas[0].stream_num, 0x7f);
    }

    #[test]
    fn empty_frame_serializes_to_nothing() {
        let fi = FrameInfo::new(1024, 1);
        assert!(serialize_raw_udw(&fi).is_empty());
        assert!(serialize_rfc8331(&fi).unwrap().is_empty());
    }
}
