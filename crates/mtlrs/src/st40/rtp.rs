// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RFC 3550 / RFC 8331 wire parsing for ST 2110-40 ancillary data.
//!
//! Bit layouts are grounded in the original library's
//! `st40_rfc8331_rtp_hdr` / `st40_rfc8331_payload_hdr` structures: a base
//! RTP header, an extended sequence number, a payload length, a one-word
//! packet-count/field header, then one 10-byte meta header per ANC packet
//! followed by its packed 10-bit UDW stream.

use crate::error::{Error, Result};
use crate::frame_info::AncMeta;

/// Size of the RFC 3550 base RTP header, in bytes.
pub const RTP_BASE_HDR_LEN: usize = 12;
/// Size of the ST 2110-40 extension (ext seq + length + packet-count word), in bytes.
pub const ST40_HDR_EXT_LEN: usize = 8;
/// Size of one ANC packet's RFC 8331 meta header, in bytes.
pub const ANC_META_HDR_LEN: usize = 8;

/// Parsed RFC 3550 base RTP header fields relevant to ST 2110-40 reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub seq_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

/// Parsed ST 2110-40 / RFC 8331 payload header (the packet-count/field word).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rfc8331Header {
    pub rtp: RtpHeader,
    pub seq_number_ext: u16,
    pub length: u16,
    pub anc_count: u8,
    /// Raw 2-bit field indicator: 0 = progressive/first field, 1/2/3 = field id.
    pub field: u8,
}

impl Rfc8331Header {
    /// The 32-bit extended sequence number (spec §4.2), combining the base
    /// RTP sequence number with the ST 2110-40 16-bit extension.
    pub fn extended_seq(&self) -> u32 {
        (u32::from(self.seq_number_ext) << 16) | u32::from(self.rtp.seq_number)
    }
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Parses the RFC 3550 base header out of `pkt`.
pub fn parse_rtp_header(pkt: &[u8]) -> Result<RtpHeader> {
    if pkt.len() < RTP_BASE_HDR_LEN {
        return Err(Error::ResourceError("rtp packet shorter than base header".into()));
    }
    let b0 = pkt[0];
    let version = b0 >> 6;
    if version != 2 {
        return Err(Error::ResourceError(format!("unsupported rtp version {version}")));
    }
    let b1 = pkt[1];
    Ok(RtpHeader {
        marker: (b1 & 0x80) != 0,
        payload_type: b1 & 0x7f,
        seq_number: read_u16(pkt, 2),
        timestamp: read_u32(pkt, 4),
        ssrc: read_u32(pkt, 8),
    })
}

/// Parses the full RFC 8331 header (base RTP header plus the ST 2110-40 extension).
pub fn parse_rfc8331_header(pkt: &[u8]) -> Result<Rfc8331Header> {
    let rtp = parse_rtp_header(pkt)?;
    if pkt.len() < RTP_BASE_HDR_LEN + ST40_HDR_EXT_LEN {
        return Err(Error::ResourceError("rtp packet shorter than st40 extension".into()));
    }
    let seq_number_ext = read_u16(pkt, RTP_BASE_HDR_LEN);
    let length = read_u16(pkt, RTP_BASE_HDR_LEN + 2);
    let word = read_u32(pkt, RTP_BASE_HDR_LEN + 4);
    let anc_count = ((word >> 24) & 0xff) as u8;
    let field = ((word >> 22) & 0x3) as u8;
    Ok(Rfc8331Header { rtp, seq_number_ext, length, anc_count, field })
}

/// Serializes an RFC 3550 + ST 2110-40 extension header into the first 20
/// bytes of `out` (`out` must be at least `RTP_BASE_HDR_LEN +
/// ST40_HDR_EXT_LEN` bytes).
pub fn write_rfc8331_header(out: &mut [u8], hdr: &Rfc8331Header) {
    assert!(out.len() >= RTP_BASE_HDR_LEN + ST40_HDR_EXT_LEN);
    out[0] = 0x80; // version 2, no padding/extension/csrc
    out[1] = (hdr.rtp.payload_type & 0x7f) | if hdr.rtp.marker { 0x80 } else { 0 };
    out[2..4].copy_from_slice(&hdr.rtp.seq_number.to_be_bytes());
    out[4..8].copy_from_slice(&hdr.rtp.timestamp.to_be_bytes());
    out[8..12].copy_from_slice(&hdr.rtp.ssrc.to_be_bytes());
    out[12..14].copy_from_slice(&hdr.seq_number_ext.to_be_bytes());
    out[14..16].copy_from_slice(&hdr.length.to_be_bytes());
    let word = (u32::from(hdr.anc_count) << 24) | (u32::from(hdr.field & 0x3) << 22);
    out[16..20].copy_from_slice(&word.to_be_bytes());
}

/// Even-parity bits for a 10-bit SMPTE 291 word (spec §4.2).
///
/// Bit 8 is the even parity of data bits 0-7 and bit 9 is its complement,
/// following SMPTE 291's "parity, not-parity" convention so any single-bit
/// flip anywhere in the 10-bit word is detectable.
pub fn add_parity_bits(data8: u16) -> u16 {
    let d = data8 & 0xff;
    let b8 = (d.count_ones() % 2) as u16;
    let b9 = 1 - b8;
    d | (b8 << 8) | (b9 << 9)
}

/// Validates a 10-bit word's parity pair, returning the unwrapped 8-bit
/// data value on success.
pub fn check_parity_bits(word10: u16) -> Result<u8> {
    let d = word10 & 0xff;
    let b8 = (word10 >> 8) & 1;
    let b9 = (word10 >> 9) & 1;
    let parity = (d.count_ones() % 2) as u16;
    if b8 != parity || b9 != (1 - b8) {
        return Err(Error::ParityFailure);
    }
    Ok(d as u8)
}

/// Parses one ANC meta header (8 bytes) at `pkt[off..]`, per the RFC 8331
/// layout: word0 = C(1) LineNumber(11) HorizontalOffset(12) S(1)
/// StreamNum(7); word1 = DID(10, parity-protected) SDID(10,
/// parity-protected) DataCount(10, parity-protected) + 2 reserved bits.
pub fn parse_anc_meta_header(pkt: &[u8], off: usize) -> Result<(AncMeta, usize)> {
    if pkt.len() < off + ANC_META_HDR_LEN {
        return Err(Error::ResourceError("truncated anc meta header".into()));
    }
    let word0 = read_u32(pkt, off);
    let c = ((word0 >> 31) & 1) != 0;
    let line_number = ((word0 >> 20) & 0x7ff) as u16;
    let horizontal_offset = ((word0 >> 8) & 0xfff) as u16;
    let s = ((word0 >> 7) & 1) != 0;
    let stream_num = (word0 & 0x7f) as u8;

    let word1 = read_u32(pkt, off + 4);
    let did10 = ((word1 >> 22) & 0x3ff) as u16;
    let sdid10 = ((word1 >> 12) & 0x3ff) as u16;
    let data_count10 = ((word1 >> 2) & 0x3ff) as u16;

    let did = check_parity_bits(did10)?;
    let sdid = check_parity_bits(sdid10)?;
    let data_count = check_parity_bits(data_count10)?;

    Ok((
        AncMeta {
            c,
            line_number,
            horizontal_offset,
            s,
            stream_num,
            did,
            sdid,
            udw_size: data_count,
            udw_offset: 0,
        },
        off + ANC_META_HDR_LEN,
    ))
}

/// Serializes one ANC meta header, mirroring [`parse_anc_meta_header`].
pub fn write_anc_meta_header(out: &mut [u8], off: usize, meta: &AncMeta) {
    assert!(out.len() >= off + ANC_META_HDR_LEN);
    let word0 = ((meta.c as u32) << 31)
        | (u32::from(meta.line_number & 0x7ff) << 20)
        | (u32::from(meta.horizontal_offset & 0xfff) << 8)
        | ((meta.s as u32) << 7)
        | u32::from(meta.stream_num & 0x7f);
    out[off..off + 4].copy_from_slice(&word0.to_be_bytes());

    let did10 = add_parity_bits(u16::from(meta.did));
    let sdid10 = add_parity_bits(u16::from(meta.sdid));
    let dc10 = add_parity_bits(u16::from(meta.udw_size));
    let word1 = (u32::from(did10) << 22) | (u32::from(sdid10) << 12) | (u32::from(dc10) << 2);
    out[off + 4..off + 8].copy_from_slice(&word1.to_be_bytes());
}

/// Unpacks `count` 10-bit UDWs from a bit-packed big-endian stream starting
/// at bit offset `bit_off` in `pkt`, validating parity on each word and
/// returning the unwrapped 8-bit data bytes.
pub fn unpack_udws(pkt: &[u8], bit_off: usize, count: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let start_bit = bit_off + i * 10;
        let word = read_bits_be(pkt, start_bit, 10)?;
        out.push(check_parity_bits(word)?);
    }
    Ok(out)
}

/// Packs `udws` as 10-bit parity-protected words into a big-endian bitstream.
pub fn pack_udws(udws: &[u8]) -> Vec<u8> {
    let total_bits = udws.len() * 10;
    let mut out = vec![0u8; total_bits.div_ceil(8)];
    for (i, &byte) in udws.iter().enumerate() {
        let word10 = add_parity_bits(u16::from(byte));
        write_bits_be(&mut out, i * 10, 10, word10);
    }
    out
}

fn read_bits_be(buf: &[u8], bit_off: usize, nbits: usize) -> Result<u16> {
    if (bit_off + nbits).div_ceil(8) > buf.len() {
        return Err(Error::ResourceError("udw bitstream truncated".into()));
    }
    let mut value: u32 = 0;
    for i in 0..nbits {
        let bit = bit_off + i;
        let byte = buf[bit / 8];
        let b = (byte >> (7 - (bit % 8))) & 1;
        value = (value << 1) | u32::from(b);
    }
    Ok(value as u16)
}

fn write_bits_be(buf: &mut [u8], bit_off: usize, nbits: usize, value: u16) {
    for i in 0..nbits {
        let bit = bit_off + i;
        let b = (value >> (nbits - 1 - i)) & 1;
        if b != 0 {
            buf[bit / 8] |= 1 << (7 - (bit % 8));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_round_trips_all_byte_values() {
        for v in 0u16..=255 {
            let w = add_parity_bits(v);
            assert_eq!(check_parity_bits(w).unwrap(), v as u8, "v={v}");
        }
    }

    #[test]
    fn parity_detects_single_bit_flip() {
        let w = add_parity_bits(0x55);
        for bit in 0..9 {
            let flipped = w ^ (1 << bit);
            assert!(check_parity_bits(flipped).is_err(), "bit {bit}");
        }
    }

    #[test]
    fn udw_pack_unpack_round_trip() {
        let udws: Vec<u8> = (0..=255u8).collect();
        let packed = pack_udws(&udws);
        let unpacked = unpack_udws(&packed, 0, udws.len()).unwrap();
        assert_eq!(unpacked, udws);
    }

    #[test]
    fn anc_meta_header_round_trip() {
        let meta = AncMeta {
            c: true,
            line_number: 9,
            horizontal_offset: 0,
            s: false,
            stream_num: 0,
            did: 0x61,
            sdid: 0x01,
            udw_size: 8,
            udw_offset: 0,
        };
        let mut buf = [0u8; ANC_META_HDR_LEN];
        write_anc_meta_header(&mut buf, 0, &meta);
        let (parsed, next) = parse_anc_meta_header(&buf, 0).unwrap();
        assert_eq!(next, ANC_META_HDR_LEN);
        assert_eq!(parsed.c, meta.c);
        assert_eq!(parsed.line_number, meta.line_number);
        assert_eq!(parsed.did, meta.did);
        assert_eq!(parsed.sdid, meta.sdid);
        assert_eq!(parsed.udw_size, meta.udw_size);
    }

    #[test]
    fn rfc8331_header_round_trip() {
        let hdr = Rfc8331Header {
            rtp: RtpHeader { marker: true, payload_type: 113, seq_number: 100, timestamp: 90000, ssrc: 0xdead_beef },
            seq_number_ext: 0,
            length: 42,
            anc_count: 3,
            field: 1,
        };
        let mut buf = [0u8; RTP_BASE_HDR_LEN + ST40_HDR_EXT_LEN];
        write_rfc8331_header(&mut buf, &hdr);
        let parsed = parse_rfc8331_header(&buf).unwrap();
        assert_eq!(parsed, hdr);
        assert_eq!(parsed.extended_seq(), 100);
    }

    #[test]
    fn short_packet_is_rejected() {
        assert!(parse_rtp_header(&[0u8; 4]).is_err());
    }
}
