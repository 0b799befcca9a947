//! TCP segments, 20-byte header, no options.

use std::net::Ipv4Addr;
use std::ops::BitOr;

use crate::codec::checksum::tcp_udp_checksum;
use crate::error::FrameError;

pub const HEADER_LEN: usize = 20;
const PROTO_TCP: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(0x01);
    pub const SYN: TcpFlags = TcpFlags(0x02);
    pub const RST: TcpFlags = TcpFlags(0x04);
    pub const PSH: TcpFlags = TcpFlags(0x08);
    pub const ACK: TcpFlags = TcpFlags(0x10);

    pub fn contains(&self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TcpFlags {
    type Output = TcpFlags;
    fn bitor(self, rhs: TcpFlags) -> TcpFlags {
        TcpFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TcpSegment<'a> {
    bytes: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::TooShort {
                need: HEADER_LEN,
                have: bytes.len(),
            });
        }
        let data_offset = ((bytes[12] >> 4) as usize) * 4;
        if data_offset > bytes.len() {
            return Err(FrameError::TooShort {
                need: data_offset,
                have: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    pub fn seq_number(&self) -> u32 {
        u32::from_be_bytes([self.bytes[4], self.bytes[5], self.bytes[6], self.bytes[7]])
    }

    pub fn ack_number(&self) -> u32 {
        u32::from_be_bytes([
            self.bytes[8],
            self.bytes[9],
            self.bytes[10],
            self.bytes[11],
        ])
    }

    fn data_offset(&self) -> usize {
        ((self.bytes[12] >> 4) as usize) * 4
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags(self.bytes[13])
    }

    pub fn window_size(&self) -> u16 {
        u16::from_be_bytes([self.bytes[14], self.bytes[15]])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[self.data_offset()..]
    }
}

pub struct TcpSegmentBuilder<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_number: u32,
    pub ack_number: u32,
    pub flags: TcpFlags,
    pub window_size: u16,
    pub urgent_pointer: u16,
    pub options: &'a [u8],
    pub payload: &'a [u8],
}

impl TcpSegmentBuilder<'_> {
    pub fn build_vec(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Result<Vec<u8>, FrameError> {
        if !self.options.is_empty() {
            return Err(FrameError::Ipv4OptionsUnsupported);
        }
        let mut out = vec![0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        out[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        out[4..8].copy_from_slice(&self.seq_number.to_be_bytes());
        out[8..12].copy_from_slice(&self.ack_number.to_be_bytes());
        out[12] = ((HEADER_LEN / 4) as u8) << 4;
        out[13] = self.flags.0;
        out[14..16].copy_from_slice(&self.window_size.to_be_bytes());
        out[16..18].copy_from_slice(&[0, 0]); // checksum, filled below
        out[18..20].copy_from_slice(&self.urgent_pointer.to_be_bytes());
        out.extend_from_slice(self.payload);
        let cksum = tcp_udp_checksum(src_ip, dst_ip, PROTO_TCP, &out);
        out[16..18].copy_from_slice(&cksum.to_be_bytes());
        Ok(out)
    }
}
