//! UDP datagrams, 8-byte header.

use std::net::Ipv4Addr;

use crate::codec::checksum::tcp_udp_checksum;
use crate::error::FrameError;

pub const HEADER_LEN: usize = 8;
const PROTO_UDP: u8 = 17;

#[derive(Debug, Clone, Copy)]
pub struct UdpPacket<'a> {
    bytes: &'a [u8],
}

impl<'a> UdpPacket<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::TooShort {
                need: HEADER_LEN,
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

    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.bytes[4], self.bytes[5]])
    }

    pub fn payload(&self) -> &'a [u8] {
        let len = self.length() as usize;
        &self.bytes[HEADER_LEN..len.max(HEADER_LEN).min(self.bytes.len())]
    }
}

pub struct UdpPacketBuilder<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: &'a [u8],
}

impl UdpPacketBuilder<'_> {
    pub fn build_vec(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Result<Vec<u8>, FrameError> {
        let len = HEADER_LEN + self.payload.len();
        let mut out = vec![0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        out[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        out[4..6].copy_from_slice(&(len as u16).to_be_bytes());
        out[6..8].copy_from_slice(&[0, 0]);
        out.extend_from_slice(self.payload);
        let cksum = tcp_udp_checksum(src_ip, dst_ip, PROTO_UDP, &out);
        out[6..8].copy_from_slice(&cksum.to_be_bytes());
        Ok(out)
    }
}
