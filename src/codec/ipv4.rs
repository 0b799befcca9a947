//! IPv4 headers, 20 bytes, no options.

use std::net::Ipv4Addr;

use crate::codec::checksum::ipv4_header_checksum;
use crate::error::FrameError;

pub const HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Protocol(pub u8);

impl Ipv4Protocol {
    pub const UDP: Ipv4Protocol = Ipv4Protocol(17);
    pub const TCP: Ipv4Protocol = Ipv4Protocol(6);
}

#[derive(Debug, Clone, Copy)]
pub struct Ipv4Packet<'a> {
    bytes: &'a [u8],
}

impl<'a> Ipv4Packet<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::TooShort {
                need: HEADER_LEN,
                have: bytes.len(),
            });
        }
        let ihl = (bytes[0] & 0x0F) as usize * 4;
        if ihl != HEADER_LEN {
            return Err(FrameError::Ipv4OptionsUnsupported);
        }
        Ok(Self { bytes })
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    pub fn protocol(&self) -> Ipv4Protocol {
        Ipv4Protocol(self.bytes[9])
    }

    pub fn header_checksum(&self) -> u16 {
        u16::from_be_bytes([self.bytes[10], self.bytes[11]])
    }

    pub fn src_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.bytes[12], self.bytes[13], self.bytes[14], self.bytes[15])
    }

    pub fn dst_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.bytes[16], self.bytes[17], self.bytes[18], self.bytes[19])
    }

    pub fn payload(&self) -> &'a [u8] {
        let total = self.total_length() as usize;
        let avail = self.bytes.len();
        &self.bytes[HEADER_LEN..total.min(avail)]
    }
}

pub struct Ipv4PacketBuilder<'a> {
    pub dscp_ecn: u8,
    pub identification: u16,
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: Ipv4Protocol,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub options: &'a [u8],
    pub payload: &'a [u8],
}

impl Ipv4PacketBuilder<'_> {
    pub fn build_vec(&self) -> Result<Vec<u8>, FrameError> {
        if !self.options.is_empty() {
            return Err(FrameError::Ipv4OptionsUnsupported);
        }
        let total_len = HEADER_LEN + self.payload.len();
        let mut out = vec![0u8; HEADER_LEN];
        out[0] = 0x45; // version 4, IHL 5 words
        out[1] = self.dscp_ecn;
        out[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        out[4..6].copy_from_slice(&self.identification.to_be_bytes());
        out[6..8].copy_from_slice(&self.flags_fragment.to_be_bytes());
        out[8] = self.ttl;
        out[9] = self.protocol.0;
        out[10..12].copy_from_slice(&[0, 0]);
        out[12..16].copy_from_slice(&self.src_ip.octets());
        out[16..20].copy_from_slice(&self.dst_ip.octets());
        let cksum = ipv4_header_checksum(&out);
        out[10..12].copy_from_slice(&cksum.to_be_bytes());
        out.extend_from_slice(self.payload);
        Ok(out)
    }
}
