//! ARP (RFC 826), Ethernet/IPv4 variant only: a fixed 28-byte payload behind the
//! Ethernet header.

use std::net::Ipv4Addr;

use crate::codec::ethernet::MacAddr;
use crate::error::FrameError;

pub const PAYLOAD_LEN: usize = 28;

pub const HTYPE_ETHERNET: u16 = 1;
pub const PTYPE_IPV4: u16 = 0x0800;
pub const OP_REQUEST: u16 = 1;
pub const OP_REPLY: u16 = 2;

#[derive(Debug, Clone, Copy)]
pub struct ArpPacket<'a> {
    bytes: &'a [u8],
}

impl<'a> ArpPacket<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() < PAYLOAD_LEN {
            return Err(FrameError::TooShort {
                need: PAYLOAD_LEN,
                have: bytes.len(),
            });
        }
        let hlen = bytes[4];
        let plen = bytes[5];
        if hlen != 6 || plen != 4 {
            return Err(FrameError::BadArpLengths);
        }
        Ok(Self { bytes })
    }

    pub fn operation(&self) -> u16 {
        u16::from_be_bytes([self.bytes[6], self.bytes[7]])
    }

    pub fn sender_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.bytes[8..14]);
        MacAddr(mac)
    }

    pub fn sender_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.bytes[14], self.bytes[15], self.bytes[16], self.bytes[17])
    }

    pub fn target_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.bytes[18..24]);
        MacAddr(mac)
    }

    pub fn target_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.bytes[24], self.bytes[25], self.bytes[26], self.bytes[27])
    }
}

pub struct ArpPacketBuilder {
    pub operation: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacketBuilder {
    pub fn build_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; PAYLOAD_LEN];
        out[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        out[2..4].copy_from_slice(&PTYPE_IPV4.to_be_bytes());
        out[4] = 6;
        out[5] = 4;
        out[6..8].copy_from_slice(&self.operation.to_be_bytes());
        out[8..14].copy_from_slice(&self.sender_mac.0);
        out[14..18].copy_from_slice(&self.sender_ip.octets());
        out[18..24].copy_from_slice(&self.target_mac.0);
        out[24..28].copy_from_slice(&self.target_ip.octets());
        out
    }
}
