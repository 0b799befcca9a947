//! Ethernet II framing: a 14-byte header (dst MAC, src MAC, EtherType) around an
//! opaque payload.

use crate::error::FrameError;

pub const HEADER_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtherType(pub u16);

impl EtherType {
    pub const IPV4: EtherType = EtherType(0x0800);
    pub const ARP: EtherType = EtherType(0x0806);
}

/// A parsed, borrowed view over an Ethernet II frame.
#[derive(Debug, Clone, Copy)]
pub struct EthernetFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> EthernetFrame<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::TooShort {
                need: HEADER_LEN,
                have: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    pub fn dest_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.bytes[0..6]);
        MacAddr(mac)
    }

    pub fn src_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.bytes[6..12]);
        MacAddr(mac)
    }

    pub fn ethertype(&self) -> EtherType {
        EtherType(u16::from_be_bytes([self.bytes[12], self.bytes[13]]))
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[HEADER_LEN..]
    }
}

/// Builds an Ethernet II frame around an already-encoded payload.
pub struct EthernetFrameBuilder<'a> {
    pub dest_mac: MacAddr,
    pub src_mac: MacAddr,
    pub ethertype: EtherType,
    pub payload: &'a [u8],
}

impl EthernetFrameBuilder<'_> {
    pub fn build_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.dest_mac.0);
        out.extend_from_slice(&self.src_mac.0);
        out.extend_from_slice(&self.ethertype.0.to_be_bytes());
        out.extend_from_slice(self.payload);
        out
    }
}
