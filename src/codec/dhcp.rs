//! BOOTP/DHCP (RFC 2131/2132), the fixed-layout subset used by the virtual DHCP
//! server: the 240-byte BOOTP prefix plus the option TLVs this card
//! understands (53 message type, 54 server id, 1 subnet, 3 router, 6 DNS,
//! 51 lease time, 255 end, 0 pad).

use std::net::Ipv4Addr;

use crate::codec::ethernet::MacAddr;
use crate::error::FrameError;

pub const BOOTP_LEN: usize = 240;
pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
/// DHCP payloads the server injects are zero-padded to at least this size.
pub const MIN_INJECTED_LEN: usize = 300;

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;

pub const OPT_SUBNET_MASK: u8 = 1;
pub const OPT_ROUTER: u8 = 3;
pub const OPT_DNS: u8 = 6;
pub const OPT_LEASE_TIME: u8 = 51;
pub const OPT_MESSAGE_TYPE: u8 = 53;
pub const OPT_SERVER_ID: u8 = 54;
pub const OPT_END: u8 = 255;
pub const OPT_PAD: u8 = 0;

pub const MSG_DISCOVER: u8 = 1;
pub const MSG_OFFER: u8 = 2;
pub const MSG_REQUEST: u8 = 3;
pub const MSG_ACK: u8 = 5;

/// A parsed, borrowed view over a BOOTP/DHCP payload (the UDP payload, not
/// including the Ethernet/IP/UDP headers).
#[derive(Debug, Clone, Copy)]
pub struct DhcpMessage<'a> {
    bytes: &'a [u8],
}

impl<'a> DhcpMessage<'a> {
    /// Parses the fixed BOOTP prefix and confirms the DHCP magic cookie is
    /// present at the documented offset.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() < BOOTP_LEN + MAGIC_COOKIE.len() {
            return Err(FrameError::NotDhcp);
        }
        if bytes[236..240] != MAGIC_COOKIE {
            return Err(FrameError::NotDhcp);
        }
        Ok(Self { bytes })
    }

    pub fn op(&self) -> u8 {
        self.bytes[0]
    }

    pub fn xid(&self) -> [u8; 4] {
        let mut xid = [0u8; 4];
        xid.copy_from_slice(&self.bytes[4..8]);
        xid
    }

    pub fn client_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.bytes[28..34]);
        MacAddr(mac)
    }

    fn options(&self) -> &'a [u8] {
        &self.bytes[BOOTP_LEN..]
    }

    /// Scans the option TLVs for `code`, returning its value bytes. Stops at
    /// `OPT_END`; `OPT_PAD` is a single zero byte with no length field.
    pub fn find_option(&self, code: u8) -> Option<&'a [u8]> {
        let opts = self.options();
        let mut i = 0;
        while i < opts.len() {
            let tag = opts[i];
            if tag == OPT_END {
                break;
            }
            if tag == OPT_PAD {
                i += 1;
                continue;
            }
            if i + 1 >= opts.len() {
                break;
            }
            let len = opts[i + 1] as usize;
            let start = i + 2;
            let end = start + len;
            if end > opts.len() {
                break;
            }
            if tag == code {
                return Some(&opts[start..end]);
            }
            i = end;
        }
        None
    }

    /// The message type carried in option 53. Only DISCOVER and REQUEST are
    /// acted upon by the server.
    pub fn message_type(&self) -> Option<u8> {
        self.find_option(OPT_MESSAGE_TYPE).and_then(|v| v.first().copied())
    }

    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        self.find_option(50).and_then(bytes_to_ipv4)
    }

    pub fn server_id(&self) -> Option<Ipv4Addr> {
        self.find_option(OPT_SERVER_ID).and_then(bytes_to_ipv4)
    }
}

fn bytes_to_ipv4(v: &[u8]) -> Option<Ipv4Addr> {
    if v.len() == 4 {
        Some(Ipv4Addr::new(v[0], v[1], v[2], v[3]))
    } else {
        None
    }
}

/// Builds a BOOTREPLY: the fixed prefix plus the subnet/router/DNS/lease
/// options the virtual DHCP server always offers, zero-padded to
/// `MIN_INJECTED_LEN`.
pub struct DhcpReplyBuilder {
    pub xid: [u8; 4],
    pub client_mac: MacAddr,
    pub your_ip: Ipv4Addr,
    pub server_id: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub router: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub lease_seconds: u32,
    pub message_type: u8,
}

impl DhcpReplyBuilder {
    pub fn build_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; BOOTP_LEN];
        out[0] = BOOTREPLY;
        out[1] = 1; // htype: Ethernet
        out[2] = 6; // hlen
        out[3] = 0; // hops
        out[4..8].copy_from_slice(&self.xid);
        out[16..20].copy_from_slice(&self.your_ip.octets());
        out[20..24].copy_from_slice(&self.server_id.octets());
        out[28..34].copy_from_slice(&self.client_mac.0);
        out[236..240].copy_from_slice(&MAGIC_COOKIE);

        push_opt(&mut out, OPT_MESSAGE_TYPE, &[self.message_type]);
        push_opt(&mut out, OPT_SERVER_ID, &self.server_id.octets());
        push_opt(&mut out, OPT_SUBNET_MASK, &self.subnet.octets());
        push_opt(&mut out, OPT_ROUTER, &self.router.octets());
        push_opt(&mut out, OPT_DNS, &self.dns.octets());
        push_opt(&mut out, OPT_LEASE_TIME, &self.lease_seconds.to_be_bytes());
        out.push(OPT_END);

        if out.len() < MIN_INJECTED_LEN {
            out.resize(MIN_INJECTED_LEN, 0);
        }
        out
    }
}

fn push_opt(out: &mut Vec<u8>, code: u8, value: &[u8]) {
    out.push(code);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
}
