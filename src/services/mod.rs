//! The ARP responder, DHCP server, and TCP translator that give the guest a
//! synthetic LAN instead of a real one. Each is a free-function set operating
//! on `&mut Card`; none owns its socket lifecycle beyond the one `VirtualTcp`
//! singleton already in the data model.

pub mod arp;
pub mod dhcp;
pub mod tcp;

use crate::card::Card;
use crate::codec::ethernet::{EtherType, EthernetFrame, MacAddr};
use crate::codec::ipv4::{Ipv4Packet, Ipv4Protocol};
use crate::codec::udp::UdpPacket;
use crate::constants::VIRTUAL_GATEWAY_IP;
use std::net::Ipv4Addr;

/// Dispatches a raw Ethernet frame handed to MAC-raw socket 0 by the guest's
/// `SEND` command to whichever service understands it; unrecognized traffic
/// is silently dropped.
pub fn handle_macraw_send(card: &mut Card, idx: usize, frame: &[u8]) {
    let Ok(eth) = EthernetFrame::parse(frame) else {
        return;
    };
    match eth.ethertype() {
        EtherType::ARP => arp::handle_request(card, idx, eth.payload()),
        EtherType::IPV4 => handle_ipv4(card, idx, eth.src_mac(), eth.payload()),
        _ => {}
    }
}

/// Invoked on every status read of the MAC-raw socket: polls the translated
/// host TCP socket for unsolicited data even when the guest hasn't just sent
/// anything.
pub fn poll_macraw(card: &mut Card, idx: usize) {
    tcp::poll_unsolicited(card, idx);
}

fn handle_ipv4(card: &mut Card, idx: usize, src_mac: MacAddr, payload: &[u8]) {
    let Ok(ip) = Ipv4Packet::parse(payload) else {
        return;
    };
    match ip.protocol() {
        Ipv4Protocol::UDP => {
            let Ok(udp) = UdpPacket::parse(ip.payload()) else {
                return;
            };
            if udp.src_port() == 68 && udp.dst_port() == 67 {
                dhcp::handle_datagram(card, idx, &ip, &udp);
            }
        }
        Ipv4Protocol::TCP => {
            let gateway = Ipv4Addr::from(VIRTUAL_GATEWAY_IP);
            let redirect_subnet = matches!(ip.dst_ip().octets(), [192, 168, 64 | 65, _]);
            if ip.dst_ip() == gateway || redirect_subnet {
                tcp::handle_segment(card, idx, src_mac, &ip);
            }
        }
        _ => {}
    }
}
