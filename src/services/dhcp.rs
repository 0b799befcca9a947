//! Virtual DHCP server: leases a single fixed address to the guest. DISCOVER
//! is answered with an OFFER; REQUEST is answered with an ACK that also
//! seeds the common IP registers so a guest driver that reads them back sees
//! the leased configuration. A REQUEST with no preceding DISCOVER is ignored.

use std::net::Ipv4Addr;
use tracing::{debug, warn};

use crate::card::Card;
use crate::codec::dhcp::{
    DhcpMessage, DhcpReplyBuilder, MSG_ACK, MSG_DISCOVER, MSG_OFFER, MSG_REQUEST,
};
use crate::codec::ethernet::{EtherType, EthernetFrameBuilder, MacAddr};
use crate::codec::ipv4::{Ipv4PacketBuilder, Ipv4Protocol};
use crate::codec::ipv4::Ipv4Packet;
use crate::codec::udp::{UdpPacket, UdpPacketBuilder};
use crate::constants::*;

/// Tracks the virtual DHCP server's progress through one DISCOVER/REQUEST
/// exchange. `OfferSent` gates `handle_request`: a REQUEST that shows up
/// without a preceding DISCOVER is ignored rather than acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DhcpServerState {
    #[default]
    Idle,
    OfferSent,
    Complete,
}

pub fn handle_datagram(card: &mut Card, idx: usize, ip: &Ipv4Packet, udp: &UdpPacket) {
    let Ok(msg) = DhcpMessage::parse(udp.payload()) else {
        return;
    };
    match msg.message_type() {
        Some(MSG_DISCOVER) => handle_discover(card, idx, &msg),
        Some(MSG_REQUEST) => handle_request(card, idx, &msg),
        _ => {
            let _ = ip;
        }
    }
}

fn handle_discover(card: &mut Card, idx: usize, msg: &DhcpMessage) {
    debug!(socket = idx, "DHCP DISCOVER received, offering lease");
    card.dhcp = DhcpServerState::OfferSent;
    let frame = build_reply(msg, MSG_OFFER, true);
    card.inject_frame(idx, &frame);
}

fn handle_request(card: &mut Card, idx: usize, msg: &DhcpMessage) {
    if card.dhcp != DhcpServerState::OfferSent {
        warn!(socket = idx, "DHCP REQUEST with no preceding DISCOVER, ignoring");
        return;
    }
    debug!(socket = idx, "DHCP REQUEST received, acknowledging lease");
    card.dhcp = DhcpServerState::Complete;
    let frame = build_reply(msg, MSG_ACK, false);
    card.inject_frame(idx, &frame);

    let client_ip = Ipv4Addr::from(VIRTUAL_CLIENT_IP);
    let gateway_ip = Ipv4Addr::from(VIRTUAL_GATEWAY_IP);
    card.mem[SIPR..SIPR + 4].copy_from_slice(&client_ip.octets());
    card.mem[GAR..GAR + 4].copy_from_slice(&gateway_ip.octets());
    card.mem[SUBR..SUBR + 4].copy_from_slice(&VIRTUAL_SUBNET);
}

/// Builds the Ethernet/IPv4/UDP/BOOTP stack for an OFFER or ACK.
/// `broadcast` selects OFFER's broadcast destination vs. ACK's unicast one.
fn build_reply(msg: &DhcpMessage, message_type: u8, broadcast: bool) -> Vec<u8> {
    let client_mac = msg.client_mac();
    let client_ip = Ipv4Addr::from(VIRTUAL_CLIENT_IP);
    let gateway_ip = Ipv4Addr::from(VIRTUAL_GATEWAY_IP);
    let gateway_mac = MacAddr(VIRTUAL_GATEWAY_MAC);

    let bootp = DhcpReplyBuilder {
        xid: msg.xid(),
        client_mac,
        your_ip: client_ip,
        server_id: gateway_ip,
        subnet: Ipv4Addr::from(VIRTUAL_SUBNET),
        router: gateway_ip,
        dns: Ipv4Addr::from(VIRTUAL_DNS_IP),
        lease_seconds: DHCP_LEASE_SECONDS,
        message_type,
    }
    .build_vec();

    let dest_ip = if broadcast {
        Ipv4Addr::BROADCAST
    } else {
        client_ip
    };
    let udp = UdpPacketBuilder {
        src_port: 67,
        dst_port: 68,
        payload: &bootp,
    }
    .build_vec(gateway_ip, dest_ip)
    .expect("DHCP payload never carries raw options");

    let ip = Ipv4PacketBuilder {
        dscp_ecn: 0,
        identification: 0,
        flags_fragment: 0,
        ttl: 64,
        protocol: Ipv4Protocol::UDP,
        src_ip: gateway_ip,
        dst_ip: dest_ip,
        options: &[],
        payload: &udp,
    }
    .build_vec()
    .expect("DHCP packet never carries IP options");

    let dest_mac = if broadcast {
        MacAddr::BROADCAST
    } else {
        client_mac
    };
    EthernetFrameBuilder {
        dest_mac,
        src_mac: gateway_mac,
        ethertype: EtherType::IPV4,
        payload: &ip,
    }
    .build_vec()
}
