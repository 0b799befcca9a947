//! ARP responder: answers requests for the virtual gateway's own address;
//! everything else is silently dropped.

use tracing::debug;

use crate::card::Card;
use crate::codec::arp::{ArpPacket, ArpPacketBuilder, OP_REPLY, OP_REQUEST};
use crate::codec::ethernet::{EtherType, EthernetFrameBuilder, MacAddr};
use crate::constants::VIRTUAL_GATEWAY_IP;
use std::net::Ipv4Addr;

pub fn handle_request(card: &mut Card, idx: usize, payload: &[u8]) {
    let Ok(arp) = ArpPacket::parse(payload) else {
        return;
    };
    let gateway_ip = Ipv4Addr::from(VIRTUAL_GATEWAY_IP);
    if arp.operation() != OP_REQUEST || arp.target_ip() != gateway_ip {
        return;
    }

    let gateway_mac = MacAddr(crate::constants::VIRTUAL_GATEWAY_MAC);
    let reply_payload = ArpPacketBuilder {
        operation: OP_REPLY,
        sender_mac: gateway_mac,
        sender_ip: gateway_ip,
        target_mac: arp.sender_mac(),
        target_ip: arp.sender_ip(),
    }
    .build_vec();

    let frame = EthernetFrameBuilder {
        dest_mac: arp.sender_mac(),
        src_mac: gateway_mac,
        ethertype: EtherType::ARP,
        payload: &reply_payload,
    }
    .build_vec();

    debug!(socket = idx, target = %arp.sender_ip(), "replying to ARP request for gateway");
    card.inject_frame(idx, &frame);
}
