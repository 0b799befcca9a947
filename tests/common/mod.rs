//! Shared test scaffolding: a thin slot-I/O harness plus hand-rolled frame
//! builders/parsers for Ethernet/ARP/IPv4/UDP/TCP/DHCP. Deliberately
//! independent of the crate's internal codec so these tests exercise exactly
//! what a real guest driver would poke through `Card::slot_io`.

#![allow(dead_code)]

use uthernet2::Card;

// --- Register map (W5100 datasheet offsets; mirrored here since the crate
// keeps them private) -------------------------------------------------------

pub const SHAR_ADDR: u16 = 0x0009;
pub const SIPR_ADDR: u16 = 0x000F;
pub const GAR_ADDR: u16 = 0x0001;
pub const SUBR_ADDR: u16 = 0x0005;
pub const RTR_ADDR: u16 = 0x0017;
pub const RCR_ADDR: u16 = 0x0019;

pub const SOCKET_BASES: [u16; 4] = [0x0400, 0x0500, 0x0600, 0x0700];

pub const SN_MR: u16 = 0x00;
pub const SN_CR: u16 = 0x01;
pub const SN_SR: u16 = 0x03;
pub const SN_DIPR: u16 = 0x0C;
pub const SN_DPORT: u16 = 0x10;
pub const SN_TX_FSR: u16 = 0x20;
pub const SN_TX_RD: u16 = 0x22;
pub const SN_TX_WR: u16 = 0x24;
pub const SN_RX_RSR: u16 = 0x26;
pub const SN_RX_RD: u16 = 0x28;

pub const TX_BASE: u16 = 0x4000;
pub const RX_BASE: u16 = 0x6000;
pub const SOCKET_BUF_SIZE: u16 = 0x0800;

pub const SN_MR_TCP: u8 = 0x01;
pub const SN_MR_MACRAW: u8 = 0x04;

pub const SN_CR_OPEN: u8 = 0x01;
pub const SN_CR_CONNECT: u8 = 0x04;
pub const SN_CR_SEND: u8 = 0x20;
pub const SN_CR_RECV: u8 = 0x40;

pub const SN_SR_CLOSED: u8 = 0x00;
pub const SN_SR_INIT: u8 = 0x13;
pub const SN_SR_ESTABLISHED: u8 = 0x17;
pub const SN_SR_MACRAW: u8 = 0x42;

const SW_MODE: i32 = 0x04;
const SW_ADDR_HI: i32 = 0x05;
const SW_ADDR_LO: i32 = 0x06;
const SW_DATA: i32 = 0x07;
const MR_RST: u8 = 0x80;
const MR_AI: u8 = 0x02;

pub fn new_card() -> Card {
    Card::new()
}

pub fn set_addr(card: &mut Card, addr: u16) {
    card.slot_io(0, (addr >> 8) as i32, -1, SW_ADDR_HI);
    card.slot_io(0, (addr & 0xFF) as i32, -1, SW_ADDR_LO);
}

pub fn read_mode(card: &mut Card) -> u8 {
    card.slot_io(0, -1, -1, SW_MODE)
}

pub fn write_mode(card: &mut Card, val: u8) {
    card.slot_io(0, val as i32, -1, SW_MODE);
}

pub fn reset_card(card: &mut Card) {
    write_mode(card, MR_RST);
}

pub fn read_byte(card: &mut Card, addr: u16) -> u8 {
    set_addr(card, addr);
    card.slot_io(0, -1, -1, SW_DATA)
}

pub fn write_byte(card: &mut Card, addr: u16, val: u8) {
    set_addr(card, addr);
    card.slot_io(0, val as i32, -1, SW_DATA);
}

pub fn read_reg16(card: &mut Card, addr: u16) -> u16 {
    let hi = read_byte(card, addr) as u16;
    let lo = read_byte(card, addr + 1) as u16;
    (hi << 8) | lo
}

pub fn write_reg16(card: &mut Card, addr: u16, val: u16) {
    write_byte(card, addr, (val >> 8) as u8);
    write_byte(card, addr + 1, val as u8);
}

pub fn read_block(card: &mut Card, addr: u16, len: usize) -> Vec<u8> {
    let mode = read_mode(card);
    write_mode(card, mode | MR_AI);
    set_addr(card, addr);
    let out = (0..len).map(|_| card.slot_io(0, -1, -1, SW_DATA)).collect();
    write_mode(card, mode);
    out
}

pub fn write_block(card: &mut Card, addr: u16, bytes: &[u8]) {
    let mode = read_mode(card);
    write_mode(card, mode | MR_AI);
    set_addr(card, addr);
    for &b in bytes {
        card.slot_io(0, b as i32, -1, SW_DATA);
    }
    write_mode(card, mode);
}

pub fn sock_reg8(card: &mut Card, idx: usize, rel: u16) -> u8 {
    read_byte(card, SOCKET_BASES[idx] + rel)
}

pub fn set_sock_reg8(card: &mut Card, idx: usize, rel: u16, val: u8) {
    write_byte(card, SOCKET_BASES[idx] + rel, val);
}

pub fn sock_reg16(card: &mut Card, idx: usize, rel: u16) -> u16 {
    read_reg16(card, SOCKET_BASES[idx] + rel)
}

pub fn set_sock_reg16(card: &mut Card, idx: usize, rel: u16, val: u16) {
    write_reg16(card, SOCKET_BASES[idx] + rel, val);
}

pub fn open_macraw(card: &mut Card, idx: usize) {
    set_sock_reg8(card, idx, SN_MR, SN_MR_MACRAW);
    set_sock_reg8(card, idx, SN_CR, SN_CR_OPEN);
}

/// Writes `frame` into socket `idx`'s TX window at its current write pointer
/// and issues SEND, exactly as a guest MAC-raw driver would.
pub fn macraw_send(card: &mut Card, idx: usize, frame: &[u8]) {
    let wr = sock_reg16(card, idx, SN_TX_WR);
    let base = TX_BASE + idx as u16 * SOCKET_BUF_SIZE;
    write_block(card, base.wrapping_add(wr), frame);
    set_sock_reg16(card, idx, SN_TX_WR, wr.wrapping_add(frame.len() as u16));
    set_sock_reg8(card, idx, SN_CR, SN_CR_SEND);
}

/// Drains one queued frame from socket `idx`'s RX staging area, stripping the
/// 2-byte big-endian length prefix MAC-raw framing carries. `None` if nothing
/// is queued. Returns the raw length prefix alongside the frame so callers
/// can check it directly.
pub fn macraw_recv_with_prefix(card: &mut Card, idx: usize) -> Option<(u16, Vec<u8>)> {
    let avail = sock_reg16(card, idx, SN_RX_RSR);
    if avail == 0 {
        return None;
    }
    let rd = sock_reg16(card, idx, SN_RX_RD);
    let base = RX_BASE + idx as u16 * SOCKET_BUF_SIZE;
    let prefix = read_block(card, base.wrapping_add(rd), 2);
    let total_len = u16::from_be_bytes([prefix[0], prefix[1]]);
    let frame = read_block(card, base.wrapping_add(rd).wrapping_add(2), (total_len - 2) as usize);
    set_sock_reg16(card, idx, SN_RX_RD, rd.wrapping_add(total_len));
    set_sock_reg8(card, idx, SN_CR, SN_CR_RECV);
    Some((total_len, frame))
}

pub fn macraw_recv(card: &mut Card, idx: usize) -> Option<Vec<u8>> {
    macraw_recv_with_prefix(card, idx).map(|(_, frame)| frame)
}

// --- Hand-rolled wire format helpers -----------------------------------------

pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const BROADCAST_MAC: [u8; 6] = [0xFF; 6];

pub fn eth_frame(dst: [u8; 6], src: [u8; 6], ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(14 + payload.len());
    out.extend_from_slice(&dst);
    out.extend_from_slice(&src);
    out.extend_from_slice(&ethertype.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub struct ParsedEth<'a> {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub ethertype: u16,
    pub payload: &'a [u8],
}

pub fn parse_eth(frame: &[u8]) -> ParsedEth<'_> {
    let mut dst = [0u8; 6];
    dst.copy_from_slice(&frame[0..6]);
    let mut src = [0u8; 6];
    src.copy_from_slice(&frame[6..12]);
    ParsedEth {
        dst,
        src,
        ethertype: u16::from_be_bytes([frame[12], frame[13]]),
        payload: &frame[14..],
    }
}

pub fn arp_request(sender_mac: [u8; 6], sender_ip: [u8; 4], target_ip: [u8; 4]) -> Vec<u8> {
    let mut out = vec![0u8; 28];
    out[0..2].copy_from_slice(&1u16.to_be_bytes());
    out[2..4].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
    out[4] = 6;
    out[5] = 4;
    out[6..8].copy_from_slice(&1u16.to_be_bytes()); // REQUEST
    out[8..14].copy_from_slice(&sender_mac);
    out[14..18].copy_from_slice(&sender_ip);
    out[18..24].copy_from_slice(&[0u8; 6]);
    out[24..28].copy_from_slice(&target_ip);
    out
}

pub struct ParsedArp {
    pub operation: u16,
    pub sender_mac: [u8; 6],
    pub sender_ip: [u8; 4],
    pub target_mac: [u8; 6],
    pub target_ip: [u8; 4],
}

pub fn parse_arp(payload: &[u8]) -> ParsedArp {
    let mut sender_mac = [0u8; 6];
    sender_mac.copy_from_slice(&payload[8..14]);
    let mut sender_ip = [0u8; 4];
    sender_ip.copy_from_slice(&payload[14..18]);
    let mut target_mac = [0u8; 6];
    target_mac.copy_from_slice(&payload[18..24]);
    let mut target_ip = [0u8; 4];
    target_ip.copy_from_slice(&payload[24..28]);
    ParsedArp {
        operation: u16::from_be_bytes([payload[6], payload[7]]),
        sender_mac,
        sender_ip,
        target_mac,
        target_ip,
    }
}

fn ones_complement_sum(data: &[u8]) -> u32 {
    let mut sum = 0u32;
    let mut chunks = data.chunks_exact(2);
    for c in &mut chunks {
        sum += u16::from_be_bytes([c[0], c[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum
}

fn ipv4_checksum(header: &[u8]) -> u16 {
    !(ones_complement_sum(header) as u16)
}

fn pseudo_checksum(src: [u8; 4], dst: [u8; 4], proto: u8, segment: &[u8]) -> u16 {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src);
    pseudo[4..8].copy_from_slice(&dst);
    pseudo[9] = proto;
    pseudo[10..12].copy_from_slice(&(segment.len() as u16).to_be_bytes());
    let mut sum = ones_complement_sum(&pseudo) + ones_complement_sum(segment);
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

pub fn ipv4_packet(proto: u8, src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let total_len = 20 + payload.len();
    let mut out = vec![0u8; 20];
    out[0] = 0x45;
    out[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    out[8] = 64;
    out[9] = proto;
    out[12..16].copy_from_slice(&src);
    out[16..20].copy_from_slice(&dst);
    let cksum = ipv4_checksum(&out);
    out[10..12].copy_from_slice(&cksum.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub struct ParsedIpv4<'a> {
    pub protocol: u8,
    pub src: [u8; 4],
    pub dst: [u8; 4],
    pub payload: &'a [u8],
}

pub fn parse_ipv4(packet: &[u8]) -> ParsedIpv4<'_> {
    let mut src = [0u8; 4];
    src.copy_from_slice(&packet[12..16]);
    let mut dst = [0u8; 4];
    dst.copy_from_slice(&packet[16..20]);
    let total_len = u16::from_be_bytes([packet[2], packet[3]]) as usize;
    ParsedIpv4 {
        protocol: packet[9],
        src,
        dst,
        payload: &packet[20..total_len.min(packet.len())],
    }
}

pub const PROTO_UDP: u8 = 17;
pub const PROTO_TCP: u8 = 6;

pub fn udp_packet(src_ip: [u8; 4], dst_ip: [u8; 4], src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let len = 8 + payload.len();
    let mut out = vec![0u8; 8];
    out[0..2].copy_from_slice(&src_port.to_be_bytes());
    out[2..4].copy_from_slice(&dst_port.to_be_bytes());
    out[4..6].copy_from_slice(&(len as u16).to_be_bytes());
    out.extend_from_slice(payload);
    let cksum = pseudo_checksum(src_ip, dst_ip, PROTO_UDP, &out);
    out[6..8].copy_from_slice(&cksum.to_be_bytes());
    out
}

pub struct ParsedUdp<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: &'a [u8],
}

pub fn parse_udp(datagram: &[u8]) -> ParsedUdp<'_> {
    ParsedUdp {
        src_port: u16::from_be_bytes([datagram[0], datagram[1]]),
        dst_port: u16::from_be_bytes([datagram[2], datagram[3]]),
        payload: &datagram[8..],
    }
}

pub const TCP_FIN: u8 = 0x01;
pub const TCP_SYN: u8 = 0x02;
pub const TCP_RST: u8 = 0x04;
pub const TCP_PSH: u8 = 0x08;
pub const TCP_ACK: u8 = 0x10;

#[allow(clippy::too_many_arguments)]
pub fn tcp_segment(
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut out = vec![0u8; 20];
    out[0..2].copy_from_slice(&src_port.to_be_bytes());
    out[2..4].copy_from_slice(&dst_port.to_be_bytes());
    out[4..8].copy_from_slice(&seq.to_be_bytes());
    out[8..12].copy_from_slice(&ack.to_be_bytes());
    out[12] = 5 << 4;
    out[13] = flags;
    out[14..16].copy_from_slice(&4096u16.to_be_bytes());
    out.extend_from_slice(payload);
    let cksum = pseudo_checksum(src_ip, dst_ip, PROTO_TCP, &out);
    out[16..18].copy_from_slice(&cksum.to_be_bytes());
    out
}

pub struct ParsedTcp<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
    pub payload: &'a [u8],
}

pub fn parse_tcp(segment: &[u8]) -> ParsedTcp<'_> {
    let data_offset = ((segment[12] >> 4) as usize) * 4;
    ParsedTcp {
        src_port: u16::from_be_bytes([segment[0], segment[1]]),
        dst_port: u16::from_be_bytes([segment[2], segment[3]]),
        seq: u32::from_be_bytes([segment[4], segment[5], segment[6], segment[7]]),
        ack: u32::from_be_bytes([segment[8], segment[9], segment[10], segment[11]]),
        flags: segment[13],
        payload: &segment[data_offset..],
    }
}

const DHCP_MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

pub fn dhcp_discover(xid: [u8; 4], client_mac: [u8; 6]) -> Vec<u8> {
    let mut out = vec![0u8; 240];
    out[0] = 1; // BOOTREQUEST
    out[1] = 1; // htype ethernet
    out[2] = 6; // hlen
    out[4..8].copy_from_slice(&xid);
    out[28..34].copy_from_slice(&client_mac);
    out[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
    out.extend_from_slice(&[53, 1, 1]); // option 53 = DISCOVER
    out.push(255);
    out
}

pub fn dhcp_request(xid: [u8; 4], client_mac: [u8; 6], requested_ip: [u8; 4], server_id: [u8; 4]) -> Vec<u8> {
    let mut out = vec![0u8; 240];
    out[0] = 1;
    out[1] = 1;
    out[2] = 6;
    out[4..8].copy_from_slice(&xid);
    out[28..34].copy_from_slice(&client_mac);
    out[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
    out.extend_from_slice(&[53, 1, 3]); // option 53 = REQUEST
    out.extend_from_slice(&[50, 4]);
    out.extend_from_slice(&requested_ip);
    out.extend_from_slice(&[54, 4]);
    out.extend_from_slice(&server_id);
    out.push(255);
    out
}

pub fn find_dhcp_option(payload: &[u8], code: u8) -> Option<&[u8]> {
    let opts = &payload[240..];
    let mut i = 0;
    while i < opts.len() {
        let tag = opts[i];
        if tag == 255 {
            break;
        }
        if tag == 0 {
            i += 1;
            continue;
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
