//! Virtual TCP translator: terminates the guest's TCP exchange at the card
//! and re-originates it as a host stream-socket connection, ferrying
//! payload bytes between the two. Only one translated connection is
//! supported at a time — a second SYN closes the first.

use tracing::{debug, warn};

use crate::card::Card;
use crate::codec::ethernet::{EtherType, EthernetFrameBuilder, MacAddr};
use crate::codec::ipv4::{Ipv4Packet, Ipv4PacketBuilder, Ipv4Protocol};
use crate::codec::tcp::{TcpFlags, TcpSegment, TcpSegmentBuilder};
use crate::constants::*;
use crate::error::{CardError, HostSocketOp};
use crate::host_socket::{redirect_destination, StreamSocket};
use std::net::{Ipv4Addr, SocketAddrV4};

/// State for the single in-flight translated TCP connection.
pub struct VirtualTcp {
    host: StreamSocket,
    guest_mac: MacAddr,
    /// The address/port the guest originally targeted; what we present as
    /// the source of every injected reply.
    local_ip: Ipv4Addr,
    local_port: u16,
    /// The guest's own address/port; the destination of every injected
    /// reply.
    peer_ip: Ipv4Addr,
    peer_port: u16,
    our_seq: u32,
    peer_seq_expected: u32,
    established: bool,
    fin_sent: bool,
    fin_received: bool,
}

/// A cheap snapshot of the addressing/sequence fields, so replies can be
/// built without holding a borrow of the host socket.
#[derive(Clone, Copy)]
struct Snapshot {
    guest_mac: MacAddr,
    local_ip: Ipv4Addr,
    local_port: u16,
    peer_ip: Ipv4Addr,
    peer_port: u16,
    our_seq: u32,
    peer_seq_expected: u32,
}

impl VirtualTcp {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            guest_mac: self.guest_mac,
            local_ip: self.local_ip,
            local_port: self.local_port,
            peer_ip: self.peer_ip,
            peer_port: self.peer_port,
            our_seq: self.our_seq,
            peer_seq_expected: self.peer_seq_expected,
        }
    }
}

pub fn handle_segment(card: &mut Card, idx: usize, guest_mac: MacAddr, ip: &Ipv4Packet) {
    let Ok(seg) = TcpSegment::parse(ip.payload()) else {
        return;
    };
    let flags = seg.flags();

    if flags.contains(TcpFlags::SYN) {
        handle_syn(card, idx, guest_mac, ip, &seg);
        return;
    }

    let matches_translation = matches!(
        &card.virtual_tcp,
        Some(vt) if vt.peer_ip == ip.src_ip() && vt.peer_port == seg.src_port()
    );
    if !matches_translation {
        return;
    }

    if flags.contains(TcpFlags::FIN) {
        handle_fin(card, idx);
    } else if !seg.payload().is_empty() {
        handle_data(card, idx, seg.payload());
    } else if flags.contains(TcpFlags::ACK) {
        if let Some(vt) = card.virtual_tcp.as_mut() {
            vt.established = true;
        }
    }
}

fn handle_syn(card: &mut Card, idx: usize, guest_mac: MacAddr, ip: &Ipv4Packet, seg: &TcpSegment) {
    if card.virtual_tcp.is_some() {
        close_translation(card);
    }

    let redirected = redirect_destination(ip.dst_ip());
    let addr = SocketAddrV4::new(redirected, seg.dst_port());
    let (stream, in_progress) = match StreamSocket::connect_nonblocking(addr) {
        Ok(v) => v,
        Err(e) => {
            log_failure(idx, HostSocketOp::Connect, e);
            inject_reset(card, idx, guest_mac, ip, seg);
            return;
        }
    };
    if in_progress {
        match stream.poll_connect_complete(CONNECT_POLL_TIMEOUT_MS) {
            Ok(true) => {}
            Ok(false) => {
                inject_reset(card, idx, guest_mac, ip, seg);
                return;
            }
            Err(e) => {
                log_failure(idx, HostSocketOp::Connect, e);
                inject_reset(card, idx, guest_mac, ip, seg);
                return;
            }
        }
    }

    let our_seq = VIRTUAL_TCP_INITIAL_SEQ;
    let peer_seq_expected = seg.seq_number().wrapping_add(1);
    let snapshot = Snapshot {
        guest_mac,
        local_ip: ip.dst_ip(),
        local_port: seg.dst_port(),
        peer_ip: ip.src_ip(),
        peer_port: seg.src_port(),
        our_seq,
        peer_seq_expected,
    };
    debug!(socket = idx, peer = %snapshot.peer_ip, port = snapshot.peer_port, "TCP translation established");
    inject_segment(card, idx, &snapshot, TcpFlags::SYN | TcpFlags::ACK, &[]);

    card.virtual_tcp = Some(VirtualTcp {
        host: stream,
        guest_mac,
        local_ip: ip.dst_ip(),
        local_port: seg.dst_port(),
        peer_ip: ip.src_ip(),
        peer_port: seg.src_port(),
        our_seq: our_seq.wrapping_add(1), // SYN consumes one sequence number
        peer_seq_expected,
        established: false,
        fin_sent: false,
        fin_received: false,
    });
}

fn handle_data(card: &mut Card, idx: usize, payload: &[u8]) {
    let send_result = match card.virtual_tcp.as_mut() {
        Some(vt) => vt.host.send(payload),
        None => return,
    };
    if let Err(e) = send_result {
        log_failure(idx, HostSocketOp::Send, e);
        close_translation_with_reset(card, idx);
        return;
    }

    let Some(vt) = card.virtual_tcp.as_mut() else {
        return;
    };
    vt.peer_seq_expected = vt.peer_seq_expected.wrapping_add(payload.len() as u32);
    let snapshot = vt.snapshot();
    inject_segment(card, idx, &snapshot, TcpFlags::ACK, &[]);

    drain_and_relay(card, idx, POST_SEND_DRAIN_TIMEOUT_MS);
}

fn handle_fin(card: &mut Card, idx: usize) {
    let Some(vt) = card.virtual_tcp.as_mut() else {
        return;
    };
    vt.peer_seq_expected = vt.peer_seq_expected.wrapping_add(1);
    vt.fin_received = true;
    let flags = if vt.fin_sent {
        TcpFlags::ACK
    } else {
        vt.fin_sent = true;
        TcpFlags::FIN | TcpFlags::ACK
    };
    let snapshot = vt.snapshot();
    inject_segment(card, idx, &snapshot, flags, &[]);
    close_translation(card);
}

/// Invoked on every MAC-raw status read to relay unsolicited host data
/// without waiting for a guest ACK.
pub fn poll_unsolicited(card: &mut Card, idx: usize) {
    drain_and_relay(card, idx, 0);
}

/// Polls the host socket for up to `timeout_ms` and relays any data as a
/// PSH+ACK segment, advancing our sequence number by the bytes injected.
fn drain_and_relay(card: &mut Card, idx: usize, timeout_ms: i32) {
    let result = {
        let Some(vt) = card.virtual_tcp.as_mut() else {
            return;
        };
        if timeout_ms == 0 {
            vt.host.try_recv(SOCKET_BUF_SIZE)
        } else {
            vt.host.poll_recv(SOCKET_BUF_SIZE, timeout_ms)
        }
    };
    match result {
        Ok(Some(data)) if !data.is_empty() => {
            let Some(vt) = card.virtual_tcp.as_ref() else {
                return;
            };
            let snapshot = vt.snapshot();
            inject_segment(card, idx, &snapshot, TcpFlags::PSH | TcpFlags::ACK, &data);
            if let Some(vt) = card.virtual_tcp.as_mut() {
                vt.our_seq = vt.our_seq.wrapping_add(data.len() as u32);
            }
        }
        Ok(_) => {}
        Err(e) => {
            log_failure(idx, HostSocketOp::Recv, e);
            close_translation_with_reset(card, idx);
        }
    }
}

fn close_translation(card: &mut Card) {
    card.virtual_tcp = None;
}

fn close_translation_with_reset(card: &mut Card, idx: usize) {
    if let Some(vt) = &card.virtual_tcp {
        let snapshot = vt.snapshot();
        inject_segment(card, idx, &snapshot, TcpFlags::RST | TcpFlags::ACK, &[]);
    }
    close_translation(card);
}

fn inject_reset(card: &mut Card, idx: usize, guest_mac: MacAddr, ip: &Ipv4Packet, seg: &TcpSegment) {
    let snapshot = Snapshot {
        guest_mac,
        local_ip: ip.dst_ip(),
        local_port: seg.dst_port(),
        peer_ip: ip.src_ip(),
        peer_port: seg.src_port(),
        our_seq: 0,
        peer_seq_expected: seg.seq_number().wrapping_add(1),
    };
    inject_segment(card, idx, &snapshot, TcpFlags::RST | TcpFlags::ACK, &[]);
}

fn log_failure(socket: usize, op: HostSocketOp, source: std::io::Error) {
    let err = CardError::HostSocketFailure { socket, op, source };
    warn!(error = %err, "virtual TCP translation host socket failure");
}

fn inject_segment(card: &mut Card, idx: usize, s: &Snapshot, flags: TcpFlags, payload: &[u8]) {
    let tcp = TcpSegmentBuilder {
        src_port: s.local_port,
        dst_port: s.peer_port,
        seq_number: s.our_seq,
        ack_number: s.peer_seq_expected,
        flags,
        window_size: SOCKET_BUF_SIZE as u16,
        urgent_pointer: 0,
        options: &[],
        payload,
    }
    .build_vec(s.local_ip, s.peer_ip)
    .expect("virtual TCP segments never carry options");

    let ip = Ipv4PacketBuilder {
        dscp_ecn: 0,
        identification: 0,
        flags_fragment: 0,
        ttl: 64,
        protocol: Ipv4Protocol::TCP,
        src_ip: s.local_ip,
        dst_ip: s.peer_ip,
        options: &[],
        payload: &tcp,
    }
    .build_vec()
    .expect("virtual TCP packets never carry IP options");

    let eth = EthernetFrameBuilder {
        dest_mac: s.guest_mac,
        src_mac: MacAddr(VIRTUAL_GATEWAY_MAC),
        ethertype: EtherType::IPV4,
        payload: &ip,
    }
    .build_vec();

    card.inject_frame(idx, &eth);
}
