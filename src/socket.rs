//! The five socket modes, eight-plus statuses, and six commands, driving the
//! frame codec, ring buffers, and host socket adapter to advance the status
//! byte the guest observes.

use tracing::{debug, warn};

use crate::card::Card;
use crate::constants::*;
use crate::error::{CardError, HostSocketOp};
use crate::host_socket::{redirect_destination, DatagramSocket, ListenSocket, StreamSocket};
use crate::mem::RxStaging;
use crate::services;
use std::net::{Ipv4Addr, SocketAddrV4};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketMode {
    Closed = SN_MR_CLOSE,
    Tcp = SN_MR_TCP,
    Udp = SN_MR_UDP,
    IpRaw = SN_MR_IPRAW,
    MacRaw = SN_MR_MACRAW,
}

impl TryFrom<u8> for SocketMode {
    type Error = ();
    fn try_from(v: u8) -> Result<Self, ()> {
        match v & 0x0F {
            SN_MR_CLOSE => Ok(SocketMode::Closed),
            SN_MR_TCP => Ok(SocketMode::Tcp),
            SN_MR_UDP => Ok(SocketMode::Udp),
            SN_MR_IPRAW => Ok(SocketMode::IpRaw),
            SN_MR_MACRAW => Ok(SocketMode::MacRaw),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketCommand {
    Open = SN_CR_OPEN,
    Listen = SN_CR_LISTEN,
    Connect = SN_CR_CONNECT,
    Discon = SN_CR_DISCON,
    Close = SN_CR_CLOSE,
    Send = SN_CR_SEND,
    Recv = SN_CR_RECV,
}

impl TryFrom<u8> for SocketCommand {
    type Error = ();
    fn try_from(v: u8) -> Result<Self, ()> {
        match v {
            SN_CR_OPEN => Ok(SocketCommand::Open),
            SN_CR_LISTEN => Ok(SocketCommand::Listen),
            SN_CR_CONNECT => Ok(SocketCommand::Connect),
            SN_CR_DISCON => Ok(SocketCommand::Discon),
            SN_CR_CLOSE => Ok(SocketCommand::Close),
            SN_CR_SEND => Ok(SocketCommand::Send),
            SN_CR_RECV => Ok(SocketCommand::Recv),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketStatus {
    Closed = SN_SR_CLOSED,
    Init = SN_SR_INIT,
    Listen = SN_SR_LISTEN,
    SynSent = SN_SR_SYNSENT,
    SynRecv = SN_SR_SYNRECV,
    Established = SN_SR_ESTABLISHED,
    FinWait = SN_SR_FIN_WAIT,
    Closing = SN_SR_CLOSING,
    TimeWait = SN_SR_TIME_WAIT,
    CloseWait = SN_SR_CLOSE_WAIT,
    LastAck = SN_SR_LAST_ACK,
    Udp = SN_SR_UDP,
    IpRaw = SN_SR_IPRAW,
    MacRaw = SN_SR_MACRAW,
}

impl TryFrom<u8> for SocketStatus {
    type Error = ();
    fn try_from(v: u8) -> Result<Self, ()> {
        Ok(match v {
            SN_SR_CLOSED => SocketStatus::Closed,
            SN_SR_INIT => SocketStatus::Init,
            SN_SR_LISTEN => SocketStatus::Listen,
            SN_SR_SYNSENT => SocketStatus::SynSent,
            SN_SR_SYNRECV => SocketStatus::SynRecv,
            SN_SR_ESTABLISHED => SocketStatus::Established,
            SN_SR_FIN_WAIT => SocketStatus::FinWait,
            SN_SR_CLOSING => SocketStatus::Closing,
            SN_SR_TIME_WAIT => SocketStatus::TimeWait,
            SN_SR_CLOSE_WAIT => SocketStatus::CloseWait,
            SN_SR_LAST_ACK => SocketStatus::LastAck,
            SN_SR_UDP => SocketStatus::Udp,
            SN_SR_IPRAW => SocketStatus::IpRaw,
            SN_SR_MACRAW => SocketStatus::MacRaw,
            _ => return Err(()),
        })
    }
}

/// The host-side handle backing a socket, or `None` while closed/MAC-raw.
/// Exactly one of `{host socket open, MAC-raw active, closed}` holds per
/// socket.
pub enum HostConn {
    None,
    Stream(StreamSocket),
    Listener(ListenSocket),
    Datagram(DatagramSocket),
}

/// Per-socket adapter state: the host connection, the
/// non-blocking-connect-in-progress flag, the RX staging buffer, and the
/// MAC-raw flag.
pub struct Socket {
    pub conn: HostConn,
    pub connecting: bool,
    pub macraw: bool,
    pub rx: RxStaging,
    pub(crate) rx_rd_synced: u16,
}

impl Socket {
    pub fn new() -> Self {
        Self {
            conn: HostConn::None,
            connecting: false,
            macraw: false,
            rx: RxStaging::new(),
            rx_rd_synced: 0,
        }
    }

    pub fn reset(&mut self) {
        self.conn = HostConn::None;
        self.connecting = false;
        self.macraw = false;
        self.rx.reset();
        self.rx_rd_synced = 0;
    }

    pub fn close_connection(&mut self) {
        self.conn = HostConn::None;
        self.connecting = false;
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}

impl Card {
    pub(crate) fn dispatch_command(&mut self, idx: usize) {
        let raw = self.sock_reg8(idx, SN_CR);
        self.set_sock_reg8(idx, SN_CR, 0);
        let Ok(cmd) = SocketCommand::try_from(raw) else {
            warn!(socket = idx, cmd = raw, "ignoring unrecognized socket command");
            return;
        };
        debug!(socket = idx, raw, "dispatching socket command {:?}", cmd);
        match cmd {
            SocketCommand::Open => self.cmd_open(idx),
            SocketCommand::Listen => self.cmd_listen(idx),
            SocketCommand::Connect => self.cmd_connect(idx),
            SocketCommand::Discon | SocketCommand::Close => self.cmd_close(idx),
            SocketCommand::Send => self.cmd_send(idx),
            SocketCommand::Recv => self.cmd_recv(idx),
        }
    }

    fn status(&self, idx: usize) -> u8 {
        self.sock_reg8(idx, SN_SR)
    }

    fn set_status(&mut self, idx: usize, status: u8) {
        self.set_sock_reg8(idx, SN_SR, status);
    }

    fn cmd_open(&mut self, idx: usize) {
        if self.status(idx) != SN_SR_CLOSED {
            return;
        }
        let mode = SocketMode::try_from(self.sock_reg8(idx, SN_MR)).unwrap_or(SocketMode::Closed);
        match mode {
            SocketMode::Tcp => {
                self.set_status(idx, SN_SR_INIT);
            }
            SocketMode::Udp => {
                let port = self.sock_reg_be16(idx, SN_PORT);
                match DatagramSocket::bind(port) {
                    Ok(sock) => {
                        self.sockets[idx].conn = HostConn::Datagram(sock);
                        self.set_status(idx, SN_SR_UDP);
                    }
                    Err(e) => self.fail_socket(idx, HostSocketOp::Bind, e),
                }
            }
            SocketMode::IpRaw => {
                self.set_status(idx, SN_SR_IPRAW);
            }
            SocketMode::MacRaw if idx == 0 => {
                self.sockets[idx].macraw = true;
                self.set_status(idx, SN_SR_MACRAW);
            }
            _ => {}
        }
    }

    fn cmd_listen(&mut self, idx: usize) {
        if self.status(idx) != SN_SR_INIT {
            return;
        }
        let port = self.sock_reg_be16(idx, SN_PORT);
        match ListenSocket::bind(port) {
            Ok(listener) => {
                self.sockets[idx].conn = HostConn::Listener(listener);
                self.set_status(idx, SN_SR_LISTEN);
            }
            Err(e) => self.fail_socket(idx, HostSocketOp::Listen, e),
        }
    }

    fn cmd_connect(&mut self, idx: usize) {
        if self.status(idx) != SN_SR_INIT {
            return;
        }
        let dest_ip = Ipv4Addr::from(self.sock_reg_be32(idx, SN_DIPR));
        let dest_port = self.sock_reg_be16(idx, SN_DPORT);
        let redirected = redirect_destination(dest_ip);
        let addr = SocketAddrV4::new(redirected, dest_port);
        match StreamSocket::connect_nonblocking(addr) {
            Ok((stream, in_progress)) => {
                self.sockets[idx].conn = HostConn::Stream(stream);
                if in_progress {
                    self.sockets[idx].connecting = true;
                    self.set_status(idx, SN_SR_SYNSENT);
                } else {
                    self.sockets[idx].connecting = false;
                    self.set_status(idx, SN_SR_ESTABLISHED);
                }
            }
            Err(e) => self.fail_socket(idx, HostSocketOp::Connect, e),
        }
    }

    fn cmd_close(&mut self, idx: usize) {
        self.sockets[idx].close_connection();
        self.sockets[idx].macraw = false;
        self.sockets[idx].rx.reset();
        self.set_status(idx, SN_SR_CLOSED);
        if idx == 0 {
            self.virtual_tcp = None;
        }
    }

    fn fail_socket(&mut self, idx: usize, op: HostSocketOp, source: std::io::Error) {
        let err = CardError::HostSocketFailure { socket: idx, op, source };
        warn!(error = %err, "host socket operation failed");
        self.cmd_close(idx);
    }

    /// Statuses in which a socket actually owns an open data path: the only
    /// ones `SEND`/`RECV` are meaningful against.
    fn data_path_open(&self, idx: usize) -> bool {
        matches!(
            self.status(idx),
            SN_SR_ESTABLISHED | SN_SR_CLOSE_WAIT | SN_SR_UDP | SN_SR_IPRAW | SN_SR_MACRAW
        )
    }

    fn cmd_send(&mut self, idx: usize) {
        if !self.data_path_open(idx) {
            let err = CardError::InvalidSocket { socket: idx, cmd: SN_CR_SEND };
            warn!(error = %err, "ignoring SEND");
            return;
        }
        let wr = self.sock_reg_be16(idx, SN_TX_WR);
        let rd = self.sock_reg_be16(idx, SN_TX_RD);
        let bufsize = SOCKET_BUF_SIZE as u16;
        let len = wr.wrapping_sub(rd) % bufsize;
        let base = TX_BASE + idx * SOCKET_BUF_SIZE;
        let mut frame = Vec::with_capacity(len as usize);
        for i in 0..len {
            let off = (rd.wrapping_add(i) % bufsize) as usize;
            frame.push(self.mem[base + off]);
        }

        let consumed = if self.sockets[idx].macraw {
            services::handle_macraw_send(self, idx, &frame);
            len
        } else {
            match &mut self.sockets[idx].conn {
                HostConn::Stream(s) => match s.send(&frame) {
                    Ok(n) => n as u16,
                    Err(e) => {
                        self.fail_socket(idx, HostSocketOp::Send, e);
                        return;
                    }
                },
                HostConn::Datagram(s) => {
                    let dest_ip = Ipv4Addr::from(self.sock_reg_be32(idx, SN_DIPR));
                    let dest_port = self.sock_reg_be16(idx, SN_DPORT);
                    let dest = SocketAddrV4::new(redirect_destination(dest_ip), dest_port);
                    match s.send_to(&frame, dest) {
                        Ok(_) => len,
                        Err(e) => {
                            self.fail_socket(idx, HostSocketOp::Send, e);
                            return;
                        }
                    }
                }
                _ => len,
            }
        };

        self.set_sock_reg_be16(idx, SN_TX_RD, rd.wrapping_add(consumed));
    }

    fn cmd_recv(&mut self, idx: usize) {
        if !self.data_path_open(idx) {
            let err = CardError::InvalidSocket { socket: idx, cmd: SN_CR_RECV };
            warn!(error = %err, "ignoring RECV");
            return;
        }
        let new_rd = self.sock_reg_be16(idx, SN_RX_RD);
        let delta = new_rd.wrapping_sub(self.sockets[idx].rx_rd_synced);
        let wrapped = self.sockets[idx].rx.consume(delta);
        self.sockets[idx].rx_rd_synced = new_rd;
        if wrapped {
            self.set_sock_reg_be16(idx, SN_RX_RD, 0);
            self.sockets[idx].rx_rd_synced = 0;
        }
    }

    /// Opportunistic poll invoked on every read of a socket's status
    /// register: observes host-side progress without any guest-visible
    /// interrupt.
    pub(crate) fn poll_socket(&mut self, idx: usize) {
        match self.status(idx) {
            SN_SR_SYNSENT => self.poll_connecting(idx),
            SN_SR_LISTEN => self.poll_listening(idx),
            SN_SR_ESTABLISHED => self.poll_established(idx),
            SN_SR_UDP => self.poll_udp(idx),
            SN_SR_MACRAW => services::poll_macraw(self, idx),
            _ => {}
        }
    }

    fn poll_connecting(&mut self, idx: usize) {
        let result = match &self.sockets[idx].conn {
            HostConn::Stream(s) => s.poll_connect_complete(0),
            _ => return,
        };
        match result {
            Ok(true) => {
                self.sockets[idx].connecting = false;
                self.set_status(idx, SN_SR_ESTABLISHED);
            }
            Ok(false) => {}
            Err(e) => self.fail_socket(idx, HostSocketOp::Connect, e),
        }
    }

    fn poll_listening(&mut self, idx: usize) {
        let accepted = match &self.sockets[idx].conn {
            HostConn::Listener(l) => l.try_accept(),
            _ => return,
        };
        match accepted {
            Ok(Some(stream)) => {
                self.sockets[idx].conn = HostConn::Stream(stream);
                self.set_status(idx, SN_SR_ESTABLISHED);
            }
            Ok(None) => {}
            Err(e) => self.fail_socket(idx, HostSocketOp::Accept, e),
        }
    }

    fn poll_established(&mut self, idx: usize) {
        let read = match &mut self.sockets[idx].conn {
            HostConn::Stream(s) => s.try_recv(SOCKET_BUF_SIZE),
            _ => return,
        };
        match read {
            Ok(Some(data)) if data.is_empty() => {
                self.set_status(idx, SN_SR_CLOSE_WAIT);
            }
            Ok(Some(data)) => {
                if let Err(e) = self.sockets[idx].rx.inject(idx, &data) {
                    warn!(error = %e, "dropping inbound data, RX staging full");
                }
            }
            Ok(None) => {}
            Err(e) => self.fail_socket(idx, HostSocketOp::Recv, e),
        }
    }

    fn poll_udp(&mut self, idx: usize) {
        let read = match &self.sockets[idx].conn {
            HostConn::Datagram(s) => s.try_recv(SOCKET_BUF_SIZE),
            _ => return,
        };
        match read {
            Ok(Some((data, _from))) => {
                if let Err(e) = self.sockets[idx].rx.inject(idx, &data) {
                    warn!(error = %e, "dropping inbound datagram, RX staging full");
                }
            }
            Ok(None) => {}
            Err(e) => self.fail_socket(idx, HostSocketOp::Recv, e),
        }
    }
}

impl Card {
    pub(crate) fn sock_reg_be32(&self, idx: usize, rel: usize) -> u32 {
        let base = Card::socket_base(idx) + rel;
        u32::from_be_bytes([
            self.mem[base],
            self.mem[base + 1],
            self.mem[base + 2],
            self.mem[base + 3],
        ])
    }
}
