//! The external slot-I/O entry point, the address-pointer/auto-increment
//! logic, slot-ROM identification bytes, and the full-reset path.
//! `Card::slot_io` is the only `pub fn` an embedding CPU emulator needs to
//! call.

use tracing::trace;

use crate::constants::*;
use crate::error::CardError;
use crate::mem::{read_be16, write_be16};
use crate::services::dhcp::DhcpServerState;
use crate::services::tcp::VirtualTcp;
use crate::socket::Socket;

/// The emulated W5100 card: the 32 KiB register/buffer image, the 16-bit
/// address pointer, four socket adapters, and the virtual-services singleton
/// state.
pub struct Card {
    pub(crate) mem: Box<[u8; MEM_SIZE]>,
    pub(crate) addr_ptr: u16,
    pub(crate) sockets: [Socket; SOCKET_COUNT],
    pub(crate) virtual_tcp: Option<VirtualTcp>,
    pub(crate) dhcp: DhcpServerState,
}

impl Card {
    pub fn new() -> Self {
        let mut card = Self {
            mem: Box::new([0u8; MEM_SIZE]),
            addr_ptr: 0,
            sockets: [Socket::new(), Socket::new(), Socket::new(), Socket::new()],
            virtual_tcp: None,
            dhcp: DhcpServerState::default(),
        };
        card.reset();
        card
    }

    /// The slot-I/O entry point: `val == -1` marks a read cycle, `ploc` in
    /// `0..=0xFF` marks a slot-ROM access, `psw` selects one of the four soft
    /// switches (4: mode, 5: addr-hi, 6: addr-lo, 7: data).
    pub fn slot_io(&mut self, loc: u16, val: i32, ploc: i32, psw: i32) -> u8 {
        trace!(loc, val, ploc, psw, "slot_io");
        if (0..=0xFF).contains(&ploc) {
            return self.read_rom(ploc as u16);
        }
        let is_write = val >= 0;
        match psw {
            SW_MODE => {
                if is_write {
                    self.write_mode(val as u8);
                    0
                } else {
                    self.mem[MR]
                }
            }
            SW_ADDR_HI => {
                if is_write {
                    self.addr_ptr = (self.addr_ptr & 0x00FF) | ((val as u16) << 8);
                }
                (self.addr_ptr >> 8) as u8
            }
            SW_ADDR_LO => {
                if is_write {
                    self.addr_ptr = (self.addr_ptr & 0xFF00) | (val as u16);
                }
                (self.addr_ptr & 0x00FF) as u8
            }
            SW_DATA => {
                let addr = self.addr_ptr;
                let result = if is_write {
                    self.write_data(addr, val as u8);
                    0
                } else {
                    self.read_data(addr)
                };
                if self.mem[MR] & MR_AI != 0 {
                    self.addr_ptr = self.addr_ptr.wrapping_add(1);
                }
                result
            }
            _ => 0,
        }
    }

    fn read_rom(&self, ploc: u16) -> u8 {
        match ploc as i32 {
            ROM_ID_OFFSET_1 => ROM_ID_BYTE_1,
            ROM_ID_OFFSET_2 => ROM_ID_BYTE_2,
            _ => 0,
        }
    }

    fn write_mode(&mut self, val: u8) {
        self.mem[MR] = val;
        if val & MR_RST != 0 {
            self.reset();
        }
    }

    /// Re-seeds every common register to its documented default and closes
    /// all socket/translator state.
    pub fn reset(&mut self) {
        for s in &mut self.sockets {
            s.close_connection();
            s.reset();
        }
        self.virtual_tcp = None;
        self.dhcp = DhcpServerState::default();
        self.addr_ptr = 0;

        let mem = self.mem.as_mut();
        mem.iter_mut().for_each(|b| *b = 0);
        mem[MR] = 0;
        mem[SHAR..SHAR + 6].copy_from_slice(&DEFAULT_SOURCE_MAC);
        write_be16(mem, RTR, 0x07D0);
        mem[RCR] = 8;
        mem[RMSR] = 0x55;
        mem[TMSR] = 0x55;
        mem[PPTLR] = 0x00;
        for base in SOCKET_BASES {
            mem[base + SN_TTL] = SN_TTL_DEFAULT;
        }
    }

    /// Returns the offset of socket `idx`'s register page.
    pub(crate) fn socket_base(idx: usize) -> usize {
        SOCKET_BASES[idx]
    }

    pub(crate) fn sock_reg8(&self, idx: usize, rel: usize) -> u8 {
        self.mem[Self::socket_base(idx) + rel]
    }

    pub(crate) fn set_sock_reg8(&mut self, idx: usize, rel: usize, val: u8) {
        self.mem[Self::socket_base(idx) + rel] = val;
    }

    pub(crate) fn sock_reg_be16(&self, idx: usize, rel: usize) -> u16 {
        read_be16(self.mem.as_ref(), Self::socket_base(idx) + rel)
    }

    pub(crate) fn set_sock_reg_be16(&mut self, idx: usize, rel: usize, val: u16) {
        write_be16(self.mem.as_mut(), Self::socket_base(idx) + rel, val);
    }

    fn read_data(&mut self, addr: u16) -> u8 {
        if let Some((idx, rel)) = self.socket_register_hit(addr) {
            return self.read_socket_register(idx, rel);
        }
        if let Some((idx, local)) = self.rx_window_hit(addr) {
            return self.sockets[idx].rx.read_at(local);
        }
        let addr = addr as usize;
        if addr < MEM_SIZE {
            self.mem[addr]
        } else {
            let err = CardError::AddressOutOfRange { addr: addr as u32 };
            tracing::warn!(error = %err, "read ignored");
            0
        }
    }

    fn write_data(&mut self, addr: u16, val: u8) {
        if let Some((idx, rel)) = self.socket_register_hit(addr) {
            self.write_socket_register(idx, rel, val);
            return;
        }
        let addr = addr as usize;
        if addr < MEM_SIZE {
            self.mem[addr] = val;
        } else {
            let err = CardError::AddressOutOfRange { addr: addr as u32 };
            tracing::warn!(error = %err, "write ignored");
        }
    }

    fn socket_register_hit(&self, addr: u16) -> Option<(usize, usize)> {
        let addr = addr as usize;
        for (idx, &base) in SOCKET_BASES.iter().enumerate() {
            if addr >= base && addr < base + SOCKET_PAGE_SIZE {
                return Some((idx, addr - base));
            }
        }
        None
    }

    fn rx_window_hit(&self, addr: u16) -> Option<(usize, u16)> {
        let addr = addr as usize;
        if addr < RX_BASE || addr >= RX_BASE + SOCKET_COUNT * SOCKET_BUF_SIZE {
            return None;
        }
        let idx = (addr - RX_BASE) / SOCKET_BUF_SIZE;
        let local = (addr - RX_BASE - idx * SOCKET_BUF_SIZE) as u16;
        Some((idx, local))
    }

    fn read_socket_register(&mut self, idx: usize, rel: usize) -> u8 {
        if rel == SN_SR {
            self.poll_socket(idx);
        }
        match rel {
            SN_TX_FSR => (self.tx_free_size(idx) >> 8) as u8,
            r if r == SN_TX_FSR + 1 => self.tx_free_size(idx) as u8,
            SN_RX_RSR => (self.sockets[idx].rx.received_size() >> 8) as u8,
            r if r == SN_RX_RSR + 1 => self.sockets[idx].rx.received_size() as u8,
            _ => self.sock_reg8(idx, rel),
        }
    }

    fn write_socket_register(&mut self, idx: usize, rel: usize, val: u8) {
        self.set_sock_reg8(idx, rel, val);
        if rel == SN_CR {
            self.dispatch_command(idx);
        }
    }

    pub(crate) fn tx_free_size(&self, idx: usize) -> u16 {
        let wr = self.sock_reg_be16(idx, SN_TX_WR);
        let rd = self.sock_reg_be16(idx, SN_TX_RD);
        crate::mem::tx_free_size(wr, rd, SOCKET_BUF_SIZE as u16)
    }

    /// Appends `frame` to socket `idx`'s RX staging buffer, prefixed with the
    /// 2-byte big-endian length (including the prefix itself) that MAC-raw
    /// framing requires.
    pub(crate) fn inject_frame(&mut self, idx: usize, frame: &[u8]) {
        let total_len = (frame.len() + 2) as u16;
        let mut buf = Vec::with_capacity(frame.len() + 2);
        buf.extend_from_slice(&total_len.to_be_bytes());
        buf.extend_from_slice(frame);
        if let Err(e) = self.sockets[idx].rx.inject(idx, &buf) {
            tracing::warn!(error = %e, socket = idx, "dropping frame, RX staging full");
        }
    }
}

impl Default for Card {
    fn default() -> Self {
        Self::new()
    }
}
