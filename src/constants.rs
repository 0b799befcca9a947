//! W5100 register map, socket mode/status/command encodings, and the fixed virtual
//! network the card presents to the guest. Nothing here is configurable at runtime.

/// Size of the W5100's internal dual-port memory.
pub const MEM_SIZE: usize = 0x8000;

// --- Common register offsets (into the 32 KiB image) ---------------------------

pub const MR: usize = 0x0000;
pub const GAR: usize = 0x0001;
pub const SUBR: usize = 0x0005;
pub const SHAR: usize = 0x0009;
pub const SIPR: usize = 0x000F;
pub const IR: usize = 0x0015;
pub const IMR: usize = 0x0016;
pub const RTR: usize = 0x0017;
pub const RCR: usize = 0x0019;
pub const RMSR: usize = 0x001A;
pub const TMSR: usize = 0x001B;
pub const PPTLR: usize = 0x0028;

pub const MR_RST: u8 = 0x80;
pub const MR_AI: u8 = 0x02;

// --- Socket register pages ------------------------------------------------------

pub const SOCKET_COUNT: usize = 4;
pub const SOCKET_PAGE_SIZE: usize = 0x0100;
pub const SOCKET_BASES: [usize; SOCKET_COUNT] = [0x0400, 0x0500, 0x0600, 0x0700];

pub const TX_BASE: usize = 0x4000;
pub const RX_BASE: usize = 0x6000;
pub const SOCKET_BUF_SIZE: usize = 0x0800;

/// Per-socket register offsets within a socket's 256-byte page.
pub const SN_MR: usize = 0x00;
pub const SN_CR: usize = 0x01;
pub const SN_IR: usize = 0x02;
pub const SN_SR: usize = 0x03;
pub const SN_PORT: usize = 0x04;
pub const SN_DHAR: usize = 0x06;
pub const SN_DIPR: usize = 0x0C;
pub const SN_DPORT: usize = 0x10;
pub const SN_MSSR: usize = 0x12;
pub const SN_PROTO: usize = 0x14;
pub const SN_TOS: usize = 0x15;
pub const SN_TTL: usize = 0x16;
pub const SN_TX_FSR: usize = 0x20;
pub const SN_TX_RD: usize = 0x22;
pub const SN_TX_WR: usize = 0x24;
pub const SN_RX_RSR: usize = 0x26;
pub const SN_RX_RD: usize = 0x28;

pub const SN_TTL_DEFAULT: u8 = 128;

// --- Socket modes (Sn_MR low nibble) ---------------------------------------------

pub const SN_MR_CLOSE: u8 = 0x00;
pub const SN_MR_TCP: u8 = 0x01;
pub const SN_MR_UDP: u8 = 0x02;
pub const SN_MR_IPRAW: u8 = 0x03;
pub const SN_MR_MACRAW: u8 = 0x04;

// --- Socket commands (Sn_CR) ------------------------------------------------------

pub const SN_CR_OPEN: u8 = 0x01;
pub const SN_CR_LISTEN: u8 = 0x02;
pub const SN_CR_CONNECT: u8 = 0x04;
pub const SN_CR_DISCON: u8 = 0x08;
pub const SN_CR_CLOSE: u8 = 0x10;
pub const SN_CR_SEND: u8 = 0x20;
pub const SN_CR_RECV: u8 = 0x40;

// --- Socket statuses (Sn_SR) ------------------------------------------------------

pub const SN_SR_CLOSED: u8 = 0x00;
pub const SN_SR_INIT: u8 = 0x13;
pub const SN_SR_LISTEN: u8 = 0x14;
pub const SN_SR_SYNSENT: u8 = 0x15;
pub const SN_SR_SYNRECV: u8 = 0x16;
pub const SN_SR_ESTABLISHED: u8 = 0x17;
pub const SN_SR_FIN_WAIT: u8 = 0x18;
pub const SN_SR_CLOSING: u8 = 0x1A;
pub const SN_SR_TIME_WAIT: u8 = 0x1B;
pub const SN_SR_CLOSE_WAIT: u8 = 0x1C;
pub const SN_SR_LAST_ACK: u8 = 0x1D;
pub const SN_SR_UDP: u8 = 0x22;
pub const SN_SR_IPRAW: u8 = 0x32;
pub const SN_SR_MACRAW: u8 = 0x42;

// --- Slot soft switches (offsets 4-7 within the slot I/O page) -------------------

pub const SW_MODE: i32 = 0x04;
pub const SW_ADDR_HI: i32 = 0x05;
pub const SW_ADDR_LO: i32 = 0x06;
pub const SW_DATA: i32 = 0x07;

/// Slot-ROM identification pattern probed by Uthernet II driver software.
pub const ROM_ID_OFFSET_1: i32 = 0x05;
pub const ROM_ID_BYTE_1: u8 = 0x38;
pub const ROM_ID_OFFSET_2: i32 = 0x07;
pub const ROM_ID_BYTE_2: u8 = 0x18;

// --- RX staging buffer ------------------------------------------------------------

/// Capacity of the linear RX staging buffer kept outside the 32 KiB image.
/// Tied to one modulus throughout the crate (see `mem::RxStaging`) rather than
/// the reference C implementation's two inconsistent masks.
pub const RX_STAGING_CAPACITY: usize = 4096;

// --- Virtual network the card presents to the guest -------------------------------

pub const VIRTUAL_CLIENT_IP: [u8; 4] = [192, 168, 65, 100];
pub const VIRTUAL_GATEWAY_IP: [u8; 4] = [192, 168, 65, 1];
pub const VIRTUAL_DNS_IP: [u8; 4] = [8, 8, 8, 8];
pub const VIRTUAL_SUBNET: [u8; 4] = [255, 255, 255, 0];
pub const VIRTUAL_GATEWAY_MAC: [u8; 6] = [0x02, 0x00, 0xDE, 0xAD, 0xBE, 0x01];
pub const DEFAULT_SOURCE_MAC: [u8; 6] = [0x02, 0x00, 0xDE, 0xAD, 0xBE, 0xEF];
pub const DHCP_LEASE_SECONDS: u32 = 86_400;

/// 192.168.64.0/24 and 192.168.65.0/24: destinations the card redirects to localhost.
pub const REDIRECT_SUBNET_OCTETS: [u8; 2] = [192, 168];
pub const REDIRECT_THIRD_OCTETS: [u8; 2] = [64, 65];

// --- Bounded host-socket waits ------------------------------------------------------

pub const CONNECT_POLL_TIMEOUT_MS: i32 = 100;
pub const POST_SEND_DRAIN_TIMEOUT_MS: i32 = 50;

/// Our starting sequence number for a freshly translated TCP connection.
pub const VIRTUAL_TCP_INITIAL_SEQ: u32 = 12345;
