//! Error taxonomy for the card. None of these ever cross the public
//! `Card::slot_io` boundary: the hardware being emulated has no exception channel,
//! so every error here is consumed at its point of origin and turned into a status
//! register value, a dropped frame, or a log line.

use thiserror::Error;

/// Errors raised while parsing or building a wire frame. Always handled by
/// dropping the frame (wrapped as `CardError::FrameParseFailure`).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: need at least {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },
    #[error("unexpected ethertype {0:#06x}")]
    UnexpectedEtherType(u16),
    #[error("unexpected IP protocol {0}")]
    UnexpectedProtocol(u8),
    #[error("unsupported IPv4 header length (options not supported)")]
    Ipv4OptionsUnsupported,
    #[error("ARP hardware/protocol length mismatch")]
    BadArpLengths,
    #[error("DHCP magic cookie missing or message truncated")]
    NotDhcp,
    #[error("checksum mismatch: computed {computed:#06x}, header had {header:#06x}")]
    BadChecksum { computed: u16, header: u16 },
}

/// Top-level error kinds the card can encounter.
#[derive(Debug, Error)]
pub enum CardError {
    #[error("address {addr:#06x} is outside the 32 KiB W5100 image")]
    AddressOutOfRange { addr: u32 },

    #[error("command {cmd:#04x} issued against socket {socket} in a state that doesn't accept it")]
    InvalidSocket { socket: usize, cmd: u8 },

    #[error("host socket op {op} failed on socket {socket}: {source}")]
    HostSocketFailure {
        socket: usize,
        op: HostSocketOp,
        #[source]
        source: std::io::Error,
    },

    #[error("dropped malformed frame on socket {socket}: {source}")]
    FrameParseFailure {
        socket: usize,
        #[source]
        source: FrameError,
    },

    #[error("RX buffer on socket {socket} would overflow injecting {len} bytes; frame dropped")]
    ResourceExhaustion { socket: usize, len: usize },
}

/// Which host-socket call failed, for `CardError::HostSocketFailure` logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSocketOp {
    Connect,
    Bind,
    Listen,
    Accept,
    Send,
    Recv,
}

impl std::fmt::Display for HostSocketOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HostSocketOp::Connect => "connect",
            HostSocketOp::Bind => "bind",
            HostSocketOp::Listen => "listen",
            HostSocketOp::Accept => "accept",
            HostSocketOp::Send => "send",
            HostSocketOp::Recv => "recv",
        };
        f.write_str(s)
    }
}
