//! Parsing and byte-exact emission of the wire formats the card speaks. Each
//! wire format gets a borrowing parser and a builder; checksums live in one
//! place (`checksum`) since IP and TCP/UDP both reduce to the same
//! one's-complement arithmetic.

pub mod arp;
pub mod checksum;
pub mod dhcp;
pub mod ethernet;
pub mod ipv4;
pub mod tcp;
pub mod udp;
