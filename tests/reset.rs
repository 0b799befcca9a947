//! A mode-register RST clears every socket's state, including an in-flight
//! virtual TCP translation.

mod common;
use common::*;

use std::net::TcpListener;
use std::time::{Duration, Instant};

const GUEST_MAC: [u8; 6] = [0x02, 0x00, 0xDE, 0xAD, 0xBE, 0xEF];
const GATEWAY_MAC: [u8; 6] = [0x02, 0x00, 0xDE, 0xAD, 0xBE, 0x01];
const GUEST_IP: [u8; 4] = [192, 168, 65, 100];
const GATEWAY_IP: [u8; 4] = [192, 168, 65, 1];

#[test]
fn reset_clears_translations_and_socket_statuses() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let accept = std::thread::spawn(move || listener.accept().unwrap());

    let mut card = new_card();
    open_macraw(&mut card, 0);

    let tcp = tcp_segment(GUEST_IP, GATEWAY_IP, 4000, port, 1000, 0, TCP_SYN, &[]);
    let ip = ipv4_packet(PROTO_TCP, GUEST_IP, GATEWAY_IP, &tcp);
    let frame = eth_frame(GATEWAY_MAC, GUEST_MAC, ETHERTYPE_IPV4, &ip);
    macraw_send(&mut card, 0, &frame);
    assert!(macraw_recv(&mut card, 0).is_some(), "SYN+ACK was injected");
    accept.join().unwrap();

    // Open a second socket too, so the reset's effect can be checked broadly.
    set_sock_reg8(&mut card, 1, SN_MR, SN_MR_TCP);
    set_sock_reg8(&mut card, 1, SN_CR, SN_CR_OPEN);
    assert_eq!(sock_reg8(&mut card, 1, SN_SR), SN_SR_INIT);

    reset_card(&mut card);

    for idx in 0..4 {
        assert_eq!(
            sock_reg8(&mut card, idx, SN_SR),
            SN_SR_CLOSED,
            "socket {idx} status not cleared by reset"
        );
    }
    assert_eq!(&read_block(&mut card, SHAR_ADDR, 6), &[0x02, 0x00, 0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(read_reg16(&mut card, RTR_ADDR), 0x07D0);
    assert_eq!(read_byte(&mut card, RCR_ADDR), 8);

    // A fresh SYN after reset must open a brand new translation rather than
    // silently reusing anything from before.
    let listener2 = TcpListener::bind("127.0.0.1:0").unwrap();
    let port2 = listener2.local_addr().unwrap().port();
    let accept2 = std::thread::spawn(move || listener2.accept().unwrap());
    open_macraw(&mut card, 0);
    let tcp = tcp_segment(GUEST_IP, GATEWAY_IP, 4001, port2, 2000, 0, TCP_SYN, &[]);
    let ip = ipv4_packet(PROTO_TCP, GUEST_IP, GATEWAY_IP, &tcp);
    let frame = eth_frame(GATEWAY_MAC, GUEST_MAC, ETHERTYPE_IPV4, &ip);
    macraw_send(&mut card, 0, &frame);

    let deadline = Instant::now() + Duration::from_secs(2);
    while macraw_recv(&mut card, 0).is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    accept2.join().unwrap();
}
