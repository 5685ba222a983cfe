extern crate syncnet;

use std::net::TcpListener;
use syncnet::*;

#[test]
fn close_is_idempotent() {
    let ctx = Context::new();
    let mut soc = Socket::new(&ctx);
    assert_eq!(soc.state(), SocketState::Closed);
    soc.close();
    soc.close();
    assert_eq!(soc.state(), SocketState::Closed);

    assert!(soc.open().ok());
    assert!(soc.open().ok());
    assert_eq!(soc.state(), SocketState::Open);
    soc.close();
    soc.close();
    assert_eq!(soc.state(), SocketState::Closed);
}

#[test]
fn strict_io_requires_connection() {
    let ctx = Context::new();
    let mut soc = Socket::new(&ctx);
    let mut buf = [0u8; 16];

    let res = soc.read_some(&mut buf);
    assert_eq!(res.error.value(), ErrorCode::InvalidState);
    assert_eq!(res.bytes, 0);

    assert!(soc.open().ok());
    let res = soc.write_some(b"data");
    assert_eq!(res.error.value(), ErrorCode::InvalidState);
    assert_eq!(res.bytes, 0);
}

#[test]
fn empty_buffers_are_rejected() {
    let ctx = Context::new();
    let mut soc = Socket::new(&ctx);
    assert_eq!(soc.read_some(&mut []).error.value(), ErrorCode::InvalidArgument);
    assert_eq!(soc.write_some(&[]).error.value(), ErrorCode::InvalidArgument);
}

#[test]
fn invalid_endpoints() {
    let ctx = Context::new();
    let mut soc = Socket::new(&ctx);
    let err = soc.connect(&TcpEndpoint::new("127.0.0.1", 0));
    assert_eq!(err.value(), ErrorCode::InvalidArgument);
    let err = soc.connect(&TcpEndpoint::new("no.such.host", 80));
    assert_eq!(err.value(), ErrorCode::InvalidArgument);
    assert_eq!(soc.state(), SocketState::Closed);
}

#[test]
fn failed_connect_keeps_state() {
    let ctx = Context::new();

    // Nothing listens on this port.
    let ep = TcpEndpoint::new("127.0.0.1", 19083);

    let mut soc = Socket::new(&ctx);
    assert_eq!(soc.connect(&ep).value(), ErrorCode::ConnectFailed);
    assert_eq!(soc.state(), SocketState::Closed);

    assert!(soc.open().ok());
    assert_eq!(soc.connect(&ep).value(), ErrorCode::ConnectFailed);
    assert_eq!(soc.state(), SocketState::Open);
    assert!(soc.peer_endpoint().is_none());
}

#[test]
fn relaxed_io_reaches_backend() {
    let ctx = Context::with_config(Config::new().with_strict_checks(false));
    let mut soc = Socket::new(&ctx);
    let mut buf = [0u8; 4];
    assert_eq!(soc.read_some(&mut buf).error.value(), ErrorCode::ReadFailed);
    assert_eq!(soc.write_some(b"x").error.value(), ErrorCode::WriteFailed);
}

#[test]
fn ipv6_target_recreates_open_socket() {
    let ctx = Context::new();
    let lis = TcpListener::bind("[::1]:0").unwrap();
    let port = lis.local_addr().unwrap().port();
    let ep = TcpEndpoint::new("::1", port);

    let mut soc = Socket::new(&ctx);
    assert!(soc.open().ok());
    let err = soc.connect(&ep);
    assert!(err.ok(), "connect failed: {}", err);
    assert_eq!(soc.state(), SocketState::Connected);
    assert_eq!(soc.peer_endpoint().map(|ep| ep.port), Some(port));
    soc.close();
    drop(lis);

    let mut soc = Socket::new(&ctx);
    assert!(soc.open().ok());
    assert_eq!(soc.connect(&ep).value(), ErrorCode::ConnectFailed);
    assert_eq!(soc.state(), SocketState::Open);
    assert!(soc.local_port().is_some());
}
