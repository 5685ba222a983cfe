extern crate syncnet;

use std::sync::mpsc;
use std::thread;
use syncnet::*;

const MESSAGE: &[u8] = b"hello from client\n";

fn read_exact(soc: &mut Socket, buf: &mut [u8]) {
    let mut len = 0;
    while len < buf.len() {
        let res = soc.read_some(&mut buf[len..]);
        assert!(res.error.ok(), "[socket] read failed: {}", res.error);
        assert!(res.bytes > 0, "[socket] peer closed early");
        len += res.bytes;
    }
}

fn write_all(soc: &mut Socket, buf: &[u8]) {
    let mut len = 0;
    while len < buf.len() {
        let res = soc.write_some(&buf[len..]);
        assert!(res.error.ok(), "[socket] write failed: {}", res.error);
        len += res.bytes;
    }
}

fn echo_server(port: u16, size: usize, ready: mpsc::Sender<()>) {
    let ctx = Context::new();
    let mut lis = Listener::new(&ctx);
    let err = lis.bind(port);
    assert!(err.ok(), "[listener] bind failed: {}", err);
    let err = lis.listen(0);
    assert!(err.ok(), "[listener] listen failed: {}", err);
    ready.send(()).unwrap();

    let AcceptResult { error, mut socket } = lis.accept();
    assert!(error.ok(), "[listener] accept failed: {}", error);
    assert_eq!(socket.state(), SocketState::Connected);
    assert!(socket.peer_endpoint().is_some());

    let mut buf = vec![0u8; 4096];
    let mut total = 0;
    while total < size {
        let res = socket.read_some(&mut buf);
        assert!(res.error.ok(), "[server] read failed: {}", res.error);
        assert!(res.bytes > 0);
        write_all(&mut socket, &buf[..res.bytes]);
        total += res.bytes;
    }
    socket.close();
    lis.close();
}

fn round_trip(port: u16, payload: &[u8]) -> Vec<u8> {
    let (tx, rx) = mpsc::channel();
    let size = payload.len();
    let server = thread::spawn(move || echo_server(port, size, tx));
    rx.recv().unwrap();

    let ctx = Context::new();
    let mut soc = Socket::new(&ctx);
    let err = soc.connect(&TcpEndpoint::new("127.0.0.1", port));
    assert!(err.ok(), "[client] connect failed: {}", err);
    assert_eq!(soc.state(), SocketState::Connected);
    assert_eq!(soc.peer_endpoint(), Some(TcpEndpoint::new("127.0.0.1", port)));

    write_all(&mut soc, payload);
    let mut echoed = vec![0u8; payload.len()];
    read_exact(&mut soc, &mut echoed);

    soc.close();
    soc.close();
    server.join().unwrap();
    echoed
}

#[test]
fn echo_hello() {
    assert_eq!(round_trip(19080, MESSAGE), MESSAGE);
}

#[test]
fn echo_is_byte_exact() {
    let payload: Vec<u8> = (0..32 * 1024).map(|i| (i % 251) as u8).collect();
    assert_eq!(round_trip(19081, &payload), payload);
}
