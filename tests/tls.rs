#![cfg(feature = "tls")]

extern crate openssl;
extern crate syncnet;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509NameRef, X509};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use syncnet::*;

fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn name(cn: &str) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    name.build()
}

fn builder(serial: u32, subject: &X509NameRef, issuer: &X509NameRef, key: &PKey<Private>) -> X509Builder {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(subject).unwrap();
    builder.set_issuer_name(issuer).unwrap();
    builder.set_pubkey(key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(7).unwrap()).unwrap();
    builder
}

struct Pki {
    ca_pem: String,
    cert_path: PathBuf,
    key_path: PathBuf,
}

/// A throwaway CA plus a `localhost` leaf signed by it.
fn pki(tag: &str) -> Pki {
    let ca_key = new_key();
    let ca_name = name("syncnet test ca");
    let mut ca = builder(1, &ca_name, &ca_name, &ca_key);
    ca.append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    ca.append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build().unwrap())
        .unwrap();
    ca.sign(&ca_key, MessageDigest::sha256()).unwrap();
    let ca: X509 = ca.build();

    let key = new_key();
    let mut leaf = builder(2, &name("localhost"), ca.subject_name(), &key);
    let san = SubjectAlternativeName::new()
        .dns("localhost")
        .build(&leaf.x509v3_context(Some(&*ca), None))
        .unwrap();
    leaf.append_extension(san).unwrap();
    leaf.sign(&ca_key, MessageDigest::sha256()).unwrap();
    let leaf = leaf.build();

    let dir = std::env::temp_dir();
    let cert_path = dir.join(format!("syncnet-{}-{}-cert.pem", std::process::id(), tag));
    let key_path = dir.join(format!("syncnet-{}-{}-key.pem", std::process::id(), tag));
    std::fs::write(&cert_path, leaf.to_pem().unwrap()).unwrap();
    std::fs::write(&key_path, key.private_key_to_pem_pkcs8().unwrap()).unwrap();

    Pki {
        ca_pem: String::from_utf8(ca.to_pem().unwrap()).unwrap(),
        cert_path,
        key_path,
    }
}

fn server_context(pki: &Pki) -> TlsContext {
    let mut tls = TlsContext::new(TlsRole::Server);
    assert!(tls
        .use_certificate_file(pki.cert_path.to_str().unwrap(), TlsFileFormat::Pem)
        .ok());
    assert!(tls
        .use_private_key_file(pki.key_path.to_str().unwrap(), TlsFileFormat::Pem)
        .ok());
    assert!(tls.set_alpn(&["h2", "http/1.1"]).ok());
    assert!(tls.set_min_protocol_version(TlsVersion::Tls12).ok());
    tls
}

fn serve(port: u16, tls: TlsContext, ready: mpsc::Sender<()>, expect_ok: bool) {
    let ctx = Context::new();
    let mut lis = Listener::new(&ctx);
    assert!(lis.bind(port).ok());
    assert!(lis.listen(0).ok());
    ready.send(()).unwrap();

    let mut res = lis.accept();
    assert!(res.error.ok());
    let mut stream = TlsStream::new(&mut res.socket, &tls);
    let err = stream.handshake();
    if !expect_ok {
        assert!(err.is_err());
        return;
    }
    assert!(err.ok(), "[server] handshake failed: {}", err);
    assert_eq!(stream.negotiated_alpn().as_deref(), Some("h2"));

    let mut buf = [0u8; 64];
    let r = stream.read_some(&mut buf);
    assert!(r.error.ok(), "[server] read failed: {}", r.error);
    assert_eq!(&buf[..r.bytes], b"hello");
    let w = stream.write_some(b"world");
    assert!(w.error.ok() && w.bytes == 5);

    // close_notify from the client reads as a clean end of stream.
    let r = stream.read_some(&mut buf);
    assert!(r.error.ok());
    assert_eq!(r.bytes, 0);
}

#[test]
fn verified_round_trip() {
    let pki = pki("ok");
    let (tx, rx) = mpsc::channel();
    let server_tls = server_context(&pki);
    let server = thread::spawn(move || serve(19086, server_tls, tx, true));
    rx.recv().unwrap();

    let ctx = Context::new();
    let mut soc = Socket::new(&ctx);
    assert!(soc.connect(&TcpEndpoint::new("127.0.0.1", 19086)).ok());

    let mut tls = TlsContext::new(TlsRole::Client);
    assert!(tls.set_verify_mode(TlsVerifyMode::Peer).ok());
    assert!(tls.add_certificate_authority(&pki.ca_pem).ok());
    assert!(tls.set_hostname("localhost").ok());
    assert!(tls.set_alpn(&["http/1.1", "h2"]).ok());

    {
        let mut stream = TlsStream::new(&mut soc, &tls);
        assert_eq!(stream.state(), TlsState::Unestablished);
        let err = stream.handshake();
        assert!(err.ok(), "[client] handshake failed: {}", err);
        assert_eq!(stream.state(), TlsState::Established);
        assert_eq!(stream.negotiated_alpn().as_deref(), Some("h2"));

        let w = stream.write_some(b"hello");
        assert!(w.error.ok() && w.bytes == 5);
        let mut buf = [0u8; 64];
        let mut len = 0;
        while len < 5 {
            let r = stream.read_some(&mut buf[len..]);
            assert!(r.error.ok(), "[client] read failed: {}", r.error);
            assert!(r.bytes > 0);
            len += r.bytes;
        }
        assert_eq!(&buf[..len], b"world");

        assert!(stream.shutdown().ok());
        assert_eq!(stream.state(), TlsState::ShutDown);
        stream.close();
        stream.close();
        assert_eq!(stream.state(), TlsState::Closed);
    }
    assert_eq!(soc.state(), SocketState::Closed);
    assert_eq!(tls.set_hostname("other").value(), ErrorCode::InvalidState);

    server.join().unwrap();
    let _ = std::fs::remove_file(&pki.cert_path);
    let _ = std::fs::remove_file(&pki.key_path);
}

#[test]
fn untrusted_peer_fails_verification() {
    let pki = pki("untrusted");
    let (tx, rx) = mpsc::channel();
    let server_tls = server_context(&pki);
    let server = thread::spawn(move || serve(19087, server_tls, tx, false));
    rx.recv().unwrap();

    let ctx = Context::new();
    let mut soc = Socket::new(&ctx);
    assert!(soc.connect(&TcpEndpoint::new("127.0.0.1", 19087)).ok());

    let mut tls = TlsContext::new(TlsRole::Client);
    assert!(tls.set_verify_mode(TlsVerifyMode::Peer).ok());
    assert!(tls.set_hostname("localhost").ok());

    let mut stream = TlsStream::new(&mut soc, &tls);
    assert_eq!(stream.handshake().value(), ErrorCode::TlsVerifyFailed);
    assert_eq!(stream.state(), TlsState::Unestablished);
    drop(stream);

    server.join().unwrap();
    let _ = std::fs::remove_file(&pki.cert_path);
    let _ = std::fs::remove_file(&pki.key_path);
}

#[test]
fn setter_validation() {
    let mut tls = TlsContext::new(TlsRole::Client);
    assert_eq!(tls.role(), TlsRole::Client);
    assert_eq!(tls.set_hostname("").value(), ErrorCode::InvalidArgument);
    assert_eq!(tls.load_verify_file("").value(), ErrorCode::InvalidArgument);
    assert_eq!(tls.add_certificate_authority("").value(), ErrorCode::InvalidArgument);
    assert_eq!(tls.use_certificate_chain_file("").value(), ErrorCode::InvalidArgument);
    assert_eq!(
        tls.use_certificate_file("", TlsFileFormat::Pem).value(),
        ErrorCode::InvalidArgument
    );
    assert_eq!(
        tls.use_private_key_file("", TlsFileFormat::Der).value(),
        ErrorCode::InvalidArgument
    );
    assert_eq!(
        tls.load_verify_file("/nonexistent/ca.pem").value(),
        ErrorCode::TlsVerifyFailed
    );
    assert_eq!(
        tls.use_certificate_chain_file("/nonexistent/chain.pem").value(),
        ErrorCode::InvalidArgument
    );
    assert!(tls.set_verify_mode(TlsVerifyMode::RequirePeer).ok());
    assert!(tls.set_max_protocol_version(TlsVersion::Tls13).ok());
}

#[test]
fn alpn_closed_set() {
    let mut tls = TlsContext::new(TlsRole::Server);
    assert!(tls.set_alpn(&["h2"]).ok());
    assert!(tls.set_alpn(&["http/1.1"]).ok());
    assert!(tls.set_alpn(&["h2", "http/1.1"]).ok());
    assert!(tls.set_alpn(&["http/1.1", "h2"]).ok());

    let empty: Vec<String> = Vec::new();
    assert_eq!(tls.set_alpn(&empty).value(), ErrorCode::InvalidArgument);
    assert_eq!(tls.set_alpn(&["h3"]).value(), ErrorCode::InvalidArgument);
    assert_eq!(tls.set_alpn(&["h2", "h2"]).value(), ErrorCode::InvalidArgument);
    assert_eq!(
        tls.set_alpn(&["spdy/3", "http/1.1"]).value(),
        ErrorCode::InvalidArgument
    );
}

#[test]
fn stream_on_unconnected_socket() {
    let ctx = Context::new();
    let mut soc = Socket::new(&ctx);
    let tls = TlsContext::new(TlsRole::Client);
    let mut stream = TlsStream::new(&mut soc, &tls);

    assert_eq!(stream.handshake().value(), ErrorCode::NotInitialized);
    let mut buf = [0u8; 8];
    assert_eq!(stream.read_some(&mut buf).error.value(), ErrorCode::NotInitialized);
    assert_eq!(stream.write_some(b"x").error.value(), ErrorCode::NotInitialized);
    assert_eq!(stream.shutdown().value(), ErrorCode::NotInitialized);
    stream.close();
    stream.close();
    assert_eq!(stream.state(), TlsState::Closed);
}

#[test]
fn io_before_handshake() {
    // The kernel completes the TCP handshake without an accept call.
    let lis = TcpListener::bind("127.0.0.1:19088").unwrap();

    let ctx = Context::new();
    let mut soc = Socket::new(&ctx);
    assert!(soc.connect(&TcpEndpoint::new("127.0.0.1", 19088)).ok());

    let tls = TlsContext::new(TlsRole::Client);
    let mut stream = TlsStream::new(&mut soc, &tls);
    let mut buf = [0u8; 8];
    assert_eq!(stream.read_some(&mut buf).error.value(), ErrorCode::InvalidState);
    assert_eq!(stream.write_some(b"x").error.value(), ErrorCode::InvalidState);
    assert_eq!(stream.shutdown().value(), ErrorCode::TlsShutdownFailed);
    assert_eq!(stream.state(), TlsState::Unestablished);

    stream.close();
    assert_eq!(stream.state(), TlsState::Closed);
    drop(stream);
    assert_eq!(soc.state(), SocketState::Closed);
    drop(lis);
}
