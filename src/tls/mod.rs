//! TLS over [`Socket`](crate::Socket), backed by OpenSSL.

use crate::socket::IoResult;

/// Which side of the handshake a context drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TlsRole {
    /// Perform handshaking as a client.
    Client,

    /// Perform handshaking as a server.
    Server,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TlsVerifyMode {
    /// No peer verification.
    #[default]
    None,

    /// Verify the peer's certificate when one is presented.
    Peer,

    /// Verify the peer and fail when it presents no certificate.
    RequirePeer,
}

/// Encoding of certificate and key files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TlsFileFormat {
    Pem,
    Der,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TlsState {
    Unestablished,
    Established,
    ShutDown,
    Closed,
}

pub type TlsIoResult = IoResult;

mod context;
pub use self::context::TlsContext;

mod engine;

mod stream;
pub use self::stream::TlsStream;

/// Encodes an accepted ALPN list in wire format, or `None` when the list is
/// not one of the supported combinations of `h2` and `http/1.1`.
fn alpn_wire<S: AsRef<str>>(protocols: &[S]) -> Option<Vec<u8>> {
    let names: Vec<&str> = protocols.iter().map(AsRef::as_ref).collect();
    match names.as_slice() {
        ["h2"] | ["http/1.1"] | ["h2", "http/1.1"] | ["http/1.1", "h2"] => {}
        _ => return None,
    }
    let mut wire = Vec::new();
    for name in names {
        wire.push(name.len() as u8);
        wire.extend_from_slice(name.as_bytes());
    }
    Some(wire)
}

/// Names in a length-prefixed ALPN list. Stops at the first malformed entry.
fn alpn_entries(wire: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = wire;
    std::iter::from_fn(move || {
        let (&len, tail) = rest.split_first()?;
        let len = usize::from(len);
        if len == 0 || tail.len() < len {
            return None;
        }
        let (name, next) = tail.split_at(len);
        rest = next;
        Some(name)
    })
}

/// First entry of `server`, in server order, that the client also offers.
/// The result borrows from `client`.
fn select_alpn<'a>(server: &[u8], client: &'a [u8]) -> Option<&'a [u8]> {
    alpn_entries(server).find_map(|want| alpn_entries(client).find(|&have| have == want))
}
