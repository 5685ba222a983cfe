use super::{alpn_wire, select_alpn, TlsFileFormat, TlsRole, TlsVerifyMode, TlsVersion};
use crate::error::{Error, ErrorCode};

use std::cell::{OnceCell, RefCell};
use std::fmt;

use openssl::error::ErrorStack;
use openssl::ssl::{
    AlpnError, SslContext, SslContextBuilder, SslFiletype, SslMethod, SslVerifyMode, SslVersion,
};
use openssl::x509::X509;
use tracing::{debug, error};

impl TlsVerifyMode {
    fn to_ssl(self) -> SslVerifyMode {
        match self {
            TlsVerifyMode::None => SslVerifyMode::NONE,
            TlsVerifyMode::Peer => SslVerifyMode::PEER,
            TlsVerifyMode::RequirePeer => SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
        }
    }
}

impl TlsFileFormat {
    fn to_ssl(self) -> SslFiletype {
        match self {
            TlsFileFormat::Pem => SslFiletype::PEM,
            TlsFileFormat::Der => SslFiletype::ASN1,
        }
    }
}

impl TlsVersion {
    fn to_ssl(self) -> SslVersion {
        match self {
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

/// TLS configuration shared by the streams of one role.
///
/// Setters only apply until the first [`TlsStream`](super::TlsStream) is
/// created from the context; after that they return `invalid_state`.
pub struct TlsContext {
    role: TlsRole,
    builder: RefCell<Option<SslContextBuilder>>,
    built: OnceCell<SslContext>,
    hostname: Option<String>,
    verify_mode: TlsVerifyMode,
}

impl TlsContext {
    pub fn new(role: TlsRole) -> TlsContext {
        let method = match role {
            TlsRole::Client => SslMethod::tls_client(),
            TlsRole::Server => SslMethod::tls_server(),
        };
        let builder = match SslContextBuilder::new(method) {
            Ok(builder) => Some(builder),
            Err(err) => {
                error!(%err, ?role, "failed to create a TLS context");
                None
            }
        };
        TlsContext {
            role,
            builder: RefCell::new(builder),
            built: OnceCell::new(),
            hostname: None,
            verify_mode: TlsVerifyMode::default(),
        }
    }

    pub fn role(&self) -> TlsRole {
        self.role
    }

    pub fn verify_mode(&self) -> TlsVerifyMode {
        self.verify_mode
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    fn builder(&mut self) -> Result<&mut SslContextBuilder, Error> {
        if self.built.get().is_some() {
            return Err(ErrorCode::InvalidState.into());
        }
        self.builder
            .get_mut()
            .as_mut()
            .ok_or(Error::new(ErrorCode::NotInitialized))
    }

    fn apply<F>(&mut self, valid: bool, fallback: ErrorCode, f: F) -> Error
    where
        F: FnOnce(&mut SslContextBuilder) -> Result<(), ErrorStack>,
    {
        let builder = match self.builder() {
            Ok(builder) => builder,
            Err(err) => return err,
        };
        if !valid {
            return ErrorCode::InvalidArgument.into();
        }
        match f(builder) {
            Ok(()) => Error::NONE,
            Err(err) => {
                debug!(%err, code = %fallback, "TLS context setter failed");
                fallback.into()
            }
        }
    }

    pub fn set_verify_mode(&mut self, mode: TlsVerifyMode) -> Error {
        let err = self.apply(true, ErrorCode::TlsVerifyFailed, |b| {
            b.set_verify(mode.to_ssl());
            Ok(())
        });
        if err.ok() {
            self.verify_mode = mode;
        }
        err
    }

    /// Server name sent as SNI and, when verification is on, matched against
    /// the peer certificate.
    pub fn set_hostname(&mut self, name: &str) -> Error {
        let err = self.apply(!name.is_empty(), ErrorCode::InvalidArgument, |_| Ok(()));
        if err.ok() {
            self.hostname = Some(name.to_owned());
        }
        err
    }

    pub fn set_default_verify_paths(&mut self) -> Error {
        self.apply(true, ErrorCode::TlsVerifyFailed, |b| b.set_default_verify_paths())
    }

    pub fn load_verify_file(&mut self, path: &str) -> Error {
        self.apply(!path.is_empty(), ErrorCode::TlsVerifyFailed, |b| b.set_ca_file(path))
    }

    /// Trusts one PEM encoded certificate authority.
    pub fn add_certificate_authority(&mut self, pem: &str) -> Error {
        self.apply(!pem.is_empty(), ErrorCode::TlsVerifyFailed, |b| {
            let cert = X509::from_pem(pem.as_bytes())?;
            b.cert_store_mut().add_cert(cert)
        })
    }

    pub fn use_certificate_chain_file(&mut self, path: &str) -> Error {
        self.apply(!path.is_empty(), ErrorCode::InvalidArgument, |b| {
            b.set_certificate_chain_file(path)
        })
    }

    pub fn use_certificate_file(&mut self, path: &str, format: TlsFileFormat) -> Error {
        self.apply(!path.is_empty(), ErrorCode::InvalidArgument, |b| {
            b.set_certificate_file(path, format.to_ssl())
        })
    }

    pub fn use_private_key_file(&mut self, path: &str, format: TlsFileFormat) -> Error {
        self.apply(!path.is_empty(), ErrorCode::InvalidArgument, |b| {
            b.set_private_key_file(path, format.to_ssl())
        })
    }

    /// Accepts `["h2"]`, `["http/1.1"]` or both in either order. A client
    /// advertises the list, a server picks the first of its own entries the
    /// client offers.
    pub fn set_alpn<S: AsRef<str>>(&mut self, protocols: &[S]) -> Error {
        let wire = alpn_wire(protocols);
        let role = self.role;
        self.apply(wire.is_some(), ErrorCode::InvalidArgument, |b| {
            let wire = wire.unwrap_or_default();
            match role {
                TlsRole::Client => b.set_alpn_protos(&wire),
                TlsRole::Server => {
                    b.set_alpn_select_callback(move |_, client| {
                        select_alpn(&wire, client).ok_or(AlpnError::NOACK)
                    });
                    Ok(())
                }
            }
        })
    }

    pub fn set_min_protocol_version(&mut self, version: TlsVersion) -> Error {
        self.apply(true, ErrorCode::InvalidArgument, |b| {
            b.set_min_proto_version(Some(version.to_ssl()))
        })
    }

    pub fn set_max_protocol_version(&mut self, version: TlsVersion) -> Error {
        self.apply(true, ErrorCode::InvalidArgument, |b| {
            b.set_max_proto_version(Some(version.to_ssl()))
        })
    }

    /// Builds the OpenSSL context on first use. `None` when uninitialized.
    pub(crate) fn freeze(&self) -> Option<&SslContext> {
        if let Some(ctx) = self.built.get() {
            return Some(ctx);
        }
        let builder = self.builder.borrow_mut().take()?;
        Some(self.built.get_or_init(|| builder.build()))
    }

    pub fn is_frozen(&self) -> bool {
        self.built.get().is_some()
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("role", &self.role)
            .field("verify_mode", &self.verify_mode)
            .field("hostname", &self.hostname)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
