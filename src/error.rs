use std::error;
use std::fmt;
use std::io;

/// Failure kinds reported by every operation of this crate.
///
/// The set is closed: backend errors from the socket layer, the resolver and
/// OpenSSL are all folded into one of these codes.
#[repr(u16)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[default]
    None = 0,

    // Generic
    Unknown,
    InvalidArgument,
    InvalidState,
    NotInitialized,

    // Networking
    ResolveFailed,
    ConnectFailed,
    AcceptFailed,
    ReadFailed,
    WriteFailed,
    Timeout,
    ConnectionClosed,

    // TLS
    TlsHandshakeFailed,
    TlsShutdownFailed,
    TlsVerifyFailed,
}

/// Coarse grouping of [`ErrorCode`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    Success,
    Generic,
    Network,
    Tls,
}

impl ErrorCode {
    /// Stable lowercase name of the code, used in logs and diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::None => "none",
            ErrorCode::Unknown => "unknown",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::InvalidState => "invalid_state",
            ErrorCode::NotInitialized => "not_initialized",
            ErrorCode::ResolveFailed => "resolve_failed",
            ErrorCode::ConnectFailed => "connect_failed",
            ErrorCode::AcceptFailed => "accept_failed",
            ErrorCode::ReadFailed => "read_failed",
            ErrorCode::WriteFailed => "write_failed",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ConnectionClosed => "connection_closed",
            ErrorCode::TlsHandshakeFailed => "tls_handshake_failed",
            ErrorCode::TlsShutdownFailed => "tls_shutdown_failed",
            ErrorCode::TlsVerifyFailed => "tls_verify_failed",
        }
    }

    pub const fn category(self) -> ErrorCategory {
        match self {
            ErrorCode::None => ErrorCategory::Success,
            ErrorCode::Unknown
            | ErrorCode::InvalidArgument
            | ErrorCode::InvalidState
            | ErrorCode::NotInitialized => ErrorCategory::Generic,
            ErrorCode::ResolveFailed
            | ErrorCode::ConnectFailed
            | ErrorCode::AcceptFailed
            | ErrorCode::ReadFailed
            | ErrorCode::WriteFailed
            | ErrorCode::Timeout
            | ErrorCode::ConnectionClosed => ErrorCategory::Network,
            ErrorCode::TlsHandshakeFailed
            | ErrorCode::TlsShutdownFailed
            | ErrorCode::TlsVerifyFailed => ErrorCategory::Tls,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the stable name of `ec`.
pub const fn to_string(ec: ErrorCode) -> &'static str {
    ec.as_str()
}

/// Outcome of one operation. `ErrorCode::None` means success.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Error {
    pub code: ErrorCode,
}

impl Error {
    pub const NONE: Error = Error { code: ErrorCode::None };

    pub const fn new(code: ErrorCode) -> Self {
        Error { code }
    }

    pub const fn ok(&self) -> bool {
        matches!(self.code, ErrorCode::None)
    }

    pub const fn is_err(&self) -> bool {
        !self.ok()
    }

    pub const fn value(&self) -> ErrorCode {
        self.code
    }

    /// Converts into a `Result` so callers can use `?`.
    pub fn into_result(self) -> Result<(), Error> {
        if self.ok() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Error {
        Error::new(code)
    }
}

impl From<Error> for ErrorCode {
    fn from(err: Error) -> ErrorCode {
        err.code
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl error::Error for Error {}

/// Maps a backend I/O error to a code. Every call site passes its own fallback.
pub(crate) fn map_io_error(_err: &io::Error, fallback: ErrorCode) -> ErrorCode {
    // One fixed code per call site for now.
    fallback
}
