// syncnet
//
// The software is released under the MIT license.

//! Blocking TCP, DNS and TLS primitives.
//!
//! Every operation looks synchronous to the caller: it is submitted to the
//! [`Context`]'s event loop, and the calling thread pumps that loop until the
//! operation completes. No helper threads are spawned. A `Context` and
//! everything built from it stay on the thread that created them.
//!
//! ```no_run
//! use syncnet::{Context, Socket, TcpEndpoint};
//!
//! let ctx = Context::new();
//! let mut soc = Socket::new(&ctx);
//! let err = soc.connect(&TcpEndpoint::new("127.0.0.1", 8080));
//! if err.ok() {
//!     let res = soc.write_some(b"ping");
//!     println!("wrote {} bytes", res.bytes);
//! }
//! ```

#[cfg(not(target_os = "linux"))]
compile_error!("syncnet drives its event loop with epoll and only builds on Linux");

macro_rules! libc_try {
    ($expr:expr) => {
        match unsafe { $expr } {
            rc if rc >= 0 => rc,
            _ => return Err(::std::io::Error::from_raw_os_error(::errno::errno().0)),
        }
    };
}

mod io_context;

mod bridge;

pub mod error;
pub use self::error::{to_string, Error, ErrorCategory, ErrorCode};

pub mod config;
pub use self::config::{default_config, Config};

mod context;
pub use self::context::{Context, Executor, StopHandle};

mod socket;
pub use self::socket::{IoResult, Socket, SocketState, TcpEndpoint};

mod listener;
pub use self::listener::{AcceptResult, Listener, ListenerState};

mod resolver;
pub use self::resolver::{Endpoint, IpVersion, ResolveResult, Resolver};

#[cfg(feature = "tls")]
pub mod tls;
#[cfg(feature = "tls")]
pub use self::tls::{
    TlsContext, TlsFileFormat, TlsIoResult, TlsRole, TlsState, TlsStream, TlsVerifyMode,
    TlsVersion,
};

pub mod version;
