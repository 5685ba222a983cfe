use crate::bridge;
use crate::context::Context;
use crate::error::{Error, ErrorCode};
use crate::socket::TcpEndpoint;

use std::ffi::{CStr, CString};
use std::fmt;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::ptr;

use libc::{addrinfo, sockaddr_in, sockaddr_in6, AF_INET, AF_INET6, AF_UNSPEC, SOCK_STREAM};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

/// One resolved address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: IpVersion,
    pub address: String,
    pub port: u16,
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint {
            ip: if addr.is_ipv4() { IpVersion::V4 } else { IpVersion::V6 },
            address: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl From<&Endpoint> for TcpEndpoint {
    fn from(ep: &Endpoint) -> Self {
        TcpEndpoint::new(ep.address.clone(), ep.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.ip {
            IpVersion::V4 => write!(f, "{}:{}", self.address, self.port),
            IpVersion::V6 => write!(f, "[{}]:{}", self.address, self.port),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveResult {
    pub error: Error,
    pub endpoints: Vec<Endpoint>,
}

impl ResolveResult {
    fn failed(error: Error) -> Self {
        ResolveResult {
            error,
            endpoints: Vec::new(),
        }
    }
}

/// Owns a `getaddrinfo` result list.
struct AddrInfoList {
    base: *mut addrinfo,
}

impl AddrInfoList {
    fn lookup(host: &CStr, service: &CStr) -> Result<Self, i32> {
        let mut hints: addrinfo = unsafe { mem::zeroed() };
        hints.ai_family = AF_UNSPEC;
        hints.ai_socktype = SOCK_STREAM;

        let node = if host.to_bytes().is_empty() { ptr::null() } else { host.as_ptr() };
        let serv = if service.to_bytes().is_empty() { ptr::null() } else { service.as_ptr() };
        let mut base = ptr::null_mut();
        match unsafe { libc::getaddrinfo(node, serv, &hints, &mut base) } {
            0 => Ok(AddrInfoList { base }),
            rc => Err(rc),
        }
    }

    fn addrs(&self) -> Vec<SocketAddr> {
        let mut out = Vec::new();
        let mut ai = self.base;
        while let Some(info) = unsafe { ai.as_ref() } {
            if let Some(addr) = unsafe { to_socket_addr(info) } {
                out.push(addr);
            }
            ai = info.ai_next;
        }
        out
    }
}

impl Drop for AddrInfoList {
    fn drop(&mut self) {
        if !self.base.is_null() {
            unsafe { libc::freeaddrinfo(self.base) }
        }
    }
}

unsafe fn to_socket_addr(ai: &addrinfo) -> Option<SocketAddr> {
    if ai.ai_addr.is_null() {
        return None;
    }
    match ai.ai_family {
        AF_INET if ai.ai_addrlen as usize >= mem::size_of::<sockaddr_in>() => {
            let sin = &*(ai.ai_addr as *const sockaddr_in);
            let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
            Some(SocketAddr::from((ip, u16::from_be(sin.sin_port))))
        }
        AF_INET6 if ai.ai_addrlen as usize >= mem::size_of::<sockaddr_in6>() => {
            let sin6 = &*(ai.ai_addr as *const sockaddr_in6);
            let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            Some(SocketAddr::from((ip, u16::from_be(sin6.sin6_port))))
        }
        _ => None,
    }
}

fn getaddrinfo(host: &str, service: &str) -> Result<Vec<Endpoint>, ErrorCode> {
    let host = CString::new(host).map_err(|_| ErrorCode::Unknown)?;
    let service = CString::new(service).map_err(|_| ErrorCode::Unknown)?;
    let list = AddrInfoList::lookup(&host, &service).map_err(|_| ErrorCode::ResolveFailed)?;
    Ok(list.addrs().into_iter().map(Endpoint::from).collect())
}

/// Blocking host and service lookup.
pub struct Resolver<'ctx> {
    ctx: &'ctx Context,
}

impl<'ctx> Resolver<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Resolver { ctx }
    }

    /// Resolves `host` and `service` in the order the system returns them.
    ///
    /// An empty `service` yields port 0. An empty `host` yields the loopback
    /// addresses.
    ///
    /// The lookup itself is a blocking `getaddrinfo` call made from inside the
    /// unit of work. A slow name server holds the pump for as long as the call
    /// takes, and [`Context::stop`] is only observed once it returns.
    pub fn resolve(&self, host: &str, service: &str) -> ResolveResult {
        let work = async { getaddrinfo(host, service) };
        match bridge::block_on(self.ctx, "resolver.resolve", work) {
            Ok(Ok(endpoints)) => ResolveResult {
                error: Error::NONE,
                endpoints,
            },
            Ok(Err(code)) => ResolveResult::failed(code.into()),
            Err(err) => ResolveResult::failed(err),
        }
    }
}

impl fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Resolver").finish()
    }
}
