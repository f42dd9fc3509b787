//! Raw IPv4 TCP socket setup on top of libc.

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use crate::error::{cvt, NetError, Result};

fn set_int_opt(fd: RawFd, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> io::Result<()> {
    cvt(unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

pub(crate) fn to_sockaddr(addr: SocketAddrV4) -> libc::sockaddr_in {
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_port = addr.port().to_be();
    sin.sin_addr.s_addr = u32::from_ne_bytes(addr.ip().octets());
    sin
}

pub(crate) fn from_sockaddr(sin: &libc::sockaddr_in) -> SocketAddrV4 {
    SocketAddrV4::new(
        Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes()),
        u16::from_be(sin.sin_port),
    )
}

/// socket + SO_REUSEADDR + bind + listen. The socket is non-blocking and
/// close-on-exec.
pub(crate) fn listen_tcp(addr: SocketAddrV4, backlog: i32) -> Result<OwnedFd> {
    let raw = cvt(unsafe {
        libc::socket(
            libc::AF_INET,
            libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            0,
        )
    })
    .map_err(|source| NetError::Setup { what: "socket", source })?;
    // Safety: fresh descriptor; dropping `fd` on any error below closes it.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    set_int_opt(raw, libc::SOL_SOCKET, libc::SO_REUSEADDR, 1)
        .map_err(|source| NetError::Setup { what: "SO_REUSEADDR", source })?;

    let sin = to_sockaddr(addr);
    cvt(unsafe {
        libc::bind(
            raw,
            &sin as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    })
    .map_err(|source| NetError::Bind { addr: addr.into(), source })?;

    cvt(unsafe { libc::listen(raw, backlog) })
        .map_err(|source| NetError::Listen { addr: addr.into(), source })?;

    Ok(fd)
}

/// One `accept4`. The new socket is non-blocking with `TCP_NODELAY`.
pub(crate) fn accept(listen_fd: RawFd) -> io::Result<(OwnedFd, SocketAddr)> {
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let raw = cvt(unsafe {
        libc::accept4(
            listen_fd,
            &mut sin as *mut libc::sockaddr_in as *mut libc::sockaddr,
            &mut len,
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )
    })?;
    // Safety: accept4 handed us a new descriptor.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };
    // Latency only; a failure here is not worth dropping the client.
    let _ = set_int_opt(raw, libc::IPPROTO_TCP, libc::TCP_NODELAY, 1);
    Ok((fd, SocketAddr::V4(from_sockaddr(&sin))))
}

/// Bound address of `fd` (resolves port 0 to the kernel's pick).
pub(crate) fn local_addr(fd: RawFd) -> io::Result<SocketAddr> {
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    cvt(unsafe {
        libc::getsockname(
            fd,
            &mut sin as *mut libc::sockaddr_in as *mut libc::sockaddr,
            &mut len,
        )
    })?;
    Ok(SocketAddr::V4(from_sockaddr(&sin)))
}
