//! Net layer error types.

use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;

use photon_core::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// epoll_create1 / eventfd / socket failed.
    #[error("{what} setup failed: {source}")]
    Setup {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    /// epoll_ctl(ADD/MOD) rejected the descriptor (fd limit, bad fd, ...).
    #[error("cannot register fd {fd} with the poller: {source}")]
    Registration {
        fd: RawFd,
        #[source]
        source: io::Error,
    },
    /// epoll_wait failed with something other than EINTR.
    #[error("poller wait failed: {0}")]
    Poll(#[source] io::Error),
    /// bind(2) failed; fatal at startup.
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// listen(2) failed; fatal at startup.
    #[error("listen on {addr} failed: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// Installing the stop signal handlers failed.
    #[error("signal handler install failed: {0}")]
    Signal(#[source] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;

/// Turn a libc return value into `io::Result`, capturing errno on `-1`.
#[inline]
pub(crate) fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// `cvt` for the `ssize_t` returning calls (recv/send/read/write).
#[inline]
pub(crate) fn cvt_size(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = NetError::Registration {
            fd: 7,
            source: io::Error::from_raw_os_error(libc::EMFILE),
        };
        assert!(e.to_string().starts_with("cannot register fd 7 with the poller"));

        let e = NetError::Setup {
            what: "epoll",
            source: io::Error::from_raw_os_error(libc::ENOMEM),
        };
        assert!(e.to_string().starts_with("epoll setup failed"));
    }

    #[test]
    fn test_cvt() {
        assert_eq!(cvt(3).unwrap(), 3);
        assert_eq!(cvt_size(0).unwrap(), 0);
    }
}
