//! SIGINT/SIGTERM -> event loop wake-up
//!
//! The handler only loads a descriptor from a static atomic and writes to
//! it, which keeps it async-signal-safe. The `Waker` itself is parked in a
//! mutex-guarded static outside the handler so its duplicate eventfd stays
//! open for as long as the handler may use it.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::{NetError, Result};
use crate::event_loop::{raw_wake, Waker};

const STOP_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGTERM];

static WAKE_FD: AtomicI32 = AtomicI32::new(-1);
static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);
static PARKED: Mutex<Option<Waker>> = Mutex::new(None);

extern "C" fn on_stop_signal(_sig: libc::c_int) {
    // The interrupted code may be about to read errno; write(2) can clobber it.
    let saved = unsafe { *libc::__errno_location() };
    let fd = WAKE_FD.load(Ordering::Acquire);
    if fd >= 0 {
        raw_wake(fd);
    }
    unsafe { *libc::__errno_location() = saved };
}

fn set_action(handler: SigHandler) -> Result<()> {
    let action = SigAction::new(handler, SaFlags::SA_RESTART, SigSet::empty());
    for sig in STOP_SIGNALS {
        // Safety: the handler only touches an atomic and calls write(2).
        unsafe { sigaction(sig, &action) }.map_err(|e| NetError::Signal(io::Error::from(e)))?;
    }
    Ok(())
}

/// Route SIGINT/SIGTERM to `waker`.
///
/// Installing again replaces the previous target; only the most recent
/// loop is stopped.
pub fn install_stop_handler(waker: Waker) -> Result<()> {
    {
        let mut parked = PARKED.lock().unwrap_or_else(|e| e.into_inner());
        // Publish the new fd before the old waker (and its fd) is dropped.
        WAKE_FD.store(waker.raw_fd(), Ordering::Release);
        *parked = Some(waker);
    }
    if !HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        if let Err(e) = set_action(SigHandler::Handler(on_stop_signal)) {
            HANDLER_INSTALLED.store(false, Ordering::SeqCst);
            return Err(e);
        }
    }
    Ok(())
}

/// Restore the default dispositions and release the parked waker.
pub fn clear_stop_handler() -> Result<()> {
    if HANDLER_INSTALLED.swap(false, Ordering::SeqCst) {
        set_action(SigHandler::SigDfl)?;
    }
    WAKE_FD.store(-1, Ordering::Release);
    PARKED.lock().unwrap_or_else(|e| e.into_inner()).take();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::{EventLoop, LoopHandle, ReadyHandler, StopReason};
    use std::os::fd::{AsRawFd, RawFd};

    // Both tests swap process-wide dispositions.
    static SERIAL: Mutex<()> = Mutex::new(());

    struct Noop;

    impl ReadyHandler for Noop {
        fn handle_read(&mut self, _lp: &mut LoopHandle<'_>, _fd: RawFd) {}
    }

    #[test]
    fn test_sigterm_wakes_loop() {
        let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let mut lp = EventLoop::new().unwrap();
        install_stop_handler(lp.waker()).unwrap();

        nix::sys::signal::raise(Signal::SIGTERM).unwrap();
        assert_eq!(lp.run(&mut Noop), StopReason::WokenUp);

        clear_stop_handler().unwrap();
        assert_eq!(WAKE_FD.load(Ordering::Acquire), -1);
        // Idempotent.
        clear_stop_handler().unwrap();
    }

    #[test]
    fn test_handler_preserves_errno() {
        let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let lp = EventLoop::new().unwrap();
        install_stop_handler(lp.waker()).unwrap();

        // Point the handler at a read-only descriptor so its write fails.
        let read_only = std::fs::File::open("/dev/null").unwrap();
        WAKE_FD.store(read_only.as_raw_fd(), Ordering::Release);

        unsafe {
            *libc::__errno_location() = libc::EDOM;
            assert_eq!(libc::raise(libc::SIGTERM), 0);
            assert_eq!(*libc::__errno_location(), libc::EDOM);
        }

        clear_stop_handler().unwrap();
        drop(read_only);
    }
}
