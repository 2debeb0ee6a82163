//! Controlling terminal access
//!
//! Raw-mode termios handling, the blocking wait on the input descriptor,
//! single-byte reads, and job-control suspend/resume.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use signal_hook::SigId;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum TtyError {
    #[error("Failed to read terminal attributes: {0}")]
    Capture(#[source] io::Error),

    #[error("Failed to set terminal attributes: {0}")]
    Apply(#[source] io::Error),

    #[error("Failed to register continue signal handler: {0}")]
    Signal(#[source] io::Error),
}

/// Outcome of waiting for input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Input (or end of file) is available
    Ready,
    /// Nothing arrived within the timeout
    Timeout,
    /// A signal interrupted the wait
    Interrupted,
}

/// The terminal as seen by the session loop
pub trait Tty {
    /// Block until input is available or `timeout` expires
    fn wait(&mut self, timeout: Duration) -> io::Result<WaitResult>;

    /// Read one byte; `None` is end of file
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Stop the whole process; returns once it has been continued
    fn suspend(&mut self) -> io::Result<()>;

    /// Apply the raw-mode attributes again
    fn reapply(&mut self) -> io::Result<()>;

    /// Whether the process was continued since the last call
    fn take_resumed(&mut self) -> bool;
}

/// Derive the raw-mode attributes from the original ones.
///
/// Input is 8-bit clean, echo, canonical mode and signal generation are off,
/// and reads return immediately with whatever is available.
pub fn raw_attributes(original: &libc::termios) -> libc::termios {
    let mut raw = *original;
    raw.c_iflag &= !libc::ISTRIP;
    raw.c_lflag &= !(libc::ECHO | libc::ICANON | libc::ISIG);
    raw.c_cc[libc::VMIN] = 0;
    raw
}

/// Raw-mode guard; restores the original attributes once, on drop at the latest
pub struct RawMode {
    fd: RawFd,
    original: Option<libc::termios>,
    applied: libc::termios,
}

impl RawMode {
    /// Capture the current attributes of `fd` and switch it to raw mode
    pub fn enable(fd: RawFd) -> Result<Self, TtyError> {
        let original = get_attributes(fd).map_err(TtyError::Capture)?;
        let mode = Self {
            fd,
            original: Some(original),
            applied: raw_attributes(&original),
        };
        // On failure `mode` is dropped here, which restores the capture.
        mode.reapply().map_err(TtyError::Apply)?;
        debug!("Raw mode enabled on fd {}", fd);
        Ok(mode)
    }

    /// Apply the raw attributes again, e.g. after a stop/continue cycle
    pub fn reapply(&self) -> io::Result<()> {
        set_attributes(self.fd, &self.applied)
    }

    /// Restore the original attributes; later calls do nothing
    pub fn restore(&mut self) -> io::Result<()> {
        match self.original.take() {
            Some(original) => {
                set_attributes(self.fd, &original)?;
                debug!("Terminal attributes restored on fd {}", self.fd);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            error!("Failed to restore terminal attributes: {}", e);
        }
    }
}

fn get_attributes(fd: RawFd) -> io::Result<libc::termios> {
    // SAFETY: `termios` is plain old data, so a zeroed value is valid, and
    // tcgetattr only writes into the struct we pass.
    unsafe {
        let mut attrs: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut attrs) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(attrs)
    }
}

fn set_attributes(fd: RawFd, attrs: &libc::termios) -> io::Result<()> {
    // SAFETY: `attrs` points to a valid termios for the duration of the call.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, attrs) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Standard input of a terminal session in raw mode
pub struct StdinTty {
    fd: RawFd,
    raw: RawMode,
    resumed: Arc<AtomicBool>,
    sig_id: SigId,
}

impl StdinTty {
    /// Switch stdin to raw mode and watch for continue signals
    pub fn open() -> Result<Self, TtyError> {
        let fd = libc::STDIN_FILENO;
        let raw = RawMode::enable(fd)?;

        let resumed = Arc::new(AtomicBool::new(false));
        let sig_id = signal_hook::flag::register(signal_hook::consts::SIGCONT, Arc::clone(&resumed))
            .map_err(TtyError::Signal)?;

        info!("Terminal input ready");
        Ok(Self {
            fd,
            raw,
            resumed,
            sig_id,
        })
    }
}

impl Tty for StdinTty {
    fn wait(&mut self, timeout: Duration) -> io::Result<WaitResult> {
        let mut fds = [libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        }];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

        // SAFETY: `fds` is a valid array of one pollfd for the whole call.
        let n = unsafe { libc::poll(fds.as_mut_ptr(), 1, timeout_ms) };
        match n {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    Ok(WaitResult::Interrupted)
                } else {
                    Err(err)
                }
            }
            0 => Ok(WaitResult::Timeout),
            _ => Ok(WaitResult::Ready),
        }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = 0u8;
        loop {
            // SAFETY: reads at most one byte into a live local.
            let n = unsafe { libc::read(self.fd, (&mut byte as *mut u8).cast(), 1) };
            match n {
                -1 => {
                    let err = io::Error::last_os_error();
                    if err.kind() != io::ErrorKind::Interrupted {
                        return Err(err);
                    }
                }
                0 => return Ok(None),
                _ => return Ok(Some(byte)),
            }
        }
    }

    fn suspend(&mut self) -> io::Result<()> {
        info!("Suspending");
        // SAFETY: plain integer arguments; SIGSTOP to ourselves blocks until SIGCONT.
        if unsafe { libc::kill(libc::getpid(), libc::SIGSTOP) } != 0 {
            return Err(io::Error::last_os_error());
        }
        info!("Resumed");
        Ok(())
    }

    fn reapply(&mut self) -> io::Result<()> {
        self.raw.reapply()
    }

    fn take_resumed(&mut self) -> bool {
        self.resumed.swap(false, Ordering::SeqCst)
    }
}

impl Drop for StdinTty {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.sig_id);
    }
}
