//! Terminal plumbing and the session loop.
//!
//! - **term**: terminfo lookup, capability set, parameter expansion
//! - **tty**: raw-mode termios, input wait/read, job control
//! - **session**: wait-read-dispatch state machine
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── Tty (raw mode, poll + read, suspend/resume)
//! ├── LineEditor (input line model)
//! └── Renderer
//!     └── CapabilitySet (terminfo sequences + geometry)
//! ```

pub mod term;
#[cfg(unix)]
pub mod tty;
#[cfg(unix)]
pub mod session;
