//! Terminal description and control-sequence generation.
//!
//! - **terminfo**: compiled terminfo database lookup and decoding
//! - **params**: `%` parameter language (`tparm`/`tgoto`) and padding removal
//! - **caps**: the capability set and screen geometry used by the renderer

use std::io;
use thiserror::Error;

pub mod caps;
pub mod params;
pub mod terminfo;

pub use caps::{Capability, CapabilitySet, Geometry};
pub use params::{strip_padding, tgoto};

#[derive(Error, Debug)]
pub enum TermError {
    #[error("Unsupported terminal type: '{0}'")]
    UnsupportedTerminal(String),

    #[error("Missing required capability {0}")]
    MissingCapability(Capability),

    #[error("Unusable screen geometry: {lines} lines x {columns} columns")]
    InvalidGeometry { lines: u16, columns: u16 },

    #[error("Malformed terminfo entry: {0}")]
    Malformed(String),

    #[error("Failed to read terminfo entry: {0}")]
    Io(#[from] io::Error),
}
