//! Capability set
//!
//! Resolves the control sequences the renderer needs from a terminal
//! description, together with the screen geometry.

use std::collections::HashMap;
use std::env;
use std::fmt;

use tracing::{debug, info};

use super::terminfo::{num, string, TermInfo};
use super::TermError;

/// The control sequences used by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CursorMove,
    ScrollForward,
    ChangeScrollRegion,
    ClearScreen,
    CarriageReturn,
    ClearToEndOfLine,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::CursorMove,
        Capability::ScrollForward,
        Capability::ChangeScrollRegion,
        Capability::ClearScreen,
        Capability::CarriageReturn,
        Capability::ClearToEndOfLine,
    ];

    /// terminfo capability name
    pub fn name(self) -> &'static str {
        match self {
            Capability::CursorMove => "cup",
            Capability::ScrollForward => "ind",
            Capability::ChangeScrollRegion => "csr",
            Capability::ClearScreen => "clear",
            Capability::CarriageReturn => "cr",
            Capability::ClearToEndOfLine => "el",
        }
    }

    /// Human readable label
    pub fn label(self) -> &'static str {
        match self {
            Capability::CursorMove => "cursor move",
            Capability::ScrollForward => "scroll forward",
            Capability::ChangeScrollRegion => "change scroll region",
            Capability::ClearScreen => "clear screen",
            Capability::CarriageReturn => "carriage return",
            Capability::ClearToEndOfLine => "clear to end of line",
        }
    }

    fn index(self) -> usize {
        match self {
            Capability::CursorMove => string::CURSOR_ADDRESS,
            Capability::ScrollForward => string::SCROLL_FORWARD,
            Capability::ChangeScrollRegion => string::CHANGE_SCROLL_REGION,
            Capability::ClearScreen => string::CLEAR_SCREEN,
            Capability::CarriageReturn => string::CARRIAGE_RETURN,
            Capability::ClearToEndOfLine => string::CLR_EOL,
        }
    }

    pub fn is_required(self) -> bool {
        !matches!(self, Capability::CarriageReturn)
    }

    /// Substitute used when an optional capability is absent
    pub fn fallback(self) -> Option<&'static [u8]> {
        match self {
            Capability::CarriageReturn => Some(b"\r"),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.label())
    }
}

/// Screen size, fixed for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub lines: u16,
    pub columns: u16,
}

/// Size sources that take precedence over the terminal description
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeHints {
    /// `LINES` / `COLUMNS` from the environment
    pub env_lines: Option<u16>,
    pub env_columns: Option<u16>,
    /// Live window size as (columns, lines)
    pub window: Option<(u16, u16)>,
}

impl SizeHints {
    /// Gather hints from the environment and the controlling terminal
    pub fn detect() -> Self {
        let window = crossterm::terminal::size()
            .ok()
            .filter(|&(cols, rows)| cols > 0 && rows > 0);
        Self {
            env_lines: env_number("LINES"),
            env_columns: env_number("COLUMNS"),
            window,
        }
    }
}

fn env_number(key: &str) -> Option<u16> {
    env::var(key).ok()?.trim().parse().ok().filter(|&n| n > 0)
}

/// Resolved capabilities plus geometry
#[derive(Debug, Clone)]
pub struct CapabilitySet {
    geometry: Geometry,
    /// `None` marks an absent optional capability
    sequences: HashMap<Capability, Option<Vec<u8>>>,
}

impl CapabilitySet {
    /// Load the description for `term` and resolve everything the renderer needs
    pub fn load(term: &str) -> Result<Self, TermError> {
        let info = TermInfo::load(term)?;
        let set = Self::from_terminfo(&info, SizeHints::detect())?;
        info!(
            "Terminal {}: {}x{}",
            term, set.geometry.columns, set.geometry.lines
        );
        Ok(set)
    }

    /// Resolve from an already decoded description
    pub fn from_terminfo(info: &TermInfo, hints: SizeHints) -> Result<Self, TermError> {
        let described = |index: usize| {
            info.number(index)
                .and_then(|n| u16::try_from(n).ok())
                .filter(|&n| n > 0)
        };
        let lines = hints
            .env_lines
            .or(hints.window.map(|(_, rows)| rows))
            .or_else(|| described(num::LINES))
            .unwrap_or(0);
        let columns = hints
            .env_columns
            .or(hints.window.map(|(cols, _)| cols))
            .or_else(|| described(num::COLUMNS))
            .unwrap_or(0);

        // One row for the log region and one for the input line at minimum.
        if lines < 2 || columns == 0 {
            return Err(TermError::InvalidGeometry { lines, columns });
        }

        let mut sequences = HashMap::new();
        for cap in Capability::ALL {
            match info.string(cap.index()) {
                Some(seq) => {
                    sequences.insert(cap, Some(seq.to_vec()));
                }
                None if cap.is_required() => {
                    return Err(TermError::MissingCapability(cap));
                }
                None => {
                    debug!("Optional capability {} absent", cap);
                    sequences.insert(cap, None);
                }
            }
        }

        Ok(Self {
            geometry: Geometry { lines, columns },
            sequences,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Raw template as found in the description
    pub fn get(&self, cap: Capability) -> Option<&[u8]> {
        self.sequences.get(&cap).and_then(|seq| seq.as_deref())
    }

    /// Template with the fallback applied for absent optional capabilities
    pub fn resolve(&self, cap: Capability) -> Option<&[u8]> {
        self.get(cap).or_else(|| cap.fallback())
    }
}
