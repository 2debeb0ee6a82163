//! Capability-driven renderer
//!
//! Turns screen operations into terminal-specific control sequences and
//! writes them to a single output sink.

use std::io::{self, Write};

use tracing::trace;

use crate::core::term::{strip_padding, tgoto, Capability, CapabilitySet, Geometry};

/// Terminal renderer
///
/// Every operation is written and flushed immediately; nothing is batched.
pub struct Renderer<W: Write> {
    out: W,
    caps: CapabilitySet,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, caps: CapabilitySet) -> Self {
        Self { out, caps }
    }

    pub fn geometry(&self) -> Geometry {
        self.caps.geometry()
    }

    pub fn clear_screen(&mut self) -> io::Result<()> {
        self.cap_write(Capability::ClearScreen)
    }

    pub fn carriage_return(&mut self) -> io::Result<()> {
        self.cap_write(Capability::CarriageReturn)
    }

    pub fn clear_to_end_of_line(&mut self) -> io::Result<()> {
        self.cap_write(Capability::ClearToEndOfLine)
    }

    pub fn scroll_forward(&mut self) -> io::Result<()> {
        self.cap_write(Capability::ScrollForward)
    }

    /// Move the cursor to a 0-based (row, col)
    pub fn move_cursor(&mut self, row: u16, col: u16) -> io::Result<()> {
        self.cap_write_param(Capability::CursorMove, i32::from(col), i32::from(row))
    }

    /// Confine scrolling to rows `first..=last`
    pub fn change_scroll_region(&mut self, first: u16, last: u16) -> io::Result<()> {
        self.cap_write_param(Capability::ChangeScrollRegion, i32::from(last), i32::from(first))
    }

    /// Raw passthrough for prompts and glyph text
    pub fn put_text(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.emit(bytes)
    }

    /// Borrow the sink
    #[allow(dead_code)]
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn template(&self, cap: Capability) -> io::Result<&[u8]> {
        self.caps.resolve(cap).ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, format!("capability {} unavailable", cap))
        })
    }

    fn cap_write(&mut self, cap: Capability) -> io::Result<()> {
        let seq = strip_padding(self.template(cap)?);
        trace!("{} -> {:?}", cap.name(), String::from_utf8_lossy(&seq));
        self.emit(&seq)
    }

    /// Expand a two-parameter capability with termcap argument order
    fn cap_write_param(&mut self, cap: Capability, p1: i32, p2: i32) -> io::Result<()> {
        let expanded = tgoto(self.template(cap)?, p1, p2)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let seq = strip_padding(&expanded);
        trace!("{}({}, {}) -> {:?}", cap.name(), p1, p2, String::from_utf8_lossy(&seq));
        self.emit(&seq)
    }

    fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        self.out.flush()
    }
}
