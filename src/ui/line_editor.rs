//! Bottom-line input editor
//!
//! Keeps the model of the input line (prompt, committed glyphs and their
//! display widths, pending multi-byte input) and mirrors every change on the
//! screen through the [`Renderer`].
//!
//! The line never wraps: a glyph that would reach the last screen column is
//! dropped.

use std::io::{self, Write};

use tracing::{debug, trace};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::renderer::Renderer;
use super::utf8::{Decode, Utf8Assembler};

/// Display width of a control byte rendered as `[xx]`
pub const CONTROL_GLYPH_WIDTH: usize = 4;

/// One committed unit of the input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glyph {
    pub text: String,
    pub width: usize,
}

/// Input line state
#[derive(Debug)]
pub struct LineEditor {
    /// Literal prompt tag (`input` in `input.1> `)
    tag: String,
    /// Number shown in the prompt; bumped after each non-empty line
    input_count: u64,
    prompt: String,
    prompt_width: usize,
    glyphs: Vec<Glyph>,
    /// Total line width including the prompt
    width: usize,
    pending: Utf8Assembler,
}

impl LineEditor {
    pub fn new(tag: impl Into<String>) -> Self {
        let mut editor = Self {
            tag: tag.into(),
            input_count: 1,
            prompt: String::new(),
            prompt_width: 0,
            glyphs: Vec::new(),
            width: 0,
            pending: Utf8Assembler::new(),
        };
        editor.build_prompt();
        editor
    }

    /// Current line width in columns, prompt included
    pub fn width(&self) -> usize {
        self.width
    }

    #[allow(dead_code)]
    pub fn input_count(&self) -> u64 {
        self.input_count
    }

    #[allow(dead_code)]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[allow(dead_code)]
    pub fn prompt_width(&self) -> usize {
        self.prompt_width
    }

    #[allow(dead_code)]
    pub fn glyphs(&self) -> &[Glyph] {
        &self.glyphs
    }

    /// Number of bytes of an unfinished multi-byte sequence
    #[allow(dead_code)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Text of the committed glyphs
    pub fn text(&self) -> String {
        self.glyphs.iter().map(|g| g.text.as_str()).collect()
    }

    /// Rebuild the prompt from the counter and start an empty line
    pub fn reset<W: Write>(&mut self, renderer: &mut Renderer<W>) -> io::Result<()> {
        self.build_prompt();
        self.clear_line(renderer)
    }

    /// Discard the line contents, keep the prompt, and redraw it
    pub fn clear_line<W: Write>(&mut self, renderer: &mut Renderer<W>) -> io::Result<()> {
        self.glyphs.clear();
        self.pending.clear();
        self.width = self.prompt_width;
        renderer.put_text(self.prompt.as_bytes())
    }

    /// Feed one input byte
    ///
    /// DEL, backspace, and newline are handled by the session before they get here.
    pub fn put_byte<W: Write>(&mut self, renderer: &mut Renderer<W>, byte: u8) -> io::Result<()> {
        if byte < 0x20 && self.pending.is_empty() {
            return self.commit(renderer, control_glyph(u32::from(byte)), CONTROL_GLYPH_WIDTH);
        }

        self.pending.push(byte);

        while !self.pending.is_empty() {
            match self.pending.decode() {
                Decode::Char(ch, len) => {
                    // A control code point reaching the front after a resync
                    // must never be written raw.
                    let (text, width) = if ch.is_control() {
                        (control_glyph(u32::from(ch)), CONTROL_GLYPH_WIDTH)
                    } else {
                        (ch.to_string(), ch.width().unwrap_or(0))
                    };
                    self.commit(renderer, text, width)?;
                    self.pending.consume(len);
                }
                Decode::Incomplete | Decode::Invalid if self.pending.is_stuck() => {
                    if let Some(dropped) = self.pending.resync() {
                        debug!("Dropped undecodable byte {:#04x}", dropped);
                    }
                }
                Decode::Incomplete | Decode::Invalid => break,
            }
        }

        Ok(())
    }

    /// Remove the most recent input and return how many columns it occupied
    ///
    /// A pending partial sequence was never drawn, so dropping one of its
    /// bytes frees no columns.
    pub fn delete_last(&mut self) -> usize {
        if self.pending.pop_last().is_some() {
            return 0;
        }

        match self.glyphs.pop() {
            Some(glyph) => {
                self.width -= glyph.width;
                glyph.width
            }
            None => 0,
        }
    }

    /// Finish the current line and start the next one
    pub fn put_enter<W: Write>(&mut self, renderer: &mut Renderer<W>) -> io::Result<()> {
        renderer.put_text(b"\n")?;
        if !self.glyphs.is_empty() {
            debug!("{}.{}: {:?}", self.tag, self.input_count, self.text());
            self.input_count += 1;
        }
        self.reset(renderer)
    }

    fn build_prompt(&mut self) {
        self.prompt = format!("{}.{}> ", self.tag, self.input_count);
        self.prompt_width = self.prompt.width();
    }

    /// Append a glyph if it fits before the last screen column
    fn commit<W: Write>(
        &mut self,
        renderer: &mut Renderer<W>,
        text: String,
        width: usize,
    ) -> io::Result<()> {
        let columns = usize::from(renderer.geometry().columns);
        if self.width + width >= columns {
            trace!("Discarded {:?} (width {}) at column {}", text, width, self.width);
            return Ok(());
        }

        renderer.put_text(text.as_bytes())?;
        self.width += width;
        self.glyphs.push(Glyph { text, width });
        Ok(())
    }
}

/// `[xx]` rendering of a control code point
fn control_glyph(code: u32) -> String {
    format!("[{:02x}]", code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::renderer::tests::test_renderer;

    fn setup(columns: u16) -> (LineEditor, Renderer<Vec<u8>>) {
        let mut renderer = test_renderer(24, columns);
        let mut editor = LineEditor::new("input");
        editor.reset(&mut renderer).unwrap();
        (editor, renderer)
    }

    fn feed(editor: &mut LineEditor, renderer: &mut Renderer<Vec<u8>>, bytes: &[u8]) {
        for &b in bytes {
            editor.put_byte(renderer, b).unwrap();
        }
    }

    fn assert_width_invariant(editor: &LineEditor) {
        let sum: usize = editor.glyphs().iter().map(|g| g.width).sum();
        assert_eq!(editor.width(), editor.prompt_width() + sum);
    }

    #[test]
    fn test_reset_writes_prompt() {
        let (editor, renderer) = setup(80);
        assert_eq!(editor.prompt(), "input.1> ");
        assert_eq!(editor.prompt_width(), 9);
        assert_eq!(editor.width(), 9);
        assert_eq!(renderer.get_ref().as_slice(), b"input.1> ");
    }

    #[test]
    fn test_truncates_at_screen_edge() {
        let (mut editor, mut renderer) = setup(80);
        feed(&mut editor, &mut renderer, &[b'a'; 75]);

        assert_eq!(editor.glyphs().len(), 70);
        assert_eq!(editor.width(), 79);
        assert_width_invariant(&editor);
        assert_eq!(renderer.get_ref().len(), 9 + 70);
    }

    #[test]
    fn test_wide_glyph_does_not_fit_last_columns() {
        let (mut editor, mut renderer) = setup(12);
        // 9 + 2 = 11 < 12
        feed(&mut editor, &mut renderer, "あ".as_bytes());
        assert_eq!(editor.width(), 11);
        // 11 + 2 >= 12: dropped; 11 + 1 >= 12: dropped too
        feed(&mut editor, &mut renderer, "いb".as_bytes());
        assert_eq!(editor.glyphs().len(), 1);
        assert_eq!(editor.pending_len(), 0);
        assert_width_invariant(&editor);
    }

    #[test]
    fn test_control_bytes_are_four_wide() {
        for byte in 0u8..0x20 {
            let (mut editor, mut renderer) = setup(80);
            editor.put_byte(&mut renderer, byte).unwrap();
            assert_eq!(editor.glyphs().len(), 1);
            assert_eq!(editor.glyphs()[0].width, CONTROL_GLYPH_WIDTH);
            assert_eq!(editor.glyphs()[0].text, format!("[{:02x}]", byte));
            assert_eq!(editor.width(), 13);
        }
    }

    #[test]
    fn test_multibyte_commits_on_last_byte() {
        let (mut editor, mut renderer) = setup(80);
        let bytes = "漢".as_bytes();

        editor.put_byte(&mut renderer, bytes[0]).unwrap();
        editor.put_byte(&mut renderer, bytes[1]).unwrap();
        assert!(editor.glyphs().is_empty());
        assert_eq!(editor.pending_len(), 2);
        assert_eq!(editor.width(), 9);

        editor.put_byte(&mut renderer, bytes[2]).unwrap();
        assert_eq!(editor.glyphs(), &[Glyph { text: "漢".to_string(), width: 2 }]);
        assert_eq!(editor.pending_len(), 0);
        assert_eq!(editor.width(), 11);
    }

    #[test]
    fn test_control_byte_joins_pending_sequence() {
        let (mut editor, mut renderer) = setup(80);
        editor.put_byte(&mut renderer, 0xE6).unwrap();
        editor.put_byte(&mut renderer, 0x01).unwrap();
        assert!(editor.glyphs().is_empty());
        assert_eq!(editor.pending_len(), 2);
    }

    #[test]
    fn test_invalid_sequence_drops_one_byte() {
        let (mut editor, mut renderer) = setup(80);
        feed(&mut editor, &mut renderer, &[0xFF, 0xFF, 0xFF]);
        assert_eq!(editor.pending_len(), 3);

        editor.put_byte(&mut renderer, 0xFF).unwrap();
        assert_eq!(editor.pending_len(), 3);
        assert!(editor.glyphs().is_empty());
    }

    #[test]
    fn test_decoding_resumes_after_resync() {
        let (mut editor, mut renderer) = setup(80);
        feed(&mut editor, &mut renderer, &[0xFF, b'a', b'b', b'c']);
        assert_eq!(editor.text(), "abc");
        assert_eq!(editor.pending_len(), 0);
        assert_width_invariant(&editor);
    }

    #[test]
    fn test_zero_width_code_points() {
        let (mut editor, mut renderer) = setup(80);
        // U+0301 combining acute
        feed(&mut editor, &mut renderer, "e\u{301}".as_bytes());
        let widths: Vec<usize> = editor.glyphs().iter().map(|g| g.width).collect();
        assert_eq!(widths, vec![1, 0]);
        assert_eq!(editor.width(), 10);
    }

    #[test]
    fn test_c1_controls_are_bracketed() {
        let (mut editor, mut renderer) = setup(80);
        // U+0085 next line
        feed(&mut editor, &mut renderer, "\u{85}".as_bytes());
        assert_eq!(editor.glyphs(), &[Glyph { text: "[85]".to_string(), width: 4 }]);
        assert_eq!(renderer.get_ref().as_slice(), b"input.1> [85]");
        assert_eq!(editor.width(), 13);
    }

    #[test]
    fn test_escape_after_resync_is_not_written_raw() {
        let (mut editor, mut renderer) = setup(80);
        // A stray lead byte swallows ESC into the pending buffer until the resync.
        feed(&mut editor, &mut renderer, &[0xC3, 0x1B, b'[', b'A']);

        assert_eq!(renderer.get_ref().as_slice(), b"input.1> [1b][A");
        assert!(!renderer.get_ref().contains(&0x1B));
        assert_eq!(editor.text(), "[1b][A");
        assert_eq!(editor.width(), 15);
        assert_eq!(editor.pending_len(), 0);
        assert_width_invariant(&editor);
    }

    #[test]
    fn test_delete_round_trip() {
        let (mut editor, mut renderer) = setup(80);
        for input in ["a", "é", "あ", "\x07"] {
            let before = editor.width();
            feed(&mut editor, &mut renderer, input.as_bytes());
            let added = editor.width() - before;
            assert_eq!(editor.delete_last(), added);
            assert_eq!(editor.width(), before);
        }
        assert_eq!(editor.delete_last(), 0);
        assert_eq!(editor.width(), 9);
    }

    #[test]
    fn test_delete_pending_byte_returns_zero() {
        let (mut editor, mut renderer) = setup(80);
        feed(&mut editor, &mut renderer, b"x");
        feed(&mut editor, &mut renderer, &"あ".as_bytes()[..2]);

        assert_eq!(editor.delete_last(), 0);
        assert_eq!(editor.pending_len(), 1);
        assert_eq!(editor.delete_last(), 0);
        assert_eq!(editor.pending_len(), 0);
        assert_eq!(editor.delete_last(), 1);
        assert!(editor.glyphs().is_empty());
    }

    #[test]
    fn test_enter_on_empty_line_keeps_counter() {
        let (mut editor, mut renderer) = setup(80);
        editor.put_enter(&mut renderer).unwrap();
        assert_eq!(editor.input_count(), 1);
        assert_eq!(editor.prompt(), "input.1> ");
        assert_eq!(renderer.get_ref().as_slice(), b"input.1> \ninput.1> ");
    }

    #[test]
    fn test_enter_after_input_bumps_counter() {
        let (mut editor, mut renderer) = setup(80);
        feed(&mut editor, &mut renderer, b"hi");
        feed(&mut editor, &mut renderer, &"あ".as_bytes()[..1]);
        editor.put_enter(&mut renderer).unwrap();

        assert_eq!(editor.input_count(), 2);
        assert_eq!(editor.prompt(), "input.2> ");
        assert!(editor.glyphs().is_empty());
        assert_eq!(editor.pending_len(), 0);
        assert_eq!(editor.width(), 9);
        assert_eq!(renderer.get_ref().as_slice(), b"input.1> hi\ninput.2> ");
    }

    #[test]
    fn test_clear_line_keeps_prompt() {
        let (mut editor, mut renderer) = setup(80);
        feed(&mut editor, &mut renderer, b"abc");
        editor.clear_line(&mut renderer).unwrap();
        assert_eq!(editor.input_count(), 1);
        assert!(editor.glyphs().is_empty());
        assert_eq!(editor.width(), 9);
    }

    #[test]
    fn test_prompt_width_counts_columns() {
        let editor = LineEditor::new("入力");
        assert_eq!(editor.prompt(), "入力.1> ");
        assert_eq!(editor.prompt_width(), 8);
    }
}
