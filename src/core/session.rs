//! Session controller
//!
//! Drives the wait-read-dispatch cycle: control characters become session
//! actions, everything else goes to the line editor, and idle timeouts are
//! logged into the scroll region above the input line.

use std::io::{self, Write};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use super::tty::{Tty, WaitResult};
use crate::ui::{LineEditor, Renderer};

/// Control bytes with a session-level meaning
pub mod keys {
    pub const INTERRUPT: u8 = 0x03; // ^C
    pub const EOF: u8 = 0x04; // ^D
    pub const BACKSPACE: u8 = 0x08; // ^H
    pub const NEWLINE: u8 = 0x0A; // ^J
    pub const KILL_LINE: u8 = 0x15; // ^U
    pub const SUSPEND: u8 = 0x1A; // ^Z
    pub const DELETE: u8 = 0x7F;
}

/// Erases one column to the left of the cursor
const ERASE_COLUMN: &[u8] = b"\x08 \x08";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to wait for input: {0}")]
    Wait(#[source] io::Error),

    #[error("Failed to read input: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write to terminal: {0}")]
    Output(#[source] io::Error),

    #[error("Failed to suspend: {0}")]
    Suspend(#[source] io::Error),

    #[error("Failed to restore raw mode after resume: {0}")]
    Reapply(#[source] io::Error),
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    /// Suspended by job control, waiting to be continued
    Stopped,
    Terminated,
}

/// Result of one [`Session::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A byte was handled, or the wait was interrupted
    Continue,
    /// The wait timed out
    Idle,
    /// End of input or interrupt character
    Terminate,
}

/// Session behavior settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll_timeout: Duration,
    /// Write a notice into the log region on every timeout
    pub idle_log: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            idle_log: true,
        }
    }
}

/// Interactive session over a terminal
pub struct Session<T: Tty, W: Write> {
    tty: T,
    renderer: Renderer<W>,
    editor: LineEditor,
    options: SessionOptions,
    state: SessionState,
    /// Number shown in the next idle notice
    wait_count: u64,
}

impl<T: Tty, W: Write> Session<T, W> {
    pub fn new(tty: T, renderer: Renderer<W>, editor: LineEditor, options: SessionOptions) -> Self {
        Self {
            tty,
            renderer,
            editor,
            options,
            state: SessionState::Running,
            wait_count: 1,
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[allow(dead_code)]
    pub fn editor(&self) -> &LineEditor {
        &self.editor
    }

    #[allow(dead_code)]
    pub fn renderer(&self) -> &Renderer<W> {
        &self.renderer
    }

    #[allow(dead_code)]
    pub fn tty(&self) -> &T {
        &self.tty
    }

    /// Clear the screen and put the prompt on the bottom row
    pub fn start(&mut self) -> Result<(), SessionError> {
        let input_row = self.input_row();
        let result = self
            .renderer
            .clear_screen()
            .and_then(|_| self.renderer.move_cursor(input_row, 0))
            .and_then(|_| self.editor.reset(&mut self.renderer));
        self.check(result.map_err(SessionError::Output))
    }

    /// Run until end of input, the interrupt character, or a fatal error
    pub fn run(&mut self) -> Result<(), SessionError> {
        info!("Session loop started");
        while self.step()? != Step::Terminate {}
        info!("Session loop finished");
        Ok(())
    }

    /// One wait-read-dispatch cycle
    pub fn step(&mut self) -> Result<Step, SessionError> {
        if self.state == SessionState::Terminated {
            return Ok(Step::Terminate);
        }

        // Continued after a stop we did not initiate.
        if self.tty.take_resumed() {
            debug!("Continued externally, reapplying raw mode");
            let result = self.tty.reapply().map_err(SessionError::Reapply);
            self.check(result)?;
        }

        let waited = self.tty.wait(self.options.poll_timeout).map_err(SessionError::Wait);
        match self.check(waited)? {
            WaitResult::Interrupted => Ok(Step::Continue),
            WaitResult::Timeout => {
                if self.options.idle_log {
                    let msg = format!("waiting for input ({}) ...", self.wait_count);
                    let result = self.log(&msg).map_err(SessionError::Output);
                    self.check(result)?;
                }
                self.wait_count += 1;
                Ok(Step::Idle)
            }
            WaitResult::Ready => {
                let read = self.tty.read_byte().map_err(SessionError::Read);
                match self.check(read)? {
                    Some(byte) => self.on_byte(byte),
                    None => {
                        debug!("End of input");
                        self.terminate()
                    }
                }
            }
        }
    }

    /// Write a line into the log region and return to the input line
    pub fn log(&mut self, msg: &str) -> io::Result<()> {
        let log_last = self.input_row() - 1;
        let input_row = self.input_row();
        let column = u16::try_from(self.editor.width()).unwrap_or(u16::MAX);

        self.renderer.change_scroll_region(0, log_last)?;
        self.renderer.move_cursor(log_last, 0)?;
        self.renderer.scroll_forward()?;
        self.renderer.put_text(msg.as_bytes())?;

        self.renderer.change_scroll_region(0, input_row)?;
        self.renderer.move_cursor(input_row, column)
    }

    fn on_byte(&mut self, byte: u8) -> Result<Step, SessionError> {
        let result = match byte {
            keys::INTERRUPT | keys::EOF => return self.terminate(),
            keys::BACKSPACE | keys::DELETE => self.erase_last(),
            keys::NEWLINE => self.editor.put_enter(&mut self.renderer),
            keys::KILL_LINE => self
                .renderer
                .carriage_return()
                .and_then(|_| self.renderer.clear_to_end_of_line())
                .and_then(|_| self.editor.clear_line(&mut self.renderer)),
            keys::SUSPEND => return self.suspend(),
            _ => self.editor.put_byte(&mut self.renderer, byte),
        };
        self.check(result.map_err(SessionError::Output))?;
        Ok(Step::Continue)
    }

    fn erase_last(&mut self) -> io::Result<()> {
        let columns = self.editor.delete_last();
        for _ in 0..columns {
            self.renderer.put_text(ERASE_COLUMN)?;
        }
        Ok(())
    }

    /// Stop the process and restore raw mode once it is continued
    fn suspend(&mut self) -> Result<Step, SessionError> {
        self.state = SessionState::Stopped;
        let stopped = self.tty.suspend().map_err(SessionError::Suspend);
        self.check(stopped)?;

        // The continue signal that woke us is handled here.
        self.tty.take_resumed();
        let result = self.tty.reapply().map_err(SessionError::Reapply);
        self.check(result)?;

        self.state = SessionState::Running;
        Ok(Step::Continue)
    }

    fn terminate(&mut self) -> Result<Step, SessionError> {
        self.state = SessionState::Terminated;
        self.renderer.put_text(b"\n").map_err(SessionError::Output)?;
        Ok(Step::Terminate)
    }

    /// Any error ends the session
    fn check<R>(&mut self, result: Result<R, SessionError>) -> Result<R, SessionError> {
        if result.is_err() {
            self.state = SessionState::Terminated;
        }
        result
    }

    fn input_row(&self) -> u16 {
        self.renderer.geometry().lines - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::renderer::tests::test_renderer;
    use std::collections::VecDeque;

    /// Scripted input events
    #[derive(Debug)]
    enum Event {
        Byte(u8),
        Timeout,
        Interrupted,
        Eof,
        WaitError,
        ReadError,
    }

    #[derive(Default)]
    struct ScriptedTty {
        events: VecDeque<Event>,
        pending_read: Option<Event>,
        suspends: usize,
        reapplies: usize,
        resumed: bool,
    }

    impl ScriptedTty {
        fn new(events: Vec<Event>) -> Self {
            Self {
                events: events.into(),
                ..Self::default()
            }
        }
    }

    impl Tty for ScriptedTty {
        fn wait(&mut self, _timeout: Duration) -> io::Result<WaitResult> {
            match self.events.pop_front() {
                Some(Event::Timeout) | None => Ok(WaitResult::Timeout),
                Some(Event::Interrupted) => Ok(WaitResult::Interrupted),
                Some(Event::WaitError) => Err(io::Error::from_raw_os_error(libc::EBADF)),
                Some(event) => {
                    self.pending_read = Some(event);
                    Ok(WaitResult::Ready)
                }
            }
        }

        fn read_byte(&mut self) -> io::Result<Option<u8>> {
            match self.pending_read.take() {
                Some(Event::Byte(b)) => Ok(Some(b)),
                Some(Event::ReadError) => Err(io::Error::from_raw_os_error(libc::EIO)),
                _ => Ok(None),
            }
        }

        fn suspend(&mut self) -> io::Result<()> {
            self.suspends += 1;
            // The continue signal sets the flag before we return.
            self.resumed = true;
            Ok(())
        }

        fn reapply(&mut self) -> io::Result<()> {
            self.reapplies += 1;
            Ok(())
        }

        fn take_resumed(&mut self) -> bool {
            std::mem::take(&mut self.resumed)
        }
    }

    fn bytes(input: &[u8]) -> Vec<Event> {
        input.iter().map(|&b| Event::Byte(b)).collect()
    }

    fn session(events: Vec<Event>) -> Session<ScriptedTty, Vec<u8>> {
        let mut s = Session::new(
            ScriptedTty::new(events),
            test_renderer(24, 80),
            LineEditor::new("input"),
            SessionOptions::default(),
        );
        s.start().unwrap();
        s
    }

    /// Output written after `start`
    fn output_since_start(s: &Session<ScriptedTty, Vec<u8>>) -> &[u8] {
        let start = b"\x1b[H\x1b[2J\x1b[24;1Hinput.1> ";
        let out = s.renderer().get_ref().as_slice();
        assert!(out.starts_with(start));
        &out[start.len()..]
    }

    #[test]
    fn test_start_clears_and_prompts_on_bottom_row() {
        let s = session(vec![]);
        assert_eq!(output_since_start(&s), b"");
        assert_eq!(s.state(), SessionState::Running);
    }

    #[test]
    fn test_idle_timeouts_are_logged_with_counter() {
        let mut s = session(vec![Event::Timeout, Event::Timeout]);
        assert_eq!(s.step().unwrap(), Step::Idle);
        assert_eq!(s.step().unwrap(), Step::Idle);

        let expected = [
            &b"\x1b[1;23r\x1b[23;1H\nwaiting for input (1) ...\x1b[1;24r\x1b[24;10H"[..],
            &b"\x1b[1;23r\x1b[23;1H\nwaiting for input (2) ...\x1b[1;24r\x1b[24;10H"[..],
        ]
        .concat();
        assert_eq!(output_since_start(&s), expected.as_slice());
        assert_eq!(s.editor().width(), 9);
        assert!(s.editor().glyphs().is_empty());
    }

    #[test]
    fn test_idle_log_restores_cursor_after_input() {
        let mut events = bytes(b"ab");
        events.push(Event::Timeout);
        let mut s = session(events);
        for _ in 0..3 {
            s.step().unwrap();
        }
        assert!(output_since_start(&s).ends_with(b"\x1b[1;24r\x1b[24;12H"));
        assert_eq!(s.editor().text(), "ab");
    }

    #[test]
    fn test_idle_log_can_be_disabled() {
        let mut s = Session::new(
            ScriptedTty::new(vec![Event::Timeout]),
            test_renderer(24, 80),
            LineEditor::new("input"),
            SessionOptions {
                poll_timeout: Duration::from_millis(10),
                idle_log: false,
            },
        );
        assert_eq!(s.step().unwrap(), Step::Idle);
        assert!(s.renderer().get_ref().is_empty());
    }

    #[test]
    fn test_interrupt_terminates_with_newline() {
        let mut events = bytes("xあ".as_bytes());
        events.truncate(2);
        events.push(Event::Byte(keys::INTERRUPT));
        let mut s = session(events);

        assert_eq!(s.step().unwrap(), Step::Continue);
        assert_eq!(s.step().unwrap(), Step::Continue);
        assert_eq!(s.editor().pending_len(), 1);
        assert_eq!(s.step().unwrap(), Step::Terminate);

        assert_eq!(s.state(), SessionState::Terminated);
        assert_eq!(output_since_start(&s), b"x\n");
        // Terminated sessions stay terminated
        assert_eq!(s.step().unwrap(), Step::Terminate);
    }

    #[test]
    fn test_eof_and_ctrl_d_terminate() {
        let mut s = session(vec![Event::Eof]);
        assert_eq!(s.step().unwrap(), Step::Terminate);

        let mut s = session(bytes(&[keys::EOF]));
        assert_eq!(s.step().unwrap(), Step::Terminate);
        assert_eq!(output_since_start(&s), b"\n");
    }

    #[test]
    fn test_backspace_erases_glyph_width() {
        let mut events = bytes("aあ".as_bytes());
        events.push(Event::Byte(keys::DELETE));
        events.push(Event::Byte(keys::BACKSPACE));
        events.push(Event::Byte(keys::BACKSPACE));
        let mut s = session(events);
        for _ in 0..7 {
            s.step().unwrap();
        }

        let expected = ["aあ".as_bytes(), b"\x08 \x08\x08 \x08", b"\x08 \x08"].concat();
        assert_eq!(output_since_start(&s), expected.as_slice());
        assert_eq!(s.editor().width(), 9);
    }

    #[test]
    fn test_newline_commits_line() {
        let mut events = bytes(b"ok");
        events.push(Event::Byte(keys::NEWLINE));
        let mut s = session(events);
        for _ in 0..3 {
            s.step().unwrap();
        }
        assert_eq!(s.editor().input_count(), 2);
        assert_eq!(output_since_start(&s), b"ok\ninput.2> ");
    }

    #[test]
    fn test_kill_line_redraws_prompt() {
        let mut events = bytes(b"abc");
        events.push(Event::Byte(keys::KILL_LINE));
        let mut s = session(events);
        for _ in 0..4 {
            s.step().unwrap();
        }
        assert_eq!(output_since_start(&s), b"abc\r\x1b[Kinput.1> ");
        assert!(s.editor().glyphs().is_empty());
        assert_eq!(s.editor().input_count(), 1);
    }

    #[test]
    fn test_other_control_bytes_are_rendered() {
        let mut s = session(bytes(&[0x1B]));
        s.step().unwrap();
        assert_eq!(output_since_start(&s), b"[1b]");
    }

    #[test]
    fn test_suspend_reapplies_raw_mode() {
        let mut events = bytes(&[keys::SUSPEND]);
        events.push(Event::Timeout);
        let mut s = session(events);

        assert_eq!(s.step().unwrap(), Step::Continue);
        assert_eq!(s.state(), SessionState::Running);
        assert_eq!(s.tty().suspends, 1);
        assert_eq!(s.tty().reapplies, 1);

        // The resume flag was consumed by the suspend itself.
        s.step().unwrap();
        assert_eq!(s.tty().reapplies, 1);
    }

    #[test]
    fn test_external_resume_reapplies_raw_mode() {
        let mut s = session(vec![Event::Timeout]);
        s.tty.resumed = true;
        s.step().unwrap();
        assert_eq!(s.tty().reapplies, 1);
        assert_eq!(s.tty().suspends, 0);
    }

    #[test]
    fn test_interrupted_wait_continues_silently() {
        let mut s = session(vec![Event::Interrupted]);
        assert_eq!(s.step().unwrap(), Step::Continue);
        assert_eq!(output_since_start(&s), b"");
    }

    #[test]
    fn test_io_errors_terminate() {
        let mut s = session(vec![Event::WaitError]);
        assert!(matches!(s.step(), Err(SessionError::Wait(_))));
        assert_eq!(s.state(), SessionState::Terminated);

        let mut s = session(vec![Event::ReadError]);
        assert!(matches!(s.step(), Err(SessionError::Read(_))));
        assert_eq!(s.state(), SessionState::Terminated);
    }

    #[test]
    fn test_run_until_terminated() {
        let mut events = bytes(b"hi\n");
        events.push(Event::Timeout);
        events.push(Event::Eof);
        let mut s = session(events);

        s.run().unwrap();
        assert_eq!(s.state(), SessionState::Terminated);
        assert_eq!(s.editor().input_count(), 2);
    }
}
