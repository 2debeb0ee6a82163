//! Incremental UTF-8 assembly
//!
//! Collects input bytes until they form a complete code point. Invalid
//! input is resynchronized one byte at a time once the buffer is full, so a
//! bad sequence can never block input indefinitely.

/// Longest UTF-8 encoding of a code point
pub const MAX_SEQUENCE_LEN: usize = 4;

/// Result of examining the front of the pending buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode {
    /// A complete code point and the number of bytes it occupies
    Char(char, usize),
    /// A valid prefix; more bytes are needed
    Incomplete,
    /// The front bytes cannot start a valid sequence
    Invalid,
}

/// Pending bytes of an in-progress code point
#[derive(Debug, Default, Clone)]
pub struct Utf8Assembler {
    pending: Vec<u8>,
}

impl Utf8Assembler {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(MAX_SEQUENCE_LEN),
        }
    }

    pub fn push(&mut self, byte: u8) {
        self.pending.push(byte);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Abandon the most recent byte
    pub fn pop_last(&mut self) -> Option<u8> {
        self.pending.pop()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Whether a failed decode has filled the buffer and must resynchronize
    pub fn is_stuck(&self) -> bool {
        self.pending.len() >= MAX_SEQUENCE_LEN
    }

    /// Examine the front of the buffer without consuming it
    pub fn decode(&self) -> Decode {
        let buf = &self.pending;
        let first = match buf.first() {
            Some(&b) => b,
            None => return Decode::Incomplete,
        };
        let need = sequence_len(first);
        if need == 0 {
            return Decode::Invalid;
        }

        if buf.len() < need {
            return match std::str::from_utf8(buf) {
                Err(e) if e.error_len().is_none() => Decode::Incomplete,
                _ => Decode::Invalid,
            };
        }

        match std::str::from_utf8(&buf[..need]) {
            Ok(s) => match s.chars().next() {
                Some(ch) => Decode::Char(ch, need),
                None => Decode::Invalid,
            },
            Err(_) => Decode::Invalid,
        }
    }

    /// Remove `len` decoded bytes from the front
    pub fn consume(&mut self, len: usize) {
        let len = len.min(self.pending.len());
        self.pending.drain(..len);
    }

    /// Drop the front byte so decoding can restart at the next one
    pub fn resync(&mut self) -> Option<u8> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }
}

/// Encoded length implied by a lead byte, 0 if it cannot lead a sequence
fn sequence_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler(bytes: &[u8]) -> Utf8Assembler {
        let mut a = Utf8Assembler::new();
        for &b in bytes {
            a.push(b);
        }
        a
    }

    #[test]
    fn test_ascii() {
        assert_eq!(assembler(b"a").decode(), Decode::Char('a', 1));
    }

    #[test]
    fn test_multibyte_progress() {
        let bytes = "あ".as_bytes();
        assert_eq!(assembler(&bytes[..1]).decode(), Decode::Incomplete);
        assert_eq!(assembler(&bytes[..2]).decode(), Decode::Incomplete);
        assert_eq!(assembler(bytes).decode(), Decode::Char('あ', 3));

        let emoji = "😀".as_bytes();
        assert_eq!(assembler(&emoji[..3]).decode(), Decode::Incomplete);
        assert_eq!(assembler(emoji).decode(), Decode::Char('😀', 4));
    }

    #[test]
    fn test_invalid_sequences() {
        assert_eq!(assembler(&[0xFF]).decode(), Decode::Invalid);
        assert_eq!(assembler(&[0x80]).decode(), Decode::Invalid);
        assert_eq!(assembler(&[0xC0, 0x80]).decode(), Decode::Invalid);
        assert_eq!(assembler(&[0xE3, 0x41]).decode(), Decode::Invalid);
        // surrogate range
        assert_eq!(assembler(&[0xED, 0xA0, 0x80]).decode(), Decode::Invalid);
    }

    #[test]
    fn test_decode_only_looks_at_front() {
        let mut a = assembler("éx".as_bytes());
        assert_eq!(a.decode(), Decode::Char('é', 2));
        a.consume(2);
        assert_eq!(a.decode(), Decode::Char('x', 1));
    }

    #[test]
    fn test_resync_and_pop() {
        let mut a = assembler(&[0xFF, 0xFE, 0x41, 0x42]);
        assert!(a.is_stuck());
        assert_eq!(a.resync(), Some(0xFF));
        assert_eq!(a.len(), 3);
        assert!(!a.is_stuck());
        assert_eq!(a.pop_last(), Some(0x42));
        a.clear();
        assert!(a.is_empty());
        assert_eq!(a.resync(), None);
    }
}
