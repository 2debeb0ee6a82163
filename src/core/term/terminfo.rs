//! Compiled terminfo reader
//!
//! Locates a terminal description in the terminfo database and decodes the
//! compiled binary format (legacy 16-bit and extended 32-bit number tables).

use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::TermError;

/// Magic number of the legacy format (16-bit numbers)
const MAGIC_LEGACY: i16 = 0o432;
/// Magic number of the extended-number format (32-bit numbers)
const MAGIC_EXTENDED: i16 = 0o1036;

/// System directories searched after the environment-provided ones
const SYSTEM_DIRS: &[&str] = &[
    "/etc/terminfo",
    "/lib/terminfo",
    "/usr/share/terminfo",
    "/usr/lib/terminfo",
    "/usr/local/share/terminfo",
];

/// Standard numeric capability indices
pub mod num {
    pub const COLUMNS: usize = 0;
    pub const LINES: usize = 2;
}

/// Standard string capability indices
pub mod string {
    pub const CARRIAGE_RETURN: usize = 2;
    pub const CHANGE_SCROLL_REGION: usize = 3;
    pub const CLEAR_SCREEN: usize = 5;
    pub const CLR_EOL: usize = 6;
    pub const CURSOR_ADDRESS: usize = 10;
    pub const SCROLL_FORWARD: usize = 129;
}

/// A decoded terminal description
#[derive(Debug, Clone, Default)]
pub struct TermInfo {
    /// Names from the header line (`xterm|xterm terminal emulator`)
    pub names: Vec<String>,
    numbers: HashMap<usize, i32>,
    strings: HashMap<usize, Vec<u8>>,
}

impl TermInfo {
    /// Build a description from already-decoded tables
    #[allow(dead_code)]
    pub fn from_parts(
        names: Vec<String>,
        numbers: HashMap<usize, i32>,
        strings: HashMap<usize, Vec<u8>>,
    ) -> Self {
        Self { names, numbers, strings }
    }

    /// Look up `name` in the terminfo search path and decode it
    pub fn load(name: &str) -> Result<Self, TermError> {
        let dirs = search_dirs(
            env::var_os("TERMINFO"),
            env::var_os("HOME"),
            env::var("TERMINFO_DIRS").ok(),
        );
        Self::load_from_dirs(name, &dirs)
    }

    /// Look up `name` in `dirs`, in order.
    ///
    /// An entry that cannot be decoded is skipped so a later directory can
    /// still provide the terminal.
    pub fn load_from_dirs(name: &str, dirs: &[PathBuf]) -> Result<Self, TermError> {
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(TermError::UnsupportedTerminal(name.to_string()));
        }

        for dir in dirs {
            for path in entry_paths(dir, name) {
                if !path.is_file() {
                    continue;
                }
                let data = fs::read(&path)?;
                match Self::parse(&data) {
                    Ok(info) => {
                        debug!(
                            "terminfo entry for {} at {} ({})",
                            name,
                            path.display(),
                            info.names.join("|")
                        );
                        return Ok(info);
                    }
                    Err(e) => debug!("Skipping {}: {}", path.display(), e),
                }
            }
        }

        Err(TermError::UnsupportedTerminal(name.to_string()))
    }

    /// Decode a compiled terminfo entry
    pub fn parse(data: &[u8]) -> Result<Self, TermError> {
        let mut reader = Reader::new(data);

        let magic = reader.i16()?;
        let number_width = match magic {
            MAGIC_LEGACY => 2,
            MAGIC_EXTENDED => 4,
            other => return Err(malformed(format!("bad magic number {:#o}", other))),
        };

        let names_size = reader.count()?;
        let bool_count = reader.count()?;
        let num_count = reader.count()?;
        let str_count = reader.count()?;
        let table_size = reader.count()?;

        let names_raw = reader.take(names_size)?;
        let names = names_raw
            .split(|&b| b == 0)
            .next()
            .map(|s| {
                String::from_utf8_lossy(s)
                    .split('|')
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // Booleans are not used, skip them along with the alignment byte.
        reader.take(bool_count)?;
        if (names_size + bool_count) % 2 != 0 {
            reader.take(1)?;
        }

        let mut numbers = HashMap::new();
        for index in 0..num_count {
            let value = if number_width == 2 {
                i32::from(reader.i16()?)
            } else {
                reader.i32()?
            };
            if value >= 0 {
                numbers.insert(index, value);
            }
        }

        let mut offsets = Vec::with_capacity(str_count);
        for _ in 0..str_count {
            offsets.push(reader.i16()?);
        }

        let table = reader.take(table_size)?;
        let mut strings = HashMap::new();
        for (index, offset) in offsets.into_iter().enumerate() {
            // -1 is absent, -2 is cancelled
            if offset < 0 {
                continue;
            }
            let start = offset as usize;
            if start >= table.len() {
                return Err(malformed(format!("string {} offset {} out of range", index, start)));
            }
            let end = table[start..]
                .iter()
                .position(|&b| b == 0)
                .map(|n| start + n)
                .ok_or_else(|| malformed(format!("string {} is not terminated", index)))?;
            strings.insert(index, table[start..end].to_vec());
        }

        Ok(Self { names, numbers, strings })
    }

    /// Numeric capability by standard index
    pub fn number(&self, index: usize) -> Option<i32> {
        self.numbers.get(&index).copied()
    }

    /// String capability by standard index
    pub fn string(&self, index: usize) -> Option<&[u8]> {
        self.strings.get(&index).map(Vec::as_slice)
    }
}

/// Directories to search, in priority order.
///
/// Takes the values of `TERMINFO`, `HOME` and `TERMINFO_DIRS`. An empty
/// `TERMINFO_DIRS` entry stands for the system directories.
fn search_dirs(
    terminfo: Option<OsString>,
    home: Option<OsString>,
    terminfo_dirs: Option<String>,
) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(dir) = terminfo {
        dirs.push(PathBuf::from(dir));
    }
    if let Some(home) = home {
        dirs.push(PathBuf::from(home).join(".terminfo"));
    }
    if let Some(list) = terminfo_dirs {
        for entry in list.split(':') {
            if entry.is_empty() {
                dirs.extend(SYSTEM_DIRS.iter().map(PathBuf::from));
            } else {
                dirs.push(PathBuf::from(entry));
            }
        }
    }
    dirs.extend(SYSTEM_DIRS.iter().map(PathBuf::from));

    dirs
}

/// Candidate files for `name` inside `dir` (`x/xterm` and `78/xterm`)
fn entry_paths(dir: &Path, name: &str) -> Vec<PathBuf> {
    let first = name.as_bytes()[0];
    vec![
        dir.join((first as char).to_string()).join(name),
        dir.join(format!("{:02x}", first)).join(name),
    ]
}

fn malformed(msg: String) -> TermError {
    TermError::Malformed(msg)
}

/// Little-endian cursor over the compiled entry
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], TermError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(malformed(format!(
                "truncated entry: need {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.data.len().saturating_sub(self.pos)
            ))),
        }
    }

    fn i16(&mut self) -> Result<i16, TermError> {
        let bytes = self.take(2)?;
        Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn i32(&mut self) -> Result<i32, TermError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Header count field; must be non-negative
    fn count(&mut self) -> Result<usize, TermError> {
        let value = self.i16()?;
        usize::try_from(value).map_err(|_| malformed(format!("negative header field {}", value)))
    }
}
