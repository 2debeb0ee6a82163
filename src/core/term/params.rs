//! Capability parameter expansion
//!
//! Interprets the terminfo `%` stack language used by parameterized
//! capabilities such as `cup` and `csr`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("Unknown format operator '%{0}'")]
    UnknownOperator(char),

    #[error("Unterminated constant in capability string")]
    UnterminatedConstant,

    #[error("Invalid parameter or variable reference '%{0}{1}'")]
    InvalidReference(char, char),
}

/// Printf-style conversion for `%d`, `%o`, `%x`, `%X`, `%s`
#[derive(Debug, Default, Clone, Copy)]
struct Format {
    left: bool,
    plus: bool,
    space: bool,
    alternate: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
}

/// Expander state for one `tparm` call
struct Expander<'a> {
    input: &'a [u8],
    pos: usize,
    params: [i32; 9],
    stack: Vec<i32>,
    dynamic_vars: [i32; 26],
    out: Vec<u8>,
}

/// Expand `template` with up to nine integer parameters.
///
/// Missing parameters are zero. Static variables (`%PA`..`%PZ`) live for the
/// duration of one expansion only, unlike curses where they persist between
/// calls; none of the capabilities used here read a static variable set by an
/// earlier expansion.
pub fn tparm(template: &[u8], params: &[i32]) -> Result<Vec<u8>, ParamError> {
    let mut p = [0i32; 9];
    for (slot, value) in p.iter_mut().zip(params) {
        *slot = *value;
    }

    let mut expander = Expander {
        input: template,
        pos: 0,
        params: p,
        stack: Vec::with_capacity(8),
        dynamic_vars: [0; 26],
        out: Vec::with_capacity(template.len() + 8),
    };
    let mut static_vars = [0i32; 26];
    expander.run(&mut static_vars)?;
    Ok(expander.out)
}

/// termcap-style argument order: column first, then row
pub fn tgoto(template: &[u8], col: i32, row: i32) -> Result<Vec<u8>, ParamError> {
    tparm(template, &[row, col])
}

/// Remove `$<..>` padding specifications (no delay is emitted)
pub fn strip_padding(seq: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(seq.len());
    let mut i = 0;
    while i < seq.len() {
        if seq[i] == b'$' && seq.get(i + 1) == Some(&b'<') {
            let rest = &seq[i + 2..];
            if let Some(close) = rest.iter().position(|&b| b == b'>') {
                let body = &rest[..close];
                let is_delay = !body.is_empty()
                    && body
                        .iter()
                        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'*' | b'/'))
                    && body[0].is_ascii_digit();
                if is_delay {
                    i += 2 + close + 1;
                    continue;
                }
            }
        }
        out.push(seq[i]);
        i += 1;
    }
    out
}

impl<'a> Expander<'a> {
    fn run(&mut self, static_vars: &mut [i32; 26]) -> Result<(), ParamError> {
        while let Some(byte) = self.next() {
            if byte != b'%' {
                self.out.push(byte);
                continue;
            }
            let op = match self.next() {
                Some(op) => op,
                None => break,
            };
            self.operator(op, static_vars)?;
        }
        Ok(())
    }

    fn operator(&mut self, op: u8, static_vars: &mut [i32; 26]) -> Result<(), ParamError> {
        match op {
            b'%' => self.out.push(b'%'),
            b'c' => {
                // NUL cannot be sent through a C string, curses sends 0x80
                let ch = self.pop() as u8;
                self.out.push(if ch == 0 { 0x80 } else { ch });
            }
            b's' => {
                let n = self.pop();
                self.write_str(n, Format::default());
            }
            b'd' | b'o' | b'x' | b'X' => {
                let n = self.pop();
                self.write_int(n, op, Format::default());
            }
            b':' | b'#' | b' ' | b'.' | b'0'..=b'9' | b'-' | b'+' => {
                self.formatted(op)?;
            }
            b'p' => {
                let digit = self.next().unwrap_or(0);
                if !(b'1'..=b'9').contains(&digit) {
                    return Err(ParamError::InvalidReference('p', digit as char));
                }
                let n = self.params[(digit - b'1') as usize];
                self.stack.push(n);
            }
            b'P' => {
                let var = self.next().unwrap_or(0);
                let n = self.pop();
                match var {
                    b'a'..=b'z' => self.dynamic_vars[(var - b'a') as usize] = n,
                    b'A'..=b'Z' => static_vars[(var - b'A') as usize] = n,
                    _ => return Err(ParamError::InvalidReference('P', var as char)),
                }
            }
            b'g' => {
                let var = self.next().unwrap_or(0);
                let n = match var {
                    b'a'..=b'z' => self.dynamic_vars[(var - b'a') as usize],
                    b'A'..=b'Z' => static_vars[(var - b'A') as usize],
                    _ => return Err(ParamError::InvalidReference('g', var as char)),
                };
                self.stack.push(n);
            }
            b'\'' => {
                let ch = self.next().ok_or(ParamError::UnterminatedConstant)?;
                if self.next() != Some(b'\'') {
                    return Err(ParamError::UnterminatedConstant);
                }
                self.stack.push(i32::from(ch));
            }
            b'{' => {
                let mut n: i32 = 0;
                loop {
                    match self.next() {
                        Some(b'}') => break,
                        Some(d @ b'0'..=b'9') => {
                            n = n.wrapping_mul(10).wrapping_add(i32::from(d - b'0'));
                        }
                        _ => return Err(ParamError::UnterminatedConstant),
                    }
                }
                self.stack.push(n);
            }
            b'l' => {
                // Only integer parameters exist, so this is the length of
                // the decimal rendering.
                let len = self.pop().to_string().len() as i32;
                self.stack.push(len);
            }
            b'*' | b'/' | b'm' | b'&' | b'|' | b'^' | b'=' | b'>' | b'<' | b'A' | b'O' => {
                let b = self.pop();
                let a = self.pop();
                self.stack.push(binary(op, a, b));
            }
            b'!' => {
                let a = self.pop();
                self.stack.push(i32::from(a == 0));
            }
            b'~' => {
                let a = self.pop();
                self.stack.push(!a);
            }
            b'i' => {
                self.params[0] = self.params[0].wrapping_add(1);
                self.params[1] = self.params[1].wrapping_add(1);
            }
            b'?' | b';' => {}
            b't' => {
                if self.pop() == 0 {
                    self.skip_branch(true);
                }
            }
            b'e' => {
                // Reached the end of a taken then-part.
                self.skip_branch(false);
            }
            other => return Err(ParamError::UnknownOperator(other as char)),
        }
        Ok(())
    }

    /// Parse `%[:][flags][width][.precision]conv`; `first` is the byte after `%`
    fn formatted(&mut self, first: u8) -> Result<(), ParamError> {
        let mut fmt = Format::default();
        let mut byte = first;

        // A leading ':' allows '-' and '+' to be read as flags rather than operators.
        let explicit_flags = byte == b':';
        if explicit_flags {
            byte = self.next().ok_or(ParamError::UnknownOperator(':'))?;
        }
        if !explicit_flags && matches!(byte, b'-' | b'+') {
            let b = self.pop();
            let a = self.pop();
            self.stack.push(binary(byte, a, b));
            return Ok(());
        }

        loop {
            match byte {
                b'-' => fmt.left = true,
                b'+' => fmt.plus = true,
                b' ' => fmt.space = true,
                b'#' => fmt.alternate = true,
                b'0' => fmt.zero = true,
                _ => break,
            }
            byte = self.next().ok_or(ParamError::UnknownOperator(byte as char))?;
        }
        while byte.is_ascii_digit() {
            fmt.width = fmt.width * 10 + usize::from(byte - b'0');
            byte = self.next().ok_or(ParamError::UnknownOperator(byte as char))?;
        }
        if byte == b'.' {
            let mut precision = 0usize;
            byte = self.next().ok_or(ParamError::UnknownOperator('.'))?;
            while byte.is_ascii_digit() {
                precision = precision * 10 + usize::from(byte - b'0');
                byte = self.next().ok_or(ParamError::UnknownOperator(byte as char))?;
            }
            fmt.precision = Some(precision);
        }

        match byte {
            b'd' | b'o' | b'x' | b'X' => {
                let n = self.pop();
                self.write_int(n, byte, fmt);
            }
            b's' => {
                let n = self.pop();
                self.write_str(n, fmt);
            }
            other => return Err(ParamError::UnknownOperator(other as char)),
        }
        Ok(())
    }

    fn write_int(&mut self, n: i32, conv: u8, fmt: Format) {
        let magnitude = i64::from(n).unsigned_abs();
        let mut digits = match conv {
            b'o' => format!("{:o}", magnitude),
            b'x' => format!("{:x}", magnitude),
            b'X' => format!("{:X}", magnitude),
            _ => magnitude.to_string(),
        };
        if let Some(precision) = fmt.precision {
            while digits.len() < precision {
                digits.insert(0, '0');
            }
        }

        let mut prefix = String::new();
        if n < 0 {
            prefix.push('-');
        } else if fmt.plus && conv == b'd' {
            prefix.push('+');
        } else if fmt.space && conv == b'd' {
            prefix.push(' ');
        }
        if fmt.alternate && n != 0 {
            match conv {
                b'o' if !digits.starts_with('0') => prefix.push('0'),
                b'x' => prefix.push_str("0x"),
                b'X' => prefix.push_str("0X"),
                _ => {}
            }
        }

        if fmt.zero && !fmt.left && fmt.precision.is_none() {
            while prefix.len() + digits.len() < fmt.width {
                digits.insert(0, '0');
            }
        }

        let text = format!("{}{}", prefix, digits);
        self.pad(text.as_bytes(), fmt);
    }

    fn write_str(&mut self, n: i32, fmt: Format) {
        let bytes = n.to_string().into_bytes();
        let shown = match fmt.precision {
            Some(p) if p < bytes.len() => &bytes[..p],
            _ => &bytes[..],
        };
        self.pad(shown, fmt);
    }

    fn pad(&mut self, text: &[u8], fmt: Format) {
        let fill = fmt.width.saturating_sub(text.len());
        if !fmt.left {
            self.out.extend(std::iter::repeat(b' ').take(fill));
        }
        self.out.extend_from_slice(text);
        if fmt.left {
            self.out.extend(std::iter::repeat(b' ').take(fill));
        }
    }

    /// Skip forward past a conditional branch.
    ///
    /// With `to_else`, stop after a matching `%e` or `%;`; otherwise only a
    /// matching `%;` ends the skip.
    fn skip_branch(&mut self, to_else: bool) {
        let mut depth = 0usize;
        while let Some(byte) = self.next() {
            if byte != b'%' {
                continue;
            }
            match self.next() {
                Some(b'?') => depth += 1,
                Some(b';') => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                Some(b'e') if depth == 0 && to_else => return,
                Some(_) => {}
                None => return,
            }
        }
    }

    fn next(&mut self) -> Option<u8> {
        let byte = self.input.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        byte
    }

    fn pop(&mut self) -> i32 {
        self.stack.pop().unwrap_or(0)
    }
}

fn binary(op: u8, a: i32, b: i32) -> i32 {
    match op {
        b'+' => a.wrapping_add(b),
        b'-' => a.wrapping_sub(b),
        b'*' => a.wrapping_mul(b),
        b'/' => a.checked_div(b).unwrap_or(0),
        b'm' => a.checked_rem(b).unwrap_or(0),
        b'&' => a & b,
        b'|' => a | b,
        b'^' => a ^ b,
        b'=' => i32::from(a == b),
        b'>' => i32::from(a > b),
        b'<' => i32::from(a < b),
        b'A' => i32::from(a != 0 && b != 0),
        b'O' => i32::from(a != 0 || b != 0),
        _ => 0,
    }
}
