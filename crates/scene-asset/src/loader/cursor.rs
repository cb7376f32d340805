use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    UnexpectedEnd { line: usize, expected: &'static str },
    Malformed { line: usize, expected: &'static str },
}

impl Display for CursorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::UnexpectedEnd { line, expected } => {
                write!(f, "Unexpected end of file at line {}, expected {}", line, expected)
            }
            CursorError::Malformed { line, expected } => {
                write!(f, "Malformed token at line {}, expected {}", line, expected)
            }
        }
    }
}

impl Error for CursorError {}

#[inline]
fn is_space(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

#[inline]
fn is_line_end(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r' || byte == 0
}

/// Cursor over a text buffer for the line-oriented formats.
///
/// Ordinary exhaustion is reported through `Option` and `bool` results;
/// the `expect_*` helpers turn it into a [`CursorError`] carrying the line.
#[derive(Debug, Clone)]
pub struct TextCursor<'a> {
    data: &'a [u8],
    position: usize,
    line: usize,
}

impl<'a> TextCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            line: 1,
        }
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    /// 1-based number of the current line.
    pub fn line(&self) -> usize {
        self.line
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.position += 1;
        if byte == b'\n' {
            self.line += 1;
        }
        Some(byte)
    }

    pub fn is_line_end(&self) -> bool {
        self.peek().map_or(true, is_line_end)
    }

    /// Skips spaces and tabs; returns whether a token follows on this line.
    pub fn skip_spaces(&mut self) -> bool {
        while self.peek().is_some_and(is_space) {
            self.position += 1;
        }
        !self.is_line_end()
    }

    /// Skips all whitespace including line ends; returns whether data is left.
    pub fn skip_spaces_and_line_end(&mut self) -> bool {
        while self
            .peek()
            .is_some_and(|byte| is_space(byte) || is_line_end(byte))
        {
            self.bump();
        }
        !self.at_end()
    }

    /// Moves past the end of the current line; returns whether data is left.
    pub fn skip_line(&mut self) -> bool {
        while let Some(byte) = self.bump() {
            if byte == b'\n' {
                break;
            }
        }
        !self.at_end()
    }

    fn token_matches(&self, token: &str, ignore_case: bool) -> bool {
        let token = token.as_bytes();
        let Some(candidate) = self.data.get(self.position..self.position + token.len()) else {
            return false;
        };
        let equal = if ignore_case {
            candidate.eq_ignore_ascii_case(token)
        } else {
            candidate == token
        };
        equal
            && self
                .data
                .get(self.position + token.len())
                .map_or(true, |byte| is_space(*byte) || is_line_end(*byte))
    }

    /// Consumes `token` if it is the next word, along with following spaces.
    pub fn match_token(&mut self, token: &str) -> bool {
        self.skip_spaces();
        if self.token_matches(token, false) {
            self.position += token.len();
            self.skip_spaces();
            true
        } else {
            false
        }
    }

    pub fn match_token_ignore_case(&mut self, token: &str) -> bool {
        self.skip_spaces();
        if self.token_matches(token, true) {
            self.position += token.len();
            self.skip_spaces();
            true
        } else {
            false
        }
    }

    /// Reads the next whitespace delimited word of the current line.
    pub fn read_token(&mut self) -> Option<&'a str> {
        if !self.skip_spaces() {
            return None;
        }
        let start = self.position;
        while self
            .peek()
            .is_some_and(|byte| !is_space(byte) && !is_line_end(byte))
        {
            self.position += 1;
        }
        std::str::from_utf8(&self.data[start..self.position]).ok()
    }

    fn read_parsed<T: FromStr>(&mut self) -> Option<T> {
        let start = self.position;
        let value = self.read_token().and_then(|token| token.parse().ok());
        if value.is_none() {
            self.position = start;
        }
        value
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.read_parsed()
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        self.read_parsed()
    }

    pub fn read_f32(&mut self) -> Option<f32> {
        self.read_parsed()
    }

    pub fn read_hex_u32(&mut self) -> Option<u32> {
        let start = self.position;
        let value = self.read_token().and_then(|token| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            u32::from_str_radix(digits, 16).ok()
        });
        if value.is_none() {
            self.position = start;
        }
        value
    }

    /// Reads a double quoted string, or a bare word if no quote follows.
    pub fn read_quoted_or_bare(&mut self) -> Option<String> {
        if !self.skip_spaces() {
            return None;
        }
        if self.peek() == Some(b'"') {
            let start = self.position + 1;
            let mut end = start;
            while self.data.get(end).is_some_and(|byte| *byte != b'"' && !is_line_end(*byte)) {
                end += 1;
            }
            self.position = if self.data.get(end) == Some(&b'"') {
                end + 1
            } else {
                end
            };
            return Some(String::from_utf8_lossy(&self.data[start..end]).into_owned());
        }
        let start = self.position;
        while self
            .peek()
            .is_some_and(|byte| !is_space(byte) && !is_line_end(byte))
        {
            self.position += 1;
        }
        Some(String::from_utf8_lossy(&self.data[start..self.position]).into_owned())
    }

    /// Returns the trimmed remainder of the current line without consuming the line end.
    pub fn rest_of_line(&mut self) -> String {
        let start = self.position;
        while !self.is_line_end() {
            self.position += 1;
        }
        String::from_utf8_lossy(&self.data[start..self.position])
            .trim()
            .to_string()
    }

    fn missing(&mut self, expected: &'static str) -> CursorError {
        self.skip_spaces();
        if self.is_line_end() {
            CursorError::UnexpectedEnd {
                line: self.line,
                expected,
            }
        } else {
            CursorError::Malformed {
                line: self.line,
                expected,
            }
        }
    }

    pub fn expect_u32(&mut self, expected: &'static str) -> Result<u32, CursorError> {
        self.read_u32().ok_or_else(|| self.missing(expected))
    }

    pub fn expect_i32(&mut self, expected: &'static str) -> Result<i32, CursorError> {
        self.read_i32().ok_or_else(|| self.missing(expected))
    }

    pub fn expect_f32(&mut self, expected: &'static str) -> Result<f32, CursorError> {
        self.read_f32().ok_or_else(|| self.missing(expected))
    }

    pub fn expect_floats<const N: usize>(
        &mut self,
        expected: &'static str,
    ) -> Result<[f32; N], CursorError> {
        let mut values = [0.0; N];
        for value in &mut values {
            *value = self.expect_f32(expected)?;
        }
        Ok(values)
    }
}
