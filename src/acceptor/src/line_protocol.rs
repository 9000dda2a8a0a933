//! InfluxDB line protocol
//!
//! ```text
//! measurement[,tag=value...] field=value[,field=value...] [timestamp]
//! ```
//!
//! Measurement names, tag keys, tag values and field keys may escape
//! commas, spaces and equals signs with a backslash. String field values
//! are double-quoted and may escape `"` and `\`. Integers carry an `i`
//! suffix, unsigned integers a `u` suffix; everything else numeric is a
//! float.

use std::fmt;

/// A typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    UInteger(u64),
    String(String),
    Boolean(bool),
}

impl FieldValue {
    /// The value as a float, for integer and floating point fields only.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::UInteger(v) => Some(*v as f64),
            Self::String(_) | Self::Boolean(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}i"),
            Self::UInteger(v) => write!(f, "{v}u"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// One record of a line-protocol body
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// 1-based line number in the body
    pub line: usize,
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    /// Fields in input order
    pub fields: Vec<(String, FieldValue)>,
    /// Raw timestamp, unit decided by the caller
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LineProtocolError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

impl LineProtocolError {
    fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::Syntax { line, .. } => *line,
        }
    }
}

/// Parse every record in `body`. Blank lines and `#` comments are skipped.
pub fn parse_lines(body: &str) -> Result<Vec<ParsedLine>, LineProtocolError> {
    let mut parsed = Vec::new();

    for (idx, text) in body.lines().enumerate() {
        let text = text.trim_start();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        parsed.push(parse_line(text, idx + 1)?);
    }

    Ok(parsed)
}

fn parse_line(text: &str, line: usize) -> Result<ParsedLine, LineProtocolError> {
    let mut scanner = Scanner::new(text, line);

    let measurement = scanner.token(b", ")?;
    if measurement.is_empty() {
        return Err(LineProtocolError::syntax(line, "missing measurement"));
    }

    let mut tags = Vec::new();
    while scanner.eat(b',') {
        let key = scanner.token(b"=, ")?;
        if key.is_empty() {
            return Err(LineProtocolError::syntax(line, "missing tag key"));
        }
        if !scanner.eat(b'=') {
            return Err(LineProtocolError::syntax(
                line,
                format!("missing '=' after tag key '{key}'"),
            ));
        }
        let value = scanner.token(b", ")?;
        if value.is_empty() {
            return Err(LineProtocolError::syntax(
                line,
                format!("missing value for tag '{key}'"),
            ));
        }
        tags.push((key, value));
    }

    if !scanner.eat(b' ') {
        return Err(LineProtocolError::syntax(line, "missing fields"));
    }
    scanner.skip_spaces();

    let mut fields = Vec::new();
    loop {
        let key = scanner.token(b"=, ")?;
        if key.is_empty() {
            return Err(LineProtocolError::syntax(line, "missing field key"));
        }
        if !scanner.eat(b'=') {
            return Err(LineProtocolError::syntax(
                line,
                format!("missing '=' after field key '{key}'"),
            ));
        }
        let value = scanner.field_value(&key)?;
        fields.push((key, value));

        if !scanner.eat(b',') {
            break;
        }
    }

    let timestamp = match scanner.rest().trim() {
        "" => None,
        raw => Some(raw.parse::<i64>().map_err(|_| {
            LineProtocolError::syntax(line, format!("invalid timestamp '{raw}'"))
        })?),
    };

    Ok(ParsedLine {
        line,
        measurement,
        tags,
        fields,
        timestamp,
    })
}

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Self { text, pos: 0, line }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn finish(&self, bytes: Vec<u8>) -> Result<String, LineProtocolError> {
        String::from_utf8(bytes)
            .map_err(|_| LineProtocolError::syntax(self.line, "invalid UTF-8 in escaped token"))
    }

    /// Read an unquoted, possibly escaped token up to one of `stops`.
    fn token(&mut self, stops: &[u8]) -> Result<String, LineProtocolError> {
        let bytes = self.text.as_bytes();
        let mut out = Vec::new();

        while let Some(&b) = bytes.get(self.pos) {
            if b == b'\\' {
                match bytes.get(self.pos + 1) {
                    Some(&next @ (b',' | b' ' | b'=' | b'\\')) => {
                        out.push(next);
                        self.pos += 2;
                        continue;
                    }
                    _ => {
                        out.push(b);
                        self.pos += 1;
                        continue;
                    }
                }
            }
            if stops.contains(&b) {
                break;
            }
            out.push(b);
            self.pos += 1;
        }

        self.finish(out)
    }

    fn field_value(&mut self, key: &str) -> Result<FieldValue, LineProtocolError> {
        if self.eat(b'"') {
            return self.quoted_string(key).map(FieldValue::String);
        }

        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b',' || b == b' ' {
                break;
            }
            self.pos += 1;
        }
        let raw = &self.text[start..self.pos];

        parse_scalar(raw).ok_or_else(|| {
            LineProtocolError::syntax(
                self.line,
                format!("invalid value '{raw}' for field '{key}'"),
            )
        })
    }

    fn quoted_string(&mut self, key: &str) -> Result<String, LineProtocolError> {
        let bytes = self.text.as_bytes();
        let mut out = Vec::new();

        while let Some(&b) = bytes.get(self.pos) {
            self.pos += 1;
            match b {
                b'"' => return self.finish(out),
                b'\\' => match bytes.get(self.pos) {
                    Some(&next @ (b'"' | b'\\')) => {
                        out.push(next);
                        self.pos += 1;
                    }
                    _ => out.push(b),
                },
                _ => out.push(b),
            }
        }

        Err(LineProtocolError::syntax(
            self.line,
            format!("unterminated string for field '{key}'"),
        ))
    }
}

fn parse_scalar(raw: &str) -> Option<FieldValue> {
    match raw {
        "t" | "T" | "true" | "True" | "TRUE" => return Some(FieldValue::Boolean(true)),
        "f" | "F" | "false" | "False" | "FALSE" => return Some(FieldValue::Boolean(false)),
        _ => {}
    }

    if let Some(digits) = raw.strip_suffix('i') {
        return digits.parse().ok().map(FieldValue::Integer);
    }
    if let Some(digits) = raw.strip_suffix('u') {
        return digits.parse().ok().map(FieldValue::UInteger);
    }

    // Rust also accepts "inf", "NaN" and out-of-range exponents; line protocol does not.
    if !raw
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
    {
        return None;
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(FieldValue::Float)
}
