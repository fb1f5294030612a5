//! Connection descriptor parsing and rendering.
//!
//! Relational drivers accept connection targets that do not comply with
//! standard URL syntax (`jdbc:mysql://host/db` has a multi-part scheme, and
//! parameters tolerate stray whitespace), so this module carries its own
//! lenient single-pass grammar instead of a generic URL parser.

use std::fmt;

use crate::error::{Error, Result};

/// Structured form of a textual connection target.
///
/// Parsing and rendering round-trip: for any descriptor built from well-formed
/// pairs, `parse(d.to_string(), port)` reproduces the descriptor exactly.
/// Parameter insertion order is preserved on parse and on render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectDescriptor {
    schema: String,
    host: String,
    port: u16,
    path: String,
    parameters: Vec<(String, Option<String>)>,
}

impl ConnectDescriptor {
    /// Parse a connection target, falling back to `default_port` when the
    /// text carries no explicit port.
    pub fn parse(text: &str, default_port: u16) -> Result<Self> {
        let mut parser = Parser::new(text);
        let schema = parser.parse_schema()?;
        let host = parser.parse_host()?;
        let port = parser.parse_port(default_port)?;
        let path = parser.parse_path();
        let parameters = parser.parse_parameters()?;
        Ok(Self {
            schema,
            host,
            port,
            path,
            parameters,
        })
    }

    /// Scheme part, including its trailing separators (e.g. `mysql://`)
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Host name or address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, explicit or defaulted
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path part, possibly empty (e.g. `/graph`)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parameters in insertion order; a `None` value renders as `key=`
    pub fn parameters(&self) -> &[(String, Option<String>)] {
        &self.parameters
    }

    /// Whether a parameter with this key is present
    pub fn has_parameter(&self, key: &str) -> bool {
        self.parameters.iter().any(|(k, _)| k == key)
    }

    /// Look up a parameter value; a `None` value reads as the empty string
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    /// Insert `key=default` only if the key is absent; never overrides an
    /// explicit value. Idempotent: repeated calls leave the map unchanged.
    pub fn ensure_parameter(&mut self, key: &str, default: impl ToString) {
        if !self.has_parameter(key) {
            self.parameters
                .push((key.to_string(), Some(default.to_string())));
        }
    }

    /// Render a target with a replacement path and parameter set.
    pub fn build(&self, path: &str, parameters: &[(String, Option<String>)]) -> String {
        let mut out = String::with_capacity(128);
        out.push_str(&self.schema);
        out.push_str(&self.host);
        out.push(':');
        out.push_str(&self.port.to_string());
        out.push_str(path);
        for (i, (key, value)) in parameters.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(key);
            out.push('=');
            if let Some(value) = value {
                out.push_str(value);
            }
        }
        out
    }
}

impl fmt::Display for ConnectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build(&self.path, &self.parameters))
    }
}

/// Single left-to-right scan over the target text.
struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn len(&self) -> usize {
        self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn take(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn skip_whitespace(&mut self) -> usize {
        while self.pos < self.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
        self.pos
    }

    /// Consume alphanumerics and `:`; a run of `/` ends the schema and is
    /// included in it, any other character ends it after being consumed.
    fn parse_schema(&mut self) -> Result<String> {
        let start = self.skip_whitespace();
        while self.pos < self.len() {
            let ch = self.chars[self.pos];
            if ch.is_alphanumeric() || ch == ':' {
                self.pos += 1;
                continue;
            }
            if ch == '/' {
                while self.pos < self.len() && self.chars[self.pos] == '/' {
                    self.pos += 1;
                }
            } else {
                self.pos += 1;
            }
            break;
        }
        if start < self.pos {
            Ok(self.take(start, self.pos))
        } else {
            Err(Error::descriptor("invalid schema"))
        }
    }

    /// Scan forward to `?`/`/`/end, then backward for the last `:` which, if
    /// present, separates the port and re-anchors the scan position.
    fn parse_host(&mut self) -> Result<String> {
        let start = self.skip_whitespace();
        while self.pos < self.len() {
            let ch = self.chars[self.pos];
            if ch == '?' || ch == '/' {
                break;
            }
            self.pos += 1;
        }
        let mut i = self.pos;
        while i > start {
            i -= 1;
            if self.chars[i] == ':' {
                self.pos = i;
                break;
            }
        }
        let host = self.take(start, self.pos).trim().to_string();
        if host.is_empty() {
            Err(Error::descriptor("invalid host"))
        } else {
            Ok(host)
        }
    }

    fn parse_port(&mut self, default_port: u16) -> Result<u16> {
        match self.peek() {
            None | Some('?') | Some('/') => return Ok(default_port),
            Some(':') => self.pos += 1,
            Some(_) => return Err(Error::descriptor("invalid port")),
        }
        let start = self.skip_whitespace();
        while self.pos < self.len() {
            let ch = self.chars[self.pos];
            if ch == '?' || ch == '/' {
                break;
            }
            self.pos += 1;
        }
        self.take(start, self.pos)
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::descriptor("invalid port"))
    }

    fn parse_path(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.len() {
            if self.chars[self.pos] == '?' {
                break;
            }
            self.pos += 1;
        }
        self.take(start, self.pos)
    }

    fn parse_parameters(&mut self) -> Result<Vec<(String, Option<String>)>> {
        let mut parameters = Vec::new();
        match self.peek() {
            None => return Ok(parameters),
            Some('?') => self.pos += 1,
            Some(_) => return Err(Error::descriptor("invalid parameter")),
        }
        while self.pos < self.len() {
            while self.pos < self.len() && self.chars[self.pos] == '&' {
                self.pos += 1;
            }
            self.parse_parameter(&mut parameters)?;
        }
        Ok(parameters)
    }

    fn parse_parameter(&mut self, parameters: &mut Vec<(String, Option<String>)>) -> Result<()> {
        let start = self.skip_whitespace();
        if self.pos == self.len() {
            return Ok(());
        }
        let mut terminator = None;
        while self.pos < self.len() {
            let ch = self.chars[self.pos];
            if ch == '=' || ch == '&' {
                terminator = Some(ch);
                break;
            }
            self.pos += 1;
        }
        let key = self.take(start, self.pos).trim().to_string();
        if key.is_empty() {
            return Err(Error::descriptor("invalid parameter"));
        }
        // A key ended by `&` or by the end of input carries an empty value.
        if terminator != Some('=') {
            parameters.push((key, Some(String::new())));
            return Ok(());
        }
        self.pos += 1;
        let start = self.skip_whitespace();
        while self.pos < self.len() {
            if self.chars[self.pos] == '&' {
                break;
            }
            self.pos += 1;
        }
        let value = self.take(start, self.pos).trim().to_string();
        parameters.push((key, Some(value)));
        Ok(())
    }
}
