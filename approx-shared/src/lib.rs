//! # Approximator Wire Protocol
//!
//! Shared protocol definitions used by both the approximator server and
//! client. The protocol is line-framed ASCII: each message is a command
//! word followed by space-separated parameters and terminated by CRLF.
//!
//! The [`Message`] enum is the closed set of message types exchanged over
//! the wire. Parsing is strict: a line that does not match the grammar
//! yields a [`ParseError`] and never a partially-filled message. Values
//! are range-checked only where the grammar demands it (coefficients);
//! game-level range checks (put points and values) belong to the server.
//!
//! [`LineBuffer`] reassembles CRLF-terminated lines from the raw byte
//! stream, independent of how reads split the traffic.

use std::fmt;
use thiserror::Error;

/// Upper bound for the largest valid abscissa K.
pub const MAX_K: usize = 10_000;
/// Upper bound for the polynomial degree N.
pub const MAX_N: usize = 8;
/// Upper bound for the game-ending put count M.
pub const MAX_M: u64 = 12_341_234;

/// Smallest accepted coefficient value.
pub const MIN_COEFF: f64 = -100.0;
/// Largest accepted coefficient value.
pub const MAX_COEFF: f64 = 100.0;
/// Tolerance applied to all floating-point range checks.
pub const EPS: f64 = 3e-8;
/// Smallest accepted put value.
pub const MIN_PUT_VALUE: f64 = -5.0;
/// Largest accepted put value.
pub const MAX_PUT_VALUE: f64 = 5.0;

/// Exact number of fractional digits in serialized doubles; also the
/// maximum accepted when parsing.
pub const MAX_FRACTIONAL_DIGITS: usize = 7;

/// Penalty for putting while a previous put is still unanswered.
pub const EARLY_PUT_PENALTY: f64 = 20.0;
/// Penalty for a put with an out-of-range point or value.
pub const BAD_PUT_PENALTY: f64 = 10.0;
/// Delay before the server answers a bad put, in seconds.
pub const BAD_PUT_DELAY_SECS: u64 = 1;
/// How long the server waits for HELLO before disconnecting, in seconds.
pub const HELLO_WAIT_SECS: u64 = 3;
/// Pause between games after scoring, in milliseconds.
pub const RESET_DELAY_MS: u64 = 1000;
/// Wait granularity used by every client thread so shutdown is prompt.
pub const CLIENT_TIMEOUT_MS: u64 = 200;

/// Message terminator.
pub const CRLF: &str = "\r\n";

/// Why a line failed to parse into a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error("missing command word")]
    MissingCommand,
    #[error("unknown command")]
    UnknownCommand,
    #[error("malformed parameters")]
    BadParams,
}

/// A single protocol message, already validated against the grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Client introduces itself with an alphanumeric player id.
    Hello(String),
    /// Server hands the player its polynomial coefficients (a0..aN).
    Coeff(Vec<f64>),
    /// Client adds `value` to its approximation at `point`.
    Put { point: i32, value: f64 },
    /// Server rejects an out-of-range put, echoing point and value.
    BadPut { point: i32, value: f64 },
    /// Server reports the player's full approximation vector (v0..vK).
    State(Vec<f64>),
    /// Server penalizes a put made before the previous one was answered.
    Penalty { point: i32, value: f64 },
    /// Server announces final `(player id, score)` pairs.
    Scoring(Vec<(String, f64)>),
}

impl Message {
    /// Parses a single line (CRLF already stripped) into a message.
    pub fn parse(line: &str) -> Result<Message, ParseError> {
        let (command, params_str) = extract_command(line)?;
        let params = split_params(params_str).ok_or(ParseError::BadParams)?;

        match command {
            "HELLO" => {
                if params.len() != 1 || !is_alphanumeric(params[0]) {
                    return Err(ParseError::BadParams);
                }
                Ok(Message::Hello(params[0].to_string()))
            }
            "COEFF" => {
                if params.is_empty() || params.len() > MAX_N + 1 {
                    return Err(ParseError::BadParams);
                }
                let mut coeffs = Vec::with_capacity(params.len());
                for param in &params {
                    let value = parse_double(param).ok_or(ParseError::BadParams)?;
                    if value + EPS < MIN_COEFF || value - EPS > MAX_COEFF {
                        return Err(ParseError::BadParams);
                    }
                    coeffs.push(value);
                }
                Ok(Message::Coeff(coeffs))
            }
            "PUT" => {
                let (point, value) = parse_point_value(&params)?;
                Ok(Message::Put { point, value })
            }
            "BAD_PUT" => {
                let (point, value) = parse_point_value(&params)?;
                Ok(Message::BadPut { point, value })
            }
            "STATE" => {
                if params.is_empty() || params.len() > MAX_K + 1 {
                    return Err(ParseError::BadParams);
                }
                let mut values = Vec::with_capacity(params.len());
                for param in &params {
                    values.push(parse_double(param).ok_or(ParseError::BadParams)?);
                }
                Ok(Message::State(values))
            }
            "PENALTY" => {
                let (point, value) = parse_point_value(&params)?;
                Ok(Message::Penalty { point, value })
            }
            "SCORING" => {
                if params.len() % 2 != 0 {
                    return Err(ParseError::BadParams);
                }
                let mut entries = Vec::with_capacity(params.len() / 2);
                for pair in params.chunks(2) {
                    if !is_alphanumeric(pair[0]) {
                        return Err(ParseError::BadParams);
                    }
                    let score = parse_double(pair[1]).ok_or(ParseError::BadParams)?;
                    entries.push((pair[0].to_string(), score));
                }
                Ok(Message::Scoring(entries))
            }
            _ => Err(ParseError::UnknownCommand),
        }
    }

    /// Parses a raw line as received from the socket (CRLF stripped).
    pub fn parse_bytes(line: &[u8]) -> Result<Message, ParseError> {
        let text = std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;
        Message::parse(text)
    }

    /// Serializes the message without the trailing CRLF.
    ///
    /// SCORING entries are emitted sorted lexicographically by player id.
    pub fn to_line(&self) -> String {
        match self {
            Message::Hello(id) => format!("HELLO {}", id),
            Message::Coeff(coeffs) => format!("COEFF {}", join_doubles(coeffs)),
            Message::Put { point, value } => {
                format!("PUT {} {}", point, format_double(*value))
            }
            Message::BadPut { point, value } => {
                format!("BAD_PUT {} {}", point, format_double(*value))
            }
            Message::State(values) => format!("STATE {}", join_doubles(values)),
            Message::Penalty { point, value } => {
                format!("PENALTY {} {}", point, format_double(*value))
            }
            Message::Scoring(entries) => {
                let mut sorted: Vec<&(String, f64)> = entries.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                let mut line = String::from("SCORING");
                for (id, score) in sorted {
                    line.push(' ');
                    line.push_str(id);
                    line.push(' ');
                    line.push_str(&format_double(*score));
                }
                line
            }
        }
    }

    /// Serializes the message with the trailing CRLF, ready to send.
    pub fn to_wire(&self) -> String {
        let mut line = self.to_line();
        line.push_str(CRLF);
        line
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Splits a line into its command word and the remaining parameter text.
///
/// A line without a space is a bare command; a leading space or a
/// trailing space after the command are both malformed.
fn extract_command(line: &str) -> Result<(&str, &str), ParseError> {
    if line.is_empty() {
        return Err(ParseError::MissingCommand);
    }
    match line.find(' ') {
        None => Ok((line, "")),
        Some(0) => Err(ParseError::MissingCommand),
        Some(pos) if pos + 1 == line.len() => Err(ParseError::BadParams),
        Some(pos) => Ok((&line[..pos], &line[pos + 1..])),
    }
}

/// Splits parameter text into tokens.
///
/// Tokens consist of `[A-Za-z0-9.\-]` only and are separated by single
/// spaces; empty tokens (leading, trailing or doubled spaces) make the
/// whole parameter text malformed. Empty input yields no tokens.
pub fn split_params(params: &str) -> Option<Vec<&str>> {
    if params.is_empty() {
        return Some(Vec::new());
    }
    let mut out = Vec::new();
    for token in params.split(' ') {
        if token.is_empty() || !token.bytes().all(is_param_byte) {
            return None;
        }
        out.push(token);
    }
    Some(out)
}

fn is_param_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'-'
}

fn parse_point_value(params: &[&str]) -> Result<(i32, f64), ParseError> {
    if params.len() != 2 {
        return Err(ParseError::BadParams);
    }
    let point = parse_integer(params[0]).ok_or(ParseError::BadParams)?;
    let value = parse_double(params[1]).ok_or(ParseError::BadParams)?;
    Ok((point, value))
}

/// Returns whether every character is ASCII alphanumeric.
pub fn is_alphanumeric(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Parses a signed decimal integer, rejecting anything outside the
/// 32-bit range or any token not fully consumed by the number.
pub fn parse_integer(s: &str) -> Option<i32> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let wide: i64 = s.parse().ok()?;
    i32::try_from(wide).ok()
}

/// Parses a double: optional `-`, optional integer digits, optional `.`
/// with at most [`MAX_FRACTIONAL_DIGITS`] fractional digits, and at
/// least one digit somewhere.
pub fn parse_double(s: &str) -> Option<f64> {
    let body = s.strip_prefix('-').unwrap_or(s);
    if body.is_empty() {
        return None;
    }

    let mut rest = body;
    let int_digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    rest = &rest[int_digits..];

    let mut frac_digits = 0;
    if let Some(after_dot) = rest.strip_prefix('.') {
        rest = after_dot;
        frac_digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if frac_digits > MAX_FRACTIONAL_DIGITS {
            return None;
        }
        rest = &rest[frac_digits..];
    }

    if int_digits == 0 && frac_digits == 0 {
        return None;
    }
    if !rest.is_empty() {
        return None;
    }

    s.parse().ok()
}

/// Formats a double in fixed notation with exactly
/// [`MAX_FRACTIONAL_DIGITS`] fractional digits.
pub fn format_double(value: f64) -> String {
    format!("{:.*}", MAX_FRACTIONAL_DIGITS, value)
}

fn join_doubles(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format_double(*v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reassembles CRLF-terminated lines from a raw byte stream.
///
/// Bytes are appended as they arrive from the socket; complete lines are
/// handed back with the CRLF stripped. Lone CR or LF bytes inside a line
/// do not terminate it.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Takes the next complete line, without its CRLF terminator.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self
            .buf
            .windows(2)
            .position(|pair| pair == CRLF.as_bytes())?;
        let mut line: Vec<u8> = self.buf.drain(..pos + 2).collect();
        line.truncate(pos);
        Some(line)
    }

    /// Bytes of the trailing partial line, if any.
    pub fn remainder(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
