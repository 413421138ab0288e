//! LogTemplate - render a message into a key or value string.
//!
//! Syntax:
//! - `$NAME` or `${NAME}` expands to the message value `NAME`
//! - `$$` is a literal dollar sign
//! - builtins: `SEQNUM` (delivery sequence number), `ISODATE` (RFC 3339
//!   timestamp); `MESSAGE`, `HOST`, `PROGRAM` are ordinary values
//!
//! Unknown names expand to the empty string, so rendering cannot fail; all
//! syntax errors are reported by `compile`.

use std::fmt::Write as _;

use crate::domain::{LogMessage, SequenceNumber, TemplateError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Macro(String),
}

#[derive(Debug, Clone)]
pub struct LogTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl LogTemplate {
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some((_, '$')) => {
                    chars.next();
                    literal.push('$');
                }
                Some((_, '{')) => {
                    chars.next();
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::UnclosedBrace { position: pos });
                    }
                    if name.trim().is_empty() {
                        return Err(TemplateError::EmptyMacroName { position: pos });
                    }
                    flush(&mut literal, &mut segments);
                    segments.push(Segment::Macro(name.trim().to_string()));
                }
                Some((_, c)) if is_name_char(c) => {
                    let mut name = String::new();
                    while let Some((_, c)) = chars.peek().copied() {
                        if !is_name_char(c) {
                            break;
                        }
                        name.push(c);
                        chars.next();
                    }
                    flush(&mut literal, &mut segments);
                    segments.push(Segment::Macro(name));
                }
                // lone '$'
                _ => literal.push('$'),
            }
        }
        flush(&mut literal, &mut segments);

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, message: &LogMessage, seq_num: SequenceNumber) -> String {
        let mut out = String::new();
        self.render_into(message, seq_num, &mut out);
        out
    }

    /// Render into `out`, replacing its contents.
    pub fn render_into(&self, message: &LogMessage, seq_num: SequenceNumber, out: &mut String) {
        out.clear();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Macro(name) => expand(name, message, seq_num, out),
            }
        }
    }
}

fn expand(name: &str, message: &LogMessage, seq_num: SequenceNumber, out: &mut String) {
    match name {
        "SEQNUM" => {
            let _ = write!(out, "{seq_num}");
        }
        "ISODATE" => out.push_str(&message.timestamp().to_rfc3339()),
        _ => {
            if let Some(value) = message.get_value(name) {
                out.push_str(value);
            }
        }
    }
}

fn flush(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Replace every CR and LF with a space.
///
/// The backend protocol frames commands by line; a rendered key or value
/// must never contain a line break.
pub fn wash_string(s: &mut String) {
    if s.contains(['\r', '\n']) {
        *s = s.replace(['\r', '\n'], " ");
    }
}
