//! Header block codec
//!
//! Headers are persisted (queue rows, journal entries) as a single text
//! blob, one `Name: value` header per line. Lines of a multi-line value
//! after the first are written indented; any leading whitespace marks a
//! continuation on read. Lines beginning with `#` are ignored and reserved
//! for future metadata. A completely empty line terminates the block.
//!
//! Encoding then decoding a header block yields the original headers, with
//! one caveat: leading whitespace on the continuation lines of a multi-line
//! value is indistinguishable from the continuation indent and is not
//! preserved.

use thiserror::Error;

use crate::headers::Headers;

/// Indent emitted before each continuation line of a multi-line value.
const CONTINUATION_INDENT: &str = "    ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderCodecError {
    #[error("header line {line} has no name/value separator: {text:?}")]
    MissingSeparator { line: usize, text: String },

    #[error("header line {line} begins with a separator and has no name")]
    EmptyName { line: usize },

    #[error("continuation on line {line} is not preceded by a header")]
    OrphanContinuation { line: usize },
}

/// Encode a header block to its storage form.
pub fn encode_headers(headers: &Headers) -> String {
    let mut out = String::new();
    for (name, value) in headers.iter() {
        let mut segments = value.split('\n');
        let first = segments.next().unwrap_or("");
        out.push_str(name);
        out.push_str(": ");
        out.push_str(first);
        out.push('\n');
        for segment in segments {
            out.push_str(CONTINUATION_INDENT);
            out.push_str(segment);
            out.push('\n');
        }
    }
    out.push('\n');
    out
}

/// Decode a header block from its storage form.
pub fn decode_headers(text: &str) -> Result<Headers, HeaderCodecError> {
    let mut headers = Headers::new();
    let mut current: Option<(String, String)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        if raw.is_empty() {
            break;
        }
        if raw.starts_with('#') {
            continue;
        }
        if raw.starts_with(char::is_whitespace) {
            match current.as_mut() {
                Some((_, value)) => {
                    value.push('\n');
                    value.push_str(raw.trim_start());
                }
                None => return Err(HeaderCodecError::OrphanContinuation { line }),
            }
            continue;
        }

        if let Some((name, value)) = current.take() {
            headers.set(name, value);
        }

        match raw.find(':') {
            Some(0) => return Err(HeaderCodecError::EmptyName { line }),
            Some(sep) => {
                let name = raw[..sep].to_string();
                let rest = &raw[sep + 1..];
                let value = rest.strip_prefix(' ').unwrap_or(rest).to_string();
                current = Some((name, value));
            }
            None => {
                return Err(HeaderCodecError::MissingSeparator {
                    line,
                    text: raw.to_string(),
                })
            }
        }
    }

    if let Some((name, value)) = current {
        headers.set(name, value);
    }
    Ok(headers)
}
