//! Line protocol spoken by the volume knob.
//!
//! ```text
//! APP:<index>              select roster entry <index>
//! VOLUME:<index>:<value>   set roster entry <index> to <value> percent
//! ```
//!
//! Prefixes are case-sensitive. Anything else is a diagnostic line.

use thiserror::Error;

const APP_PREFIX: &str = "APP:";
const VOLUME_PREFIX: &str = "VOLUME:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select { index: usize },
    SetVolume { index: usize, percent: u8 },
    Other(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing {0} field")]
    MissingField(&'static str),

    #[error("unexpected extra field {0:?}")]
    ExtraField(String),

    #[error("{field} {text:?} is not an integer")]
    NotInteger { field: &'static str, text: String },

    #[error("index {index} is out of range (0..{len})")]
    IndexOutOfRange { index: i64, len: usize },
}

/// Parses one received line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str, roster_len: usize) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if let Some(rest) = line.strip_prefix(APP_PREFIX) {
        let mut fields = rest.split(':');
        let index = parse_index(fields.next(), roster_len)?;
        no_more(fields)?;
        return Ok(Some(Command::Select { index }));
    }

    if let Some(rest) = line.strip_prefix(VOLUME_PREFIX) {
        let mut fields = rest.split(':');
        let index = parse_index(fields.next(), roster_len)?;
        let value = parse_int("value", fields.next())?;
        no_more(fields)?;
        return Ok(Some(Command::SetVolume { index, percent: value.clamp(0, 100) as u8 }));
    }

    Ok(Some(Command::Other(line.to_string())))
}

fn parse_int(field: &'static str, text: Option<&str>) -> Result<i64, ParseError> {
    let text = text
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingField(field))?;
    text.parse::<i64>().map_err(|_| ParseError::NotInteger { field, text: text.to_string() })
}

fn parse_index(text: Option<&str>, roster_len: usize) -> Result<usize, ParseError> {
    let index = parse_int("index", text)?;
    match usize::try_from(index) {
        Ok(i) if i < roster_len => Ok(i),
        _ => Err(ParseError::IndexOutOfRange { index, len: roster_len }),
    }
}

fn no_more<'a>(mut fields: impl Iterator<Item = &'a str>) -> Result<(), ParseError> {
    match fields.next() {
        Some(extra) => Err(ParseError::ExtraField(extra.to_string())),
        None => Ok(()),
    }
}
