use serde::{Deserialize, Serialize};

use super::IdParseError;

/// One half of the (node, copy) pair inside a node-revision id.
///
/// A `revision` of `None` marks a number allocated inside a transaction that
/// has not been committed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdPart {
    pub revision: Option<u64>,
    pub number: u64,
}

impl IdPart {
    pub const ROOT: IdPart = IdPart {
        revision: Some(0),
        number: 0,
    };

    pub fn new(revision: u64, number: u64) -> Self {
        Self {
            revision: Some(revision),
            number,
        }
    }

    pub fn in_txn(number: u64) -> Self {
        Self {
            revision: None,
            number,
        }
    }

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    pub fn is_txn(&self) -> bool {
        self.revision.is_none()
    }
}

impl Default for IdPart {
    fn default() -> Self {
        Self::ROOT
    }
}

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Encode `value` with the lowercase base-36 alphabet.
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(13);
    while value > 0 {
        buf.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.iter().rev().map(|&b| char::from(b)).collect()
}

/// Decode the leading base-36 run of `text`, returning the value and the
/// unconsumed remainder.
fn take_base36(text: &str) -> Result<(u64, &str), IdParseError> {
    let end = text
        .find(|c: char| !matches!(c, '0'..='9' | 'a'..='z'))
        .unwrap_or(text.len());
    if end == 0 {
        return Err(IdParseError::MissingNumber(text.to_string()));
    }
    let mut value: u64 = 0;
    for byte in text[..end].bytes() {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            _ => byte - b'a' + 10,
        };
        value = value
            .checked_mul(36)
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or_else(|| IdParseError::NumberOverflow(text[..end].to_string()))?;
    }
    Ok((value, &text[end..]))
}

pub fn from_base36(text: &str) -> Result<u64, IdParseError> {
    let (value, rest) = take_base36(text)?;
    if !rest.is_empty() {
        return Err(IdParseError::TrailingData(text.to_string()));
    }
    Ok(value)
}

pub(crate) fn parse_decimal(text: &str) -> Result<u64, IdParseError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdParseError::BadDecimal(text.to_string()));
    }
    text.parse::<u64>()
        .map_err(|_| IdParseError::BadDecimal(text.to_string()))
}

/// Decode one textual id part (`_<base36>`, `0`, `<base36>` or `<base36>-<rev>`).
pub fn decode_part(text: &str) -> Result<IdPart, IdParseError> {
    if let Some(rest) = text.strip_prefix('_') {
        return Ok(IdPart::in_txn(from_base36(rest)?));
    }

    if text == "0" {
        return Ok(IdPart::ROOT);
    }

    let (number, rest) = take_base36(text)?;
    if rest.is_empty() {
        return Ok(IdPart::new(0, number));
    }
    match rest.strip_prefix('-') {
        Some(revision) => Ok(IdPart::new(parse_decimal(revision)?, number)),
        None => Err(IdParseError::TrailingData(text.to_string())),
    }
}

/// Textual form of `part`, without the trailing `.` separator.
pub fn unparse_part(part: &IdPart) -> String {
    match part.revision {
        None => format!("_{}", to_base36(part.number)),
        Some(0) => to_base36(part.number),
        Some(revision) => format!("{}-{}", to_base36(part.number), revision),
    }
}
