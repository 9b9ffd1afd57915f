use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub(crate) enum PatternError {
    #[error("byte string must be multiple of two, got {0} digits")]
    OddLength(usize),
    #[error("invalid hex digits {digits:?} at offset {offset}")]
    InvalidDigit { offset: usize, digits: String },
    #[error("pattern must contain at least one byte")]
    Empty,
}

/// Decodes pairs of hex digits into bytes. Accepts an optional `0x` prefix.
pub(crate) fn decode_hex(text: &str) -> Result<Vec<u8>, PatternError> {
    let text = text.strip_prefix("0x").unwrap_or(text);
    if text.len() % 2 != 0 {
        return Err(PatternError::OddLength(text.len()));
    }
    text.as_bytes()
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| {
            let invalid = || PatternError::InvalidDigit {
                offset: i * 2,
                digits: String::from_utf8_lossy(pair).into_owned(),
            };
            // from_str_radix accepts a leading '+'
            if !pair.iter().all(u8::is_ascii_hexdigit) {
                return Err(invalid());
            }
            let pair = std::str::from_utf8(pair).map_err(|_| invalid())?;
            u8::from_str_radix(pair, 16).map_err(|_| invalid())
        })
        .collect()
}

/// Non-empty byte sequence repeated over a block by `--pattern-fill`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pattern(Vec<u8>);

impl Pattern {
    pub(crate) fn new(bytes: Vec<u8>) -> Result<Self, PatternError> {
        if bytes.is_empty() {
            return Err(PatternError::Empty);
        }
        Ok(Pattern(bytes))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::new(decode_hex(s.trim())?)
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
