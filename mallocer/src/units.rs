use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub(crate) enum UnitError {
    #[error("empty size")]
    Empty,
    #[error("size must start with a number: {0:?}")]
    MissingNumber(String),
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("unknown unit suffix {0:?}. expected one of K, Ki, KiB, kB (and the same for M, G, T, P, E)")]
    UnknownSuffix(String),
    #[error("{0} overflows 64 bits")]
    Overflow(String),
}

/// Amount of bytes as written on the command line.
///
/// Single letter suffixes and the `i`/`iB` forms are binary (`4K` is 4096),
/// suffixes ending in `B` without `i` are decimal (`4kB` is 4000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ByteSize(pub(crate) u64);

impl ByteSize {
    pub(crate) const fn new(bytes: u64) -> Self {
        ByteSize(bytes)
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.0
    }
}

impl Display for ByteSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

fn multiplier(suffix: &str) -> Option<u64> {
    if suffix.is_empty() || suffix == "B" {
        return Some(1);
    }
    let mut chars = suffix.chars();
    let prefix = chars.next()?.to_ascii_uppercase();
    let exponent = PREFIXES.iter().position(|p| *p == prefix)? as u32 + 1;
    match chars.as_str() {
        "" | "i" | "iB" => Some(1024u64.pow(exponent)),
        "B" => Some(1000u64.pow(exponent)),
        _ => None,
    }
}

impl FromStr for ByteSize {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(UnitError::Empty);
        }
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (number, suffix) = s.split_at(split);
        if number.is_empty() {
            return Err(UnitError::MissingNumber(s.to_string()));
        }
        let number = number
            .parse::<u64>()
            .map_err(|_| UnitError::InvalidNumber(number.to_string()))?;
        let multiplier = multiplier(suffix.trim_start()).ok_or_else(|| UnitError::UnknownSuffix(suffix.to_string()))?;
        number
            .checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| UnitError::Overflow(s.to_string()))
    }
}
