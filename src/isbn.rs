//! ISBN normalisation, checksum validation and the barcode plausibility filter.
//!
//! Everything here is pure: the same input always gives the same verdict and
//! nothing is logged or mutated.

use std::{fmt, ops::Deref, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bookland EAN prefixes that mark a 13-digit barcode as a book
pub const BOOKLAND_PREFIXES: [&str; 2] = ["978", "979"];

/// Errors produced when turning raw text into an [`Isbn`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsbnError {
    /// Normalised input is neither 10 nor 13 characters long
    #[error("expected 10 or 13 ISBN characters, found {len}")]
    WrongLength {
        /// Length after normalisation
        len: usize,
    },
    /// Input has the right length but fails the checksum
    #[error("{0} is not a valid book ISBN")]
    InvalidChecksum(String),
}

/// Which of the two ISBN forms a value has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum IsbnKind {
    /// Ten characters, mod-11 check character (may be `X`)
    Isbn10,
    /// Thirteen digits, EAN-13 mod-10 check digit
    Isbn13,
}

/// Rule deciding which 13-digit candidates count as plausible book barcodes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixRule {
    /// Accept every 13-digit candidate
    Any,
    /// Accept 13-digit candidates starting with one of these prefixes
    Prefixes(Vec<String>),
}

impl Default for PrefixRule {
    fn default() -> Self {
        Self::bookland()
    }
}

impl PrefixRule {
    /// The `978`/`979` Bookland rule
    #[must_use]
    pub fn bookland() -> Self {
        Self::Prefixes(BOOKLAND_PREFIXES.iter().map(ToString::to_string).collect())
    }

    /// Whether a normalised 13-character code passes this rule
    #[must_use]
    pub fn allows(&self, code: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Prefixes(prefixes) => prefixes.iter().any(|p| code.starts_with(p.as_str())),
        }
    }
}

/// Strip everything except ASCII digits and `X`, upper-casing `x`.
///
/// `"ISBN 0-306-40615-2"` becomes `"0306406152"`.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            'x' | 'X' => Some('X'),
            _ => None,
        })
        .collect()
}

/// Cheap length/prefix check run before the checksum.
///
/// The candidate is normalised first. Ten characters always pass; thirteen pass
/// only when `rule` allows the prefix. Anything else is rejected.
#[must_use]
pub fn is_plausible_barcode(raw: &str, rule: &PrefixRule) -> bool {
    let cleaned = normalize(raw);
    match cleaned.len() {
        10 => true,
        13 => rule.allows(&cleaned),
        _ => false,
    }
}

/// Checksum validation of an already normalised ISBN-10 or ISBN-13.
///
/// Strings of any other length are never valid.
#[must_use]
pub fn is_valid_isbn(isbn: &str) -> bool {
    match isbn.len() {
        10 => isbn10_checksum_ok(isbn.as_bytes()),
        13 => isbn13_checksum_ok(isbn.as_bytes()),
        _ => false,
    }
}

/// Weighted mod-11 sum with weights 10 down to 1; `X` only in last place.
#[allow(clippy::arithmetic_side_effects)]
fn isbn10_checksum_ok(bytes: &[u8]) -> bool {
    let last = bytes.len().saturating_sub(1);
    let mut sum = 0_u32;
    for (i, (&b, weight)) in bytes.iter().zip((1..=10_u32).rev()).enumerate() {
        let value = match (b, char::from(b).to_digit(10)) {
            (_, Some(digit)) => digit,
            (b'X', None) if i == last => 10,
            _ => return false,
        };
        sum += value * weight;
    }
    sum % 11 == 0
}

/// Alternating 1/3 weights, sum mod 10; all thirteen must be digits.
#[allow(clippy::arithmetic_side_effects)]
fn isbn13_checksum_ok(bytes: &[u8]) -> bool {
    let mut sum = 0_u32;
    for (&b, weight) in bytes.iter().zip([1_u32, 3].iter().cycle()) {
        let Some(digit) = char::from(b).to_digit(10) else {
            return false;
        };
        sum += digit * weight;
    }
    sum % 10 == 0
}

/// A normalised, checksum-valid ISBN
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn(String);

impl Isbn {
    /// Normalise `raw` and validate it
    ///
    /// # Errors
    ///
    /// Returns `IsbnError::WrongLength` when the normalised text is not 10 or
    /// 13 characters and `IsbnError::InvalidChecksum` when the check character
    /// does not match.
    pub fn parse(raw: &str) -> Result<Self, IsbnError> {
        let cleaned = normalize(raw);
        match cleaned.len() {
            10 | 13 if is_valid_isbn(&cleaned) => Ok(Self(cleaned)),
            10 | 13 => Err(IsbnError::InvalidChecksum(cleaned)),
            len => Err(IsbnError::WrongLength { len }),
        }
    }

    /// Whether this is the 10 or 13 character form
    #[must_use]
    pub fn kind(&self) -> IsbnKind {
        if self.0.len() == 10 { IsbnKind::Isbn10 } else { IsbnKind::Isbn13 }
    }

    /// Medium-size Open Library cover image for this ISBN
    #[must_use]
    pub fn cover_url(&self) -> String {
        cover_url(&self.0)
    }

    /// The normalised characters
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Medium-size Open Library cover image for a raw ISBN string
#[must_use]
pub fn cover_url(isbn: &str) -> String {
    format!("https://covers.openlibrary.org/b/isbn/{isbn}-M.jpg")
}

impl Deref for Isbn {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Isbn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Isbn {
    type Err = IsbnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Isbn {
    type Error = IsbnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Isbn> for String {
    fn from(isbn: Isbn) -> Self {
        isbn.0
    }
}
