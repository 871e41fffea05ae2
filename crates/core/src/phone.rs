use std::str::FromStr;

use phonenumber::{country, Mode};
use thiserror::Error;

/// Region national numbers are read in unless configured otherwise.
pub const DEFAULT_REGION: country::Id = country::Id::KE;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number is empty")]
    Empty,
    #[error("phone number `{raw}` could not be parsed: {reason}")]
    Unparseable { raw: String, reason: String },
    #[error("phone number `{0}` is not a valid number for its region")]
    Invalid(String),
    #[error("`{0}` is not an ISO 3166 region code")]
    UnknownRegion(String),
}

/// Rewrites caller-supplied phone numbers into E.164 (`+254712345678`).
///
/// Numbers without a `+` prefix are read in the configured region, so with
/// `KE` both `0712345678` and `712 345 678` map to the same canonical value.
/// Parsing and validity come from the libphonenumber metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhoneNormalizer {
    region: country::Id,
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_REGION)
    }
}

impl PhoneNormalizer {
    pub fn new(region: country::Id) -> Self {
        Self { region }
    }

    /// Normalizer for a two-letter region code such as `KE` or `tz`.
    pub fn for_region(code: &str) -> Result<Self, PhoneError> {
        let code = code.trim().to_ascii_uppercase();
        country::Id::from_str(&code).map(Self::new).map_err(|_| PhoneError::UnknownRegion(code))
    }

    pub fn region(&self) -> country::Id {
        self.region
    }

    pub fn normalize(&self, raw: &str) -> Result<String, PhoneError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PhoneError::Empty);
        }

        let number = phonenumber::parse(Some(self.region), raw).map_err(|error| {
            PhoneError::Unparseable { raw: raw.to_string(), reason: error.to_string() }
        })?;
        if !phonenumber::is_valid(&number) {
            return Err(PhoneError::Invalid(raw.to_string()));
        }

        Ok(number.format().mode(Mode::E164).to_string())
    }

    /// Canonical form when the number parses, otherwise the trimmed input, so
    /// formats the metadata does not cover still round-trip.
    pub fn normalize_or_raw(&self, raw: &str) -> String {
        self.normalize(raw).unwrap_or_else(|_| raw.trim().to_string())
    }
}
