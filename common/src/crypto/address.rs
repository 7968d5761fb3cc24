use lazy_static::lazy_static;
use regex::Regex;
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

lazy_static! {
    static ref ADDRESS_REGEX: Regex =
        Regex::new("^0x[0-9a-f]{40}$").expect("address regex is valid");
}

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invalid address format: {0}")]
    InvalidFormat(String),
}

/// A ledger address, normalized to lowercase `0x` + 40 hex characters.
///
/// The only way to build one is through [`Address::parse`], which trims and
/// lowercases its input and rejects anything that does not match the
/// canonical form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(String);

impl Address {
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let normalized = input.trim().to_lowercase();
        if !ADDRESS_REGEX.is_match(&normalized) {
            return Err(AddressError::InvalidFormat(input.to_string()));
        }
        Ok(Address(normalized))
    }

    /// Check an already-normalized candidate without allocating.
    pub fn is_valid(input: &str) -> bool {
        ADDRESS_REGEX.is_match(input)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'a> Deserialize<'a> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(SerdeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let addr = Address::parse("  0xABCDEF0123456789abcdef0123456789ABCDEF01 ").unwrap();
        assert_eq!(addr.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Address::parse("abcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(Address::parse("0xabc").is_err());
        assert!(Address::parse("0xghijkl0123456789abcdef0123456789abcdef01").is_err());
        assert!(Address::parse("").is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let addr = Address::parse("0xabcdef0123456789abcdef0123456789abcdef01").unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, back);
    }

    #[test]
    fn deserialize_normalizes() {
        let back: Address =
            serde_json::from_str("\"0xABCDEF0123456789abcdef0123456789ABCDEF01\"").unwrap();
        assert_eq!(back.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }
}
