// Lenient deserializers for fields that older PHP peers serialize
// inconsistently: numbers as strings, nulls for zero, empty strings for
// absent hashes.

use crate::crypto::{Address, Hash};
use rust_decimal::Decimal;
use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Null => Some(0),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Some(0);
            }
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
        }
        _ => None,
    }
}

fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Null => Some(Decimal::ZERO),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Some(Decimal::ZERO);
            }
            Decimal::from_str(s).ok()
        }
        _ => None,
    }
}

pub fn u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_u64(&value).ok_or_else(|| SerdeError::custom(format!("expected integer, got {}", value)))
}

pub fn opt_u64_lenient<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        Value::String(ref s) if s.trim().is_empty() => Ok(None),
        other => value_to_u64(&other)
            .map(Some)
            .ok_or_else(|| SerdeError::custom(format!("expected integer, got {}", other))),
    }
}

pub fn u32_lenient<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let wide = u64_lenient(deserializer)?;
    u32::try_from(wide).map_err(|_| SerdeError::custom("integer out of range for u32"))
}

pub fn u16_lenient<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let wide = u64_lenient(deserializer)?;
    u16::try_from(wide).map_err(|_| SerdeError::custom("integer out of range for u16"))
}

pub fn decimal_lenient<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_decimal(&value)
        .ok_or_else(|| SerdeError::custom(format!("expected decimal, got {}", value)))
}

pub fn f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(0.0),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| SerdeError::custom("expected float")),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(0.0);
            }
            s.parse::<f64>()
                .map_err(|_| SerdeError::custom(format!("expected float, got {}", s)))
        }
        other => Err(SerdeError::custom(format!("expected float, got {}", other))),
    }
}

// Absent, null, empty or malformed hashes all map to None; replication
// treats them as unlinked rather than failing the whole page.
pub fn opt_hash_lenient<'de, D>(deserializer: D) -> Result<Option<Hash>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(Hash::from_str(s.trim()).ok()),
        _ => Ok(None),
    }
}

pub fn opt_address_lenient<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(Address::parse(&s).ok()),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Row {
        #[serde(default, deserialize_with = "u64_lenient")]
        count: u64,
        #[serde(default, deserialize_with = "decimal_lenient")]
        amount: Decimal,
        #[serde(default, deserialize_with = "opt_u64_lenient")]
        height: Option<u64>,
        #[serde(default, deserialize_with = "opt_hash_lenient")]
        hash: Option<Hash>,
    }

    #[test]
    fn accepts_strings_and_numbers() {
        let row: Row =
            serde_json::from_str(r#"{"count":"12","amount":"3.50","height":9}"#).unwrap();
        assert_eq!(row.count, 12);
        assert_eq!(row.amount, Decimal::from_str("3.50").unwrap());
        assert_eq!(row.height, Some(9));
    }

    #[test]
    fn nulls_and_empties_default() {
        let row: Row =
            serde_json::from_str(r#"{"count":null,"amount":"","height":null,"hash":""}"#).unwrap();
        assert_eq!(row.count, 0);
        assert_eq!(row.amount, Decimal::ZERO);
        assert_eq!(row.height, None);
        assert!(row.hash.is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(serde_json::from_str::<Row>(r#"{"count":[1]}"#).is_err());
    }
}
