//! JSON helpers for values that must not lose precision on the way out
//!
//! Tool outputs and API responses are consumed by JavaScript-shaped clients
//! (the agent backend, browser front ends) that parse numbers as IEEE-754
//! doubles. Anything wider than 2^53 - 1 is therefore written as a decimal
//! string.

use serde_json::{Map, Number, Value};

/// Largest integer a double can represent exactly (2^53 - 1)
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Rewrite every integer outside the safe range as a decimal string.
///
/// Floats and small integers are left untouched.
pub fn stringify_wide_integers(value: Value) -> Value {
    match value {
        Value::Number(number) => stringify_number(number),
        Value::Array(items) => Value::Array(items.into_iter().map(stringify_wide_integers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, stringify_wide_integers(value)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

fn stringify_number(number: Number) -> Value {
    if let Some(unsigned) = number.as_u64() {
        if unsigned > MAX_SAFE_INTEGER {
            return Value::String(unsigned.to_string());
        }
    } else if let Some(signed) = number.as_i64() {
        if signed.unsigned_abs() > MAX_SAFE_INTEGER {
            return Value::String(signed.to_string());
        }
    }
    Value::Number(number)
}

/// `#[serde(with = "decimal")]` for integer fields that are always written
/// as decimal strings (block numbers, wei amounts, credit counts).
///
/// Deserialization accepts either a string or a JSON number so values can
/// round-trip through tool outputs.
pub mod decimal {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Number(number) => number.to_string(),
        };
        raw.trim().parse::<T>().map_err(de::Error::custom)
    }
}

/// Same as [`decimal`] for optional fields.
pub mod decimal_opt {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        match value {
            Some(value) => serializer.collect_str(value),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper<T>(#[serde(with = "super::decimal")] T)
        where
            T: FromStr,
            T::Err: Display;

        Ok(Option::<Wrapper<T>>::deserialize(deserializer)?.map(|Wrapper(value)| value))
    }
}
