//! Human-friendly byte sizes for configuration values.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A size in bytes.
///
/// Deserializes from a plain integer (`104857600`) or from a string with an
/// optional binary unit (`"100Mi"`, `"10GiB"`, `"512K"`). Serializes as the
/// raw byte count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const KIB: u64 = 1024;
    pub const MIB: u64 = 1024 * Self::KIB;
    pub const GIB: u64 = 1024 * Self::MIB;

    pub const fn bytes(n: u64) -> Self {
        Self(n)
    }

    pub const fn kib(n: u64) -> Self {
        Self(n * Self::KIB)
    }

    pub const fn mib(n: u64) -> Self {
        Self(n * Self::MIB)
    }

    pub const fn gib(n: u64) -> Self {
        Self(n * Self::GIB)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for ByteSize {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0;
        if n != 0 && n % Self::GIB == 0 {
            write!(f, "{}Gi", n / Self::GIB)
        } else if n != 0 && n % Self::MIB == 0 {
            write!(f, "{}Mi", n / Self::MIB)
        } else if n != 0 && n % Self::KIB == 0 {
            write!(f, "{}Ki", n / Self::KIB)
        } else {
            write!(f, "{n}B")
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ByteSizeError {
    #[error("Invalid size '{0}': expected a number with an optional unit")]
    Malformed(String),

    #[error("Unknown size unit '{unit}' in '{input}'")]
    UnknownUnit { input: String, unit: String },

    #[error("Size '{0}' overflows a 64-bit byte count")]
    Overflow(String),
}

impl FromStr for ByteSize {
    type Err = ByteSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);
        if digits.is_empty() {
            return Err(ByteSizeError::Malformed(s.to_string()));
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| ByteSizeError::Overflow(s.to_string()))?;

        let multiplier = match unit.trim() {
            "" | "b" | "B" => 1,
            "k" | "K" | "Ki" | "KiB" => Self::KIB,
            "m" | "M" | "Mi" | "MiB" => Self::MIB,
            "g" | "G" | "Gi" | "GiB" => Self::GIB,
            other => {
                return Err(ByteSizeError::UnknownUnit {
                    input: s.to_string(),
                    unit: other.to_string(),
                });
            }
        };

        n.checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| ByteSizeError::Overflow(s.to_string()))
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ByteSizeVisitor;

        impl Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a size string such as \"100Mi\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ByteSize, E> {
                Ok(ByteSize(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ByteSize, E> {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom(format!("size must not be negative, got {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ByteSize, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("10Mi".parse::<ByteSize>().unwrap(), ByteSize::mib(10));
        assert_eq!("10MiB".parse::<ByteSize>().unwrap(), ByteSize::mib(10));
        assert_eq!("2G".parse::<ByteSize>().unwrap(), ByteSize::gib(2));
        assert_eq!("512k".parse::<ByteSize>().unwrap(), ByteSize::kib(512));
        assert_eq!("42".parse::<ByteSize>().unwrap(), ByteSize(42));
        assert_eq!("42B".parse::<ByteSize>().unwrap(), ByteSize(42));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "Mi".parse::<ByteSize>(),
            Err(ByteSizeError::Malformed(_))
        ));
        assert!(matches!(
            "10Tb".parse::<ByteSize>(),
            Err(ByteSizeError::UnknownUnit { .. })
        ));
        assert!(matches!(
            "99999999999999999999".parse::<ByteSize>(),
            Err(ByteSizeError::Overflow(_))
        ));
    }

    #[test]
    fn test_deserialize_integer_and_string() {
        let from_int: ByteSize = serde_json::from_str("1024").unwrap();
        assert_eq!(from_int, ByteSize::kib(1));

        let from_str: ByteSize = serde_json::from_str("\"100Mi\"").unwrap();
        assert_eq!(from_str.as_u64(), 100 * 1024 * 1024);

        assert!(serde_json::from_str::<ByteSize>("-1").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ByteSize::gib(10).to_string(), "10Gi");
        assert_eq!(ByteSize::mib(100).to_string(), "100Mi");
        assert_eq!(ByteSize(1000).to_string(), "1000B");
        assert_eq!(ByteSize(0).to_string(), "0B");
    }
}
