//! The SCTID value type.

use crate::verhoeff;
use crate::{SctIdError, SctIdResult};
use std::fmt;
use std::str::FromStr;

/// Smallest item identifier issued in the International (short) partition.
///
/// Keeps every short-format SCTID at the 6-digit minimum length.
pub(crate) const MIN_SHORT_ITEM_ID: u64 = 100;

/// Largest item identifier in the short partition (15 digits; the SCTID
/// itself is capped at 18 digits).
pub(crate) const MAX_SHORT_ITEM_ID: u64 = 999_999_999_999_999;

/// Smallest item identifier issued in an extension (long) namespace.
pub(crate) const MIN_LONG_ITEM_ID: u64 = 1;

/// Largest item identifier in a long-format namespace (8 digits).
pub(crate) const MAX_LONG_ITEM_ID: u64 = 99_999_999;

/// Component category encoded in the second partition digit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionCategory {
    Concept,
    Description,
    Relationship,
}

impl PartitionCategory {
    pub(crate) const fn digit(self) -> u8 {
        match self {
            Self::Concept => 0,
            Self::Description => 1,
            Self::Relationship => 2,
        }
    }

    fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            0 => Some(Self::Concept),
            1 => Some(Self::Description),
            2 => Some(Self::Relationship),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::Description => "description",
            Self::Relationship => "relationship",
        }
    }
}

impl fmt::Display for PartitionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 7-digit SNOMED CT extension namespace identifier.
///
/// Displayed zero-padded to exactly seven digits, as it appears inside
/// long-format SCTIDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(u32);

impl Namespace {
    /// Wraps a namespace number, which must fit in seven digits.
    pub fn new(value: u32) -> SctIdResult<Self> {
        if value == 0 || value > 9_999_999 {
            return Err(SctIdError::InvalidNamespace(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:07}", self.0)
    }
}

impl FromStr for Namespace {
    type Err = SctIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 7 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SctIdError::InvalidNamespace(s.to_owned()));
        }
        let value: u32 = s
            .parse()
            .map_err(|_| SctIdError::InvalidNamespace(s.to_owned()))?;
        Namespace::new(value)
    }
}

/// A validated SNOMED CT identifier.
///
/// Once constructed, the contained string is guaranteed to be a well-formed
/// SCTID: correct length, a known partition identifier, and a valid Verhoeff
/// check digit. Equality and hashing operate on the canonical digit string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SctId {
    value: String,
    item_id: u64,
    namespace: Option<Namespace>,
    category: PartitionCategory,
}

impl SctId {
    /// Parses and validates an SCTID string.
    pub fn parse(input: &str) -> SctIdResult<Self> {
        let invalid = |reason: &str| SctIdError::InvalidSctId(format!("'{input}': {reason}"));

        if input.len() < 6 || input.len() > 18 {
            return Err(invalid("length must be 6-18 digits"));
        }
        if !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("must contain digits only"));
        }
        if input.starts_with('0') {
            return Err(invalid("must not have a leading zero"));
        }
        if !verhoeff::validate(input) {
            return Err(invalid("check digit mismatch"));
        }

        let digits = input.as_bytes();
        let format_digit = digits[digits.len() - 3] - b'0';
        let category_digit = digits[digits.len() - 2] - b'0';
        let category = PartitionCategory::from_digit(category_digit)
            .ok_or_else(|| invalid("unknown component category in partition identifier"))?;

        let (item_part, namespace) = match format_digit {
            0 => (&input[..input.len() - 3], None),
            1 => {
                // itemId(>=1) + namespace(7) + partition(2) + check(1)
                if input.len() < 11 {
                    return Err(invalid("too short for a namespaced identifier"));
                }
                let namespace_start = input.len() - 10;
                let namespace: Namespace = input[namespace_start..input.len() - 3].parse()?;
                (&input[..namespace_start], Some(namespace))
            }
            _ => return Err(invalid("unknown partition format digit")),
        };

        let item_id: u64 = item_part
            .parse()
            .map_err(|_| invalid("item identifier out of range"))?;

        Ok(Self {
            value: input.to_owned(),
            item_id,
            namespace,
            category,
        })
    }

    /// Builds a short-format (International) SCTID from an item identifier.
    pub fn new_short(item_id: u64, category: PartitionCategory) -> SctIdResult<Self> {
        if !(MIN_SHORT_ITEM_ID..=MAX_SHORT_ITEM_ID).contains(&item_id) {
            return Err(SctIdError::InvalidSctId(format!(
                "item identifier {item_id} out of short-format range"
            )));
        }
        Ok(Self::render(item_id, None, category))
    }

    /// Builds a long-format (extension) SCTID from an item identifier and namespace.
    pub fn new_long(
        item_id: u64,
        namespace: Namespace,
        category: PartitionCategory,
    ) -> SctIdResult<Self> {
        if !(MIN_LONG_ITEM_ID..=MAX_LONG_ITEM_ID).contains(&item_id) {
            return Err(SctIdError::InvalidSctId(format!(
                "item identifier {item_id} out of long-format range"
            )));
        }
        Ok(Self::render(item_id, Some(namespace), category))
    }

    fn render(item_id: u64, namespace: Option<Namespace>, category: PartitionCategory) -> Self {
        let body = match namespace {
            Some(ns) => format!("{item_id}{ns}1{}", category.digit()),
            None => format!("{item_id}0{}", category.digit()),
        };
        let check = verhoeff::check_digit(&body);
        Self {
            value: format!("{body}{check}"),
            item_id,
            namespace,
            category,
        }
    }

    /// The canonical digit string.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The issuer-allocated item identifier.
    pub fn item_id(&self) -> u64 {
        self.item_id
    }

    /// The extension namespace, or `None` for International content.
    pub fn namespace(&self) -> Option<Namespace> {
        self.namespace
    }

    /// The component category encoded in the partition identifier.
    pub fn category(&self) -> PartitionCategory {
        self.category
    }
}

impl fmt::Display for SctId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for SctId {
    type Err = SctIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SctId::parse(s)
    }
}

impl serde::Serialize for SctId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> serde::Deserialize<'de> for SctId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SctId::parse(&s).map_err(serde::de::Error::custom)
    }
}
