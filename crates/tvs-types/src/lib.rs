/// Validation failures for the text newtypes in this crate.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// Empty, or whitespace only.
    #[error("Text cannot be empty")]
    Empty,
    /// Contains characters a branch path segment may not carry.
    #[error("Invalid branch name segment: {0}")]
    InvalidSegment(String),
}

/// Free-form text with at least one non-whitespace character, such as a
/// commit author or comment. Stored trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Trims the input and wraps it; whitespace-only input is rejected.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A single branch path segment (the part between slashes).
///
/// Segments are restricted to ASCII letters, digits, `-`, `_` and `.` so that
/// branch paths remain safe to embed in URLs and never collide with path
/// separators. `MAIN` is an ordinary segment by this rule; the store decides
/// what it means.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchSegment(String);

impl BranchSegment {
    /// Validates and wraps a branch path segment.
    ///
    /// The input is not trimmed: whitespace anywhere is invalid, as are empty
    /// segments and segments containing `/`.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let segment = input.as_ref();
        if segment.is_empty() {
            return Err(TextError::Empty);
        }
        let valid = segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        if !valid {
            return Err(TextError::InvalidSegment(segment.to_owned()));
        }
        Ok(Self(segment.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for BranchSegment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for BranchSegment {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BranchSegment::new(s)
    }
}

impl serde::Serialize for BranchSegment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for BranchSegment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BranchSegment::new(&s).map_err(serde::de::Error::custom)
    }
}
