//! Validated primitive types shared across the cinelink crates.
//!
//! Values arriving from configuration or from either remote system are checked once at the
//! boundary and carried as these types afterwards:
//! - [`NonEmptyText`] for free text that must not be blank (credentials, labels)
//! - [`Uid`] for registry identifiers (programs, data fields, attributes)
//! - [`ArchiveId`] for imaging-archive identifiers, which also end up as path segments
//! - [`Secret`] for credentials that must stay out of logs

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    /// The input is not an 11-character registry identifier
    #[error("invalid registry uid '{0}': expected a letter followed by 10 alphanumerics")]
    InvalidUid(String),

    /// The input cannot be used as an archive identifier
    #[error("invalid archive id '{0}'")]
    InvalidArchiveId(String),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns `Err(TextError::Empty)` if the trimmed input is empty.
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

/// Identifier of a registry object (program, stage, org unit, data field, attribute).
///
/// Registry identifiers are exactly 11 ASCII characters: one letter followed by ten letters or
/// digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(String);

impl Uid {
    const LEN: usize = 11;

    /// Parses a registry identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::InvalidUid`] when the input is not 11 characters long, does not start
    /// with a letter, or contains anything other than ASCII letters and digits.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let input = input.as_ref().trim();
        let bytes = input.as_bytes();
        let valid = bytes.len() == Self::LEN
            && bytes[0].is_ascii_alphabetic()
            && bytes.iter().all(u8::is_ascii_alphanumeric);
        if !valid {
            return Err(TextError::InvalidUid(input.to_owned()));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of an imaging-archive resource (study, series, instance).
///
/// Archive ids name scratch directories and output files, so only a conservative character set
/// is accepted: ASCII alphanumerics, `-`, `_` and `.`, with `.` and `..` rejected outright.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveId(String);

impl ArchiveId {
    const MAX_LEN: usize = 128;

    /// Parses an archive identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::InvalidArchiveId`] for empty, overlong, dot-only, or otherwise unsafe
    /// values.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let input = input.as_ref().trim();
        let charset_ok = input
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'-' | b'_'));
        if input.is_empty()
            || input.len() > Self::MAX_LEN
            || !charset_ok
            || input.bytes().all(|b| b == b'.')
        {
            return Err(TextError::InvalidArchiveId(input.to_owned()));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A credential that never appears in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret value. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

macro_rules! text_impls {
    ($ty:ident, $ctor:ident) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $ty {
            type Err = TextError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::$ctor(s)
            }
        }

        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $ty::$ctor(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

text_impls!(NonEmptyText, new);
text_impls!(Uid, parse);
text_impls!(ArchiveId, parse);
