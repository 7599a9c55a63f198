//! Strongly-typed identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A strongly-typed UUID wrapper with a display prefix.
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[doc = concat!("A unique identifier with prefix '", $prefix, "_'.")]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from string (with or without prefix).
            pub fn parse(s: &str) -> Result<Self, IdParseError> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| IdParseError::InvalidFormat)
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

/// Error parsing an ID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    /// The ID format is invalid.
    #[error("invalid ID format")]
    InvalidFormat,
    /// The subject identifier is empty.
    #[error("subject identifier is empty")]
    EmptySubject,
    /// The subject identifier exceeds the maximum length.
    #[error("subject identifier exceeds {max} bytes")]
    SubjectTooLong {
        /// Maximum accepted length in bytes.
        max: usize,
    },
    /// The subject identifier contains control characters.
    #[error("subject identifier contains control characters")]
    InvalidSubject,
}

define_id!(AuditRecordId, "aud");

/// Opaque subject identifier issued by the external identity provider.
///
/// Bastion never interprets the value; it only compares and stores it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Maximum subject length in bytes.
    pub const MAX_LEN: usize = 255;

    /// Validate and wrap a subject identifier.
    pub fn parse(value: impl Into<String>) -> Result<Self, IdParseError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IdParseError::EmptySubject);
        }
        if value.len() > Self::MAX_LEN {
            return Err(IdParseError::SubjectTooLong { max: Self::MAX_LEN });
        }
        if value.chars().any(char::is_control) {
            return Err(IdParseError::InvalidSubject);
        }
        Ok(Self(value))
    }

    /// Borrow the raw subject string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubjectId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

impl std::str::FromStr for SubjectId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubjectId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_record_id_prefix() {
        let id = AuditRecordId::new();
        assert!(id.to_string().starts_with("aud_"));
    }

    #[test]
    fn test_record_id_parse_with_and_without_prefix() {
        let id = AuditRecordId::new();
        assert_eq!(AuditRecordId::parse(&id.to_string()).unwrap(), id);
        assert_eq!(AuditRecordId::parse(&id.as_uuid().to_string()).unwrap(), id);
    }

    #[test]
    fn test_record_id_rejects_garbage() {
        assert_eq!(
            AuditRecordId::parse("aud_not-a-uuid"),
            Err(IdParseError::InvalidFormat)
        );
    }

    #[test]
    fn test_record_id_serializes_as_bare_uuid() {
        let id = AuditRecordId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }

    #[test]
    fn test_subject_validation() {
        assert_eq!(SubjectId::parse(""), Err(IdParseError::EmptySubject));
        assert_eq!(
            SubjectId::parse("a".repeat(256)),
            Err(IdParseError::SubjectTooLong { max: 255 })
        );
        assert_eq!(SubjectId::parse("bad\nsubject"), Err(IdParseError::InvalidSubject));
        assert_eq!(SubjectId::parse("auth0|42").unwrap().as_str(), "auth0|42");
    }

    #[test]
    fn test_subject_deserialize_validates() {
        let ok: SubjectId = serde_json::from_str("\"user-7\"").unwrap();
        assert_eq!(ok.as_str(), "user-7");
        assert!(serde_json::from_str::<SubjectId>("\"\"").is_err());
    }

    proptest! {
        #[test]
        fn test_subject_display_is_identity(raw in "[a-zA-Z0-9|:@._-]{1,64}") {
            let subject = SubjectId::parse(raw.clone()).unwrap();
            prop_assert_eq!(subject.to_string(), raw);
        }
    }
}
