use std::fmt;
use std::str::FromStr;

use snafu::ensure;
use uuid::Uuid;

use super::error::{InvalidIdSnafu, StorageError, StorageResult};

/// Opaque identifier scoping one conversation on the backend.
///
/// Locally minted identifiers are random UUID v4 strings, but the backend is
/// authoritative and may hand back any non-empty token, so the wrapper never
/// requires the UUID shape when parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Mints a fresh random identifier (version nibble 4, RFC 4122 variant).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> StorageResult<Self> {
        let trimmed = raw.trim();
        ensure!(
            !trimmed.is_empty(),
            InvalidIdSnafu {
                stage: "parse-session-id",
                id_type: "session-id",
                raw: raw.to_string(),
            }
        );
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the identifier is a canonical UUID v4 string.
    pub fn is_uuid_v4(&self) -> bool {
        Uuid::parse_str(&self.0)
            .map(|uuid| uuid.get_version_num() == 4 && uuid.get_variant() == uuid::Variant::RFC4122)
            .unwrap_or(false)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = StorageError;

    fn from_str(raw: &str) -> StorageResult<Self> {
        Self::parse(raw)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_uuid_v4_shaped() {
        let id = SessionId::generate();
        let raw = id.as_str();

        assert_eq!(raw.len(), 36);
        assert_eq!(&raw[14..15], "4");
        assert!(matches!(&raw[19..20], "8" | "9" | "a" | "b"));
        assert!(id.is_uuid_v4());
        assert_ne!(id, SessionId::generate());
    }

    #[test]
    fn parse_keeps_opaque_backend_tokens() {
        let id = SessionId::parse(" s2 ").expect("token should parse");
        assert_eq!(id.as_str(), "s2");
        assert!(!id.is_uuid_v4());
    }

    #[test]
    fn parse_rejects_blank_input() {
        let error = SessionId::parse("   ").expect_err("blank id must be rejected");
        assert!(matches!(error, StorageError::InvalidId { .. }));
    }
}
