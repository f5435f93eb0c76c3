//! Identifier wrappers shared by the dicomsync crates.
//!
//! `AttachmentId` is the opaque UUID the archive host assigns to stored
//! content. `InstanceId` is the canonical identity derived from the DICOM
//! hierarchy of a file; two files carrying the same hierarchy share it.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use uuid::Uuid;

/// Error returned when parsing an identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

// ============================================================================
// AttachmentId
// ============================================================================

const HYPHENATED_UUID_LEN: usize = 36;

/// Host-assigned storage identifier. Always a syntactically valid UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(String);

impl AttachmentId {
    /// Accepts only the 36-character hyphenated form and keeps the caller's
    /// text, since the host addresses content by that exact string and the
    /// store shards on its leading characters.
    pub fn parse(value: &str) -> Result<Self, IdParseError> {
        if value.len() != HYPHENATED_UUID_LEN {
            return Err(IdParseError::new(format!(
                "Invalid attachment ID '{}': expected {} characters",
                value, HYPHENATED_UUID_LEN
            )));
        }
        Uuid::parse_str(value)
            .map_err(|e| IdParseError::new(format!("Invalid attachment ID '{}': {}", value, e)))?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AttachmentId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// InstanceId
// ============================================================================

const INSTANCE_GROUPS: usize = 5;
const INSTANCE_GROUP_LEN: usize = 8;

/// Canonical content identity: the SHA-1 digest of the DICOM hierarchy as
/// five dash-separated groups of eight lowercase hex digits. The archive host
/// derives its instance IDs the same way, so this value addresses the host's
/// copy directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Derive the identity of an instance from its hierarchy.
    ///
    /// `patient_id` may be empty; the three UIDs are expected to be present.
    pub fn from_hierarchy(patient_id: &str, study_uid: &str, series_uid: &str, sop_uid: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(patient_id.as_bytes());
        hasher.update(b"|");
        hasher.update(study_uid.as_bytes());
        hasher.update(b"|");
        hasher.update(series_uid.as_bytes());
        hasher.update(b"|");
        hasher.update(sop_uid.as_bytes());
        let digest = hasher.finalize();

        let hex = hex::encode(digest);
        let groups: Vec<&str> = (0..INSTANCE_GROUPS)
            .map(|i| &hex[i * INSTANCE_GROUP_LEN..(i + 1) * INSTANCE_GROUP_LEN])
            .collect();
        Self(groups.join("-"))
    }

    pub fn parse(value: &str) -> Result<Self, IdParseError> {
        let groups: Vec<&str> = value.split('-').collect();
        let well_formed = groups.len() == INSTANCE_GROUPS
            && groups.iter().all(|g| {
                g.len() == INSTANCE_GROUP_LEN
                    && g.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
            });
        if !well_formed {
            return Err(IdParseError::new(format!("Invalid instance ID '{}'", value)));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for InstanceId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_id_rejects_non_uuid() {
        assert!(AttachmentId::parse("not-a-uuid").is_err());
        assert!(AttachmentId::parse("").is_err());
        // Braced and simple forms parse as UUIDs but are not shardable text.
        assert!(AttachmentId::parse("{0a1b2c3d-0000-4000-8000-000000000001}").is_err());
        assert!(AttachmentId::parse("0a1b2c3d000040008000000000000001").is_err());
    }

    #[test]
    fn test_attachment_id_keeps_caller_text() {
        let raw = "0A1B2C3D-0000-4000-8000-000000000001";
        let id = AttachmentId::parse(raw).unwrap();
        assert_eq!(id.as_str(), raw);
    }

    #[test]
    fn test_instance_id_shape() {
        let id = InstanceId::from_hierarchy("P1", "1.2.3", "1.2.3.4", "1.2.3.4.5");
        let groups: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(groups.len(), 5);
        assert!(groups.iter().all(|g| g.len() == 8));
        assert_eq!(InstanceId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_instance_id_matches_host_instance_hash() {
        assert_eq!(
            InstanceId::from_hierarchy("P", "1.2", "1.2.3", "1.2.3.4").as_str(),
            "45ee1518-507b741a-aab5bb28-d6831be1-d449663a"
        );
        assert_eq!(
            InstanceId::from_hierarchy("", "1.2", "1.2.3", "1.2.3.4").as_str(),
            "00cbb9b4-02b89e2c-07fb286e-76013ff2-0361a859"
        );
    }

    #[test]
    fn test_instance_id_deterministic_and_field_sensitive() {
        let a = InstanceId::from_hierarchy("", "1.2", "1.2.3", "1.2.3.4");
        let b = InstanceId::from_hierarchy("", "1.2", "1.2.3", "1.2.3.4");
        let c = InstanceId::from_hierarchy("", "1.2", "1.2.3", "1.2.3.5");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_instance_id_parse_rejects_uppercase_and_short() {
        assert!(InstanceId::parse("ABCDEF01-00000000-00000000-00000000-00000000").is_err());
        assert!(InstanceId::parse("abc-def").is_err());
    }
}
