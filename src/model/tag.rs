//! Tag directory entries: identifiers, status, and name normalization

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a tag (the directory row id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(i64);

impl TagId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TagId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Moderation status of a tag.
///
/// `Merged` carries its canonical target, so "canonical present iff merged"
/// holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "into", rename_all = "lowercase")]
pub enum TagStatus {
    Active,
    Blocked,
    Merged(TagId),
}

impl TagStatus {
    /// Column value stored in the `status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            TagStatus::Active => "active",
            TagStatus::Blocked => "blocked",
            TagStatus::Merged(_) => "merged",
        }
    }

    /// Canonical target stored in the `canonical_id` column
    pub fn canonical(&self) -> Option<TagId> {
        match self {
            TagStatus::Merged(target) => Some(*target),
            _ => None,
        }
    }

    /// Rebuild a status from its two columns.
    pub fn from_columns(status: &str, canonical: Option<i64>) -> Result<Self, String> {
        match (status, canonical) {
            ("active", None) => Ok(TagStatus::Active),
            ("blocked", None) => Ok(TagStatus::Blocked),
            ("merged", Some(target)) => Ok(TagStatus::Merged(TagId(target))),
            (other, canonical) => Err(format!(
                "invalid tag status '{}' with canonical {:?}",
                other, canonical
            )),
        }
    }
}

/// A tag in the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    /// Display name as first submitted (trimmed, whitespace collapsed)
    pub name: String,
    /// Normalized lookup key, unique across the directory
    pub key: String,
    pub status: TagStatus,
    /// Number of live attributions pointing at this row
    pub global_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    pub fn is_active(&self) -> bool {
        self.status == TagStatus::Active
    }

    pub fn is_blocked(&self) -> bool {
        self.status == TagStatus::Blocked
    }
}

/// A reference to a tag as submitted by a caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagRef {
    ById(TagId),
    ByName(String),
}

impl From<TagId> for TagRef {
    fn from(id: TagId) -> Self {
        TagRef::ById(id)
    }
}

impl From<&str> for TagRef {
    fn from(name: &str) -> Self {
        TagRef::ByName(name.to_string())
    }
}

/// Collapse runs of whitespace to a single space and trim both ends.
pub fn display_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lookup key for a free-text tag name: trimmed, casefolded, inner
/// whitespace collapsed. Empty when the input is blank.
pub fn normalize_name(raw: &str) -> String {
    display_name(raw).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_casefolds() {
        assert_eq!(normalize_name("  Warm-Story "), "warm-story");
        assert_eq!(normalize_name("GROWTH"), "growth");
    }

    #[test]
    fn normalize_collapses_inner_whitespace() {
        assert_eq!(normalize_name("coming \t of\n  age"), "coming of age");
        assert_eq!(display_name("  Coming   of Age "), "Coming of Age");
    }

    #[test]
    fn normalize_blank_is_empty() {
        assert_eq!(normalize_name("   \t"), "");
    }

    #[test]
    fn normalize_handles_non_ascii() {
        assert_eq!(normalize_name(" 따뜻한   이야기 "), "따뜻한 이야기");
        assert_eq!(normalize_name("ÉTÉ"), "été");
    }

    #[test]
    fn status_round_trips_through_columns() {
        for status in [
            TagStatus::Active,
            TagStatus::Blocked,
            TagStatus::Merged(TagId::new(7)),
        ] {
            let rebuilt =
                TagStatus::from_columns(status.as_str(), status.canonical().map(TagId::get))
                    .unwrap();
            assert_eq!(rebuilt, status);
        }
    }

    #[test]
    fn status_rejects_merged_without_target() {
        assert!(TagStatus::from_columns("merged", None).is_err());
        assert!(TagStatus::from_columns("active", Some(3)).is_err());
        assert!(TagStatus::from_columns("retired", None).is_err());
    }

    #[test]
    fn tag_ref_serializes_as_tagged_variant() {
        let json = serde_json::to_string(&TagRef::ById(TagId::new(4))).unwrap();
        assert_eq!(json, r#"{"by_id":4}"#);
        let parsed: TagRef = serde_json::from_str(r#"{"by_name":"growth"}"#).unwrap();
        assert_eq!(parsed, TagRef::ByName("growth".to_string()));
    }
}
