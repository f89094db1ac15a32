// FilterSpec Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Hex-encoded SHA-256 of a filter's canonical serialization
pub type FilterHash = String;

/// Predicates selecting which annotated conversations go into an export.
///
/// Collections are ordered (`BTreeSet` / `BTreeMap`) so the JSON form is
/// canonical: two specs selecting the same records serialize to the same bytes
/// regardless of the order the caller listed them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Inclusive lower bound on conversation time (epoch ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<i64>,

    /// Inclusive upper bound on conversation time (epoch ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<i64>,

    #[serde(default)]
    pub folder_ids: BTreeSet<String>,

    #[serde(default)]
    pub session_ids: BTreeSet<String>,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Minimum annotation rating (1-5)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<u8>,

    #[serde(default)]
    pub annotated_only: bool,

    #[serde(default)]
    pub include_flagged: bool,

    /// Predicates this core does not interpret; forwarded to the exporter
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FilterSpec {
    /// Check the predicates are well-formed
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(DomainError::InvalidFilter(format!(
                    "date_from ({}) is after date_to ({})",
                    from, to
                )));
            }
        }

        if let Some(rating) = self.min_rating {
            if !(1..=5).contains(&rating) {
                return Err(DomainError::InvalidFilter(format!(
                    "min_rating {} out of range (1-5)",
                    rating
                )));
            }
        }

        let ids = self
            .folder_ids
            .iter()
            .chain(self.session_ids.iter())
            .chain(self.tags.iter());
        for id in ids {
            if id.trim().is_empty() {
                return Err(DomainError::InvalidFilter(
                    "folder, session and tag identifiers must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Canonical JSON serialization used for hashing and storage
    pub fn canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Stable content hash of this filter (deduplication fingerprint)
    pub fn filter_hash(&self) -> serde_json::Result<FilterHash> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}
