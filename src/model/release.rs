//! A single tagged release of an upstream source repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single tagged release of a source repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub tag: String,
    pub version: semver::Version,
    pub published_at: DateTime<Utc>,
}

impl Release {
    pub fn new(tag: impl Into<String>, version: semver::Version, published_at: DateTime<Utc>) -> Self {
        Self {
            tag: tag.into(),
            version,
            published_at,
        }
    }
}

impl PartialEq for Release {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}
impl Eq for Release {}

impl PartialOrd for Release {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Release {
    /// Published date decides first; ties are broken by semver.
    fn cmp(&self, other: &Self) -> Ordering {
        self.published_at
            .cmp(&other.published_at)
            .then_with(|| self.version.cmp(&other.version))
    }
}
