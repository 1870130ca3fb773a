//! # Data Model
//!
//! Plain, `serde`-derived types shared by every component: the resolved
//! configuration, the persisted state document, upstream releases and the
//! change summary parsed out of plan logs.

mod config;
mod release;
mod state;

pub use config::{ApprovePolicy, Config, Module, Source, Step, StepType, Vpc};
pub use release::Release;
pub use state::{ModuleState, PipelineChangeSummary, State, StepState};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Thin wrapper around `semver::Version` so config/state fields carry real
/// ordering instead of opaque strings, while still (de)serializing as the
/// bare version string users write in YAML (`v1.4.0`, `1.4.0`, `stable`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleVersion {
    /// Resolves to the latest release of the first source at tick start.
    Stable,
    Exact(semver::Version),
}

impl ModuleVersion {
    pub fn parse(raw: &str) -> Result<Self, semver::Error> {
        if raw.trim().eq_ignore_ascii_case("stable") {
            return Ok(ModuleVersion::Stable);
        }
        let trimmed = raw.trim().trim_start_matches('v');
        semver::Version::parse(trimmed).map(ModuleVersion::Exact)
    }

    pub fn as_exact(&self) -> Option<&semver::Version> {
        match self {
            ModuleVersion::Exact(v) => Some(v),
            ModuleVersion::Stable => None,
        }
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleVersion::Stable => write!(f, "stable"),
            ModuleVersion::Exact(v) => write!(f, "v{v}"),
        }
    }
}

impl PartialOrd for ModuleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (ModuleVersion::Exact(a), ModuleVersion::Exact(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl Serialize for ModuleVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ModuleVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ModuleVersion::parse(&raw).map_err(serde::de::Error::custom)
    }
}
