//! # Release Catalog
//!
//! Lists/sorts/retrieves upstream releases and raw files at a tag.
//! `GitSourceCatalog` is the concrete, HTTP-backed implementation;
//! `releases_between` and the `stable` sentinel are plain functions over
//! `[Release]` so the Version Resolver can use them without going through
//! a trait object.

mod github;

pub use github::GitSourceCatalog;

use crate::model::Release;

/// Inclusive, ascending, bounded to `[oldest, newest]` by semver
/// regardless of what publication dates would otherwise include.
pub fn releases_between<'a>(
    releases: impl IntoIterator<Item = &'a Release>,
    oldest: &semver::Version,
    newest: &semver::Version,
) -> Vec<Release> {
    let mut matched: Vec<Release> = releases
        .into_iter()
        .filter(|r| &r.version >= oldest && &r.version <= newest)
        .cloned()
        .collect();
    matched.sort_by(|a, b| a.version.cmp(&b.version));
    matched
}

/// The latest release by publication date, with semver as the tie-break.
pub fn latest<'a>(releases: impl IntoIterator<Item = &'a Release>) -> Option<Release> {
    releases.into_iter().max().cloned()
}
