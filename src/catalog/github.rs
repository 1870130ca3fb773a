//! HTTP-backed `ReleaseCatalog`: lists tags via a hosting provider's tags
//! API and fetches raw file content via its raw-content endpoint. Raw
//! files are cached in-process keyed by `(source, ref, path)` — entries
//! are immutable once written, so the cache never needs invalidation.

use crate::errors::{CoreResult, NotFoundKind, TransportError};
use crate::model::Release;
use crate::ports::ReleaseCatalog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

type CacheKey = (String, String, String);

#[derive(Debug)]
pub struct GitSourceCatalog {
    client: reqwest::Client,
    raw_file_cache: Mutex<HashMap<CacheKey, Vec<u8>>>,
}

impl Default for GitSourceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl GitSourceCatalog {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            raw_file_cache: Mutex::new(HashMap::new()),
        }
    }

    fn tags_api_url(source: &str) -> String {
        format!("{}/tags", source.trim_end_matches('/'))
    }

    fn raw_content_url(source: &str, reference: &str, path: &str) -> String {
        format!("{}/raw/{reference}/{path}", source.trim_end_matches('/'))
    }

    async fn list_all_releases(&self, source: &str) -> CoreResult<Vec<Release>> {
        #[derive(Deserialize)]
        struct TagEntry {
            name: String,
            #[serde(default)]
            created_at: Option<DateTime<Utc>>,
        }

        let response = self
            .client
            .get(Self::tags_api_url(source))
            .send()
            .await
            .map_err(|e| TransportError::new(format!("failed to list tags for {source}: {e}")))?;

        let entries: Vec<TagEntry> = response
            .json()
            .await
            .map_err(|e| TransportError::new(format!("failed to parse tag list for {source}: {e}")))?;

        let mut releases = Vec::with_capacity(entries.len());
        for entry in entries {
            let trimmed = entry.name.trim_start_matches('v');
            let Ok(version) = semver::Version::parse(trimmed) else {
                debug!(source, tag = %entry.name, "catalog.skip_non_semver_tag");
                continue;
            };
            releases.push(Release::new(entry.name, version, entry.created_at.unwrap_or_else(Utc::now)));
        }
        Ok(releases)
    }
}

#[async_trait]
impl ReleaseCatalog for GitSourceCatalog {
    async fn latest_release(&self, source: &str) -> CoreResult<Release> {
        let releases = self.list_all_releases(source).await?;
        super::latest(&releases).ok_or_else(|| {
            NotFoundKind::Release {
                source: source.to_string(),
                tag: "latest".to_string(),
            }
            .into()
        })
    }

    async fn release_by_tag(&self, source: &str, tag: &str) -> CoreResult<Release> {
        let releases = self.list_all_releases(source).await?;
        releases
            .into_iter()
            .find(|r| r.tag == tag)
            .ok_or_else(|| {
                NotFoundKind::Release {
                    source: source.to_string(),
                    tag: tag.to_string(),
                }
                .into()
            })
    }

    async fn releases_between(
        &self,
        source: &str,
        oldest: &semver::Version,
        newest: &semver::Version,
    ) -> CoreResult<Vec<Release>> {
        let releases = self.list_all_releases(source).await?;
        Ok(super::releases_between(&releases, oldest, newest))
    }

    async fn raw_file(&self, source: &str, path: &str, reference: &str) -> CoreResult<Vec<u8>> {
        let key: CacheKey = (source.to_string(), reference.to_string(), path.to_string());
        if let Some(cached) = self.raw_file_cache.lock().await.get(&key) {
            return Ok(cached.clone());
        }

        let response = self
            .client
            .get(Self::raw_content_url(source, reference, path))
            .send()
            .await
            .map_err(|e| TransportError::new(format!("failed to fetch {path}@{reference} from {source}: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(NotFoundKind::File {
                source: source.to_string(),
                reference: reference.to_string(),
                path: path.to_string(),
            }
            .into());
        }
        if !response.status().is_success() {
            return Err(TransportError::new(format!(
                "fetch {path}@{reference} from {source} returned {}",
                response.status()
            ))
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(format!("failed to read body for {path}@{reference}: {e}")))?
            .to_vec();

        self.raw_file_cache.lock().await.insert(key, bytes.clone());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_content_url_joins_ref_and_path() {
        let url = GitSourceCatalog::raw_content_url("https://git.example.com/org/repo", "v1.4.0", "modules/vpc/main.tf");
        assert_eq!(url, "https://git.example.com/org/repo/raw/v1.4.0/modules/vpc/main.tf");
    }
}
