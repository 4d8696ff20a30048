//! Image catalog access.
//!
//! The catalog is a JSON document listing flashable images with their source
//! URLs and expected checksums. It is fetched fresh on every command that
//! needs it; nothing is cached between invocations.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// One obtainable image, as described by the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub version: String,
    pub description: String,
    pub url: String,
    /// Hex-encoded SHA-256 of the image, when the catalog publishes one.
    pub sha256: Option<String>,
}

impl CatalogEntry {
    /// Local file name for this entry: the last path segment of the source
    /// URL, with any query string stripped. Re-downloading the same URL
    /// reuses the same name.
    pub fn file_name(&self) -> Result<&str, CatalogError> {
        let path = self.url.split('?').next().unwrap_or(&self.url);
        path.rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| CatalogError::InvalidImageUrl(self.url.clone()))
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The endpoint could not be reached or answered with a non-success
    /// status.
    #[error("image catalog unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),

    /// The endpoint answered, but the body was not a catalog.
    #[error("image catalog could not be parsed: {0}")]
    Malformed(#[source] serde_json::Error),

    /// No entry matched the user-supplied name or version.
    #[error("no image matching `{0}` in the catalog")]
    ImageNotFound(String),

    /// An entry's source URL has no usable final path segment.
    #[error("image URL `{0}` has no file name")]
    InvalidImageUrl(String),
}

/// Where catalog entries come from.
///
/// Either a remote endpoint or a fixed in-process list satisfies the same
/// contract, so the workflow never hardwires one.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>, CatalogError>;
}

/// Catalog served by a remote HTTP endpoint as a JSON array.
pub struct RemoteCatalog {
    url: String,
    client: reqwest::Client,
}

impl RemoteCatalog {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CatalogSource for RemoteCatalog {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        debug!(url = %self.url, "Fetching image catalog");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(CatalogError::Unavailable)?
            .error_for_status()
            .map_err(CatalogError::Unavailable)?;

        let body = response.text().await.map_err(CatalogError::Unavailable)?;
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(&body).map_err(CatalogError::Malformed)?;

        debug!(entries = entries.len(), "Catalog fetched");
        Ok(entries)
    }
}

/// Fixed in-process catalog. Lets tests and embedders drive the same
/// workflow without a network round trip.
pub struct StaticCatalog {
    entries: Vec<CatalogEntry>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        Ok(self.entries.clone())
    }
}

/// Resolve a user-supplied identifier against fetched entries.
///
/// Matching is exact equality against either the name or the version field.
/// Not fuzzy, not case-insensitive.
pub fn resolve<'a>(
    entries: &'a [CatalogEntry],
    identifier: &str,
) -> Result<&'a CatalogEntry, CatalogError> {
    entries
        .iter()
        .find(|entry| entry.name == identifier || entry.version == identifier)
        .ok_or_else(|| CatalogError::ImageNotFound(identifier.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, version: &str, url: &str) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            url: url.to_string(),
            sha256: None,
        }
    }

    #[test]
    fn resolve_matches_name_or_version() {
        let entries = vec![
            entry("Ubuntu 24.04 LTS", "24.04", "https://example.com/u.iso"),
            entry("Fedora 41", "41", "https://example.com/f.iso"),
        ];

        let by_name = resolve(&entries, "Ubuntu 24.04 LTS").unwrap();
        let by_version = resolve(&entries, "24.04").unwrap();
        assert_eq!(by_name.url, by_version.url);
    }

    #[test]
    fn resolve_is_exact_and_case_sensitive() {
        let entries = vec![entry("Ubuntu 24.04 LTS", "24.04", "https://example.com/u.iso")];

        assert!(matches!(
            resolve(&entries, "ubuntu 24.04 lts"),
            Err(CatalogError::ImageNotFound(_))
        ));
        assert!(matches!(
            resolve(&entries, "Ubuntu"),
            Err(CatalogError::ImageNotFound(_))
        ));
    }

    #[test]
    fn file_name_is_last_url_segment() {
        let e = entry(
            "Ubuntu",
            "24.04",
            "https://releases.ubuntu.com/24.04/ubuntu-24.04-desktop-amd64.iso",
        );
        assert_eq!(e.file_name().unwrap(), "ubuntu-24.04-desktop-amd64.iso");
    }

    #[test]
    fn file_name_strips_query_string() {
        let e = entry(
            "Mirror",
            "1.0",
            "https://mirror.example.com/pub/os-1.0.iso?token=abc123",
        );
        assert_eq!(e.file_name().unwrap(), "os-1.0.iso");
    }

    #[test]
    fn file_name_rejects_trailing_slash() {
        let e = entry("Bad", "0", "https://example.com/images/");
        assert!(matches!(
            e.file_name(),
            Err(CatalogError::InvalidImageUrl(_))
        ));
    }

    #[tokio::test]
    async fn static_catalog_returns_fixed_entries() {
        let catalog = StaticCatalog::new(vec![entry("A", "1", "https://example.com/a.iso")]);
        let entries = catalog.fetch().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "A");
    }
}
