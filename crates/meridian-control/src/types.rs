//! Core types for meridian-control.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Default size class for newly created formation entries.
pub const DEFAULT_PROCESS_SIZE: &str = "1X";

/// Unique identifier for an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    /// Create an app ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique app ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AppId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for a config version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(String);

impl ConfigId {
    /// Create a config ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique config ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ConfigId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for a slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlugId(String);

impl SlugId {
    /// Create a slug ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique slug ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlugId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SlugId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for a release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseId(String);

impl ReleaseId {
    /// Create a release ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique release ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ReleaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Source repository (may include a registry prefix).
    pub repo: String,
    /// Image tag.
    pub tag: String,
}

impl Image {
    /// Create an image reference from repository and tag.
    #[must_use]
    pub fn new(repo: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo, self.tag)
    }
}

impl FromStr for Image {
    type Err = EngineError;

    /// Parse `repo[:tag]`, defaulting the tag to `latest`.
    ///
    /// A colon inside the last path segment separates the tag; a colon in a
    /// registry host (`registry:5000/app`) does not.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.starts_with(':') {
            return Err(EngineError::validation(format!(
                "invalid image reference: {s:?}"
            )));
        }

        match s.rsplit_once(':') {
            Some((_, tag)) if tag.is_empty() => Err(EngineError::validation(format!(
                "image tag is empty: {s:?}"
            ))),
            Some((repo, tag)) if !tag.contains('/') => Ok(Self::new(repo, tag)),
            _ => Ok(Self::new(s, "latest")),
        }
    }
}

/// An application registered with the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    /// Unique application identifier.
    pub id: AppId,
    /// Application name (unique across the platform).
    pub name: String,
    /// Source repository this app deploys from, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// When the application was created.
    pub created_at: DateTime<Utc>,
}

/// An immutable, versioned environment-variable set for one application.
///
/// Configs are never edited in place; `set`/`unset` append a new version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Unique config identifier.
    pub id: ConfigId,
    /// Application this config belongs to.
    pub app_id: AppId,
    /// Version number, starting at 1 for the empty baseline.
    pub version: i64,
    /// Environment variable mapping.
    pub vars: BTreeMap<String, String>,
    /// When this config version was created.
    pub created_at: DateTime<Utc>,
}

/// An immutable build artifact derived from a container image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slug {
    /// Unique slug identifier.
    pub id: SlugId,
    /// The processed image reference this slug was built from.
    pub image: Image,
    /// Process-type name to command mapping declared by the artifact.
    pub process_types: BTreeMap<String, String>,
    /// When the slug was built.
    pub created_at: DateTime<Utc>,
}

impl Slug {
    /// Create a new slug record for a built image.
    #[must_use]
    pub fn new(image: Image, process_types: BTreeMap<String, String>, now: DateTime<Utc>) -> Self {
        Self {
            id: SlugId::generate(),
            image,
            process_types,
            created_at: now,
        }
    }
}

/// Release status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    /// Release created, scheduler handoff not yet resolved.
    Pending,
    /// Scheduler rejected the release or the handoff failed.
    Failed,
    /// Scheduler accepted the release.
    Success,
}

impl ReleaseStatus {
    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Success => "success",
        }
    }

    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Success)
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReleaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            "success" => Ok(Self::Success),
            _ => Err(format!("unknown release status: {s}")),
        }
    }
}

/// An immutable release record.
///
/// Versions per application are strictly increasing from 1 with no gaps.
/// A release transitions its status at most once from pending to a terminal
/// state and is never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// Unique release identifier.
    pub id: ReleaseId,
    /// Application this release belongs to.
    pub app_id: AppId,
    /// Version number within the application.
    pub version: i64,
    /// Config captured by this release.
    pub config_id: ConfigId,
    /// Slug captured by this release.
    pub slug_id: SlugId,
    /// Human-readable description (`Deploy <image>` or `Rollback to v<N>`).
    pub description: String,
    /// Current status.
    pub status: ReleaseStatus,
    /// When the release was created.
    pub created_at: DateTime<Utc>,
}

/// Desired scale for one process type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessScale {
    /// Desired instance count.
    pub count: u32,
    /// Size class (e.g. `1X`).
    pub size: String,
}

impl ProcessScale {
    /// Create a scale entry with the default size class.
    #[must_use]
    pub fn with_default_size(count: u32) -> Self {
        Self {
            count,
            size: DEFAULT_PROCESS_SIZE.to_owned(),
        }
    }
}

/// The per-application process scale table.
///
/// Mutated in place by scaling operations; not versioned. Keys are a subset
/// of the process types declared by the current release's slug.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Formation {
    processes: BTreeMap<String, ProcessScale>,
}

impl Formation {
    /// Create an empty formation.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            processes: BTreeMap::new(),
        }
    }

    /// Look up the scale for a process type.
    #[must_use]
    pub fn get(&self, process_type: &str) -> Option<&ProcessScale> {
        self.processes.get(process_type)
    }

    /// Set the scale for a process type.
    pub fn set(&mut self, process_type: impl Into<String>, scale: ProcessScale) {
        self.processes.insert(process_type.into(), scale);
    }

    /// Whether no process type has been scaled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Iterate over process types and their scales.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProcessScale)> {
        self.processes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_parse_with_tag() {
        let image: Image = "acme/api:v1.2".parse().unwrap();
        assert_eq!(image.repo, "acme/api");
        assert_eq!(image.tag, "v1.2");
        assert_eq!(image.to_string(), "acme/api:v1.2");
    }

    #[test]
    fn image_parse_defaults_to_latest() {
        let image: Image = "acme/api".parse().unwrap();
        assert_eq!(image.repo, "acme/api");
        assert_eq!(image.tag, "latest");
    }

    #[test]
    fn image_parse_registry_port_is_not_a_tag() {
        let image: Image = "registry:5000/acme/api".parse().unwrap();
        assert_eq!(image.repo, "registry:5000/acme/api");
        assert_eq!(image.tag, "latest");

        let image: Image = "registry:5000/acme/api:sha".parse().unwrap();
        assert_eq!(image.repo, "registry:5000/acme/api");
        assert_eq!(image.tag, "sha");
    }

    #[test]
    fn image_parse_rejects_malformed() {
        assert!("".parse::<Image>().is_err());
        assert!(":tag".parse::<Image>().is_err());
        assert!("repo:".parse::<Image>().is_err());
    }

    #[test]
    fn release_status_round_trip() {
        for status in [
            ReleaseStatus::Pending,
            ReleaseStatus::Failed,
            ReleaseStatus::Success,
        ] {
            let parsed: ReleaseStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("running".parse::<ReleaseStatus>().is_err());
    }

    #[test]
    fn release_status_terminal() {
        assert!(!ReleaseStatus::Pending.is_terminal());
        assert!(ReleaseStatus::Failed.is_terminal());
        assert!(ReleaseStatus::Success.is_terminal());
    }

    #[test]
    fn formation_set_and_get() {
        let mut formation = Formation::new();
        assert!(formation.is_empty());

        formation.set("web", ProcessScale::with_default_size(2));
        assert_eq!(formation.get("web").map(|s| s.count), Some(2));
        assert_eq!(
            formation.get("web").map(|s| s.size.as_str()),
            Some(DEFAULT_PROCESS_SIZE)
        );
        assert!(formation.get("worker").is_none());
    }

    #[test]
    fn ids_generate_unique_values() {
        assert_ne!(AppId::generate(), AppId::generate());
        assert_ne!(ReleaseId::generate(), ReleaseId::generate());
    }
}
