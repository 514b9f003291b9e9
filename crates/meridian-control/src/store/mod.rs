//! Durable storage for apps, configs, slugs, releases and formations.
//!
//! This module provides the trait consumed by the orchestration services and
//! two implementations: PostgreSQL for production and an in-memory store for
//! testing.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{
    App, AppId, Config, ConfigId, Formation, Release, ReleaseId, ReleaseStatus, Slug, SlugId,
};

/// Backend for the platform's durable records.
///
/// "Not found" is a distinguished outcome (`Ok(None)`), never an error.
/// Implementations must enforce uniqueness of `(app, version)` for releases
/// and configs, surfacing violations as [`EngineError::Conflict`] so the
/// ledger can retry.
///
/// [`EngineError::Conflict`]: crate::error::EngineError::Conflict
#[async_trait]
pub trait PlatformStore: Send + Sync {
    /// Insert a new application.
    ///
    /// Fails with a conflict if the name is already taken.
    async fn insert_app(&self, app: &App) -> EngineResult<()>;

    /// Look up an application by name.
    async fn app_by_name(&self, name: &str) -> EngineResult<Option<App>>;

    /// Look up an application by its source repository.
    async fn app_by_repo(&self, repo: &str) -> EngineResult<Option<App>>;

    /// Update an application's repository linkage.
    async fn update_app_repo(&self, id: &AppId, repo: &str) -> EngineResult<()>;

    /// Append a new config version.
    ///
    /// Fails with a conflict if `(app, version)` already exists.
    async fn insert_config(&self, config: &Config) -> EngineResult<()>;

    /// The most recently created config for an application, if any.
    async fn current_config(&self, app: &AppId) -> EngineResult<Option<Config>>;

    /// Look up a config by ID.
    async fn config_by_id(&self, id: &ConfigId) -> EngineResult<Option<Config>>;

    /// Insert a new slug.
    async fn insert_slug(&self, slug: &Slug) -> EngineResult<()>;

    /// Look up a slug by ID.
    async fn slug_by_id(&self, id: &SlugId) -> EngineResult<Option<Slug>>;

    /// Insert a new release.
    ///
    /// Fails with a conflict if `(app, version)` already exists.
    async fn insert_release(&self, release: &Release) -> EngineResult<()>;

    /// Look up a release by application and version.
    async fn release_by_version(&self, app: &AppId, version: i64)
        -> EngineResult<Option<Release>>;

    /// All releases for an application, ordered by ascending version.
    async fn releases(&self, app: &AppId) -> EngineResult<Vec<Release>>;

    /// The highest release version for an application, or 0 if none.
    async fn max_release_version(&self, app: &AppId) -> EngineResult<i64>;

    /// Update a release's status.
    async fn update_release_status(
        &self,
        id: &ReleaseId,
        status: ReleaseStatus,
    ) -> EngineResult<()>;

    /// The formation for an application (empty if never scaled).
    async fn formation(&self, app: &AppId) -> EngineResult<Formation>;

    /// Replace the formation for an application.
    async fn save_formation(&self, app: &AppId, formation: &Formation) -> EngineResult<()>;
}
