//! Formation scaling.
//!
//! Scaling changes the process scale table and converges the cluster against
//! the current release. It never mints a new release.

use std::sync::Arc;

use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::scheduler::Scheduler;
use crate::store::PlatformStore;
use crate::types::{App, Formation, ProcessScale, DEFAULT_PROCESS_SIZE};

/// Manages per-application process scale tables.
pub struct FormationsService {
    store: Arc<dyn PlatformStore>,
    scheduler: Arc<dyn Scheduler>,
}

impl FormationsService {
    /// Create a new formations service.
    pub fn new(store: Arc<dyn PlatformStore>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { store, scheduler }
    }

    /// The application's current formation.
    pub async fn current(&self, app: &App) -> EngineResult<Formation> {
        self.store.formation(&app.id).await
    }

    /// Set the desired instance count for a process type.
    ///
    /// The process type must be declared by the current release's slug.
    /// Returns the full updated formation.
    pub async fn scale(
        &self,
        app: &App,
        process_type: &str,
        count: u32,
    ) -> EngineResult<Formation> {
        let version = self.store.max_release_version(&app.id).await?;
        if version == 0 {
            return Err(EngineError::validation(format!(
                "cannot scale {}: no release exists yet",
                app.name
            )));
        }

        let release = self
            .store
            .release_by_version(&app.id, version)
            .await?
            .ok_or_else(|| EngineError::ReleaseNotFound {
                app: app.name.clone(),
                version,
            })?;

        let slug = self
            .store
            .slug_by_id(&release.slug_id)
            .await?
            .ok_or_else(|| EngineError::SlugNotFound(release.slug_id.to_string()))?;

        if !slug.process_types.contains_key(process_type) {
            return Err(EngineError::validation(format!(
                "unknown process type {process_type:?}; current release declares: {}",
                slug.process_types
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        let mut formation = self.store.formation(&app.id).await?;
        let size = formation.get(process_type).map_or_else(
            || DEFAULT_PROCESS_SIZE.to_owned(),
            |existing| existing.size.clone(),
        );
        formation.set(process_type, ProcessScale { count, size });

        self.store.save_formation(&app.id, &formation).await?;

        self.scheduler
            .apply_scale(&app.name, release.version, process_type, count)
            .await?;

        info!(
            app = %app.name,
            process_type = %process_type,
            count,
            "formation scaled"
        );

        Ok(formation)
    }
}

impl std::fmt::Debug for FormationsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormationsService").finish_non_exhaustive()
    }
}
