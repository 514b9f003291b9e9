//! Release ledger: version assignment, persistence and scheduler handoff.
//!
//! Version numbers per application are strictly increasing from 1 with no
//! gaps. Assignment is serialised per application: an in-process keyed mutex
//! is held across "read highest version, insert", and the store's
//! UNIQUE(app, version) guard catches writers in other processes, in which
//! case the ledger retries with a recomputed version.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::scheduler::{ScheduleRequest, Scheduler};
use crate::store::PlatformStore;
use crate::types::{
    App, AppId, Config, Formation, ProcessScale, Release, ReleaseId, ReleaseStatus, Slug,
};

/// Owns the immutable release sequence per application.
pub struct ReleaseLedger {
    store: Arc<dyn PlatformStore>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    app_locks: DashMap<AppId, Arc<Mutex<()>>>,
}

impl ReleaseLedger {
    /// Create a new release ledger.
    pub fn new(
        store: Arc<dyn PlatformStore>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            scheduler,
            clock,
            app_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, app: &AppId) -> Arc<Mutex<()>> {
        self.app_locks
            .entry(app.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Mint the next release for an application and hand it to the scheduler.
    ///
    /// The release is inserted as `pending`, then resolved to `success` on
    /// scheduler acceptance or `failed` on rejection, transport failure or
    /// cancellation. A failed release is retained for audit and its error is
    /// surfaced to the caller. Cancellation before the insert leaves no
    /// record at all.
    pub async fn create(
        &self,
        app: &App,
        config: &Config,
        slug: &Slug,
        description: impl Into<String>,
        cancel: &CancellationToken,
    ) -> EngineResult<Release> {
        let description = description.into();

        if cancel.is_cancelled() {
            return Err(EngineError::Canceled("release creation"));
        }

        let mut release = {
            let lock = self.lock_for(&app.id);
            let _guard = lock.lock().await;

            loop {
                let version = self.store.max_release_version(&app.id).await? + 1;

                let release = Release {
                    id: ReleaseId::generate(),
                    app_id: app.id.clone(),
                    version,
                    config_id: config.id.clone(),
                    slug_id: slug.id.clone(),
                    description: description.clone(),
                    status: ReleaseStatus::Pending,
                    created_at: self.clock.now(),
                };

                match self.store.insert_release(&release).await {
                    Ok(()) => break release,
                    Err(EngineError::Conflict(_)) => {
                        // A writer in another process took this version.
                        debug!(app = %app.name, version, "release version conflict, retrying");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        info!(
            app = %app.name,
            version = release.version,
            description = %release.description,
            "release created"
        );

        match self.hand_off(app, slug, &release, cancel).await {
            Ok(()) => {
                self.store
                    .update_release_status(&release.id, ReleaseStatus::Success)
                    .await?;
                release.status = ReleaseStatus::Success;

                info!(app = %app.name, version = release.version, "release succeeded");
                Ok(release)
            }
            Err(e) => {
                error!(
                    app = %app.name,
                    version = release.version,
                    error = %e,
                    "release failed"
                );
                self.store
                    .update_release_status(&release.id, ReleaseStatus::Failed)
                    .await?;
                Err(e)
            }
        }
    }

    async fn hand_off(
        &self,
        app: &App,
        slug: &Slug,
        release: &Release,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        let formation = self.ensure_formation(app, slug).await?;

        if cancel.is_cancelled() {
            return Err(EngineError::Canceled("scheduler handoff"));
        }

        let request = ScheduleRequest {
            app: app.name.clone(),
            release: release.version,
            process_types: slug.process_types.clone(),
            formation,
        };

        self.scheduler.apply(&request).await
    }

    /// Create a default single-instance `web` entry when an app is deployed
    /// for the first time and its slug declares one.
    async fn ensure_formation(&self, app: &App, slug: &Slug) -> EngineResult<Formation> {
        let mut formation = self.store.formation(&app.id).await?;

        if formation.is_empty() {
            if slug.process_types.contains_key("web") {
                formation.set("web", ProcessScale::with_default_size(1));
                self.store.save_formation(&app.id, &formation).await?;
                info!(app = %app.name, "default web formation created");
            } else {
                warn!(app = %app.name, "slug declares no web process; formation left empty");
            }
        }

        Ok(formation)
    }

    /// Look up the release at a specific version, erroring if absent.
    pub async fn find(&self, app: &App, version: i64) -> EngineResult<Release> {
        self.store
            .release_by_version(&app.id, version)
            .await?
            .ok_or_else(|| EngineError::ReleaseNotFound {
                app: app.name.clone(),
                version,
            })
    }

    /// All releases for an application, ordered by ascending version.
    pub async fn list(&self, app: &App) -> EngineResult<Vec<Release>> {
        self.store.releases(&app.id).await
    }
}

impl std::fmt::Debug for ReleaseLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseLedger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::clock::SystemClock;
    use crate::scheduler::MockScheduler;
    use crate::store::MemoryStore;
    use crate::types::{AppId, ConfigId, Image};

    struct Harness {
        ledger: ReleaseLedger,
        store: Arc<MemoryStore>,
        scheduler: Arc<MockScheduler>,
        app: App,
        config: Config,
        slug: Slug,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(MockScheduler::new());

        let ledger = ReleaseLedger::new(
            Arc::clone(&store) as Arc<dyn PlatformStore>,
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            Arc::new(SystemClock),
        );

        let app = App {
            id: AppId::generate(),
            name: "acme-inc".to_owned(),
            repo: Some("acme/api".to_owned()),
            created_at: Utc::now(),
        };
        store.insert_app(&app).await.unwrap();

        let config = Config {
            id: ConfigId::generate(),
            app_id: app.id.clone(),
            version: 1,
            vars: BTreeMap::new(),
            created_at: Utc::now(),
        };
        store.insert_config(&config).await.unwrap();

        let slug = Slug::new(
            Image::new("acme/api", "v1"),
            BTreeMap::from([
                ("web".to_owned(), "./bin/web".to_owned()),
                ("worker".to_owned(), "./bin/worker".to_owned()),
            ]),
            Utc::now(),
        );
        store.insert_slug(&slug).await.unwrap();

        Harness {
            ledger,
            store,
            scheduler,
            app,
            config,
            slug,
        }
    }

    #[tokio::test]
    async fn versions_start_at_one_and_increment() {
        let h = harness().await;

        let first = h
            .ledger
            .create(
                &h.app,
                &h.config,
                &h.slug,
                "Deploy acme/api:v1",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.status, ReleaseStatus::Success);

        let second = h
            .ledger
            .create(
                &h.app,
                &h.config,
                &h.slug,
                "Deploy acme/api:v2",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(second.version, 2);
    }

    #[tokio::test]
    async fn first_release_creates_default_web_formation() {
        let h = harness().await;

        h.ledger
            .create(
                &h.app,
                &h.config,
                &h.slug,
                "Deploy acme/api:v1",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let formation = h.store.formation(&h.app.id).await.unwrap();
        let web = formation.get("web").expect("no web entry");
        assert_eq!(web.count, 1);
        assert_eq!(web.size, crate::types::DEFAULT_PROCESS_SIZE);
        // Only web is defaulted, even though the slug declares a worker.
        assert!(formation.get("worker").is_none());
    }

    #[tokio::test]
    async fn handoff_carries_formation_and_processes() {
        let h = harness().await;

        h.ledger
            .create(
                &h.app,
                &h.config,
                &h.slug,
                "Deploy acme/api:v1",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let applied = h.scheduler.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].app, "acme-inc");
        assert_eq!(applied[0].release, 1);
        assert!(applied[0].process_types.contains_key("worker"));
        assert_eq!(applied[0].formation.get("web").map(|s| s.count), Some(1));
    }

    #[tokio::test]
    async fn scheduler_rejection_retains_failed_release() {
        let h = harness().await;
        h.scheduler.fail_with("no capacity");

        let result = h
            .ledger
            .create(
                &h.app,
                &h.config,
                &h.slug,
                "Deploy acme/api:v1",
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(EngineError::Scheduler(_))));

        let releases = h.store.releases(&h.app.id).await.unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].status, ReleaseStatus::Failed);

        // A failed version is still consumed; the next release moves past it.
        h.scheduler.accept();
        let next = h
            .ledger
            .create(
                &h.app,
                &h.config,
                &h.slug,
                "Deploy acme/api:v1",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(next.version, 2);
    }

    #[tokio::test]
    async fn cancellation_before_insert_leaves_no_release() {
        let h = harness().await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = h
            .ledger
            .create(&h.app, &h.config, &h.slug, "Deploy acme/api:v1", &cancel)
            .await;

        assert!(matches!(result, Err(EngineError::Canceled(_))));
        assert!(h.store.releases(&h.app.id).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_creates_assign_distinct_versions() {
        let h = Arc::new(harness().await);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let h = Arc::clone(&h);
                tokio::spawn(async move {
                    h.ledger
                        .create(
                            &h.app,
                            &h.config,
                            &h.slug,
                            "Deploy acme/api:v1",
                            &CancellationToken::new(),
                        )
                        .await
                })
            })
            .collect();

        let mut versions = Vec::new();
        for task in tasks {
            versions.push(task.await.expect("task").expect("create").version);
        }

        versions.sort_unstable();
        assert_eq!(versions, (1..=8).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn find_missing_version_is_not_found() {
        let h = harness().await;
        let result = h.ledger.find(&h.app, 7).await;
        assert!(matches!(
            result,
            Err(EngineError::ReleaseNotFound { version: 7, .. })
        ));
    }
}
