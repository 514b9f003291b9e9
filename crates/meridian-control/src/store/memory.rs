//! In-memory platform store for testing.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};
use crate::types::{
    App, AppId, Config, ConfigId, Formation, Release, ReleaseId, ReleaseStatus, Slug, SlugId,
};

use super::PlatformStore;

/// In-memory platform store for testing.
///
/// Data is lost when the process exits; not suitable for production.
#[derive(Debug, Default)]
pub struct MemoryStore {
    apps: RwLock<HashMap<String, App>>,
    configs: RwLock<HashMap<String, Config>>,
    slugs: RwLock<HashMap<String, Slug>>,
    releases: RwLock<HashMap<String, Release>>,
    formations: RwLock<HashMap<String, Formation>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> EngineError {
    EngineError::internal("lock poisoned")
}

#[async_trait]
impl PlatformStore for MemoryStore {
    async fn insert_app(&self, app: &App) -> EngineResult<()> {
        let mut apps = self.apps.write().map_err(|_| poisoned())?;

        if apps.values().any(|a| a.name == app.name) {
            return Err(EngineError::conflict(format!(
                "app name already taken: {}",
                app.name
            )));
        }

        apps.insert(app.id.as_str().to_owned(), app.clone());
        Ok(())
    }

    async fn app_by_name(&self, name: &str) -> EngineResult<Option<App>> {
        let apps = self.apps.read().map_err(|_| poisoned())?;
        Ok(apps.values().find(|a| a.name == name).cloned())
    }

    async fn app_by_repo(&self, repo: &str) -> EngineResult<Option<App>> {
        let apps = self.apps.read().map_err(|_| poisoned())?;
        Ok(apps
            .values()
            .find(|a| a.repo.as_deref() == Some(repo))
            .cloned())
    }

    async fn update_app_repo(&self, id: &AppId, repo: &str) -> EngineResult<()> {
        let mut apps = self.apps.write().map_err(|_| poisoned())?;

        let app = apps
            .get_mut(id.as_str())
            .ok_or_else(|| EngineError::AppNotFound(id.to_string()))?;

        app.repo = Some(repo.to_owned());
        Ok(())
    }

    async fn insert_config(&self, config: &Config) -> EngineResult<()> {
        let mut configs = self.configs.write().map_err(|_| poisoned())?;

        if configs
            .values()
            .any(|c| c.app_id == config.app_id && c.version == config.version)
        {
            return Err(EngineError::conflict(format!(
                "config v{} already exists for app {}",
                config.version, config.app_id
            )));
        }

        configs.insert(config.id.as_str().to_owned(), config.clone());
        Ok(())
    }

    async fn current_config(&self, app: &AppId) -> EngineResult<Option<Config>> {
        let configs = self.configs.read().map_err(|_| poisoned())?;
        Ok(configs
            .values()
            .filter(|c| &c.app_id == app)
            .max_by_key(|c| c.version)
            .cloned())
    }

    async fn config_by_id(&self, id: &ConfigId) -> EngineResult<Option<Config>> {
        let configs = self.configs.read().map_err(|_| poisoned())?;
        Ok(configs.get(id.as_str()).cloned())
    }

    async fn insert_slug(&self, slug: &Slug) -> EngineResult<()> {
        let mut slugs = self.slugs.write().map_err(|_| poisoned())?;
        slugs.insert(slug.id.as_str().to_owned(), slug.clone());
        Ok(())
    }

    async fn slug_by_id(&self, id: &SlugId) -> EngineResult<Option<Slug>> {
        let slugs = self.slugs.read().map_err(|_| poisoned())?;
        Ok(slugs.get(id.as_str()).cloned())
    }

    async fn insert_release(&self, release: &Release) -> EngineResult<()> {
        let mut releases = self.releases.write().map_err(|_| poisoned())?;

        if releases
            .values()
            .any(|r| r.app_id == release.app_id && r.version == release.version)
        {
            return Err(EngineError::conflict(format!(
                "release v{} already exists for app {}",
                release.version, release.app_id
            )));
        }

        releases.insert(release.id.as_str().to_owned(), release.clone());
        Ok(())
    }

    async fn release_by_version(
        &self,
        app: &AppId,
        version: i64,
    ) -> EngineResult<Option<Release>> {
        let releases = self.releases.read().map_err(|_| poisoned())?;
        Ok(releases
            .values()
            .find(|r| &r.app_id == app && r.version == version)
            .cloned())
    }

    async fn releases(&self, app: &AppId) -> EngineResult<Vec<Release>> {
        let releases = self.releases.read().map_err(|_| poisoned())?;

        let mut results: Vec<_> = releases
            .values()
            .filter(|r| &r.app_id == app)
            .cloned()
            .collect();

        results.sort_by_key(|r| r.version);
        Ok(results)
    }

    async fn max_release_version(&self, app: &AppId) -> EngineResult<i64> {
        let releases = self.releases.read().map_err(|_| poisoned())?;
        Ok(releases
            .values()
            .filter(|r| &r.app_id == app)
            .map(|r| r.version)
            .max()
            .unwrap_or(0))
    }

    async fn update_release_status(
        &self,
        id: &ReleaseId,
        status: ReleaseStatus,
    ) -> EngineResult<()> {
        let mut releases = self.releases.write().map_err(|_| poisoned())?;

        let release = releases.get_mut(id.as_str()).ok_or_else(|| {
            EngineError::internal(format!("release {id} missing during status update"))
        })?;

        release.status = status;
        Ok(())
    }

    async fn formation(&self, app: &AppId) -> EngineResult<Formation> {
        let formations = self.formations.read().map_err(|_| poisoned())?;
        Ok(formations.get(app.as_str()).cloned().unwrap_or_default())
    }

    async fn save_formation(&self, app: &AppId, formation: &Formation) -> EngineResult<()> {
        let mut formations = self.formations.write().map_err(|_| poisoned())?;
        formations.insert(app.as_str().to_owned(), formation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::types::{Image, ProcessScale};

    fn test_app(name: &str) -> App {
        App {
            id: AppId::generate(),
            name: name.to_owned(),
            repo: Some(format!("acme/{name}")),
            created_at: Utc::now(),
        }
    }

    fn test_config(app: &App, version: i64) -> Config {
        Config {
            id: ConfigId::generate(),
            app_id: app.id.clone(),
            version,
            vars: BTreeMap::from([("RAILS_ENV".to_owned(), "production".to_owned())]),
            created_at: Utc::now(),
        }
    }

    fn test_release(app: &App, version: i64) -> Release {
        Release {
            id: ReleaseId::generate(),
            app_id: app.id.clone(),
            version,
            config_id: ConfigId::generate(),
            slug_id: SlugId::generate(),
            description: format!("Deploy acme/{}:v{version}", app.name),
            status: ReleaseStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn app_lookup_by_name_and_repo() {
        let store = MemoryStore::new();
        let app = test_app("api");

        store.insert_app(&app).await.expect("insert failed");

        let by_name = store.app_by_name("api").await.unwrap().expect("not found");
        assert_eq!(by_name.id, app.id);

        let by_repo = store
            .app_by_repo("acme/api")
            .await
            .unwrap()
            .expect("not found");
        assert_eq!(by_repo.id, app.id);

        assert!(store.app_by_name("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_app_name_conflicts() {
        let store = MemoryStore::new();
        store.insert_app(&test_app("api")).await.unwrap();

        let result = store.insert_app(&test_app("api")).await;
        assert!(matches!(result, Err(EngineError::Conflict(_))));
    }

    #[tokio::test]
    async fn update_app_repo() {
        let store = MemoryStore::new();
        let app = test_app("api");
        store.insert_app(&app).await.unwrap();

        store.update_app_repo(&app.id, "acme/api-v2").await.unwrap();

        let updated = store.app_by_name("api").await.unwrap().unwrap();
        assert_eq!(updated.repo.as_deref(), Some("acme/api-v2"));
    }

    #[tokio::test]
    async fn current_config_is_highest_version() {
        let store = MemoryStore::new();
        let app = test_app("api");

        store.insert_config(&test_config(&app, 1)).await.unwrap();
        let v2 = test_config(&app, 2);
        store.insert_config(&v2).await.unwrap();

        let current = store
            .current_config(&app.id)
            .await
            .unwrap()
            .expect("no config");
        assert_eq!(current.id, v2.id);
        assert_eq!(current.version, 2);
    }

    #[tokio::test]
    async fn duplicate_config_version_conflicts() {
        let store = MemoryStore::new();
        let app = test_app("api");

        store.insert_config(&test_config(&app, 1)).await.unwrap();
        let result = store.insert_config(&test_config(&app, 1)).await;
        assert!(matches!(result, Err(EngineError::Conflict(_))));
    }

    #[tokio::test]
    async fn duplicate_release_version_conflicts() {
        let store = MemoryStore::new();
        let app = test_app("api");

        store.insert_release(&test_release(&app, 1)).await.unwrap();
        let result = store.insert_release(&test_release(&app, 1)).await;
        assert!(matches!(result, Err(EngineError::Conflict(_))));
    }

    #[tokio::test]
    async fn releases_are_version_ordered() {
        let store = MemoryStore::new();
        let app = test_app("api");

        for version in [3, 1, 2] {
            store
                .insert_release(&test_release(&app, version))
                .await
                .unwrap();
        }

        let releases = store.releases(&app.id).await.unwrap();
        let versions: Vec<_> = releases.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(store.max_release_version(&app.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn max_version_is_zero_without_releases() {
        let store = MemoryStore::new();
        let app = test_app("api");
        assert_eq!(store.max_release_version(&app.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn release_status_update() {
        let store = MemoryStore::new();
        let app = test_app("api");
        let release = test_release(&app, 1);

        store.insert_release(&release).await.unwrap();
        store
            .update_release_status(&release.id, ReleaseStatus::Success)
            .await
            .unwrap();

        let stored = store
            .release_by_version(&app.id, 1)
            .await
            .unwrap()
            .expect("not found");
        assert_eq!(stored.status, ReleaseStatus::Success);
    }

    #[tokio::test]
    async fn formation_round_trip() {
        let store = MemoryStore::new();
        let app = test_app("api");

        let empty = store.formation(&app.id).await.unwrap();
        assert!(empty.is_empty());

        let mut formation = Formation::new();
        formation.set("web", ProcessScale::with_default_size(2));
        store.save_formation(&app.id, &formation).await.unwrap();

        let stored = store.formation(&app.id).await.unwrap();
        assert_eq!(stored.get("web").map(|s| s.count), Some(2));
    }

    #[tokio::test]
    async fn slug_round_trip() {
        let store = MemoryStore::new();
        let slug = Slug::new(
            Image::new("acme/api", "v1"),
            BTreeMap::from([("web".to_owned(), "./bin/web".to_owned())]),
            Utc::now(),
        );

        store.insert_slug(&slug).await.unwrap();

        let stored = store
            .slug_by_id(&slug.id)
            .await
            .unwrap()
            .expect("not found");
        assert_eq!(stored.image, slug.image);
        assert_eq!(stored.process_types, slug.process_types);
    }
}
