//! Application resolution and lifecycle.

use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::store::PlatformStore;
use crate::types::{App, AppId};

/// Manages application records.
pub struct AppsService {
    store: Arc<dyn PlatformStore>,
    clock: Arc<dyn Clock>,
}

impl AppsService {
    /// Create a new apps service.
    pub fn new(store: Arc<dyn PlatformStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a new application.
    ///
    /// Fails with a validation error if the name is malformed, or a conflict
    /// if the name is already taken.
    pub async fn create(&self, name: &str, repo: Option<&str>) -> EngineResult<App> {
        if !valid_name(name) {
            return Err(EngineError::validation(format!(
                "invalid app name {name:?}: must match [a-z][a-z0-9-]{{2,29}}"
            )));
        }

        let app = App {
            id: AppId::generate(),
            name: name.to_owned(),
            repo: repo.map(ToOwned::to_owned),
            created_at: self.clock.now(),
        };

        self.store.insert_app(&app).await?;
        info!(app = %app.name, "app created");

        Ok(app)
    }

    /// Look up an application by name.
    pub async fn find_by_name(&self, name: &str) -> EngineResult<App> {
        self.store
            .app_by_name(name)
            .await?
            .ok_or_else(|| EngineError::AppNotFound(name.to_owned()))
    }

    /// Resolve the application deploying from a repository, creating it on
    /// first deploy.
    ///
    /// Idempotent: repeated calls with the same repository return the same
    /// application.
    pub async fn find_or_create_by_repo(&self, repo: &str) -> EngineResult<App> {
        if let Some(app) = self.store.app_by_repo(repo).await? {
            return Ok(app);
        }

        let name = name_from_repo(repo);
        match self.create(&name, Some(repo)).await {
            Ok(app) => Ok(app),
            // Another deploy from the same repo created it between the
            // lookup and the insert; a name clash from a different repo
            // stays a conflict.
            Err(EngineError::Conflict(msg)) => match self.store.app_by_repo(repo).await? {
                Some(app) => Ok(app),
                None => Err(EngineError::Conflict(msg)),
            },
            Err(e) => Err(e),
        }
    }

    /// Ensure the application's repository linkage is set to `repo`,
    /// persisting the change when it differs.
    pub async fn ensure_repo(&self, app: &mut App, repo: &str) -> EngineResult<()> {
        if app.repo.as_deref() == Some(repo) {
            return Ok(());
        }

        self.store.update_app_repo(&app.id, repo).await?;
        app.repo = Some(repo.to_owned());

        info!(app = %app.name, repo = %repo, "app repo linkage updated");
        Ok(())
    }
}

impl std::fmt::Debug for AppsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppsService").finish_non_exhaustive()
    }
}

/// Whether a name matches `[a-z][a-z0-9-]{2,29}`.
fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    (3..=30).contains(&name.len())
        && first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Derive an app name from the last path segment of a repository.
fn name_from_repo(repo: &str) -> String {
    let tail = repo.rsplit('/').next().unwrap_or(repo);
    tail.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;

    fn service() -> AppsService {
        AppsService::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    #[test]
    fn name_validation() {
        assert!(valid_name("acme-inc"));
        assert!(valid_name("api2"));
        assert!(!valid_name("ab"));
        assert!(!valid_name("Acme"));
        assert!(!valid_name("1api"));
        assert!(!valid_name("a".repeat(31).as_str()));
        assert!(!valid_name(""));
    }

    #[test]
    fn name_derivation_from_repo() {
        assert_eq!(name_from_repo("acme/api"), "api");
        assert_eq!(name_from_repo("ghcr.io/acme/Api_Server"), "api-server");
        assert_eq!(name_from_repo("standalone"), "standalone");
    }

    #[tokio::test]
    async fn create_rejects_malformed_names() {
        let apps = service();
        let result = apps.create("Not Valid", None).await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let apps = service();

        let first = apps.find_or_create_by_repo("acme/api").await.unwrap();
        let second = apps.find_or_create_by_repo("acme/api").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "api");
        assert_eq!(first.repo.as_deref(), Some("acme/api"));
    }

    #[tokio::test]
    async fn ensure_repo_updates_linkage() {
        let apps = service();
        let mut app = apps.create("acme-inc", None).await.unwrap();

        apps.ensure_repo(&mut app, "acme/api").await.unwrap();
        assert_eq!(app.repo.as_deref(), Some("acme/api"));

        let stored = apps.find_by_name("acme-inc").await.unwrap();
        assert_eq!(stored.repo.as_deref(), Some("acme/api"));

        // Already linked: no-op.
        apps.ensure_repo(&mut app, "acme/api").await.unwrap();
    }

    #[tokio::test]
    async fn find_by_name_not_found() {
        let apps = service();
        let result = apps.find_by_name("ghost").await;
        assert!(matches!(result, Err(EngineError::AppNotFound(_))));
    }
}
