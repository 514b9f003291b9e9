//! Deploy and rollback orchestration.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::apps::AppsService;
use crate::configs::ConfigsService;
use crate::error::{EngineError, EngineResult};
use crate::event::{DeployEvent, EventSink};
use crate::releases::ReleaseLedger;
use crate::slugs::SlugsService;
use crate::types::{App, Image, Release};

/// Orchestrates deploy operations end-to-end, with rollback as a
/// specialisation that reuses a historical release's inputs.
///
/// Collaborators are constructor-injected; the deployer owns no state of its
/// own and every durable effect happens through them.
pub struct Deployer {
    apps: Arc<AppsService>,
    configs: Arc<ConfigsService>,
    slugs: Arc<SlugsService>,
    ledger: Arc<ReleaseLedger>,
}

impl Deployer {
    /// Create a new deployer.
    pub fn new(
        apps: Arc<AppsService>,
        configs: Arc<ConfigsService>,
        slugs: Arc<SlugsService>,
        ledger: Arc<ReleaseLedger>,
    ) -> Self {
        Self {
            apps,
            configs,
            slugs,
            ledger,
        }
    }

    /// Deploy an image, resolving the target application from the image's
    /// repository (creating it on first deploy).
    pub async fn deploy_image(
        &self,
        image: &Image,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> EngineResult<Release> {
        let mut app = self.apps.find_or_create_by_repo(&image.repo).await?;
        self.deploy_image_to_app(&mut app, image, events, cancel)
            .await
    }

    /// Deploy an image to a specific application.
    ///
    /// Fetches the current config, builds a slug from the image (streaming
    /// build progress to `events`), then mints a release. Any failure
    /// short-circuits with the underlying error and leaves no release
    /// behind; a scheduler failure leaves the release in `failed` status.
    pub async fn deploy_image_to_app(
        &self,
        app: &mut App,
        image: &Image,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> EngineResult<Release> {
        self.apps.ensure_repo(app, &image.repo).await?;

        info!(app = %app.name, image = %image, "deploy started");
        events.send(DeployEvent::Started {
            app: app.name.clone(),
            image: image.to_string(),
        });

        let result = self.run_deploy(app, image, events, cancel).await;

        match &result {
            Ok(release) => {
                info!(
                    app = %app.name,
                    version = release.version,
                    "deploy finished"
                );
                events.send(DeployEvent::Finished {
                    version: release.version,
                    status: release.status,
                });
            }
            Err(e) => {
                error!(app = %app.name, image = %image, error = %e, "deploy failed");
            }
        }

        result
    }

    async fn run_deploy(
        &self,
        app: &App,
        image: &Image,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> EngineResult<Release> {
        let config = self.configs.current(app).await?;

        if cancel.is_cancelled() {
            return Err(EngineError::Canceled("image build"));
        }

        let slug = self.slugs.create_by_image(image, events, cancel).await?;
        events.send(DeployEvent::BuildCompleted {
            slug_id: slug.id.clone(),
        });

        let release = self
            .ledger
            .create(app, &config, &slug, format!("Deploy {image}"), cancel)
            .await?;

        events.send(DeployEvent::ReleaseCreated {
            version: release.version,
        });

        Ok(release)
    }

    /// Re-apply a historical release's config and slug as a new version.
    ///
    /// No image build runs; this is a metadata-level re-application. Fails
    /// with a not-found error if `version` does not exist.
    pub async fn rollback(&self, app: &App, version: i64) -> EngineResult<Release> {
        let target = self.ledger.find(app, version).await?;
        let config = self.configs.find(&target.config_id).await?;
        let slug = self.slugs.find(&target.slug_id).await?;

        info!(app = %app.name, target = version, "rollback started");

        self.ledger
            .create(
                app,
                &config,
                &slug,
                format!("Rollback to v{version}"),
                &CancellationToken::new(),
            )
            .await
    }
}

impl std::fmt::Debug for Deployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer").finish_non_exhaustive()
    }
}
