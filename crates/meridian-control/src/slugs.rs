//! Slug building and persistence.
//!
//! The actual container build runs behind the [`SlugBuilder`] trait; this
//! engine only drives it and records the resulting artifact.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::event::{DeployEvent, EventSink};
use crate::store::PlatformStore;
use crate::types::{Image, Slug, SlugId};

/// Turns a container image into an immutable build artifact.
///
/// Implementations stream zero or more progress events to the sink, then
/// return exactly one terminal result. A build must honour cancellation and
/// be safe to retry at the caller's discretion.
#[async_trait]
pub trait SlugBuilder: Send + Sync {
    /// Build a slug from an image.
    async fn build(
        &self,
        image: &Image,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> EngineResult<Slug>;
}

/// Drives the builder and persists what it produces.
pub struct SlugsService {
    store: Arc<dyn PlatformStore>,
    builder: Arc<dyn SlugBuilder>,
}

impl SlugsService {
    /// Create a new slugs service.
    pub fn new(store: Arc<dyn PlatformStore>, builder: Arc<dyn SlugBuilder>) -> Self {
        Self { store, builder }
    }

    /// Build a slug for an image and persist it.
    pub async fn create_by_image(
        &self,
        image: &Image,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> EngineResult<Slug> {
        events.send(DeployEvent::BuildStarted {
            image: image.to_string(),
        });

        let slug = self.builder.build(image, events, cancel).await?;
        self.store.insert_slug(&slug).await?;

        info!(image = %image, slug_id = %slug.id, "slug built");
        Ok(slug)
    }

    /// Look up a slug by ID, erroring if absent.
    pub async fn find(&self, id: &SlugId) -> EngineResult<Slug> {
        self.store
            .slug_by_id(id)
            .await?
            .ok_or_else(|| EngineError::SlugNotFound(id.to_string()))
    }
}

impl std::fmt::Debug for SlugsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlugsService").finish_non_exhaustive()
    }
}

/// Mock builder for testing and local wiring.
///
/// Yields a fixed process-type table and can be armed to fail.
#[derive(Debug)]
pub struct MockBuilder {
    process_types: BTreeMap<String, String>,
    fail_with: RwLock<Option<String>>,
}

impl MockBuilder {
    /// Create a mock builder declaring the given process types.
    #[must_use]
    pub fn new<I, K, V>(process_types: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            process_types: process_types
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            fail_with: RwLock::new(None),
        }
    }

    /// A builder declaring a single `web` process.
    #[must_use]
    pub fn web() -> Self {
        Self::new([("web", "./bin/web")])
    }

    /// Arm the builder to fail every build with the given message.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.write().expect("lock poisoned") = Some(message.into());
    }

    /// Clear an armed failure.
    pub fn succeed(&self) {
        *self.fail_with.write().expect("lock poisoned") = None;
    }
}

#[async_trait]
impl SlugBuilder for MockBuilder {
    async fn build(
        &self,
        image: &Image,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> EngineResult<Slug> {
        if cancel.is_cancelled() {
            return Err(EngineError::Canceled("image build"));
        }

        events.send(DeployEvent::BuildOutput {
            line: format!("pulling {image}"),
        });

        if let Some(message) = self.fail_with.read().expect("lock poisoned").clone() {
            return Err(EngineError::build(message));
        }

        events.send(DeployEvent::BuildOutput {
            line: format!("extracting process types from {image}"),
        });

        Ok(Slug::new(
            image.clone(),
            self.process_types.clone(),
            Utc::now(),
        ))
    }
}
