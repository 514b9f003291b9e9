//! Config versioning.
//!
//! Configs are append-only: `apply` never edits an existing version, it
//! creates the next one. The current config is always the highest version.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::store::PlatformStore;
use crate::types::{App, Config, ConfigId};

/// Manages an application's environment-variable versions.
pub struct ConfigsService {
    store: Arc<dyn PlatformStore>,
    clock: Arc<dyn Clock>,
}

impl ConfigsService {
    /// Create a new configs service.
    pub fn new(store: Arc<dyn PlatformStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The application's current config.
    ///
    /// An app that has never had config set gets an empty baseline (version
    /// 1), persisted so releases always reference a stored config.
    pub async fn current(&self, app: &App) -> EngineResult<Config> {
        if let Some(config) = self.store.current_config(&app.id).await? {
            return Ok(config);
        }

        let baseline = Config {
            id: ConfigId::generate(),
            app_id: app.id.clone(),
            version: 1,
            vars: BTreeMap::new(),
            created_at: self.clock.now(),
        };

        match self.store.insert_config(&baseline).await {
            Ok(()) => {
                debug!(app = %app.name, "empty baseline config created");
                Ok(baseline)
            }
            // Another operation initialised the baseline concurrently.
            Err(EngineError::Conflict(_)) => self
                .store
                .current_config(&app.id)
                .await?
                .ok_or_else(|| EngineError::ConfigNotFound(app.name.clone())),
            Err(e) => Err(e),
        }
    }

    /// Look up a config by ID, erroring if absent.
    pub async fn find(&self, id: &ConfigId) -> EngineResult<Config> {
        self.store
            .config_by_id(id)
            .await?
            .ok_or_else(|| EngineError::ConfigNotFound(id.to_string()))
    }

    /// Append a new config version with `sets` written and `unsets` removed.
    ///
    /// Returns the new current config. Prior versions are untouched.
    pub async fn apply(
        &self,
        app: &App,
        sets: &BTreeMap<String, String>,
        unsets: &[String],
    ) -> EngineResult<Config> {
        for name in sets.keys().map(String::as_str).chain(unsets.iter().map(String::as_str)) {
            if !valid_var_name(name) {
                return Err(EngineError::validation(format!(
                    "invalid config variable name: {name:?}"
                )));
            }
        }

        loop {
            let current = self.current(app).await?;

            let mut vars = current.vars;
            for (name, value) in sets {
                vars.insert(name.clone(), value.clone());
            }
            for name in unsets {
                vars.remove(name);
            }

            let next = Config {
                id: ConfigId::generate(),
                app_id: app.id.clone(),
                version: current.version + 1,
                vars,
                created_at: self.clock.now(),
            };

            match self.store.insert_config(&next).await {
                Ok(()) => {
                    info!(app = %app.name, version = next.version, "config updated");
                    return Ok(next);
                }
                // Lost the version race; recompute from the new current.
                Err(EngineError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for ConfigsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigsService").finish_non_exhaustive()
    }
}

/// Whether a string is usable as an environment variable name.
fn valid_var_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('=') && !name.contains('\0')
}
