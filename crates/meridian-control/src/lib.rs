//! Meridian Deployment Engine
//!
//! This crate is the deployment and release orchestration core of the
//! Meridian platform. It turns a container image into a running, versioned
//! application release and manages the application's configuration, release
//! history and process scaling over time.
//!
//! # Architecture
//!
//! The engine composes narrow, constructor-injected collaborators:
//!
//! - **[`Deployer`]**: orchestrates one deploy end-to-end and exposes
//!   rollback as a metadata-level re-application of historical inputs
//! - **[`ReleaseLedger`]**: assigns gap-free, strictly increasing version
//!   numbers per application and drives the scheduler handoff
//! - **[`ConfigsService`]**: append-only environment-variable versioning
//! - **[`FormationsService`]**: per-process-type scale changes against the
//!   current release, without minting a new one
//! - **[`SlugBuilder`]**: the external build system, behind a trait
//! - **[`Scheduler`]**: the external cluster scheduler, behind a trait
//!
//! # Release lifecycle
//!
//! ```text
//! pending ──▶ success
//!    │
//!    ▼
//!  failed
//! ```
//!
//! A release transitions its status at most once. Failed releases are
//! retained for audit; they still consume a version number.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use meridian_control::{
//!     AppsService, ConfigsService, Deployer, EventSink, MemoryStore, MockBuilder,
//!     MockScheduler, ReleaseLedger, SlugsService, SystemClock,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(MemoryStore::new());
//! let clock = Arc::new(SystemClock);
//! let scheduler = Arc::new(MockScheduler::new());
//! let builder = Arc::new(MockBuilder::web());
//!
//! let deployer = Deployer::new(
//!     Arc::new(AppsService::new(store.clone(), clock.clone())),
//!     Arc::new(ConfigsService::new(store.clone(), clock.clone())),
//!     Arc::new(SlugsService::new(store.clone(), builder)),
//!     Arc::new(ReleaseLedger::new(store, scheduler, clock)),
//! );
//!
//! let (events, _rx) = EventSink::channel(256);
//! let release = deployer
//!     .deploy_image(&"acme/api:v1".parse()?, &events, &CancellationToken::new())
//!     .await?;
//! assert_eq!(release.version, 1);
//! ```

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod apps;
pub mod clock;
pub mod config;
pub mod configs;
pub mod deployer;
pub mod error;
pub mod event;
pub mod formations;
pub mod releases;
pub mod scheduler;
pub mod slugs;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root
pub use apps::AppsService;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{DatabaseConfig, DeploymentConfig, EngineConfig, SchedulerConfig};
pub use configs::ConfigsService;
pub use deployer::Deployer;
pub use error::{EngineError, EngineResult};
pub use event::{DeployEvent, EventSink};
pub use formations::FormationsService;
pub use releases::ReleaseLedger;
pub use scheduler::{MockScheduler, ScheduleRequest, Scheduler, SchedulerClient};
pub use slugs::{MockBuilder, SlugBuilder, SlugsService};
pub use store::{MemoryStore, PlatformStore, PostgresStore};
pub use types::{
    App, AppId, Config, ConfigId, Formation, Image, ProcessScale, Release, ReleaseId,
    ReleaseStatus, Slug, SlugId, DEFAULT_PROCESS_SIZE,
};
