//! Scheduler collaborator.
//!
//! The engine hands releases and scale changes to the cluster scheduler
//! through the [`Scheduler`] trait. The production implementation is the
//! HTTP [`SchedulerClient`]; a recording mock ships for tests.

mod client;

pub use client::SchedulerClient;

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::types::Formation;

/// Instructions handed to the scheduler when a release becomes current.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleRequest {
    /// Application name.
    pub app: String,
    /// Release version being applied.
    pub release: i64,
    /// Process-type name to command mapping from the release's slug.
    pub process_types: BTreeMap<String, String>,
    /// Desired scale per process type.
    pub formation: Formation,
}

/// Places and supervises an application's processes on the cluster.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Converge the cluster to a release and its formation.
    async fn apply(&self, request: &ScheduleRequest) -> EngineResult<()>;

    /// Converge one process type of the current release to a new count.
    async fn apply_scale(
        &self,
        app: &str,
        release: i64,
        process_type: &str,
        count: u32,
    ) -> EngineResult<()>;
}

/// A recorded scale call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleCall {
    /// Application name.
    pub app: String,
    /// Release version targeted.
    pub release: i64,
    /// Process type scaled.
    pub process_type: String,
    /// Requested count.
    pub count: u32,
}

/// Mock scheduler for testing.
///
/// Records every call and can be armed to reject.
#[derive(Debug, Default)]
pub struct MockScheduler {
    applied: Mutex<Vec<ScheduleRequest>>,
    scaled: Mutex<Vec<ScaleCall>>,
    fail_with: Mutex<Option<String>>,
}

impl MockScheduler {
    /// Create a new mock scheduler that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the scheduler to reject every call with the given message.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock().expect("lock poisoned") = Some(message.into());
    }

    /// Clear an armed failure.
    pub fn accept(&self) {
        *self.fail_with.lock().expect("lock poisoned") = None;
    }

    /// The release applications seen so far.
    #[must_use]
    pub fn applied(&self) -> Vec<ScheduleRequest> {
        self.applied.lock().expect("lock poisoned").clone()
    }

    /// The scale calls seen so far.
    #[must_use]
    pub fn scaled(&self) -> Vec<ScaleCall> {
        self.scaled.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Scheduler for MockScheduler {
    async fn apply(&self, request: &ScheduleRequest) -> EngineResult<()> {
        if let Some(message) = self.fail_with.lock().expect("lock poisoned").clone() {
            return Err(EngineError::scheduler(message));
        }

        self.applied
            .lock()
            .expect("lock poisoned")
            .push(request.clone());
        Ok(())
    }

    async fn apply_scale(
        &self,
        app: &str,
        release: i64,
        process_type: &str,
        count: u32,
    ) -> EngineResult<()> {
        if let Some(message) = self.fail_with.lock().expect("lock poisoned").clone() {
            return Err(EngineError::scheduler(message));
        }

        self.scaled.lock().expect("lock poisoned").push(ScaleCall {
            app: app.to_owned(),
            release,
            process_type: process_type.to_owned(),
            count,
        });
        Ok(())
    }
}
