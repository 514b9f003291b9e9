//! Error types for meridian-control.

/// Result type alias using [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the orchestration engine.
///
/// Variants are the contract with the compatibility layer: callers match on
/// the variant to pick a wire-level error, never on the message text.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Caller input violates an invariant.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Application not found.
    #[error("app not found: {0}")]
    AppNotFound(String),

    /// Release not found for an application/version pair.
    #[error("release not found: {app} v{version}")]
    ReleaseNotFound {
        /// Application name.
        app: String,
        /// Requested release version.
        version: i64,
    },

    /// Config not found.
    #[error("config not found: {0}")]
    ConfigNotFound(String),

    /// Slug not found.
    #[error("slug not found: {0}")]
    SlugNotFound(String),

    /// Slug build failed.
    #[error("build failed: {0}")]
    Build(String),

    /// Scheduler rejected or failed to apply a release/scale.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Version assignment raced with another writer.
    ///
    /// Retried inside the release ledger; never escapes under normal
    /// operation.
    #[error("version conflict: {0}")]
    Conflict(String),

    /// Operation was cancelled before completion.
    #[error("cancelled during {0}")]
    Canceled(&'static str),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a build error.
    #[must_use]
    pub fn build(msg: impl Into<String>) -> Self {
        Self::Build(msg.into())
    }

    /// Create a scheduler error.
    #[must_use]
    pub fn scheduler(msg: impl Into<String>) -> Self {
        Self::Scheduler(msg.into())
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is one of the not-found kinds.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AppNotFound(_)
                | Self::ReleaseNotFound { .. }
                | Self::ConfigNotFound(_)
                | Self::SlugNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_kinds() {
        assert!(EngineError::AppNotFound("acme".to_owned()).is_not_found());
        assert!(EngineError::ReleaseNotFound {
            app: "acme".to_owned(),
            version: 2
        }
        .is_not_found());
        assert!(!EngineError::validation("bad input").is_not_found());
        assert!(!EngineError::scheduler("refused").is_not_found());
    }

    #[test]
    fn messages_carry_context() {
        let err = EngineError::ReleaseNotFound {
            app: "acme".to_owned(),
            version: 4,
        };
        assert_eq!(err.to_string(), "release not found: acme v4");

        let err = EngineError::Canceled("image build");
        assert_eq!(err.to_string(), "cancelled during image build");
    }
}
