//! Error types for zone orchestration
//!
//! ## Table of Contents
//! - **ZoneError**: Main error enum covering all failure modes
//! - **Result**: Type alias for `Result<T, ZoneError>`

use thiserror::Error;

/// Result type alias for zone operations
pub type Result<T> = std::result::Result<T, ZoneError>;

/// Main error type for zone operations
#[derive(Error, Debug)]
pub enum ZoneError {
    /// Attempted zone operation on a protected region
    #[error("protection violation: region '{0}' is protected")]
    ProtectionViolation(String),

    /// Region is not part of the configured set
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    /// Duplicate in-flight operation or duplicate coordinator spawn
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// A collaborator was not available at call time
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// The catalog failed to create a required resource instance
    #[error("failed to create {resource_type}/{subtype} resource instance: {reason}")]
    CreationFailure {
        /// Requested resource type
        resource_type: String,
        /// Requested resource subtype
        subtype: String,
        /// Underlying reason
        reason: String,
    },

    /// Coordinator queried before initialization completed
    #[error("zone coordinator for '{0}' is not ready")]
    NotReady(String),

    /// Work dropped because its coordinator was torn down
    #[error("work for region '{0}' abandoned after teardown")]
    Abandoned(String),

    /// Harvest node id is not tracked by the coordinator
    #[error("unknown harvest node: {0}")]
    UnknownNode(String),

    /// Region content failed to load or unload
    #[error("content error for region '{region}': {reason}")]
    ContentLoad {
        /// Region name
        region: String,
        /// Underlying reason
        reason: String,
    },

    /// Resource catalog backend failure
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Metrics collection or export failure
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML config parse error
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Internal error (should not occur in normal operation)
    #[error("internal error: {0}")]
    Internal(String),
}

impl ZoneError {
    /// Create a concurrency conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(msg.into())
    }

    /// Create a dependency unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::DependencyUnavailable(msg.into())
    }

    /// Create a creation failure error
    pub fn creation(
        resource_type: impl Into<String>,
        subtype: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::CreationFailure {
            resource_type: resource_type.into(),
            subtype: subtype.into(),
            reason: reason.into(),
        }
    }

    /// Create a content load error
    pub fn content(region: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContentLoad {
            region: region.into(),
            reason: reason.into(),
        }
    }

    /// Create a catalog error
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a metrics error
    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }

    /// Short machine-readable label, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProtectionViolation(_) => "protection_violation",
            Self::UnknownRegion(_) => "unknown_region",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::DependencyUnavailable(_) => "dependency_unavailable",
            Self::CreationFailure { .. } => "creation_failure",
            Self::NotReady(_) => "not_ready",
            Self::Abandoned(_) => "abandoned",
            Self::UnknownNode(_) => "unknown_node",
            Self::ContentLoad { .. } => "content_load",
            Self::Catalog(_) => "catalog",
            Self::Config(_) => "config",
            Self::Metrics(_) => "metrics",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Toml(_) => "toml",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the caller may continue operating after this error.
    ///
    /// Every `ZoneError` is recovered locally. The only fatal path is the
    /// core region watchdog, which terminates through [`crate::lifecycle::FailFast`]
    /// and never surfaces as an error value.
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

impl From<prometheus::Error> for ZoneError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ZoneError::ProtectionViolation("Core".to_string());
        assert_eq!(err.to_string(), "protection violation: region 'Core' is protected");

        let err = ZoneError::creation("Stone", "Ithoria", "no template");
        assert_eq!(
            err.to_string(),
            "failed to create Stone/Ithoria resource instance: no template"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(ZoneError::conflict("dup").kind(), "concurrency_conflict");
        assert_eq!(ZoneError::UnknownRegion("X".into()).kind(), "unknown_region");
        assert!(ZoneError::unavailable("catalog").is_recoverable());
    }
}
