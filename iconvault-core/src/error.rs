//! Service-boundary error taxonomy
//!
//! Callers of the sync coordinator see exactly these kinds. The first three
//! are rejected preconditions (nothing was written anywhere); `Catalog` means
//! the first store step failed (nothing to undo); `Sync` means the tree step
//! failed and the catalog write was rolled back (safe to retry); `Diverged`
//! means the rollback itself failed and the two stores no longer agree.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::pathmap::MappingError;
use crate::tree::TreeError;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed name, descriptor or tag, rejected before any store write.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A precondition read found no such icon/iconfile.
    #[error("{0}")]
    NotFound(String),

    /// The icon or descriptor already exists.
    #[error("{0}")]
    AlreadyExists(String),

    /// First-step failure against the catalog; no side effects to undo.
    #[error("catalog step failed: {0}")]
    Catalog(#[source] CatalogError),

    /// Second-step failure against the tree; the catalog write was
    /// compensated. The net effect is a rollback and the caller may retry.
    #[error("tree step failed ({cause}); rolled back: {compensation}")]
    Sync {
        #[source]
        cause: TreeError,
        /// What the compensation reversed.
        compensation: String,
    },

    /// Compensation failed after a mid-saga failure: the stores disagree
    /// about this icon. Fatal; requires an operator-triggered audit, never
    /// auto-retried.
    #[error(
        "stores diverged for icon \"{icon_name}\": {cause}, \
         then compensation failed ({compensation_failure})"
    )]
    Diverged {
        icon_name: String,
        cause: String,
        #[source]
        compensation_failure: CatalogError,
    },
}

impl From<MappingError> for ServiceError {
    fn from(err: MappingError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl ServiceError {
    /// Whether a retry of the same call can possibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Sync { .. } | ServiceError::Catalog(_))
    }

    /// Log divergence as a system-integrity event, distinct from ordinary
    /// request failures.
    pub fn log_if_integrity_critical(&self) {
        if let ServiceError::Diverged { icon_name, .. } = self {
            tracing::error!(
                target: "integrity",
                icon = %icon_name,
                "STORE DIVERGENCE: {self}"
            );
        }
    }
}

/// Precondition-aware mapping of catalog failures: missing rows and
/// duplicates become their service-level kinds, everything else is a
/// first-step catalog failure.
impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::IconNotFound(_) | CatalogError::IconfileNotFound { .. } => {
                ServiceError::NotFound(err.to_string())
            }
            CatalogError::IconAlreadyExists(_) | CatalogError::IconfileAlreadyExists { .. } => {
                ServiceError::AlreadyExists(err.to_string())
            }
            other => ServiceError::Catalog(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IconfileDescriptor;

    #[test]
    fn catalog_preconditions_map_to_service_kinds() {
        let err: ServiceError = CatalogError::IconNotFound("home".into()).into();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err: ServiceError = CatalogError::IconfileAlreadyExists {
            icon_name: "home".into(),
            descriptor: IconfileDescriptor::new("svg", "24px"),
        }
        .into();
        assert!(matches!(err, ServiceError::AlreadyExists(_)));

        let err: ServiceError = CatalogError::Backend("disk full".into()).into();
        assert!(matches!(err, ServiceError::Catalog(_)));
    }

    #[test]
    fn only_rolled_back_failures_are_retryable() {
        let sync = ServiceError::Sync {
            cause: TreeError::Timeout,
            compensation: "deleted icon row".into(),
        };
        assert!(sync.is_retryable());

        let diverged = ServiceError::Diverged {
            icon_name: "home".into(),
            cause: TreeError::Timeout.to_string(),
            compensation_failure: CatalogError::Timeout,
        };
        assert!(!diverged.is_retryable());
    }
}
