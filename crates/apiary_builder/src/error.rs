//! Registration and construction errors.

use apiary_runtime::{GroupVersionKind, GroupVersionResource, SchemeError};
use apiary_storage::StorageError;
use apiary_storage::rest::Capability;
use core::fmt;

/// A registration that can never be served as declared.
///
/// Collected by the [`ResourceRegistry`](crate::registry::ResourceRegistry)
/// and returned from `finalize()`, or produced by a provider on first use
/// when the mismatch is only visible once the parent storage exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A subresource was registered before its parent resource.
    #[error("subresource {path:?} registered before parent {parent}")]
    ParentNotRegistered {
        /// The missing parent.
        parent: GroupVersionResource,
        /// The subresource path.
        path: String,
    },

    /// A non-storage version declares no conversion to the storage version.
    #[error("{resource} is not the storage version and declares no conversion to it")]
    MissingConverter {
        /// The offending version.
        resource: GroupVersionResource,
    },

    /// The parent storage lacks a capability the subresource shape requires.
    #[error("subresource {resource} requires {capability} on its parent storage")]
    MissingParentCapability {
        /// The subresource.
        resource: GroupVersionResource,
        /// The missing capability.
        capability: Capability,
    },

    /// A status subresource over a parent that is not a generic store.
    #[error("subresource {resource} requires its parent storage to be a generic store")]
    ParentNotStore {
        /// The subresource.
        resource: GroupVersionResource,
    },

    /// The stored kind does not declare what the subresource needs.
    #[error("subresource {resource} requires kind {kind} to declare {declaration}")]
    MissingObjectCapability {
        /// The subresource.
        resource: GroupVersionResource,
        /// The stored kind.
        kind: &'static str,
        /// `status` or `scale`.
        declaration: &'static str,
    },

    /// The same route was registered twice.
    #[error("route {resource} is registered twice")]
    DuplicateRoute {
        /// The route.
        resource: GroupVersionResource,
    },

    /// A registration supplied its own storage for a resource that already
    /// has storage from another version.
    #[error("{resource} already has storage from another version, the {variant} would be ignored")]
    ProviderConflict {
        /// The offending version.
        resource: GroupVersionResource,
        /// The registration variant.
        variant: &'static str,
    },

    /// A version converts to another kind than the shared storage holds.
    #[error("{resource} stores {found}, but its shared storage holds {expected}")]
    StorageKindMismatch {
        /// The offending version.
        resource: GroupVersionResource,
        /// Kind of the shared storage.
        expected: GroupVersionKind,
        /// Kind the version converts to.
        found: GroupVersionKind,
    },

    /// A subresource path is empty or nested.
    #[error("invalid subresource path {path:?} for {parent}")]
    InvalidSubresourcePath {
        /// The parent resource.
        parent: GroupVersionResource,
        /// The rejected path.
        path: String,
    },

    /// A custom strategy or handler was supplied for `status` or `scale`.
    #[error("subresource {path:?} of {parent} is served by its built-in adapter")]
    ReservedSubresource {
        /// The parent resource.
        parent: GroupVersionResource,
        /// The reserved path.
        path: String,
    },

    /// The type registry refused a registration.
    #[error(transparent)]
    Scheme(#[from] SchemeError),
}

/// Error produced by a storage provider.
///
/// `Clone`, so a [`SingletonProvider`](crate::provider::SingletonProvider)
/// can hand the same failure to every caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The registration can never be served.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The persistence engine could not be reached.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// No route is registered for the resource.
    #[error("no route for {0}")]
    UnknownRoute(GroupVersionResource),
}

impl From<SchemeError> for RegistryError {
    fn from(error: SchemeError) -> Self {
        Self::Config(ConfigError::Scheme(error))
    }
}

/// Every error of a failed `finalize()` or `prepare()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError {
    errors: Vec<RegistryError>,
}

impl AggregateError {
    /// Wraps a non-empty list of errors.
    #[must_use]
    pub fn new(errors: Vec<RegistryError>) -> Self {
        Self { errors }
    }

    /// The collected errors, in the order they occurred.
    #[must_use]
    pub fn errors(&self) -> &[RegistryError] {
        &self.errors
    }

    /// Number of collected errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the collected errors.
    #[must_use]
    pub fn into_errors(self) -> Vec<RegistryError> {
        self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [single] => write!(f, "1 error: {single}"),
            errors => {
                write!(f, "{} errors: ", errors.len())?;
                for error in errors {
                    write!(f, "\n{error}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for AggregateError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn flunders() -> GroupVersionResource {
        GroupVersionResource::new("wardle.example.com", "v1alpha1", "flunders")
    }

    #[test]
    fn messages_name_resource_and_capability() {
        let err = ConfigError::MissingParentCapability {
            resource: flunders().with_subresource("status"),
            capability: Capability::Standard,
        };
        let message = err.to_string();
        assert!(message.contains("flunders/status"));
        assert!(message.contains("get, list, create, update and delete"));

        let err = ConfigError::ParentNotRegistered {
            parent: flunders(),
            path: "scale".into(),
        };
        assert!(err.to_string().contains("before parent"));
    }

    #[test]
    fn aggregate_lists_every_error() {
        let one = AggregateError::new(vec![
            ConfigError::MissingConverter { resource: flunders() }.into(),
        ]);
        assert!(one.to_string().starts_with("1 error: "));

        let two = AggregateError::new(vec![
            ConfigError::MissingConverter { resource: flunders() }.into(),
            ConfigError::DuplicateRoute { resource: flunders() }.into(),
        ]);
        let message = two.to_string();
        assert!(message.starts_with("2 errors: "));
        assert_eq!(message.lines().count(), 3);
        assert_eq!(two.len(), 2);
    }
}
