//! Error types for storage handles and persistence backends.

use apiary_runtime::GroupResource;
use core::fmt;

/// A validation failure on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the field, e.g. `spec.replicas`.
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors returned by storage calls, each mapping to an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The object does not exist.
    #[error("{resource} \"{name}\" not found")]
    NotFound {
        /// Resource the lookup ran against.
        resource: GroupResource,
        /// Object name.
        name: String,
    },

    /// An object with the same name exists.
    #[error("{resource} \"{name}\" already exists")]
    AlreadyExists {
        /// Resource the create ran against.
        resource: GroupResource,
        /// Object name.
        name: String,
    },

    /// The object was modified since it was read.
    #[error("operation cannot be fulfilled on {resource} \"{name}\": {message}")]
    Conflict {
        /// Resource the write ran against.
        resource: GroupResource,
        /// Object name.
        name: String,
        /// Reason for the conflict.
        message: String,
    },

    /// The request is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The object failed validation.
    #[error("{kind} \"{name}\" is invalid: {}", join_fields(.errors))]
    Invalid {
        /// Kind of the rejected object.
        kind: String,
        /// Name of the rejected object.
        name: String,
        /// Every field that failed.
        errors: Vec<FieldError>,
    },

    /// The handle does not support the verb.
    #[error("{verb} is not supported on resource {resource}")]
    MethodNotSupported {
        /// Resource the request was routed to.
        resource: String,
        /// The rejected verb.
        verb: String,
    },

    /// The request context was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// The storage handle could not be constructed.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Creates a [`ApiError::NotFound`].
    #[must_use]
    pub fn not_found(resource: &GroupResource, name: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.clone(),
            name: name.into(),
        }
    }

    /// Creates a [`ApiError::AlreadyExists`].
    #[must_use]
    pub fn already_exists(resource: &GroupResource, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.clone(),
            name: name.into(),
        }
    }

    /// Creates a [`ApiError::Conflict`].
    #[must_use]
    pub fn conflict(
        resource: &GroupResource,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            resource: resource.clone(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a [`ApiError::Invalid`].
    #[must_use]
    pub fn invalid(kind: impl Into<String>, name: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self::Invalid {
            kind: kind.into(),
            name: name.into(),
            errors,
        }
    }

    /// Creates a [`ApiError::MethodNotSupported`].
    #[must_use]
    pub fn method_not_supported(resource: impl Into<String>, verb: impl Into<String>) -> Self {
        Self::MethodNotSupported {
            resource: resource.into(),
            verb: verb.into(),
        }
    }

    /// HTTP status code of the error.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::AlreadyExists { .. } | Self::Conflict { .. } => 409,
            Self::BadRequest(_) => 400,
            Self::Invalid { .. } => 422,
            Self::MethodNotSupported { .. } => 405,
            Self::Cancelled => 499,
            Self::ServiceUnavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Machine-readable reason, as carried in a status response.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::Conflict { .. } => "Conflict",
            Self::BadRequest(_) => "BadRequest",
            Self::Invalid { .. } => "Invalid",
            Self::MethodNotSupported { .. } => "MethodNotAllowed",
            Self::Cancelled => "Cancelled",
            Self::ServiceUnavailable(_) => "ServiceUnavailable",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Returns `true` for [`ApiError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`ApiError::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Serializes the error as a status document.
    #[must_use]
    pub fn to_status(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": "Status",
            "status": "Failure",
            "message": self.to_string(),
            "reason": self.reason(),
            "code": self.code(),
        })
    }
}

/// Errors raised while constructing a storage handle.
///
/// `Clone` so a failed construction can be handed to every caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The options for the resource are unusable.
    #[error("invalid storage options for {resource}: {message}")]
    InvalidOptions {
        /// Resource being constructed.
        resource: GroupResource,
        /// What is wrong.
        message: String,
    },

    /// The persistence engine cannot be reached.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// Filesystem failure while opening the backend.
    #[error("storage i/o error at {path}: {message}")]
    Io {
        /// Path that failed.
        path: String,
        /// The OS error message.
        message: String,
    },
}

/// Errors reported by a persistence [`Backend`](crate::backend::Backend).
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No value under the key.
    #[error("key {0} not found")]
    NotFound(String),

    /// A value already exists under the key.
    #[error("key {0} already exists")]
    AlreadyExists(String),

    /// The stored version is not the expected one.
    #[error("key {key} is at version {actual}, expected {expected}")]
    VersionConflict {
        /// Contested key.
        key: String,
        /// Version the caller expected.
        expected: u64,
        /// Version actually stored.
        actual: u64,
    },

    /// Filesystem failure.
    #[error("backend i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored document could not be (de)serialized.
    #[error("backend serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_reasons() {
        let gr = GroupResource::new("wardle.example.com", "flunders");
        let cases = [
            (ApiError::not_found(&gr, "a"), 404, "NotFound"),
            (ApiError::already_exists(&gr, "a"), 409, "AlreadyExists"),
            (ApiError::conflict(&gr, "a", "stale"), 409, "Conflict"),
            (ApiError::BadRequest("x".into()), 400, "BadRequest"),
            (ApiError::invalid("Flunder", "a", Vec::new()), 422, "Invalid"),
            (ApiError::method_not_supported("flunders", "create"), 405, "MethodNotAllowed"),
            (ApiError::Cancelled, 499, "Cancelled"),
            (ApiError::ServiceUnavailable("down".into()), 503, "ServiceUnavailable"),
            (ApiError::Internal("bug".into()), 500, "InternalError"),
        ];
        for (err, code, reason) in cases {
            assert_eq!(err.code(), code, "{err}");
            assert_eq!(err.reason(), reason);
        }
    }

    #[test]
    fn invalid_lists_fields() {
        let err = ApiError::invalid(
            "Flunder",
            "a",
            vec![
                FieldError::new("spec.reference", "must not be empty"),
                FieldError::new("metadata.name", "too long"),
            ],
        );
        assert_eq!(
            err.to_string(),
            "Flunder \"a\" is invalid: spec.reference: must not be empty, metadata.name: too long"
        );
        assert_eq!(err.to_status()["code"], 422);
    }
}
