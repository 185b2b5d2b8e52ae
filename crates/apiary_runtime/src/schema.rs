//! Resource identities.
//!
//! A [`GroupVersionResource`] names a route such as `wardle.example.com/v1alpha1,
//! Resource=flunders/status`. Its [`GroupResource`] is the version-independent
//! key that decides storage sharing.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Version name under which storage versions are registered a second time.
pub const INTERNAL_VERSION: &str = "__internal";

/// Separator between a resource and its subresource path.
const SUBRESOURCE_SEPARATOR: char = '/';

/// An API group and version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersion {
    /// The API group, empty for the core group.
    pub group: String,
    /// The version within the group.
    pub version: String,
}

impl GroupVersion {
    /// Creates a group version.
    #[must_use]
    pub fn new(group: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
        }
    }

    /// Returns the internal version of this group.
    #[must_use]
    pub fn internal(&self) -> Self {
        Self::new(self.group.clone(), INTERNAL_VERSION)
    }

    /// Returns `true` for the internal version.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.version == INTERNAL_VERSION
    }

    /// Names a resource within this group version.
    #[must_use]
    pub fn with_resource(&self, resource: impl Into<String>) -> GroupVersionResource {
        GroupVersionResource::new(self.group.clone(), self.version.clone(), resource)
    }

    /// Names a kind within this group version.
    #[must_use]
    pub fn with_kind(&self, kind: impl Into<String>) -> GroupVersionKind {
        GroupVersionKind::new(self.group.clone(), self.version.clone(), kind)
    }
}

impl fmt::Display for GroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.version)
        } else {
            write!(f, "{}/{}", self.group, self.version)
        }
    }
}

/// Version-independent resource identity. Two versions of a resource share
/// storage exactly when their `GroupResource` is equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupResource {
    /// The API group.
    pub group: String,
    /// The resource name, including any subresource path.
    pub resource: String,
}

impl GroupResource {
    /// Creates a group resource.
    #[must_use]
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// Group, version and resource name of a route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionResource {
    /// The API group.
    pub group: String,
    /// The version.
    pub version: String,
    /// The resource name, `parent/subresource` for subresources.
    pub resource: String,
}

impl GroupVersionResource {
    /// Creates a group version resource.
    #[must_use]
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// Returns the group version part.
    #[must_use]
    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::new(self.group.clone(), self.version.clone())
    }

    /// Returns the version-independent key.
    #[must_use]
    pub fn group_resource(&self) -> GroupResource {
        GroupResource::new(self.group.clone(), self.resource.clone())
    }

    /// Returns `true` if this names a subresource route.
    #[must_use]
    pub fn is_subresource(&self) -> bool {
        self.resource.contains(SUBRESOURCE_SEPARATOR)
    }

    /// Returns the top-level resource name.
    ///
    /// ```
    /// use apiary_runtime::GroupVersionResource;
    ///
    /// let gvr = GroupVersionResource::new("apps", "v1", "deployments/scale");
    /// assert_eq!(gvr.resource_name(), "deployments");
    /// assert_eq!(gvr.subresource(), Some("scale"));
    /// ```
    #[must_use]
    pub fn resource_name(&self) -> &str {
        self.resource
            .split_once(SUBRESOURCE_SEPARATOR)
            .map_or(self.resource.as_str(), |(parent, _)| parent)
    }

    /// Returns the subresource path, if any.
    #[must_use]
    pub fn subresource(&self) -> Option<&str> {
        self.resource
            .split_once(SUBRESOURCE_SEPARATOR)
            .map(|(_, sub)| sub)
    }

    /// Returns the route of the parent resource.
    #[must_use]
    pub fn parent(&self) -> Self {
        Self::new(
            self.group.clone(),
            self.version.clone(),
            self.resource_name(),
        )
    }

    /// Returns the route of a subresource of this resource.
    #[must_use]
    pub fn with_subresource(&self, path: &str) -> Self {
        Self::new(
            self.group.clone(),
            self.version.clone(),
            format!("{}{SUBRESOURCE_SEPARATOR}{path}", self.resource_name()),
        )
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Resource={}", self.group_version(), self.resource)
    }
}

/// Group, version and kind of an object type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionKind {
    /// The API group.
    pub group: String,
    /// The version.
    pub version: String,
    /// The kind name.
    pub kind: String,
}

impl GroupVersionKind {
    /// Creates a group version kind.
    #[must_use]
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Returns the group version part.
    #[must_use]
    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::new(self.group.clone(), self.version.clone())
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.group_version(), self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subresource_paths() {
        let parent = GroupVersionResource::new("wardle.example.com", "v1alpha1", "flunders");
        assert!(!parent.is_subresource());
        assert_eq!(parent.subresource(), None);

        let status = parent.with_subresource("status");
        assert!(status.is_subresource());
        assert_eq!(status.resource, "flunders/status");
        assert_eq!(status.subresource(), Some("status"));
        assert_eq!(status.parent(), parent);
        assert_eq!(
            status.with_subresource("scale").resource,
            "flunders/scale"
        );
    }

    #[test]
    fn group_resource_ignores_version() {
        let v1 = GroupVersionResource::new("wardle.example.com", "v1alpha1", "flunders");
        let v2 = GroupVersionResource::new("wardle.example.com", "v1beta1", "flunders");
        assert_ne!(v1, v2);
        assert_eq!(v1.group_resource(), v2.group_resource());
    }

    #[test]
    fn display_formats() {
        let gv = GroupVersion::new("wardle.example.com", "v1alpha1");
        assert_eq!(gv.to_string(), "wardle.example.com/v1alpha1");
        assert_eq!(GroupVersion::new("", "v1").to_string(), "v1");
        assert_eq!(
            gv.with_resource("flunders").to_string(),
            "wardle.example.com/v1alpha1, Resource=flunders"
        );
        assert_eq!(
            gv.with_kind("Flunder").to_string(),
            "wardle.example.com/v1alpha1, Kind=Flunder"
        );
        assert_eq!(
            GroupResource::new("wardle.example.com", "flunders").to_string(),
            "flunders.wardle.example.com"
        );
    }

    #[test]
    fn internal_version() {
        let gv = GroupVersion::new("wardle.example.com", "v1alpha1");
        let internal = gv.internal();
        assert!(internal.is_internal());
        assert!(!gv.is_internal());
        assert_eq!(internal.group, gv.group);
    }
}
