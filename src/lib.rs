//! Resource and subresource storage composition for resource-oriented API servers.
//!
//! Register resource types once, serve every version from one shared storage
//! handle, and derive status, scale, connector and getter/updater subresources
//! that reach their parent through the request context.

pub use apiary_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use apiary_internal::prelude::*;
}
