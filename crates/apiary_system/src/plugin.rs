//! Plugin system for composing an API server.
//!
//! Every capability of an apiary server arrives through a plugin: logging,
//! the storage layer, the resource registry and each API group that registers
//! resources against it.
//!
//! # Example
//!
//! ```
//! use apiary_system::plugin::{Plugin, PluginId};
//! use apiary_system::server::Server;
//!
//! # struct RegistryPlugin;
//! # impl Plugin for RegistryPlugin {
//! #     fn build(&self, _server: &mut Server) {}
//! # }
//! struct WardleGroup {
//!     group: String,
//! }
//!
//! # struct GroupName(String);
//! impl Plugin for WardleGroup {
//!     fn build(&self, server: &mut Server) {
//!         server.insert_state(GroupName(self.group.clone()));
//!     }
//!
//!     fn dependencies(&self) -> Vec<PluginId> {
//!         vec![PluginId::of::<RegistryPlugin>()]
//!     }
//! }
//!
//! let mut server = Server::new();
//! server.add_plugins(RegistryPlugin);
//! server.add_plugins(WardleGroup { group: "wardle.example.com".into() });
//! server.finish();
//! ```

use core::any::TypeId;

use crate::server::Server;

// ─────────────────────────────────────────────────────────────────────────────
// PluginId
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a plugin type.
///
/// Used for dependency resolution and duplicate detection. Based on [`TypeId`],
/// so each plugin type has exactly one `PluginId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId {
    type_id: TypeId,
    type_name: &'static str,
}

impl PluginId {
    /// Creates a `PluginId` for the given plugin type.
    #[must_use]
    pub fn of<P: Plugin>() -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: core::any::type_name::<P>(),
        }
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name for debugging.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of server functionality.
///
/// Plugins follow a strict lifecycle managed by the server:
///
/// 1. **Build Phase** - `build()` is called in dependency order
/// 2. **Ready Phase** - `ready()` is called in dependency order
/// 3. **Cleanup Phase** - `cleanup()` is called in reverse dependency order
///
/// The build phase is where registries are open for writing. The ready phase
/// is where they are frozen and published as global state.
pub trait Plugin: Send + Sync + 'static {
    /// Configures the server. Called once per plugin.
    ///
    /// Use this to insert state with initial values, or to register
    /// resources against a registry inserted by a dependency.
    fn build(&self, server: &mut Server);

    /// Called after all plugins have been built.
    ///
    /// Use this to freeze build-time registries, validate that required
    /// state exists, or open connections.
    fn ready(&self, _server: &mut Server) {}

    /// Called when the server is shutting down.
    ///
    /// Called in **reverse** dependency order (dependents cleanup before dependencies).
    fn cleanup(&self, _server: &mut Server) {}

    /// Returns the plugin's name for debugging and error messages.
    ///
    /// Default implementation returns the type name.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }

    /// Declares plugins that must be added before this one.
    ///
    /// The server will panic in [`Server::finish`] if a dependency is missing.
    fn dependencies(&self) -> Vec<PluginId> {
        Vec::new()
    }

    /// Returns true if this plugin can only be added once.
    ///
    /// Default is `true`. Adding the same plugin type twice will panic.
    fn is_unique(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugins Trait (for add_plugins polymorphism)
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for types that can be added to a server as plugins.
///
/// Lets [`Server::add_plugins`] accept a single [`Plugin`] or a whole
/// [`PluginGroupBuilder`].
pub trait Plugins {
    /// Adds these plugins to the server.
    fn add_to_server(self, server: &mut Server);
}

impl<P: Plugin> Plugins for P {
    fn add_to_server(self, server: &mut Server) {
        let id = PluginId::of::<P>();
        server.add_plugin_boxed(id, Box::new(self));
    }
}

impl Plugins for PluginGroupBuilder {
    fn add_to_server(self, server: &mut Server) {
        for boxed in self.plugins {
            server.add_plugin_boxed(boxed.id, boxed.plugin);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PluginGroup Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A bundle of plugins that are usually added together.
///
/// # Example
///
/// ```ignore
/// Server::new()
///     .add_plugins(
///         DefaultPlugins
///             .build()
///             .disable::<TracingPlugin>()
///     )
///     .finish();
/// ```
pub trait PluginGroup {
    /// Returns the plugins in this group.
    fn build(self) -> PluginGroupBuilder;
}

// ─────────────────────────────────────────────────────────────────────────────
// BoxedPlugin
// ─────────────────────────────────────────────────────────────────────────────

/// A boxed plugin with its [`PluginId`] captured before erasure.
pub(crate) struct BoxedPlugin {
    pub(crate) id: PluginId,
    pub(crate) plugin: Box<dyn Plugin>,
}

impl BoxedPlugin {
    fn new<P: Plugin>(plugin: P) -> Self {
        Self {
            id: PluginId::of::<P>(),
            plugin: Box::new(plugin),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.plugin.name()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PluginGroupBuilder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for customizing plugin groups.
///
/// Allows adding, removing, and reordering plugins within a group.
#[derive(Default)]
pub struct PluginGroupBuilder {
    pub(crate) plugins: Vec<BoxedPlugin>,
}

impl PluginGroupBuilder {
    /// Creates a new empty plugin group builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Adds a plugin to the end of the group.
    #[must_use]
    #[expect(
        clippy::should_implement_trait,
        reason = "This is a builder method, not std::ops::Add"
    )]
    pub fn add<P: Plugin>(mut self, plugin: P) -> Self {
        self.plugins.push(BoxedPlugin::new(plugin));
        self
    }

    /// Adds a plugin before `Target`, or at the beginning if `Target` is absent.
    #[must_use]
    pub fn add_before<P: Plugin, Target: Plugin>(mut self, plugin: P) -> Self {
        let position = self.position_of::<Target>().unwrap_or(0);
        self.plugins.insert(position, BoxedPlugin::new(plugin));
        self
    }

    /// Adds a plugin after `Target`, or at the end if `Target` is absent.
    #[must_use]
    pub fn add_after<P: Plugin, Target: Plugin>(mut self, plugin: P) -> Self {
        let position = self
            .position_of::<Target>()
            .map_or(self.plugins.len(), |i| i + 1);
        self.plugins.insert(position, BoxedPlugin::new(plugin));
        self
    }

    /// Removes a plugin from the group by type. No-op if absent.
    #[must_use]
    pub fn disable<P: Plugin>(mut self) -> Self {
        let id = PluginId::of::<P>();
        self.plugins.retain(|p| p.id != id);
        self
    }

    /// Returns the number of plugins in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if the group contains no plugins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    fn position_of<Target: Plugin>(&self) -> Option<usize> {
        let id = PluginId::of::<Target>();
        self.plugins.iter().position(|p| p.id == id)
    }
}
