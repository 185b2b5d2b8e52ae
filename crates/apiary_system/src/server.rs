//! Server runtime for plugin orchestration.
//!
//! The [`Server`] owns the plugins and the state they exchange. A bare server
//! serves nothing; storage, the resource registry and every API group are
//! plugins.
//!
//! ```ignore
//! let mut server = Server::new();
//! server
//!     .add_plugins(DefaultPlugins.build())
//!     .add_plugins(WardlePlugin);
//! server.finish();
//!
//! let dispatcher = server.get_global::<Dispatcher>().unwrap();
//! ```
//!
//! # State Scoping
//!
//! - **Build-time state** ([`insert_state`](Server::insert_state)) is mutable
//!   and meant for registries that plugins write to during `build()`.
//! - **Global state** ([`insert_global`](Server::insert_global)) is read-only
//!   once published, typically from a plugin's `ready()`.
//!
//! # Lifecycle
//!
//! 1. **Dependency Resolution** - Validate and topologically sort plugins
//! 2. **Build Phase** - Call `plugin.build()` in dependency order
//! 3. **Ready Phase** - Call `plugin.ready()` in dependency order
//! 4. **Cleanup Phase** - Call `plugin.cleanup()` in reverse order

use crate::plugin::{Plugin, PluginId, Plugins};
use crate::state::{GlobalState, State, StateMap, StateRef, StateRefMut};
use hashbrown::{HashMap, HashSet};

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// Build state of the server: `NotStarted` → `Building` → `Built`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BuildState {
    #[default]
    NotStarted,
    Building,
    Built,
}

/// The runtime that orchestrates plugins and holds shared state.
pub struct Server {
    /// Read-only state published for the server's lifetime.
    global: StateMap,

    /// Mutable build-time state.
    state: StateMap,

    /// Plugins pending build (not yet sorted).
    pending_plugins: Vec<PluginEntry>,

    /// Plugins that have been built, in sorted order.
    built_plugins: Vec<PluginEntry>,

    /// Plugin IDs that have been added, for duplicate detection.
    plugin_ids: HashSet<PluginId>,

    build_state: BuildState,
}

struct PluginEntry {
    id: PluginId,
    plugin: Box<dyn Plugin>,
    name: String,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Creates a new empty server.
    #[must_use]
    pub fn new() -> Self {
        Self {
            global: StateMap::new(),
            state: StateMap::new(),
            pending_plugins: Vec::new(),
            built_plugins: Vec::new(),
            plugin_ids: HashSet::new(),
            build_state: BuildState::NotStarted,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plugin Management
    // ─────────────────────────────────────────────────────────────────────────

    /// Adds one plugin or a [`PluginGroupBuilder`](crate::plugin::PluginGroupBuilder).
    ///
    /// # Panics
    ///
    /// Panics if a unique plugin is added twice.
    pub fn add_plugins<P: Plugins>(&mut self, plugins: P) -> &mut Self {
        plugins.add_to_server(self);
        self
    }

    pub(crate) fn add_plugin_boxed(&mut self, id: PluginId, plugin: Box<dyn Plugin>) {
        let name = plugin.name().to_string();

        if plugin.is_unique() && self.plugin_ids.contains(&id) {
            panic!(
                "Plugin '{}' is unique and was already added.\n\
                 If you intended to add this plugin multiple times, \
                 set `is_unique()` to return `false`.",
                name
            );
        }
        self.plugin_ids.insert(id);

        let entry = PluginEntry { id, plugin, name };

        // Plugins added while building are built immediately.
        if self.build_state == BuildState::Building {
            entry.plugin.build(self);
            self.built_plugins.push(entry);
        } else {
            self.pending_plugins.push(entry);
        }
    }

    /// Returns true if a plugin of the given type has been added.
    #[must_use]
    pub fn has_plugin<P: Plugin>(&self) -> bool {
        self.plugin_ids.contains(&PluginId::of::<P>())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Build-time State
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts build-time state, returning the previous value of that type.
    pub fn insert_state<S: State>(&mut self, value: S) -> Option<S> {
        self.state.insert(value)
    }

    /// Returns true if build-time state of type `S` exists.
    #[must_use]
    pub fn contains_state<S: State>(&self) -> bool {
        self.state.contains::<S>()
    }

    /// Borrows build-time state immutably.
    ///
    /// Returns `None` if it doesn't exist or is mutably borrowed.
    #[must_use]
    pub fn get_state<S: State>(&self) -> Option<StateRef<'_, S>> {
        self.state.get::<S>().ok()
    }

    /// Borrows build-time state mutably.
    ///
    /// Returns `None` if it doesn't exist or is already borrowed.
    ///
    /// ```ignore
    /// fn build(&self, server: &mut Server) {
    ///     let mut registry = server
    ///         .get_state_mut::<ResourceRegistry>()
    ///         .expect("RegistryPlugin must be added first");
    ///     registry.register(ResourceDescriptor::of::<Flunder>().with_status());
    /// }
    /// ```
    #[must_use]
    pub fn get_state_mut<S: State>(&self) -> Option<StateRefMut<'_, S>> {
        self.state.get_mut::<S>().ok()
    }

    /// Removes build-time state and returns it.
    pub fn remove_state<S: State>(&mut self) -> Option<S> {
        self.state.remove::<S>()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Global State
    // ─────────────────────────────────────────────────────────────────────────

    /// Publishes global state, returning the previous value of that type.
    pub fn insert_global<S: GlobalState>(&mut self, value: S) -> Option<S> {
        self.global.insert(value)
    }

    /// Returns true if global state of type `S` exists.
    #[must_use]
    pub fn contains_global<S: GlobalState>(&self) -> bool {
        self.global.contains::<S>()
    }

    /// Borrows global state.
    ///
    /// Returns `None` if it doesn't exist.
    #[must_use]
    pub fn get_global<S: GlobalState>(&self) -> Option<StateRef<'_, S>> {
        self.global.get::<S>().ok()
    }

    /// Returns whether [`finish()`](Self::finish) has completed.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.build_state == BuildState::Built
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Builds all plugins and prepares the server for serving.
    ///
    /// Sorts plugins by their dependencies, then calls `build()` and `ready()`
    /// on each in that order.
    ///
    /// # Panics
    ///
    /// - If a plugin's dependency is not satisfied
    /// - If there is a circular dependency between plugins
    /// - If called more than once
    /// - If a plugin panics during `build()` or `ready()`
    pub fn finish(&mut self) {
        if self.build_state != BuildState::NotStarted {
            panic!("Server::finish() was already called. Cannot build twice.");
        }

        let sorted_plugins = self.sort_plugins_by_dependencies();

        self.build_state = BuildState::Building;
        for entry in sorted_plugins {
            entry.plugin.build(self);
            self.built_plugins.push(entry);
        }

        // Plugins are moved out while `ready()` borrows the server mutably.
        // Anything added during this phase lands in `built_plugins` and is
        // appended afterwards.
        let plugins = core::mem::take(&mut self.built_plugins);
        for entry in &plugins {
            entry.plugin.ready(self);
        }
        let late = core::mem::replace(&mut self.built_plugins, plugins);
        self.built_plugins.extend(late);

        self.build_state = BuildState::Built;
    }

    /// Cleans up all plugins in reverse dependency order.
    pub fn cleanup(&mut self) {
        let plugins = core::mem::take(&mut self.built_plugins);
        for entry in plugins.iter().rev() {
            entry.plugin.cleanup(self);
        }
        let late = core::mem::replace(&mut self.built_plugins, plugins);
        self.built_plugins.extend(late);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal: Dependency Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Sorts pending plugins with Kahn's algorithm.
    ///
    /// # Panics
    ///
    /// - If a plugin's dependency is not found
    /// - If there is a circular dependency
    fn sort_plugins_by_dependencies(&mut self) -> Vec<PluginEntry> {
        if self.pending_plugins.is_empty() {
            return Vec::new();
        }

        let index_of: HashMap<PluginId, usize> = self
            .pending_plugins
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id, i))
            .collect();

        let n = self.pending_plugins.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, entry) in self.pending_plugins.iter().enumerate() {
            for dep in entry.plugin.dependencies() {
                if let Some(&dep_idx) = index_of.get(&dep) {
                    dependents[dep_idx].push(i);
                    in_degree[i] += 1;
                } else if !self.built_plugins.iter().any(|p| p.id == dep) {
                    panic!(
                        "Plugin '{}' requires '{}' which was not added.\n\
                         Add {} before {}, or use a plugin group that includes it.",
                        entry.name,
                        dep.type_name(),
                        dep.type_name(),
                        entry.name
                    );
                }
            }
        }

        // Lowest index first keeps registration order among independent plugins.
        let mut ready: std::collections::BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order: Vec<usize> = Vec::with_capacity(n);

        while let Some(idx) = ready.pop_first() {
            order.push(idx);
            for &dependent in &dependents[idx] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != n {
            let in_cycle: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, deg)| **deg > 0)
                .map(|(i, _)| self.pending_plugins[i].name.as_str())
                .collect();

            panic!(
                "Circular dependency detected among plugins: {:?}\n\
                 Break the cycle by extracting shared functionality into a separate plugin.",
                in_cycle
            );
        }

        let mut slots: Vec<Option<PluginEntry>> = core::mem::take(&mut self.pending_plugins)
            .into_iter()
            .map(Some)
            .collect();
        order
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect()
    }
}
