//! Plugin lifecycle and typed server state for apiary.
//!
//! `apiary_system` is the bottom layer every other apiary crate builds on:
//!
//! - [`plugin`] - Plugin trait, plugin groups and plugin identity
//! - [`state`] - Typed, lock-guarded state containers
//! - [`server`] - Server runtime that orders and drives plugins
//!
//! # Example
//!
//! ```
//! use apiary_system::plugin::Plugin;
//! use apiary_system::server::Server;
//! use apiary_system::state::GlobalState;
//!
//! #[derive(Default)]
//! struct ListenConfig { port: u16 }
//! impl GlobalState for ListenConfig {}
//!
//! struct ListenPlugin;
//!
//! impl Plugin for ListenPlugin {
//!     fn build(&self, server: &mut Server) {
//!         server.insert_global(ListenConfig { port: 6443 });
//!     }
//! }
//!
//! let mut server = Server::new();
//! server.add_plugins(ListenPlugin);
//! server.finish();
//! assert_eq!(server.get_global::<ListenConfig>().unwrap().port, 6443);
//! ```

/// Plugin trait and plugin groups.
pub mod plugin;

/// Server runtime for plugin orchestration.
pub mod server;

/// Typed state containers.
pub mod state;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::plugin::*;
    pub use crate::server::*;
    pub use crate::state::*;
}
