//! Typed server state.
//!
//! [`StateMap`] stores one value per Rust type behind a `RwLock`, handing out
//! RAII guards for reads and writes. The server keeps two of them:
//!
//! - build-time state, mutable, used for registries that plugins write to
//!   while the server is being built
//! - global state, values marked [`GlobalState`] that are published once and
//!   only read afterwards

use core::any::{Any, TypeId};
use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A value that can be stored in a [`StateMap`].
///
/// Implemented for every `Send + Sync + 'static` type.
pub trait State: Send + Sync + 'static {
    /// Returns the type name for debugging purposes.
    fn type_name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

impl<T: Send + Sync + 'static> State for T {}

/// Marker trait for state published once and shared read-only for the
/// lifetime of the server.
///
/// ```
/// use apiary_system::state::GlobalState;
/// use apiary_system::server::Server;
///
/// struct ServingConfig { bind_address: String }
/// impl GlobalState for ServingConfig {}
///
/// let mut server = Server::new();
/// server.insert_global(ServingConfig { bind_address: "0.0.0.0:6443".into() });
/// assert!(server.contains_global::<ServingConfig>());
/// ```
pub trait GlobalState: State {}

/// Unique identifier for a state type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(TypeId);

impl StateId {
    /// Creates a `StateId` for the given type.
    #[must_use]
    pub fn of<T: State>() -> Self {
        Self(TypeId::of::<T>())
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.0
    }
}

/// Errors returned when accessing a [`StateMap`].
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// No value of the requested type is stored.
    #[error("state not found: {0}")]
    NotFound(&'static str),

    /// The value is currently borrowed in a conflicting way.
    #[error("state already borrowed: {0}")]
    BorrowConflict(&'static str),
}

type Erased = Box<dyn Any + Send + Sync>;

/// Container for typed, lock-guarded values.
///
/// # Example
///
/// ```
/// use apiary_system::state::StateMap;
///
/// struct RouteCount(usize);
///
/// let mut state = StateMap::new();
/// state.insert(RouteCount(0));
///
/// state.get_mut::<RouteCount>().unwrap().0 += 3;
/// assert_eq!(state.get::<RouteCount>().unwrap().0, 3);
/// ```
#[derive(Default)]
pub struct StateMap {
    entries: HashMap<StateId, RwLock<Erased>>,
}

impl StateMap {
    /// Creates a new empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<T: State>(&mut self, value: T) -> Option<T> {
        self.entries
            .insert(StateId::of::<T>(), RwLock::new(Box::new(value)))
            .and_then(|old| old.into_inner().downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Returns `true` if a value of type `T` is stored.
    #[must_use]
    pub fn contains<T: State>(&self) -> bool {
        self.entries.contains_key(&StateId::of::<T>())
    }

    /// Borrows a value immutably.
    ///
    /// # Errors
    ///
    /// - [`StateError::NotFound`] if no value of type `T` is stored
    /// - [`StateError::BorrowConflict`] if the value is mutably borrowed
    pub fn get<T: State>(&self) -> Result<StateRef<'_, T>, StateError> {
        let type_name = core::any::type_name::<T>();
        let entry = self
            .entries
            .get(&StateId::of::<T>())
            .ok_or(StateError::NotFound(type_name))?;
        let guard = entry
            .try_read()
            .ok_or(StateError::BorrowConflict(type_name))?;
        Ok(StateRef {
            guard,
            _marker: core::marker::PhantomData,
        })
    }

    /// Borrows a value mutably.
    ///
    /// # Errors
    ///
    /// - [`StateError::NotFound`] if no value of type `T` is stored
    /// - [`StateError::BorrowConflict`] if the value is already borrowed
    pub fn get_mut<T: State>(&self) -> Result<StateRefMut<'_, T>, StateError> {
        let type_name = core::any::type_name::<T>();
        let entry = self
            .entries
            .get(&StateId::of::<T>())
            .ok_or(StateError::NotFound(type_name))?;
        let guard = entry
            .try_write()
            .ok_or(StateError::BorrowConflict(type_name))?;
        Ok(StateRefMut {
            guard,
            _marker: core::marker::PhantomData,
        })
    }

    /// Removes a value and returns it.
    pub fn remove<T: State>(&mut self) -> Option<T> {
        self.entries
            .remove(&StateId::of::<T>())
            .and_then(|entry| entry.into_inner().downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Removes every value.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// RAII guard for immutable access, returned by [`StateMap::get`].
pub struct StateRef<'a, T: State> {
    guard: RwLockReadGuard<'a, Erased>,
    _marker: core::marker::PhantomData<&'a T>,
}

impl<T: State> core::ops::Deref for StateRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Entries are keyed by `StateId::of::<T>()`, so the downcast cannot fail.
        self.guard
            .downcast_ref::<T>()
            .expect("state type mismatch (this is a bug)")
    }
}

/// RAII guard for mutable access, returned by [`StateMap::get_mut`].
pub struct StateRefMut<'a, T: State> {
    guard: RwLockWriteGuard<'a, Erased>,
    _marker: core::marker::PhantomData<&'a mut T>,
}

impl<T: State> core::ops::Deref for StateRefMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.guard
            .downcast_ref::<T>()
            .expect("state type mismatch (this is a bug)")
    }
}

impl<T: State> core::ops::DerefMut for StateRefMut<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard
            .downcast_mut::<T>()
            .expect("state type mismatch (this is a bug)")
    }
}
