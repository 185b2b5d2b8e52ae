//! Persistence engines.
//!
//! A [`Backend`] is a flat key/value store of JSON documents with a global
//! revision counter. Every write bumps the revision and stamps the written
//! value with it, which gives the [`Store`](crate::store::Store) its
//! resource versions and compare-and-swap updates.

mod json_file;
mod memory;

pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;

use crate::error::BackendError;
use core::fmt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored value and the revision it was written at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned {
    /// The stored document.
    pub value: Value,
    /// Revision of the last write.
    pub version: u64,
}

/// A versioned key/value persistence engine.
///
/// Calls may block on I/O.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Reads one key.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] for missing keys.
    fn get(&self, key: &str) -> Result<Versioned, BackendError>;

    /// Reads every key starting with `prefix`, in key order, together with
    /// the current revision.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be read.
    fn list(&self, prefix: &str) -> Result<(Vec<(String, Versioned)>, u64), BackendError>;

    /// Writes a new key and returns its version.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::AlreadyExists`] if the key exists.
    fn create(&self, key: &str, value: Value) -> Result<u64, BackendError>;

    /// Overwrites a key if it is still at version `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] for missing keys and
    /// [`BackendError::VersionConflict`] if the version moved.
    fn update(&self, key: &str, value: Value, expected: u64) -> Result<u64, BackendError>;

    /// Removes a key, optionally only if it is at version `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] for missing keys and
    /// [`BackendError::VersionConflict`] if the version moved.
    fn delete(&self, key: &str, expected: Option<u64>) -> Result<Versioned, BackendError>;

    /// The current revision.
    fn revision(&self) -> u64;
}

fn check_version(key: &str, expected: u64, actual: u64) -> Result<(), BackendError> {
    if expected == actual {
        Ok(())
    } else {
        Err(BackendError::VersionConflict {
            key: key.to_string(),
            expected,
            actual,
        })
    }
}
