//! Named registries
//!
//! Provisioners and repository fetchers are looked up by name. The
//! entrypoint populates each registry once, before the service opens;
//! afterwards it is only read.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::provisioner::Provisioner;
use crate::repository::Repository;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} '{name}' is already registered")]
    Duplicate { kind: &'static str, name: String },

    #[error("no {kind} named '{requested}' (available: {})", .available.join(", "))]
    NotFound {
        kind: &'static str,
        requested: String,
        available: Vec<String>,
    },
}

/// Name to instance table
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: HashMap<String, Arc<T>>,
}

pub type ProvisionerRegistry = Registry<dyn Provisioner>;
pub type RepositoryRegistry = Registry<dyn Repository>;

impl<T: ?Sized> Registry<T> {
    /// Create an empty registry; `kind` names the entries in error messages
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    /// Register an instance, rejecting a name that is already taken
    pub fn register(&mut self, name: impl Into<String>, instance: Arc<T>) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate {
                kind: self.kind,
                name,
            });
        }
        self.entries.insert(name, instance);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: self.kind,
                requested: name.to_string(),
                available: self.names(),
            })
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}
