//-
// Copyright (c) 2024, The msgstore authors
//
// This file is part of msgstore.
//
// msgstore is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// msgstore is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// msgstore. If not, see <http://www.gnu.org/licenses/>.

//! Lookup of backend implementations by name.
//!
//! A `Registry` is an ordinary value owned by whoever assembles the mail
//! system; there is no process-wide table. Store backends and
//! authentication agents each get their own registry type.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::maildir::store::MaildirStore;
use crate::store::MsgStore;
use crate::support::error::Error;
use crate::support::system_config::StoreConfig;

/// A configuration which names the backend it is meant for.
pub trait BackendConfig {
    fn backend_type(&self) -> &str;
}

impl BackendConfig for StoreConfig {
    fn backend_type(&self) -> &str {
        &self.store_type
    }
}

type Factory<C, T> = Box<dyn Fn(&C) -> Result<T, Error> + Send + Sync>;

/// Maps backend names to factories turning a configuration `C` into a
/// backend `T`.
pub struct Registry<C, T> {
    factories: BTreeMap<String, Factory<C, T>>,
}

impl<C, T> Default for Registry<C, T> {
    fn default() -> Self {
        Registry {
            factories: BTreeMap::new(),
        }
    }
}

impl<C: BackendConfig, T> fmt::Debug for Registry<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}

impl<C: BackendConfig, T> Registry<C, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend named `name`.
    ///
    /// Fails if `name` is empty or already taken; the existing registration
    /// is left untouched in the latter case.
    pub fn register(
        &mut self,
        name: &str,
        factory: impl Fn(&C) -> Result<T, Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::EmptyBackendName);
        }

        if self.factories.contains_key(name) {
            return Err(Error::DuplicateBackend(name.to_owned()));
        }

        self.factories.insert(name.to_owned(), Box::new(factory));
        Ok(())
    }

    /// Instantiate the backend that `config` names.
    pub fn open(&self, config: &C) -> Result<T, Error> {
        let factory = self
            .factories
            .get(config.backend_type())
            .ok_or(Error::NxBackend)?;
        factory(config)
    }

    /// The names of all registered backends, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(|s| &**s).collect()
    }
}

pub type StoreRegistry = Registry<StoreConfig, Arc<dyn MsgStore>>;

/// A registry holding every store backend built into this crate.
pub fn builtin_stores() -> Result<StoreRegistry, Error> {
    let mut registry = StoreRegistry::new();
    registry.register("maildir", |config| {
        Ok(Arc::new(MaildirStore::from_config(config)?) as Arc<dyn MsgStore>)
    })?;
    Ok(registry)
}
