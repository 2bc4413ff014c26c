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

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// The system-wide configuration for msgstore.
///
/// This is stored in a file named `msgstore.toml` under the msgstore system
/// root, which is typically `/etc/msgstore` or `/usr/local/etc/msgstore`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SystemConfig {
    /// Where and how messages are stored.
    pub store: StoreConfig,

    /// Encryption at rest.
    ///
    /// Leaving this out entirely delivers everything as plaintext.
    #[serde(default)]
    pub keys: KeysConfig,
}

impl SystemConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = fs::read(path)?;
        toml::from_slice(&data).map_err(|e| {
            Error::BadConfig(format!("{}: {}", path.display(), e))
        })
    }
}

/// Settings for opening a message store backend.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StoreConfig {
    /// The backend name, looked up in a `store::registry::Registry`.
    #[serde(rename = "type", default = "default_store_type")]
    pub store_type: String,

    /// The root directory below which all mailboxes live.
    ///
    /// No path derived from a mailbox or folder name is ever allowed to
    /// escape this directory.
    pub base_path: PathBuf,

    /// An optional directory placed between the resolved mailbox directory
    /// and the Maildir structure, e.g. `Maildir` to get paths like
    /// `users/alice/Maildir/cur`.
    #[serde(default)]
    pub maildir_subdir: String,

    /// Transforms mailbox identifiers into paths relative to `base_path`.
    ///
    /// The placeholders `{domain}`, `{localpart}` and `{email}` are replaced
    /// with the part after the last `@`, the part before it, and the whole
    /// identifier, respectively. For example, `{domain}/users/{localpart}`
    /// stores `alice@example.com` under `example.com/users/alice`.
    ///
    /// If empty, the mailbox identifier is used verbatim.
    #[serde(default)]
    pub path_template: String,

    /// Backend-specific extra settings.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

fn default_store_type() -> String {
    "maildir".to_owned()
}

impl StoreConfig {
    /// A maildir configuration rooted at `base_path` with everything else
    /// defaulted.
    pub fn maildir(base_path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            store_type: default_store_type(),
            base_path: base_path.into(),
            maildir_subdir: String::new(),
            path_template: String::new(),
            options: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct KeysConfig {
    /// The directory holding `<user>.pub` and `<user>.key` files.
    pub key_dir: Option<PathBuf>,

    /// If true, deliveries to users with a public key in `key_dir` are
    /// encrypted before being written.
    pub encrypt_delivery: bool,
}
