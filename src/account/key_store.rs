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

//! A file-backed store of per-user encryption keys.
//!
//! The store is a flat directory. Each user with encryption enabled has two
//! files in it:
//!
//! - `<user>.pub`, the raw 32 byte X25519 public key. This is all delivery
//!   needs, so it can be readable by the MTA.
//!
//! - `<user>.key`, the matching private key wrapped under the user's
//!   password (see `crypt::wrapped_key`).
//!
//! Users without a `.pub` file simply receive plaintext mail. Files are
//! staged in `.tmp` within the store and renamed into place, so a concurrent
//! reader never sees a partially written key.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::auth::KeyProvider;
use crate::crypt::wrapped_key::{unwrap_private_key, wrap_private_key};
use crate::crypt::{KeyPair, KEY_SIZE};
use crate::support::error::Error;
use crate::support::file_ops::{self, ErrorTransforms, IgnoreKinds};
use crate::support::safe_name::is_safe_name;

const MAX_KEY_FILE_SIZE: u64 = 4096;

#[derive(Clone, Debug)]
pub struct KeyStore {
    log_prefix: String,
    root: PathBuf,
    tmp: PathBuf,
}

impl KeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        KeyStore {
            log_prefix: format!("keys[{}]", root.display()),
            tmp: root.join(".tmp"),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the key store directories if they do not already exist.
    pub fn init(&self) -> Result<(), Error> {
        file_ops::mkdirs(&self.root, 0o750)?;
        fs::DirBuilder::new()
            .create(&self.tmp)
            .ignore_already_exists()?;
        file_ops::chmod(&self.tmp, 0o700)?;
        Ok(())
    }

    /// Return the paths of the public and private key files of `user`.
    fn key_paths(&self, user: &str) -> Result<(PathBuf, PathBuf), Error> {
        if !is_safe_name(user) {
            return Err(Error::UnsafeName);
        }

        Ok((
            self.root.join(format!("{}.pub", user)),
            self.root.join(format!("{}.key", user)),
        ))
    }

    /// Generate a new key pair for `user`, with the private key wrapped
    /// under `password`.
    ///
    /// Fails with `KeyExists` if the user already has a key.
    pub fn generate(
        &self,
        user: &str,
        password: &[u8],
    ) -> Result<KeyPair, Error> {
        let (pub_path, key_path) = self.key_paths(user)?;
        self.init()?;

        if pub_path.exists() {
            return Err(Error::KeyExists);
        }

        let keys = KeyPair::generate();
        let wrapped = wrap_private_key(&keys.private_key, password)?;

        // The private key goes first so that nothing is ever encrypted to a
        // public key whose private half was lost.
        file_ops::spit(&self.tmp, &key_path, false, 0o600, &wrapped)
            .on_exists(Error::KeyExists)?;
        if let Err(e) = file_ops::spit(
            &self.tmp,
            &pub_path,
            false,
            0o644,
            &keys.public_key,
        ) {
            warn!(
                "{} Failed to write public key for '{}': {}",
                self.log_prefix, user, e
            );
            fs::remove_file(&key_path).ignore_not_found()?;
            return Err(if io::ErrorKind::AlreadyExists == e.kind() {
                Error::KeyExists
            } else {
                e.into()
            });
        }

        info!("{} Generated key pair for '{}'", self.log_prefix, user);
        Ok(keys)
    }

    /// Load the public key of `user`.
    ///
    /// Fails with `NxKey` if the user has no key.
    pub fn public_key(&self, user: &str) -> Result<[u8; KEY_SIZE], Error> {
        let (pub_path, _) = self.key_paths(user)?;
        let data = read_key_file(&pub_path).on_not_found(Error::NxKey)?;
        if KEY_SIZE != data.len() {
            return Err(Error::BadKeyLength {
                expected: KEY_SIZE,
                actual: data.len(),
            });
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&data);
        Ok(key)
    }

    /// Unwrap the private key of `user` with `password`.
    ///
    /// Returns `Ok(None)` if the user has no private key, which means mail
    /// to them is not encrypted. A wrong password fails with
    /// `KeyUnwrapFailed`.
    pub fn unlock(
        &self,
        user: &str,
        password: &[u8],
    ) -> Result<Option<KeyPair>, Error> {
        let (pub_path, key_path) = self.key_paths(user)?;
        let wrapped = match read_key_file(&key_path) {
            Ok(wrapped) => wrapped,
            Err(e) if io::ErrorKind::NotFound == e.kind() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let private_key = match unwrap_private_key(&wrapped, password) {
            Ok(k) => k,
            Err(e) => {
                warn!(
                    "{} Failed to unlock key for '{}': {}",
                    self.log_prefix, user, e
                );
                return Err(e);
            }
        };
        let public_key = private_key.public_key();

        match self.public_key(user) {
            Ok(stored) if stored != public_key => warn!(
                "{} {} does not match the private key",
                self.log_prefix,
                pub_path.display()
            ),
            _ => (),
        }

        Ok(Some(KeyPair {
            private_key,
            public_key,
        }))
    }

    /// Re-wrap the private key of `user` under `new_password`.
    ///
    /// Fails with `NxKey` if the user has no key.
    pub fn change_password(
        &self,
        user: &str,
        old_password: &[u8],
        new_password: &[u8],
    ) -> Result<(), Error> {
        let (_, key_path) = self.key_paths(user)?;
        let keys = self.unlock(user, old_password)?.ok_or(Error::NxKey)?;
        let wrapped = wrap_private_key(&keys.private_key, new_password)?;
        file_ops::spit(&self.tmp, &key_path, true, 0o600, &wrapped)?;
        info!("{} Changed password for '{}'", self.log_prefix, user);
        Ok(())
    }
}

impl KeyProvider for KeyStore {
    fn get_public_key(&self, username: &str) -> Result<Vec<u8>, Error> {
        self.public_key(username).map(|k| k.to_vec())
    }

    fn has_encryption(&self, username: &str) -> Result<bool, Error> {
        match self.public_key(username) {
            Ok(_) => Ok(true),
            Err(Error::NxKey) | Err(Error::UnsafeName) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn read_key_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    fs::File::open(path)?
        .take(MAX_KEY_FILE_SIZE)
        .read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod test {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn set_up() -> (tempfile::TempDir, KeyStore) {
        let root = tempfile::tempdir().unwrap();
        let store = KeyStore::new(root.path().join("keys"));
        (root, store)
    }

    #[test]
    fn generate_and_unlock() {
        let (_root, store) = set_up();
        let keys = store.generate("alice", b"hunter2").unwrap();

        assert_eq!(keys.public_key, store.public_key("alice").unwrap());
        assert_eq!(
            0o600,
            fs::metadata(store.root().join("alice.key"))
                .unwrap()
                .permissions()
                .mode()
                & 0o777
        );

        let unlocked = store.unlock("alice", b"hunter2").unwrap().unwrap();
        assert_eq!(keys.private_key, unlocked.private_key);
        assert_eq!(keys.public_key, unlocked.public_key);

        assert_matches!(
            Err(Error::KeyUnwrapFailed),
            store.unlock("alice", b"hunter3")
        );
        assert_matches!(Err(Error::KeyExists), store.generate("alice", b"x"));
    }

    #[test]
    fn missing_keys() {
        let (_root, store) = set_up();
        store.init().unwrap();

        assert_matches!(Ok(None), store.unlock("bob", b"pw"));
        assert_matches!(Err(Error::NxKey), store.public_key("bob"));
        assert_matches!(
            Err(Error::NxKey),
            store.change_password("bob", b"pw", b"pw2")
        );
        assert!(!store.has_encryption("bob").unwrap());
    }

    #[test]
    fn malformed_key_files() {
        let (_root, store) = set_up();
        store.init().unwrap();
        fs::write(store.root().join("carol.pub"), &[0u8; 31][..]).unwrap();
        fs::write(store.root().join("carol.key"), b"garbage").unwrap();

        assert_matches!(
            Err(Error::BadKeyLength {
                expected: 32,
                actual: 31
            }),
            store.public_key("carol")
        );
        assert_matches!(Err(Error::BadWrappedKey), store.unlock("carol", b"pw"));
    }

    #[test]
    fn unsafe_user_names() {
        let (_root, store) = set_up();
        assert_matches!(
            Err(Error::UnsafeName),
            store.generate("../evil", b"pw").map(|_| ())
        );
        assert_matches!(Err(Error::UnsafeName), store.unlock(".tmp", b"pw"));
        assert!(!store.has_encryption("../evil").unwrap());
        assert!(!store.root().exists());
    }

    #[test]
    fn change_password() {
        let (_root, store) = set_up();
        let keys = store.generate("dave", b"old").unwrap();
        store.change_password("dave", b"old", b"new").unwrap();

        assert_matches!(
            Err(Error::KeyUnwrapFailed),
            store.unlock("dave", b"old")
        );
        let unlocked = store.unlock("dave", b"new").unwrap().unwrap();
        assert_eq!(keys.private_key, unlocked.private_key);
    }

    #[test]
    fn key_provider() {
        let (_root, store) = set_up();
        let keys = store.generate("erin", b"pw").unwrap();
        assert!(store.has_encryption("erin").unwrap());
        assert_eq!(
            keys.public_key.to_vec(),
            store.get_public_key("erin").unwrap()
        );
        assert_matches!(Err(Error::NxKey), store.get_public_key("frank"));
    }
}
