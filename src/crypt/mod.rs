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

//! Encryption at rest.
//!
//! Messages for users with encryption enabled are sealed to the user's
//! X25519 public key before they reach the store (`sealed_box`). The
//! matching private key is kept on disk wrapped under a key derived from the
//! user's password (`wrapped_key`), and only exists in plain form in memory
//! for the duration of a session, as a `SessionKey`.

use std::fmt;

use rand::{rngs::OsRng, Rng};
use secstr::SecBox;

use crate::support::error::Error;

pub mod sealed_box;
pub mod wrapped_key;

/// The size of X25519 public and private keys, and of the symmetric key
/// used for wrapping.
pub const KEY_SIZE: usize = 32;
/// The size of XSalsa20 nonces.
pub const NONCE_SIZE: usize = 24;
/// The size of Poly1305 authentication tags.
pub const TAG_SIZE: usize = 16;

/// A private key held in locked memory and zeroed when dropped.
#[derive(PartialEq)]
pub struct SessionKey(SecBox<[u8; KEY_SIZE]>);

impl SessionKey {
    /// Generate a new random private key.
    pub fn generate() -> Self {
        // Fill byte by byte so that the key never exists outside the locked
        // allocation.
        let mut key = SecBox::new(Box::new([0u8; KEY_SIZE]));
        for b in key.unsecure_mut().iter_mut() {
            *b = OsRng.gen();
        }
        SessionKey(key)
    }

    /// Copy `bytes` into a new `SessionKey`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        if KEY_SIZE != bytes.len() {
            return Err(Error::BadKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }

        let mut key = SecBox::new(Box::new([0u8; KEY_SIZE]));
        key.unsecure_mut().copy_from_slice(bytes);
        Ok(SessionKey(key))
    }

    pub fn expose(&self) -> &[u8; KEY_SIZE] {
        self.0.unsecure()
    }

    /// Derive the X25519 public key matching this private key.
    pub fn public_key(&self) -> [u8; KEY_SIZE] {
        *crypto_box::SecretKey::from(*self.expose())
            .public_key()
            .as_bytes()
    }
}

impl Clone for SessionKey {
    fn clone(&self) -> Self {
        let mut key = SecBox::new(Box::new([0u8; KEY_SIZE]));
        key.unsecure_mut().copy_from_slice(self.expose());
        SessionKey(key)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SessionKey(<redacted>)")
    }
}

/// A private key together with its public key.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub private_key: SessionKey,
    pub public_key: [u8; KEY_SIZE],
}

impl KeyPair {
    pub fn generate() -> Self {
        let private_key = SessionKey::generate();
        KeyPair {
            public_key: private_key.public_key(),
            private_key,
        }
    }
}

/// Convert `bytes` into a key-sized array.
fn key_array(bytes: &[u8]) -> Result<[u8; KEY_SIZE], Error> {
    if KEY_SIZE != bytes.len() {
        return Err(Error::BadKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        });
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(bytes);
    Ok(key)
}
