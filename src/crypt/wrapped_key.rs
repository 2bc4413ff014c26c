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

//! Password protection of private keys.
//!
//! The wrapping key is derived from the password with Argon2id (time cost 3,
//! 64 MiB of memory, 4 lanes, 32 byte output) and a random 32 byte salt. The
//! private key is then sealed under it with XSalsa20-Poly1305 (NaCl
//! `secretbox`). The stored form is
//!
//! ```text
//! salt (32) || nonce (24) || sealed private key (32 + 16)
//! ```
//!
//! A fresh salt and nonce are used every time a key is wrapped, so wrapping
//! the same key twice gives unrelated outputs.

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use rand::{rngs::OsRng, Rng};
use secstr::SecBox;

use super::{SessionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::support::error::Error;

pub const SALT_SIZE: usize = 32;
/// The exact size of a wrapped private key.
pub const WRAPPED_KEY_SIZE: usize = SALT_SIZE + NONCE_SIZE + KEY_SIZE + TAG_SIZE;

fn derive_wrapping_key(
    password: &[u8],
    salt: &[u8],
) -> Result<SecBox<[u8; KEY_SIZE]>, Error> {
    let mut raw = argon2::hash_raw(
        password,
        salt,
        &argon2::Config {
            hash_length: KEY_SIZE as u32,
            lanes: 4,
            mem_cost: 64 * 1024,
            thread_mode: argon2::ThreadMode::Parallel,
            time_cost: 3,
            variant: argon2::Variant::Argon2id,
            version: argon2::Version::Version13,
            ..argon2::Config::default()
        },
    )?;

    let mut key = SecBox::new(Box::new([0u8; KEY_SIZE]));
    key.unsecure_mut().copy_from_slice(&raw);
    zero(&mut raw);
    Ok(key)
}

fn zero(data: &mut [u8]) {
    for b in data.iter_mut() {
        *b = 0;
    }
}

/// Wrap `private_key` under `password`.
pub fn wrap_private_key(
    private_key: &SessionKey,
    password: &[u8],
) -> Result<Vec<u8>, Error> {
    let salt: [u8; SALT_SIZE] = OsRng.gen();
    let nonce: [u8; NONCE_SIZE] = OsRng.gen();
    let wrapping_key = derive_wrapping_key(password, &salt)?;

    let sealed = XSalsa20Poly1305::new(Key::from_slice(
        wrapping_key.unsecure(),
    ))
    .encrypt(Nonce::from_slice(&nonce), &private_key.expose()[..])
    .map_err(|_| Error::EncryptionFailed)?;

    let mut wrapped = Vec::with_capacity(WRAPPED_KEY_SIZE);
    wrapped.extend_from_slice(&salt);
    wrapped.extend_from_slice(&nonce);
    wrapped.extend_from_slice(&sealed);
    Ok(wrapped)
}

/// Recover the private key wrapped by `wrap_private_key()`.
///
/// Fails with `BadWrappedKey` if `wrapped` is not even shaped like a wrapped
/// key, and with `KeyUnwrapFailed` if the password is wrong or the data has
/// been tampered with.
pub fn unwrap_private_key(
    wrapped: &[u8],
    password: &[u8],
) -> Result<SessionKey, Error> {
    if WRAPPED_KEY_SIZE != wrapped.len() {
        return Err(Error::BadWrappedKey);
    }

    let (salt, rest) = wrapped.split_at(SALT_SIZE);
    let (nonce, sealed) = rest.split_at(NONCE_SIZE);
    let wrapping_key = derive_wrapping_key(password, salt)?;

    let mut plain = XSalsa20Poly1305::new(Key::from_slice(
        wrapping_key.unsecure(),
    ))
    .decrypt(Nonce::from_slice(nonce), sealed)
    .map_err(|_| Error::KeyUnwrapFailed)?;

    let key = SessionKey::from_slice(&plain).map_err(|_| Error::BadWrappedKey);
    zero(&mut plain);
    key
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wrap_unwrap() {
        let key = SessionKey::generate();
        let wrapped = wrap_private_key(&key, b"hunter2").unwrap();
        assert_eq!(WRAPPED_KEY_SIZE, wrapped.len());

        let unwrapped = unwrap_private_key(&wrapped, b"hunter2").unwrap();
        assert_eq!(key, unwrapped);

        assert_matches!(
            Err(Error::KeyUnwrapFailed),
            unwrap_private_key(&wrapped, b"hunter3")
        );
    }

    #[test]
    fn salt_is_fresh_each_time() {
        let key = SessionKey::generate();
        let a = wrap_private_key(&key, b"pw").unwrap();
        let b = wrap_private_key(&key, b"pw").unwrap();
        assert_ne!(a[..SALT_SIZE], b[..SALT_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_wrapped_keys() {
        assert_matches!(
            Err(Error::BadWrappedKey),
            unwrap_private_key(&[0u8; WRAPPED_KEY_SIZE - 1], b"pw")
        );
        assert_matches!(
            Err(Error::BadWrappedKey),
            unwrap_private_key(&[], b"pw")
        );
        // Right shape, but garbage
        assert_matches!(
            Err(Error::KeyUnwrapFailed),
            unwrap_private_key(&[0u8; WRAPPED_KEY_SIZE], b"pw")
        );
    }
}
