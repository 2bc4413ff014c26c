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

//! Per-message public key encryption.
//!
//! Each message is encrypted with a fresh ephemeral X25519 key pair and a
//! fresh random nonce, using the NaCl `crypto_box` construction
//! (X25519 + XSalsa20-Poly1305). The result is laid out as
//!
//! ```text
//! ephemeral public key (32) || nonce (24) || ciphertext (len + 16)
//! ```
//!
//! so the recipient needs nothing but its own private key to open it. The
//! ephemeral private key is discarded as soon as the message is sealed.

use crypto_box::aead::{generic_array::GenericArray, Aead};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::{rngs::OsRng, Rng};

use super::{key_array, SessionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::support::error::Error;

/// Identifies this scheme in `EncryptionInfo`.
pub const ALGORITHM: &str = "x25519-xsalsa20-poly1305";

/// The number of bytes an encrypted message is larger than its plaintext.
pub const OVERHEAD: usize = KEY_SIZE + NONCE_SIZE + TAG_SIZE;

/// Encrypt `plaintext` so that only the holder of the private key matching
/// `public_key` can read it.
pub fn encrypt_message(
    plaintext: &[u8],
    public_key: &[u8],
) -> Result<Vec<u8>, Error> {
    let recipient = PublicKey::from(key_array(public_key)?);

    let ephemeral = SessionKey::generate();
    let ephemeral_secret = SecretKey::from(*ephemeral.expose());
    let ephemeral_public = ephemeral_secret.public_key();

    let nonce: [u8; NONCE_SIZE] = OsRng.gen();
    let ciphertext = SalsaBox::new(&recipient, &ephemeral_secret)
        .encrypt(GenericArray::from_slice(&nonce), plaintext)
        .map_err(|_| Error::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(KEY_SIZE + NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a message produced by `encrypt_message()`.
///
/// Any problem with the data, including truncation and tampering, results
/// in `Error::DecryptionFailed`; no partial plaintext is ever returned.
pub fn decrypt_message(
    sealed: &[u8],
    private_key: &[u8],
) -> Result<Vec<u8>, Error> {
    let secret = SecretKey::from(key_array(private_key)?);

    if sealed.len() < OVERHEAD {
        return Err(Error::DecryptionFailed);
    }

    let (ephemeral_public, rest) = sealed.split_at(KEY_SIZE);
    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);
    let ephemeral_public = PublicKey::from(key_array(ephemeral_public)?);

    SalsaBox::new(&ephemeral_public, &secret)
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| Error::DecryptionFailed)
}
