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

//! The boundary between the message store and user authentication.
//!
//! Password verification itself lives outside this crate. What the store
//! needs from it is captured by two traits: `KeyProvider`, which delivery
//! uses to find out whether and how to encrypt for a recipient, and
//! `AuthenticationAgent`, which turns a login into an `AuthSession` carrying
//! the private key needed to read encrypted mail.

use std::collections::BTreeMap;

use crate::crypt::{SessionKey, KEY_SIZE};
use crate::store::registry::{BackendConfig, Registry};
use crate::support::error::Error;

/// An authenticated mail user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    /// The login name.
    pub username: String,
    /// The mailbox identifier the user's mail is stored under.
    pub mailbox: String,
}

/// The result of a successful login.
#[derive(Debug)]
pub struct AuthSession {
    pub user: User,
    /// The user's private key, if encryption is enabled for them.
    ///
    /// Held in locked memory and zeroed on `clear()` or drop.
    pub private_key: Option<SessionKey>,
    pub public_key: Option<[u8; KEY_SIZE]>,
    pub encryption_enabled: bool,
}

impl AuthSession {
    /// Destroy the key material held by this session.
    pub fn clear(&mut self) {
        self.private_key = None;
    }
}

/// Verifies credentials and unlocks key material.
pub trait AuthenticationAgent: Send + Sync {
    /// Fails with `AuthFailed` if the credentials are wrong and `NxUser` if
    /// the user does not exist.
    fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthSession, Error>;

    fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Looks up public keys for encrypting mail to users.
pub trait KeyProvider: Send + Sync {
    /// Fails with `NxKey` if the user has no key.
    fn get_public_key(&self, username: &str) -> Result<Vec<u8>, Error>;

    /// Whether mail to the user should be encrypted.
    ///
    /// Users who do not exist or have no key are simply not encrypted for.
    fn has_encryption(&self, username: &str) -> Result<bool, Error>;
}

/// Settings for opening an authentication agent.
#[derive(Clone, Debug, Default)]
pub struct AuthAgentConfig {
    /// The agent name, looked up in an `AuthRegistry`.
    pub agent_type: String,
    /// Where credentials live, e.g. a path or a connection URL.
    pub credential_backend: String,
    /// Where keys live; may differ from `credential_backend`.
    pub key_backend: String,
    pub options: BTreeMap<String, String>,
}

impl BackendConfig for AuthAgentConfig {
    fn backend_type(&self) -> &str {
        &self.agent_type
    }
}

pub type AuthRegistry = Registry<AuthAgentConfig, Box<dyn AuthenticationAgent>>;
