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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Path escapes the mail storage base directory")]
    PathTraversal,
    #[error("Invalid folder name")]
    InvalidFolderName,
    #[error("Unsafe key or user name")]
    UnsafeName,
    #[error("No such mailbox")]
    NxMailbox,
    #[error("No such folder")]
    NxFolder,
    #[error("No such message")]
    NxMessage,
    #[error("No such flag")]
    NxFlag,
    #[error("Folder already exists")]
    FolderExists,
    #[error("Message has been marked for deletion")]
    MessageDeleted,
    #[error("No recipients")]
    NoRecipients,
    #[error("Message decryption failed")]
    DecryptionFailed,
    #[error("Message encryption failed")]
    EncryptionFailed,
    #[error("Key has wrong length: expected {expected}, got {actual}")]
    BadKeyLength { expected: usize, actual: usize },
    #[error("Wrapped private key malformed")]
    BadWrappedKey,
    #[error("Private key could not be unwrapped with the given password")]
    KeyUnwrapFailed,
    #[error("No key configured for user")]
    NxKey,
    #[error("User already has a key")]
    KeyExists,
    #[error("No such user")]
    NxUser,
    #[error("Authentication failed")]
    AuthFailed,
    #[error("No backend registered under that name")]
    NxBackend,
    #[error("Backend registered twice: {0}")]
    DuplicateBackend(String),
    #[error("Backend name is empty")]
    EmptyBackendName,
    #[error("Bad configuration: {0}")]
    BadConfig(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[error(transparent)]
    Argon2(#[from] argon2::Error),
}
