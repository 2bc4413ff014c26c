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

use std::io::{Cursor, Read};
use std::sync::Mutex;

use chrono::prelude::*;

use crate::crypt::sealed_box::decrypt_message;
use crate::crypt::SessionKey;
use crate::store::{
    DecryptingMessageStore, Flag, FolderStore, MessageInfo, MessageStore,
};
use crate::support::error::Error;

/// Wraps a store so that retrieved messages are decrypted with the session
/// key of the logged in user.
///
/// Until `set_session_key()` is called, and again after
/// `clear_session_key()`, messages are passed through untouched. While a key
/// is set, every retrieved message must decrypt under it; a message that
/// does not fails with `DecryptionFailed` rather than being returned as-is.
/// This includes mail delivered in plaintext because the recipient's key
/// could not be looked up at delivery time: it stays listed and can be read
/// with no session key set, but not within an encrypted session.
///
/// Listing and sizes are those of the stored (encrypted) form.
#[derive(Debug)]
pub struct DecryptingStore<S> {
    inner: S,
    session_key: Mutex<Option<SessionKey>>,
}

impl<S> DecryptingStore<S> {
    pub fn new(inner: S) -> Self {
        DecryptingStore {
            inner,
            session_key: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn session_key(&self) -> Option<SessionKey> {
        match self.session_key.lock() {
            Ok(key) => key.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn decrypt(
        &self,
        mut message: Box<dyn Read + Send>,
    ) -> Result<Box<dyn Read + Send>, Error> {
        let key = match self.session_key() {
            Some(key) => key,
            None => return Ok(message),
        };

        let mut sealed = Vec::new();
        message.read_to_end(&mut sealed)?;
        let plain = decrypt_message(&sealed, key.expose())?;
        Ok(Box::new(Cursor::new(plain)))
    }
}

impl<S: MessageStore> MessageStore for DecryptingStore<S> {
    fn list(&self, mailbox: &str) -> Result<Vec<MessageInfo>, Error> {
        self.inner.list(mailbox)
    }

    fn retrieve(
        &self,
        mailbox: &str,
        uid: &str,
    ) -> Result<Box<dyn Read + Send>, Error> {
        self.decrypt(self.inner.retrieve(mailbox, uid)?)
    }

    fn delete(&self, mailbox: &str, uid: &str) -> Result<(), Error> {
        self.inner.delete(mailbox, uid)
    }

    fn expunge(&self, mailbox: &str) -> Result<(), Error> {
        self.inner.expunge(mailbox)
    }

    fn stat(&self, mailbox: &str) -> Result<(usize, u64), Error> {
        self.inner.stat(mailbox)
    }
}

impl<S: MessageStore> DecryptingMessageStore for DecryptingStore<S> {
    fn set_session_key(&self, key: SessionKey) {
        let mut lock = match self.session_key.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        *lock = Some(key);
    }

    fn clear_session_key(&self) {
        let mut lock = match self.session_key.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        *lock = None;
    }
}

impl<S: FolderStore> FolderStore for DecryptingStore<S> {
    fn create_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error> {
        self.inner.create_folder(mailbox, folder)
    }

    fn list_folders(&self, mailbox: &str) -> Result<Vec<String>, Error> {
        self.inner.list_folders(mailbox)
    }

    fn delete_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error> {
        self.inner.delete_folder(mailbox, folder)
    }

    fn rename_folder(
        &self,
        mailbox: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), Error> {
        self.inner.rename_folder(mailbox, old_name, new_name)
    }

    fn list_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
    ) -> Result<Vec<MessageInfo>, Error> {
        self.inner.list_in_folder(mailbox, folder)
    }

    fn stat_folder(
        &self,
        mailbox: &str,
        folder: &str,
    ) -> Result<(usize, u64), Error> {
        self.inner.stat_folder(mailbox, folder)
    }

    fn retrieve_from_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
    ) -> Result<Box<dyn Read + Send>, Error> {
        self.decrypt(self.inner.retrieve_from_folder(mailbox, folder, uid)?)
    }

    fn delete_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
    ) -> Result<(), Error> {
        self.inner.delete_in_folder(mailbox, folder, uid)
    }

    fn expunge_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error> {
        self.inner.expunge_folder(mailbox, folder)
    }

    fn deliver_to_folder(
        &self,
        mailbox: &str,
        folder: &str,
        message: &mut dyn Read,
    ) -> Result<String, Error> {
        self.inner.deliver_to_folder(mailbox, folder, message)
    }

    fn append_to_folder(
        &self,
        mailbox: &str,
        folder: &str,
        message: &mut dyn Read,
        flags: &[Flag],
        internal_date: DateTime<Utc>,
    ) -> Result<String, Error> {
        self.inner
            .append_to_folder(mailbox, folder, message, flags, internal_date)
    }

    fn copy_message(
        &self,
        mailbox: &str,
        src_folder: &str,
        uid: &str,
        dst_folder: &str,
    ) -> Result<String, Error> {
        self.inner.copy_message(mailbox, src_folder, uid, dst_folder)
    }

    fn set_flags_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
        flags: &[Flag],
    ) -> Result<(), Error> {
        self.inner.set_flags_in_folder(mailbox, folder, uid, flags)
    }

    fn uid_validity(&self, mailbox: &str, folder: &str) -> Result<u32, Error> {
        self.inner.uid_validity(mailbox, folder)
    }
}
