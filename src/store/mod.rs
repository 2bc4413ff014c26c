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

//! The capabilities a message store offers to the rest of the mail system.
//!
//! Delivery front-ends (an MTA hand-off, an LMTP server) only need
//! `DeliveryAgent`; reader protocols need `MessageStore` and, if they expose
//! folders, `FolderStore`. Each layer can be wrapped independently, which is
//! how the encryption gateway slots in.

pub mod model;
pub mod registry;

use std::io::Read;
use std::sync::Arc;

use chrono::prelude::*;

use crate::crypt::SessionKey;
use crate::support::error::Error;
pub use model::*;

/// Accepts messages for delivery.
pub trait DeliveryAgent: Send + Sync {
    /// Deliver the message read from `message` to every recipient in
    /// `envelope`.
    ///
    /// Returns the number of recipients the message was delivered to. Fails
    /// only if no recipient could be delivered to.
    fn deliver(
        &self,
        envelope: &Envelope,
        message: &mut dyn Read,
    ) -> Result<usize, Error>;
}

/// Read access to the inbox of a mailbox.
pub trait MessageStore: Send + Sync {
    /// List the messages in the inbox, excluding those marked for deletion.
    fn list(&self, mailbox: &str) -> Result<Vec<MessageInfo>, Error>;

    /// Open the message with the given UID for reading.
    fn retrieve(
        &self,
        mailbox: &str,
        uid: &str,
    ) -> Result<Box<dyn Read + Send>, Error>;

    /// Mark the message for deletion. Nothing is removed until `expunge`.
    fn delete(&self, mailbox: &str, uid: &str) -> Result<(), Error>;

    /// Permanently remove everything marked for deletion in the inbox.
    fn expunge(&self, mailbox: &str) -> Result<(), Error>;

    /// Return the number of visible messages and their total size.
    fn stat(&self, mailbox: &str) -> Result<(usize, u64), Error> {
        let messages = self.list(mailbox)?;
        let total = messages.iter().map(|m| m.size).sum();
        Ok((messages.len(), total))
    }
}

/// Folder management, and the folder-scoped variants of the read
/// operations.
///
/// Operations that take a destination folder (`append_to_folder`,
/// `copy_message`, `set_flags_in_folder` and `uid_validity`) treat `INBOX`
/// in any casing as the mailbox root.
pub trait FolderStore: Send + Sync {
    fn create_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error>;

    /// List the folders of the mailbox, sorted by name.
    fn list_folders(&self, mailbox: &str) -> Result<Vec<String>, Error>;

    /// Delete the folder and every message in it.
    fn delete_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error>;

    fn rename_folder(
        &self,
        mailbox: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), Error>;

    fn list_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
    ) -> Result<Vec<MessageInfo>, Error>;

    fn stat_folder(
        &self,
        mailbox: &str,
        folder: &str,
    ) -> Result<(usize, u64), Error> {
        let messages = self.list_in_folder(mailbox, folder)?;
        let total = messages.iter().map(|m| m.size).sum();
        Ok((messages.len(), total))
    }

    fn retrieve_from_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
    ) -> Result<Box<dyn Read + Send>, Error>;

    fn delete_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
    ) -> Result<(), Error>;

    fn expunge_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error>;

    /// Deliver a message directly into `folder`, creating it if needed.
    ///
    /// Returns the UID of the new message.
    fn deliver_to_folder(
        &self,
        mailbox: &str,
        folder: &str,
        message: &mut dyn Read,
    ) -> Result<String, Error>;

    /// Store a message with the given flags and internal date, as IMAP
    /// `APPEND` does. Returns the UID of the new message.
    fn append_to_folder(
        &self,
        mailbox: &str,
        folder: &str,
        message: &mut dyn Read,
        flags: &[Flag],
        internal_date: DateTime<Utc>,
    ) -> Result<String, Error>;

    /// Copy a message between folders, returning the UID of the copy.
    fn copy_message(
        &self,
        mailbox: &str,
        src_folder: &str,
        uid: &str,
        dst_folder: &str,
    ) -> Result<String, Error>;

    /// Replace the flags of a message. `Recent` is ignored.
    fn set_flags_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
        flags: &[Flag],
    ) -> Result<(), Error>;

    /// The IMAP `UIDVALIDITY` of the folder. Never 0.
    fn uid_validity(&self, mailbox: &str, folder: &str) -> Result<u32, Error>;
}

/// A complete message store: delivery, reading and folders.
pub trait MsgStore: DeliveryAgent + MessageStore + FolderStore {}
impl<T: DeliveryAgent + MessageStore + FolderStore> MsgStore for T {}

/// A `MessageStore` which can transparently decrypt what it returns once it
/// has been given the user's private key.
pub trait DecryptingMessageStore: MessageStore {
    fn set_session_key(&self, key: SessionKey);
    /// Forget (and zero) the session key, if any.
    fn clear_session_key(&self);
}

impl<T: DeliveryAgent + ?Sized> DeliveryAgent for Arc<T> {
    fn deliver(
        &self,
        envelope: &Envelope,
        message: &mut dyn Read,
    ) -> Result<usize, Error> {
        (**self).deliver(envelope, message)
    }
}

impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    fn list(&self, mailbox: &str) -> Result<Vec<MessageInfo>, Error> {
        (**self).list(mailbox)
    }

    fn retrieve(
        &self,
        mailbox: &str,
        uid: &str,
    ) -> Result<Box<dyn Read + Send>, Error> {
        (**self).retrieve(mailbox, uid)
    }

    fn delete(&self, mailbox: &str, uid: &str) -> Result<(), Error> {
        (**self).delete(mailbox, uid)
    }

    fn expunge(&self, mailbox: &str) -> Result<(), Error> {
        (**self).expunge(mailbox)
    }

    fn stat(&self, mailbox: &str) -> Result<(usize, u64), Error> {
        (**self).stat(mailbox)
    }
}

impl<T: FolderStore + ?Sized> FolderStore for Arc<T> {
    fn create_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error> {
        (**self).create_folder(mailbox, folder)
    }

    fn list_folders(&self, mailbox: &str) -> Result<Vec<String>, Error> {
        (**self).list_folders(mailbox)
    }

    fn delete_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error> {
        (**self).delete_folder(mailbox, folder)
    }

    fn rename_folder(
        &self,
        mailbox: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), Error> {
        (**self).rename_folder(mailbox, old_name, new_name)
    }

    fn list_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
    ) -> Result<Vec<MessageInfo>, Error> {
        (**self).list_in_folder(mailbox, folder)
    }

    fn stat_folder(
        &self,
        mailbox: &str,
        folder: &str,
    ) -> Result<(usize, u64), Error> {
        (**self).stat_folder(mailbox, folder)
    }

    fn retrieve_from_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
    ) -> Result<Box<dyn Read + Send>, Error> {
        (**self).retrieve_from_folder(mailbox, folder, uid)
    }

    fn delete_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
    ) -> Result<(), Error> {
        (**self).delete_in_folder(mailbox, folder, uid)
    }

    fn expunge_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error> {
        (**self).expunge_folder(mailbox, folder)
    }

    fn deliver_to_folder(
        &self,
        mailbox: &str,
        folder: &str,
        message: &mut dyn Read,
    ) -> Result<String, Error> {
        (**self).deliver_to_folder(mailbox, folder, message)
    }

    fn append_to_folder(
        &self,
        mailbox: &str,
        folder: &str,
        message: &mut dyn Read,
        flags: &[Flag],
        internal_date: DateTime<Utc>,
    ) -> Result<String, Error> {
        (**self).append_to_folder(mailbox, folder, message, flags, internal_date)
    }

    fn copy_message(
        &self,
        mailbox: &str,
        src_folder: &str,
        uid: &str,
        dst_folder: &str,
    ) -> Result<String, Error> {
        (**self).copy_message(mailbox, src_folder, uid, dst_folder)
    }

    fn set_flags_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
        flags: &[Flag],
    ) -> Result<(), Error> {
        (**self).set_flags_in_folder(mailbox, folder, uid, flags)
    }

    fn uid_validity(&self, mailbox: &str, folder: &str) -> Result<u32, Error> {
        (**self).uid_validity(mailbox, folder)
    }
}
