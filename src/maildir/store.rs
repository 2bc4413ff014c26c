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

//! The Maildir++ message store.
//!
//! Each mailbox is a Maildir whose location is determined by a
//! `MailboxPathResolver`; its folders are `.name` Maildirs inside it. The
//! inbox of a mailbox is created on first delivery or listing. Folders are
//! only ever created by explicit request, never as a side effect of
//! subaddressed delivery.

use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::sync::Arc;

use chrono::prelude::*;
use log::{info, warn};

use super::deletion::{DeletionKey, DeletionTracker};
use super::mailbox_path::MailboxPathResolver;
use super::maildir::Maildir;
use super::unique_name::UniqueNamer;
use crate::store::{
    DeliveryAgent, Envelope, Flag, MessageInfo, MessageStore, Recipient,
};
use crate::support::error::Error;
use crate::support::system_config::StoreConfig;

#[derive(Debug)]
pub struct MaildirStore {
    pub(super) resolver: MailboxPathResolver,
    pub(super) namer: Arc<UniqueNamer>,
    pub(super) deletions: DeletionTracker,
    pub(super) log_prefix: String,
}

impl MaildirStore {
    /// Create a store over the given layout, naming new messages with
    /// `namer`.
    pub fn new(resolver: MailboxPathResolver, namer: Arc<UniqueNamer>) -> Self {
        MaildirStore {
            log_prefix: format!("maildir[{}]", resolver.base_path().display()),
            resolver,
            namer,
            deletions: DeletionTracker::new(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, Error> {
        if config.base_path.as_os_str().is_empty() {
            return Err(Error::BadConfig("store.base_path is empty".to_owned()));
        }

        Ok(MaildirStore::new(
            MailboxPathResolver::from_config(config),
            Arc::new(UniqueNamer::new()),
        ))
    }

    pub fn resolver(&self) -> &MailboxPathResolver {
        &self.resolver
    }

    pub(super) fn inbox(&self, mailbox: &str) -> Result<Maildir, Error> {
        Ok(Maildir::new(self.resolver.mailbox_path(mailbox)?))
    }

    /// Return the inbox of `mailbox`, creating it if it does not exist yet.
    pub(super) fn ensure_inbox(&self, mailbox: &str) -> Result<Maildir, Error> {
        let inbox = self.inbox(mailbox)?;
        if !inbox.exists() {
            inbox.create()?;
            info!("{} Created mailbox {}", self.log_prefix, mailbox);
        }
        Ok(inbox)
    }

    pub(super) fn folder(
        &self,
        mailbox: &str,
        folder: &str,
    ) -> Result<Maildir, Error> {
        Ok(Maildir::new(self.resolver.folder_path(mailbox, folder)?))
    }

    /// Return the Maildir for `folder`, or the inbox if `folder` is `INBOX`
    /// in any casing, along with its deletion key.
    pub(super) fn folder_or_inbox(
        &self,
        mailbox: &str,
        folder: &str,
    ) -> Result<(Maildir, DeletionKey), Error> {
        if folder.eq_ignore_ascii_case("INBOX") {
            Ok((self.inbox(mailbox)?, DeletionKey::inbox(mailbox)))
        } else {
            Ok((
                self.folder(mailbox, folder)?,
                DeletionKey::folder(mailbox, folder),
            ))
        }
    }

    /// List the visible messages of `maildir`, first moving anything in
    /// `new` into `cur`.
    pub(super) fn list_dir(
        &self,
        maildir: &Maildir,
        key: &DeletionKey,
    ) -> Result<Vec<MessageInfo>, Error> {
        let recent = maildir.take_new()?.into_iter().collect::<HashSet<_>>();

        let mut messages = Vec::new();
        for file in maildir.list_cur()? {
            if self.deletions.is_deleted(key, &file.uid) {
                continue;
            }

            // The file can disappear between listing and stat if another
            // instance expunges it; it is simply not listed then.
            let metadata = match fs::metadata(&file.path) {
                Ok(md) => md,
                Err(_) => continue,
            };

            let mut flags = Vec::with_capacity(file.flags.len() + 1);
            if recent.contains(&file.uid) {
                flags.push(Flag::Recent);
            }
            flags.extend(file.flags);

            messages.push(MessageInfo {
                uid: file.uid,
                size: metadata.len(),
                flags,
                internal_date: metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
            });
        }

        Ok(messages)
    }

    pub(super) fn retrieve_from(
        &self,
        maildir: &Maildir,
        key: &DeletionKey,
        uid: &str,
        missing: Error,
    ) -> Result<Box<dyn Read + Send>, Error> {
        if self.deletions.is_deleted(key, uid) {
            return Err(Error::MessageDeleted);
        }

        if !maildir.exists() {
            return Err(missing);
        }

        Ok(Box::new(maildir.open(uid)?))
    }

    /// Remove everything marked for deletion in `key` from the Maildir
    /// `resolve` returns.
    ///
    /// `resolve` is not called at all if nothing is marked.
    pub(super) fn expunge_dir(
        &self,
        key: &DeletionKey,
        resolve: impl FnOnce() -> Result<Maildir, Error>,
        missing: Error,
    ) -> Result<(), Error> {
        let uids = self.deletions.take_and_clear(key);
        if uids.is_empty() {
            return Ok(());
        }

        let maildir = resolve()?;
        if !maildir.exists() {
            return Err(missing);
        }

        let mut result = Ok(());
        let mut removed = 0;
        for uid in &uids {
            match maildir.remove(uid) {
                Ok(true) => removed += 1,
                Ok(false) => (),
                Err(e) => {
                    warn!(
                        "{} Failed to expunge {} from {}: {}",
                        self.log_prefix,
                        uid,
                        maildir.path().display(),
                        e
                    );
                    result = Err(e);
                }
            }
        }

        info!(
            "{} Expunged {} of {} messages from {}",
            self.log_prefix,
            removed,
            uids.len(),
            maildir.path().display()
        );
        result
    }

    /// Deliver `data` to the Maildir that `recipient` routes to, returning
    /// that Maildir and the new UID.
    fn deliver_one(
        &self,
        recipient: &str,
        data: &[u8],
    ) -> Result<(Maildir, String), Error> {
        let parsed = Recipient::parse(recipient);

        let mut target = None;
        if !parsed.extension.is_empty() {
            if let Ok(folder) = self.folder(&parsed.address, &parsed.extension)
            {
                if folder.exists() {
                    target = Some(folder);
                }
            }
        }

        let target = match target {
            Some(folder) => folder,
            None => self.ensure_inbox(&parsed.address)?,
        };

        let uid = target.deliver(&self.namer, data)?;
        Ok((target, uid))
    }
}

impl DeliveryAgent for MaildirStore {
    fn deliver(
        &self,
        envelope: &Envelope,
        message: &mut dyn Read,
    ) -> Result<usize, Error> {
        if envelope.recipients.is_empty() {
            return Err(Error::NoRecipients);
        }

        let mut data = Vec::new();
        message.read_to_end(&mut data)?;

        let mut delivered = 0;
        let mut last_error = None;
        for recipient in &envelope.recipients {
            match self.deliver_one(recipient, &data) {
                Ok((target, uid)) => {
                    info!(
                        "{} Delivered message from <{}> for <{}> to {} as {}",
                        self.log_prefix,
                        envelope.from,
                        recipient,
                        target.path().display(),
                        uid
                    );
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        "{} Delivery for <{}> failed: {}",
                        self.log_prefix, recipient, e
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if 0 == delivered => Err(e),
            _ => Ok(delivered),
        }
    }
}

impl MessageStore for MaildirStore {
    /// Creates the mailbox if it does not exist, so that a newly provisioned
    /// user sees an empty inbox.
    fn list(&self, mailbox: &str) -> Result<Vec<MessageInfo>, Error> {
        let inbox = self.ensure_inbox(mailbox)?;
        self.list_dir(&inbox, &DeletionKey::inbox(mailbox))
    }

    fn retrieve(
        &self,
        mailbox: &str,
        uid: &str,
    ) -> Result<Box<dyn Read + Send>, Error> {
        let inbox = self.inbox(mailbox)?;
        self.retrieve_from(
            &inbox,
            &DeletionKey::inbox(mailbox),
            uid,
            Error::NxMailbox,
        )
    }

    fn delete(&self, mailbox: &str, uid: &str) -> Result<(), Error> {
        self.resolver.mailbox_path(mailbox)?;
        self.deletions.mark_deleted(DeletionKey::inbox(mailbox), uid);
        Ok(())
    }

    fn expunge(&self, mailbox: &str) -> Result<(), Error> {
        self.expunge_dir(
            &DeletionKey::inbox(mailbox),
            || self.inbox(mailbox),
            Error::NxMailbox,
        )
    }
}

#[cfg(test)]
pub(super) mod test {
    use std::io::Cursor;

    use super::*;

    pub struct Setup {
        pub root: tempfile::TempDir,
        pub store: MaildirStore,
    }

    pub fn set_up() -> Setup {
        set_up_with("", "")
    }

    pub fn set_up_with(maildir_subdir: &str, path_template: &str) -> Setup {
        crate::init_test_log();

        let root = tempfile::tempdir().unwrap();
        let store = MaildirStore::new(
            MailboxPathResolver::new(
                root.path(),
                maildir_subdir,
                path_template,
            ),
            Arc::new(UniqueNamer::new()),
        );
        Setup { root, store }
    }

    pub fn deliver(store: &impl DeliveryAgent, to: &[&str], data: &[u8]) {
        let envelope = Envelope::new(
            "sender@example.org",
            to.iter().map(|&s| s.to_owned()).collect(),
        );
        store.deliver(&envelope, &mut Cursor::new(data)).unwrap();
    }

    pub fn read_all(mut r: Box<dyn Read + Send>) -> Vec<u8> {
        let mut data = Vec::new();
        r.read_to_end(&mut data).unwrap();
        data
    }

    #[test]
    fn from_config_rejects_empty_base() {
        let config = StoreConfig::maildir("");
        assert_matches!(
            Err(Error::BadConfig(_)),
            MaildirStore::from_config(&config)
        );
    }

    #[test]
    fn no_recipients() {
        let setup = set_up();
        let envelope = Envelope::new("a@b", vec![]);
        assert_matches!(
            Err(Error::NoRecipients),
            setup.store.deliver(&envelope, &mut Cursor::new(b"x"))
        );
        // Nothing was created
        assert_eq!(0, fs::read_dir(setup.root.path()).unwrap().count());
    }

    #[test]
    fn list_creates_mailbox() {
        let setup = set_up();
        assert!(setup.store.list("new@example.com").unwrap().is_empty());
        assert!(setup.root.path().join("new@example.com/cur").is_dir());
        assert_eq!((0, 0), setup.store.stat("new@example.com").unwrap());
    }

    #[test]
    fn recent_reported_once() {
        let setup = set_up();
        deliver(&setup.store, &["alice@example.com"], b"hello");

        let first = setup.store.list("alice@example.com").unwrap();
        assert_eq!(1, first.len());
        assert_eq!(vec![Flag::Recent], first[0].flags);
        assert_eq!(5, first[0].size);

        let second = setup.store.list("alice@example.com").unwrap();
        assert_eq!(first[0].uid, second[0].uid);
        assert!(second[0].flags.is_empty());
    }

    #[test]
    fn retrieve_errors() {
        let setup = set_up();
        assert_matches!(
            Err(Error::NxMailbox),
            setup.store.retrieve("nobody@example.com", "x").map(|_| ())
        );

        deliver(&setup.store, &["alice@example.com"], b"hello");
        assert_matches!(
            Err(Error::NxMessage),
            setup.store.retrieve("alice@example.com", "nope").map(|_| ())
        );
        assert_matches!(
            Err(Error::NxMessage),
            setup
                .store
                .retrieve("alice@example.com", "../../etc/passwd")
                .map(|_| ())
        );
        assert_matches!(
            Err(Error::PathTraversal),
            setup.store.retrieve("../escape", "x").map(|_| ())
        );
    }

    #[test]
    fn expunge_without_marks_is_noop() {
        let setup = set_up();
        setup.store.expunge("never-created@example.com").unwrap();
        assert!(!setup.root.path().join("never-created@example.com").exists());
    }

    #[test]
    fn expunge_of_missing_mailbox() {
        let setup = set_up();
        setup.store.delete("ghost@example.com", "1").unwrap();
        assert_matches!(
            Err(Error::NxMailbox),
            setup.store.expunge("ghost@example.com")
        );
        // The marks were consumed regardless
        setup.store.expunge("ghost@example.com").unwrap();
    }

    #[test]
    fn delete_checks_mailbox_path() {
        let setup = set_up();
        assert_matches!(
            Err(Error::PathTraversal),
            setup.store.delete("../x", "1")
        );
    }

    #[test]
    fn partial_failure_counts_successes() {
        let setup = set_up();
        let envelope = Envelope::new(
            "sender@example.org",
            vec!["../escape".to_owned(), "ok@example.com".to_owned()],
        );
        assert_eq!(
            1,
            setup
                .store
                .deliver(&envelope, &mut Cursor::new(b"msg"))
                .unwrap()
        );

        let envelope =
            Envelope::new("sender@example.org", vec!["..".to_owned()]);
        assert_matches!(
            Err(Error::PathTraversal),
            setup.store.deliver(&envelope, &mut Cursor::new(b"msg"))
        );
    }
}
