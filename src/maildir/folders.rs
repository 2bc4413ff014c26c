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

//! Maildir++ folder management.
//!
//! Folders live in `.name` directories inside the mailbox directory, each a
//! complete Maildir of its own. Only one level of folders exists.

use std::fs;
use std::io::Read;

use chrono::prelude::*;
use log::info;

use super::deletion::DeletionKey;
use super::maildir::Maildir;
use super::store::MaildirStore;
use crate::store::{Flag, FolderStore, MessageInfo};
use crate::support::error::Error;
use crate::support::file_ops::ErrorTransforms;

impl MaildirStore {
    /// Make sure both the inbox of `mailbox` and `target` exist.
    fn ensure_target(&self, mailbox: &str, target: &Maildir) -> Result<(), Error> {
        self.ensure_inbox(mailbox)?;
        target.ensure()?;
        Ok(())
    }

    /// Return the Maildir for `folder` (or the inbox for `INBOX`), failing
    /// if it does not exist.
    fn existing_folder_or_inbox(
        &self,
        mailbox: &str,
        folder: &str,
    ) -> Result<Maildir, Error> {
        let (maildir, key) = self.folder_or_inbox(mailbox, folder)?;
        if maildir.exists() {
            Ok(maildir)
        } else if key.folder.is_none() {
            Err(Error::NxMailbox)
        } else {
            Err(Error::NxFolder)
        }
    }
}

impl FolderStore for MaildirStore {
    fn create_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error> {
        let target = self.folder(mailbox, folder)?;
        if target.exists() {
            return Err(Error::FolderExists);
        }

        self.ensure_target(mailbox, &target)?;
        info!(
            "{} Created folder {} in {}",
            self.log_prefix, folder, mailbox
        );
        Ok(())
    }

    fn list_folders(&self, mailbox: &str) -> Result<Vec<String>, Error> {
        let inbox = self.inbox(mailbox)?;
        if !inbox.exists() {
            return Err(Error::NxMailbox);
        }

        let mut folders = Vec::new();
        for entry in fs::read_dir(inbox.path())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };

            if name.len() > 1
                && name.starts_with('.')
                && entry.path().join("cur").is_dir()
            {
                folders.push(name[1..].to_owned());
            }
        }

        folders.sort();
        Ok(folders)
    }

    fn delete_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error> {
        let target = self.folder(mailbox, folder)?;
        if !target.exists() {
            return Err(Error::NxFolder);
        }

        self.deletions.forget(&DeletionKey::folder(mailbox, folder));
        fs::remove_dir_all(target.path()).on_not_found(Error::NxFolder)?;
        info!(
            "{} Deleted folder {} in {}",
            self.log_prefix, folder, mailbox
        );
        Ok(())
    }

    fn rename_folder(
        &self,
        mailbox: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), Error> {
        let src = self.folder(mailbox, old_name)?;
        let dst = self.folder(mailbox, new_name)?;

        if !src.exists() {
            return Err(Error::NxFolder);
        }
        if dst.exists() {
            return Err(Error::FolderExists);
        }

        fs::rename(src.path(), dst.path()).on_not_found(Error::NxFolder)?;
        self.deletions.transplant(
            &DeletionKey::folder(mailbox, old_name),
            DeletionKey::folder(mailbox, new_name),
        );
        info!(
            "{} Renamed folder {} to {} in {}",
            self.log_prefix, old_name, new_name, mailbox
        );
        Ok(())
    }

    fn list_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
    ) -> Result<Vec<MessageInfo>, Error> {
        let target = self.folder(mailbox, folder)?;
        if !target.exists() {
            return Err(Error::NxFolder);
        }

        self.list_dir(&target, &DeletionKey::folder(mailbox, folder))
    }

    fn retrieve_from_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
    ) -> Result<Box<dyn Read + Send>, Error> {
        let target = self.folder(mailbox, folder)?;
        self.retrieve_from(
            &target,
            &DeletionKey::folder(mailbox, folder),
            uid,
            Error::NxFolder,
        )
    }

    fn delete_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
    ) -> Result<(), Error> {
        self.resolver.folder_path(mailbox, folder)?;
        self.deletions
            .mark_deleted(DeletionKey::folder(mailbox, folder), uid);
        Ok(())
    }

    fn expunge_folder(&self, mailbox: &str, folder: &str) -> Result<(), Error> {
        self.expunge_dir(
            &DeletionKey::folder(mailbox, folder),
            || self.folder(mailbox, folder),
            Error::NxFolder,
        )
    }

    fn deliver_to_folder(
        &self,
        mailbox: &str,
        folder: &str,
        message: &mut dyn Read,
    ) -> Result<String, Error> {
        let target = self.folder(mailbox, folder)?;
        let mut data = Vec::new();
        message.read_to_end(&mut data)?;

        self.ensure_target(mailbox, &target)?;
        let uid = target.deliver(&self.namer, &data)?;
        info!(
            "{} Delivered message to folder {} of {} as {}",
            self.log_prefix, folder, mailbox, uid
        );
        Ok(uid)
    }

    fn append_to_folder(
        &self,
        mailbox: &str,
        folder: &str,
        message: &mut dyn Read,
        flags: &[Flag],
        internal_date: DateTime<Utc>,
    ) -> Result<String, Error> {
        let (target, _) = self.folder_or_inbox(mailbox, folder)?;
        let mut data = Vec::new();
        message.read_to_end(&mut data)?;

        self.ensure_target(mailbox, &target)?;
        let uid =
            target.deliver_seen(&self.namer, &data, flags, Some(internal_date))?;
        info!(
            "{} Appended message to {} of {} as {}",
            self.log_prefix, folder, mailbox, uid
        );
        Ok(uid)
    }

    fn copy_message(
        &self,
        mailbox: &str,
        src_folder: &str,
        uid: &str,
        dst_folder: &str,
    ) -> Result<String, Error> {
        let src = self.existing_folder_or_inbox(mailbox, src_folder)?;
        let (dst, _) = self.folder_or_inbox(mailbox, dst_folder)?;

        self.ensure_target(mailbox, &dst)?;
        let new_uid = src.copy_to(&self.namer, uid, &dst)?;
        info!(
            "{} Copied {} from {} to {} of {} as {}",
            self.log_prefix, uid, src_folder, dst_folder, mailbox, new_uid
        );
        Ok(new_uid)
    }

    fn set_flags_in_folder(
        &self,
        mailbox: &str,
        folder: &str,
        uid: &str,
        flags: &[Flag],
    ) -> Result<(), Error> {
        self.existing_folder_or_inbox(mailbox, folder)?
            .set_flags(uid, flags)
    }

    fn uid_validity(&self, mailbox: &str, folder: &str) -> Result<u32, Error> {
        let name = if folder.eq_ignore_ascii_case("INBOX") {
            let path = self.resolver.mailbox_path(mailbox)?;
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            self.resolver.folder_path(mailbox, folder)?;
            folder.to_owned()
        };

        let name = match name.find(':') {
            Some(ix) => &name[..ix],
            None => &name[..],
        };

        Ok(match fnv1a32(name.as_bytes()) {
            0 => 1,
            v => v,
        })
    }
}

/// 32-bit FNV-1a.
fn fnv1a32(data: &[u8]) -> u32 {
    data.iter().fold(0x811c_9dc5u32, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::super::store::test::*;
    use super::*;
    use crate::store::MessageStore;

    const ALICE: &str = "alice@example.com";

    #[test]
    fn fnv_known_values() {
        assert_eq!(0x811c_9dc5, fnv1a32(b""));
        assert_eq!(0xe40c_292c, fnv1a32(b"a"));
        assert_eq!(0xbf9c_f968, fnv1a32(b"foobar"));
    }

    #[test]
    fn create_list_delete() {
        let setup = set_up();
        assert_matches!(Err(Error::NxMailbox), setup.store.list_folders(ALICE));

        setup.store.create_folder(ALICE, "Work").unwrap();
        setup.store.create_folder(ALICE, "Archive").unwrap();
        assert_matches!(
            Err(Error::FolderExists),
            setup.store.create_folder(ALICE, "Work")
        );
        assert_matches!(
            Err(Error::InvalidFolderName),
            setup.store.create_folder(ALICE, "../Work")
        );

        // A stray dot-directory without Maildir structure is not a folder
        fs::create_dir(setup.root.path().join(ALICE).join(".stray")).unwrap();

        assert_eq!(
            vec!["Archive".to_owned(), "Work".to_owned()],
            setup.store.list_folders(ALICE).unwrap()
        );

        setup.store.delete_folder(ALICE, "Work").unwrap();
        assert_matches!(
            Err(Error::NxFolder),
            setup.store.delete_folder(ALICE, "Work")
        );
        assert_eq!(
            vec!["Archive".to_owned()],
            setup.store.list_folders(ALICE).unwrap()
        );
    }

    #[test]
    fn folder_reads_require_folder() {
        let setup = set_up();
        setup.store.list(ALICE).unwrap();

        assert_matches!(
            Err(Error::NxFolder),
            setup.store.list_in_folder(ALICE, "Missing")
        );
        assert_matches!(
            Err(Error::NxFolder),
            setup.store.stat_folder(ALICE, "Missing")
        );
        assert_matches!(
            Err(Error::NxFolder),
            setup
                .store
                .retrieve_from_folder(ALICE, "Missing", "x")
                .map(|_| ())
        );
        assert_matches!(
            Err(Error::InvalidFolderName),
            setup.store.delete_in_folder(ALICE, "new", "x")
        );
    }

    #[test]
    fn folder_delete_and_expunge() {
        let setup = set_up();
        let uid = setup
            .store
            .deliver_to_folder(ALICE, "Lists", &mut Cursor::new(b"list mail"))
            .unwrap();

        let listed = setup.store.list_in_folder(ALICE, "Lists").unwrap();
        assert_eq!(1, listed.len());
        assert_eq!(uid, listed[0].uid);
        assert_eq!(vec![Flag::Recent], listed[0].flags);
        assert_eq!((1, 9), setup.store.stat_folder(ALICE, "Lists").unwrap());

        setup.store.delete_in_folder(ALICE, "Lists", &uid).unwrap();
        assert!(setup.store.list_in_folder(ALICE, "Lists").unwrap().is_empty());
        assert_matches!(
            Err(Error::MessageDeleted),
            setup
                .store
                .retrieve_from_folder(ALICE, "Lists", &uid)
                .map(|_| ())
        );
        // The inbox is unaffected by folder marks
        assert!(setup.store.list(ALICE).unwrap().is_empty());

        setup.store.expunge_folder(ALICE, "Lists").unwrap();
        assert_matches!(
            Err(Error::NxMessage),
            setup
                .store
                .retrieve_from_folder(ALICE, "Lists", &uid)
                .map(|_| ())
        );
    }

    #[test]
    fn delete_folder_forgets_marks() {
        let setup = set_up();
        let uid = setup
            .store
            .deliver_to_folder(ALICE, "Tmp1", &mut Cursor::new(b"x"))
            .unwrap();
        setup.store.delete_in_folder(ALICE, "Tmp1", &uid).unwrap();
        setup.store.delete_folder(ALICE, "Tmp1").unwrap();

        setup.store.create_folder(ALICE, "Tmp1").unwrap();
        // Nothing pending, so this does not fail even though the old
        // message is gone
        setup.store.expunge_folder(ALICE, "Tmp1").unwrap();
    }

    #[test]
    fn rename_transplants_marks() {
        let setup = set_up();
        let keep = setup
            .store
            .deliver_to_folder(ALICE, "Old", &mut Cursor::new(b"keep"))
            .unwrap();
        let gone = setup
            .store
            .deliver_to_folder(ALICE, "Old", &mut Cursor::new(b"gone"))
            .unwrap();
        setup.store.delete_in_folder(ALICE, "Old", &gone).unwrap();

        setup.store.create_folder(ALICE, "Taken").unwrap();
        assert_matches!(
            Err(Error::FolderExists),
            setup.store.rename_folder(ALICE, "Old", "Taken")
        );
        assert_matches!(
            Err(Error::NxFolder),
            setup.store.rename_folder(ALICE, "Nope", "Other")
        );

        setup.store.rename_folder(ALICE, "Old", "New").unwrap();
        assert_matches!(
            Err(Error::NxFolder),
            setup.store.list_in_folder(ALICE, "Old")
        );

        let listed = setup.store.list_in_folder(ALICE, "New").unwrap();
        assert_eq!(1, listed.len());
        assert_eq!(keep, listed[0].uid);
        assert_matches!(
            Err(Error::MessageDeleted),
            setup
                .store
                .retrieve_from_folder(ALICE, "New", &gone)
                .map(|_| ())
        );

        setup.store.expunge_folder(ALICE, "New").unwrap();
        let cur = setup.root.path().join(ALICE).join(".New/cur");
        assert_eq!(1, fs::read_dir(cur).unwrap().count());
    }

    #[test]
    fn append_with_flags_and_date() {
        let setup = set_up();
        let when = Utc.timestamp_opt(1_577_934_245, 0).unwrap();
        let uid = setup
            .store
            .append_to_folder(
                ALICE,
                "Sent",
                &mut Cursor::new(b"sent mail"),
                &[Flag::Seen, Flag::Recent, Flag::Answered],
                when,
            )
            .unwrap();

        let listed = setup.store.list_in_folder(ALICE, "Sent").unwrap();
        assert_eq!(1, listed.len());
        assert_eq!(uid, listed[0].uid);
        assert_eq!(vec![Flag::Answered, Flag::Seen], listed[0].flags);
        assert_eq!(when, listed[0].internal_date);
        assert!(setup
            .root
            .path()
            .join(ALICE)
            .join(".Sent/cur")
            .join(format!("{}:2,RS", uid))
            .is_file());

        // INBOX in any casing is the mailbox root
        let uid = setup
            .store
            .append_to_folder(ALICE, "inbox", &mut Cursor::new(b"x"), &[], when)
            .unwrap();
        let listed = setup.store.list(ALICE).unwrap();
        assert_eq!(1, listed.len());
        assert_eq!(uid, listed[0].uid);
        assert!(listed[0].flags.is_empty());
    }

    #[test]
    fn copy_between_folders() {
        let setup = set_up();
        deliver(&setup.store, &[ALICE], b"original");
        let uid = setup.store.list(ALICE).unwrap()[0].uid.clone();
        setup
            .store
            .set_flags_in_folder(ALICE, "INBOX", &uid, &[Flag::Flagged])
            .unwrap();

        let copy = setup
            .store
            .copy_message(ALICE, "INBOX", &uid, "Keep")
            .unwrap();
        assert_ne!(uid, copy);

        let listed = setup.store.list_in_folder(ALICE, "Keep").unwrap();
        assert_eq!(1, listed.len());
        assert_eq!(vec![Flag::Flagged], listed[0].flags);
        assert_eq!(
            b"original".to_vec(),
            read_all(
                setup
                    .store
                    .retrieve_from_folder(ALICE, "Keep", &copy)
                    .unwrap()
            )
        );

        // Source unchanged
        assert_eq!(
            b"original".to_vec(),
            read_all(setup.store.retrieve(ALICE, &uid).unwrap())
        );

        assert_matches!(
            Err(Error::NxMessage),
            setup.store.copy_message(ALICE, "INBOX", "missing", "Keep")
        );
        assert_matches!(
            Err(Error::NxFolder),
            setup.store.copy_message(ALICE, "Nowhere", &uid, "Keep")
        );
    }

    #[test]
    fn copy_of_unseen_message_stays_new() {
        let setup = set_up();
        let uid = setup
            .store
            .deliver_to_folder(ALICE, "In", &mut Cursor::new(b"fresh"))
            .unwrap();
        let copy = setup.store.copy_message(ALICE, "In", &uid, "Out").unwrap();

        let listed = setup.store.list_in_folder(ALICE, "Out").unwrap();
        assert_eq!(copy, listed[0].uid);
        assert_eq!(vec![Flag::Recent], listed[0].flags);
    }

    #[test]
    fn set_flags() {
        let setup = set_up();
        let uid = setup
            .store
            .deliver_to_folder(ALICE, "Work", &mut Cursor::new(b"x"))
            .unwrap();

        // Still in new/
        setup
            .store
            .set_flags_in_folder(ALICE, "Work", &uid, &[Flag::Seen, Flag::Draft])
            .unwrap();
        let listed = setup.store.list_in_folder(ALICE, "Work").unwrap();
        assert_eq!(vec![Flag::Draft, Flag::Seen], listed[0].flags);

        // Now in cur/
        setup
            .store
            .set_flags_in_folder(ALICE, "Work", &uid, &[])
            .unwrap();
        let listed = setup.store.list_in_folder(ALICE, "Work").unwrap();
        assert!(listed[0].flags.is_empty());

        assert_matches!(
            Err(Error::NxMessage),
            setup.store.set_flags_in_folder(ALICE, "Work", "missing", &[])
        );
        assert_matches!(
            Err(Error::NxMailbox),
            setup
                .store
                .set_flags_in_folder("nobody@example.com", "INBOX", &uid, &[])
        );
    }

    #[test]
    fn uid_validity() {
        let setup = set_up();
        let a = setup.store.uid_validity(ALICE, "Archive").unwrap();
        let b = setup.store.uid_validity(ALICE, "Archive").unwrap();
        let c = setup.store.uid_validity(ALICE, "Work").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(0, a);
        assert_eq!(fnv1a32(b"Archive"), a);

        // Doesn't depend on the folder existing, nor on the mailbox
        assert_eq!(
            a,
            setup
                .store
                .uid_validity("bob@example.com", "Archive")
                .unwrap()
        );

        assert_eq!(
            fnv1a32(ALICE.as_bytes()),
            setup.store.uid_validity(ALICE, "INBOX").unwrap()
        );
        assert_eq!(
            setup.store.uid_validity(ALICE, "INBOX").unwrap(),
            setup.store.uid_validity(ALICE, "Inbox").unwrap()
        );
        assert_matches!(
            Err(Error::InvalidFolderName),
            setup.store.uid_validity(ALICE, "../x")
        );
    }

    #[test]
    fn uid_validity_of_inbox_uses_final_path_element() {
        let setup = set_up_with("Maildir", "{domain}/{localpart}");
        assert_eq!(
            fnv1a32(b"Maildir"),
            setup.store.uid_validity(ALICE, "INBOX").unwrap()
        );
    }
}
