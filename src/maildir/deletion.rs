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

//! In-memory tracking of messages marked for deletion.
//!
//! Marking a message deleted hides it from this store instance until the
//! next expunge of its container, when the file is actually removed. The
//! marks are never persisted and never shared with other instances.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Identifies a container of messages: the inbox of a mailbox, or one of
/// its folders.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeletionKey {
    pub mailbox: String,
    pub folder: Option<String>,
}

impl DeletionKey {
    pub fn inbox(mailbox: &str) -> Self {
        DeletionKey {
            mailbox: mailbox.to_owned(),
            folder: None,
        }
    }

    pub fn folder(mailbox: &str, folder: &str) -> Self {
        DeletionKey {
            mailbox: mailbox.to_owned(),
            folder: Some(folder.to_owned()),
        }
    }
}

#[derive(Debug, Default)]
pub struct DeletionTracker {
    marks: Mutex<HashMap<DeletionKey, HashSet<String>>>,
}

impl DeletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_marks<R>(
        &self,
        f: impl FnOnce(&mut HashMap<DeletionKey, HashSet<String>>) -> R,
    ) -> R {
        // A panic elsewhere while holding the lock cannot leave the map in
        // an inconsistent state, so poisoning is ignored.
        let mut marks = match self.marks.lock() {
            Ok(marks) => marks,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut marks)
    }

    pub fn mark_deleted(&self, key: DeletionKey, uid: &str) {
        self.with_marks(|marks| {
            marks.entry(key).or_default().insert(uid.to_owned());
        })
    }

    pub fn is_deleted(&self, key: &DeletionKey, uid: &str) -> bool {
        self.with_marks(|marks| {
            marks.get(key).map_or(false, |uids| uids.contains(uid))
        })
    }

    /// Remove and return the set of UIDs marked in `key`.
    pub fn take_and_clear(&self, key: &DeletionKey) -> HashSet<String> {
        self.with_marks(|marks| marks.remove(key).unwrap_or_default())
    }

    /// Drop any marks in `key` without acting on them.
    pub fn forget(&self, key: &DeletionKey) {
        self.with_marks(|marks| {
            marks.remove(key);
        })
    }

    /// Move the marks in `from` to `to`, merging with anything already
    /// marked there.
    pub fn transplant(&self, from: &DeletionKey, to: DeletionKey) {
        self.with_marks(|marks| {
            if let Some(uids) = marks.remove(from) {
                marks.entry(to).or_default().extend(uids);
            }
        })
    }
}
