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

//! Operations on a single Maildir directory (`new`, `cur` and `tmp`).
//!
//! A message enters a Maildir by being written in full to a uniquely-named
//! file in `tmp`, flushed, and then moved without clobbering into `new` (or,
//! if it arrives with flags, straight into `cur`). Readers therefore never
//! see a partial message, and concurrent writers never need a lock.
//!
//! Messages in `cur` carry an info suffix, `:2,` followed by the codes of
//! their flags in ASCII order. The part of the file name before the suffix is
//! the message's UID; it never changes for the life of the message.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::prelude::*;

use crate::maildir::unique_name::UniqueNamer;
use crate::store::Flag;
use crate::support::error::Error;
use crate::support::file_ops::{self, IgnoreKinds};
use crate::support::safe_name::is_safe_name;

/// Separates the UID from the info suffix in file names under `cur`.
pub const INFO_SEPARATOR: char = ':';

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;
/// How many fresh names to try if staging hits an existing file.
const STAGE_ATTEMPTS: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    New,
    Cur,
}

impl Location {
    fn dir_name(self) -> &'static str {
        match self {
            Location::New => "new",
            Location::Cur => "cur",
        }
    }
}

/// A message file found in a Maildir.
#[derive(Clone, Debug)]
pub struct MessageFile {
    pub uid: String,
    pub path: PathBuf,
    pub location: Location,
    pub flags: Vec<Flag>,
}

#[derive(Clone, Debug)]
pub struct Maildir {
    path: PathBuf,
}

impl Maildir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Maildir { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sub(&self, location: Location) -> PathBuf {
        self.path.join(location.dir_name())
    }

    fn tmp(&self) -> PathBuf {
        self.path.join("tmp")
    }

    /// Whether this Maildir exists, judged by the presence of `cur`.
    pub fn exists(&self) -> bool {
        self.sub(Location::Cur).is_dir()
    }

    /// Create the directory and its `new`, `cur` and `tmp` children, along
    /// with any missing parents.
    ///
    /// Parts which already exist are left alone.
    pub fn create(&self) -> io::Result<()> {
        for child in &["tmp", "new", "cur"] {
            file_ops::mkdirs(self.path.join(child), DIR_MODE)?;
        }
        Ok(())
    }

    /// Create the Maildir if `cur` does not yet exist.
    pub fn ensure(&self) -> io::Result<()> {
        if self.exists() {
            Ok(())
        } else {
            self.create()
        }
    }

    /// Deliver `data` into `new`, returning the UID of the new message.
    pub fn deliver(
        &self,
        namer: &UniqueNamer,
        data: &[u8],
    ) -> Result<String, Error> {
        self.place(namer, data, None, None)
    }

    /// Deliver `data` directly into `cur` with the given flags and internal
    /// date, returning the UID of the new message.
    pub fn deliver_seen(
        &self,
        namer: &UniqueNamer,
        data: &[u8],
        flags: &[Flag],
        internal_date: Option<DateTime<Utc>>,
    ) -> Result<String, Error> {
        self.place(namer, data, Some(flags), internal_date)
    }

    fn place(
        &self,
        namer: &UniqueNamer,
        data: &[u8],
        flags: Option<&[Flag]>,
        internal_date: Option<DateTime<Utc>>,
    ) -> Result<String, Error> {
        let tmp = self.tmp();
        let mut attempt = 0;
        let (uid, staged) = loop {
            let uid = namer.next_name();
            match file_ops::stage(&tmp, &uid, FILE_MODE, data) {
                Ok(staged) => break (uid, staged),
                Err(e)
                    if io::ErrorKind::AlreadyExists == e.kind()
                        && attempt + 1 < STAGE_ATTEMPTS =>
                {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(internal_date) = internal_date {
            file_ops::set_times(staged.path(), internal_date)?;
        }

        let dst = match flags {
            None => self.sub(Location::New).join(&uid),
            Some(flags) => self.sub(Location::Cur).join(cur_name(&uid, flags)),
        };

        // On failure the staged file is dropped, and with it removed.
        staged.persist_noclobber(&dst).map_err(|e| e.error)?;
        Ok(uid)
    }

    /// Move everything in `new` into `cur` with an empty info suffix,
    /// returning the UIDs of the messages moved.
    ///
    /// Messages which vanish in the meantime (e.g. because another process
    /// moved them first) are silently skipped.
    pub fn take_new(&self) -> Result<Vec<String>, Error> {
        let new = self.sub(Location::New);
        let cur = self.sub(Location::Cur);
        let mut taken = Vec::new();

        for name in list_file_names(&new)? {
            let (uid, flags) = parse_file_name(&name);
            let uid = uid.to_owned();
            let moved =
                fs::rename(new.join(&name), cur.join(cur_name(&uid, &flags)))
                    .map(|_| true)
                    .ignore_not_found()?;
            if moved {
                taken.push(uid);
            }
        }

        Ok(taken)
    }

    /// List the messages in `cur`, sorted by UID.
    pub fn list_cur(&self) -> Result<Vec<MessageFile>, Error> {
        let cur = self.sub(Location::Cur);
        let mut messages = list_file_names(&cur)?
            .into_iter()
            .map(|name| {
                let (uid, flags) = parse_file_name(&name);
                MessageFile {
                    uid: uid.to_owned(),
                    path: cur.join(&name),
                    location: Location::Cur,
                    flags,
                }
            })
            .collect::<Vec<_>>();
        messages.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(messages)
    }

    /// Find the message with the given UID, looking first in `new`, then in
    /// `cur`.
    ///
    /// Messages only ever move from `new` to `cur`, so scanning in that order
    /// cannot miss one that another process moves concurrently. Both
    /// directories are read in full each time, so the cost is linear in the
    /// size of the Maildir.
    pub fn find(&self, uid: &str) -> Result<Option<MessageFile>, Error> {
        if !is_plausible_uid(uid) {
            return Ok(None);
        }

        for &location in &[Location::New, Location::Cur] {
            let dir = self.sub(location);
            for name in list_file_names(&dir)? {
                let (name_uid, flags) = parse_file_name(&name);
                if name_uid == uid {
                    return Ok(Some(MessageFile {
                        uid: uid.to_owned(),
                        path: dir.join(&name),
                        location,
                        flags,
                    }));
                }
            }
        }

        Ok(None)
    }

    /// Find the message with the given UID and run `f` on it.
    ///
    /// Another process may rename the file (taking it out of `new` or
    /// changing its flags) between the lookup and `f`, so if the message
    /// cannot be found or `f` fails with `NotFound`, the lookup is made once
    /// more before giving up with `NxMessage`.
    fn with_message<R>(
        &self,
        uid: &str,
        mut f: impl FnMut(&MessageFile) -> io::Result<R>,
    ) -> Result<R, Error> {
        for _ in 0..2 {
            let message = match self.find(uid)? {
                Some(message) => message,
                None => continue,
            };

            match f(&message) {
                Ok(r) => return Ok(r),
                Err(e) if io::ErrorKind::NotFound == e.kind() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::NxMessage)
    }

    /// Open the message with the given UID for reading.
    pub fn open(&self, uid: &str) -> Result<fs::File, Error> {
        self.with_message(uid, |message| fs::File::open(&message.path))
    }

    /// Replace the flags of the message with the given UID.
    ///
    /// A message still in `new` is moved to `cur` in the process.
    pub fn set_flags(&self, uid: &str, flags: &[Flag]) -> Result<(), Error> {
        let dst = self.sub(Location::Cur).join(cur_name(uid, flags));
        self.with_message(uid, |message| {
            if dst != message.path {
                fs::rename(&message.path, &dst)?;
            }
            Ok(())
        })
    }

    /// Permanently remove the message with the given UID.
    ///
    /// Returns whether anything was removed.
    pub fn remove(&self, uid: &str) -> Result<bool, Error> {
        match self.find(uid)? {
            None => Ok(false),
            Some(message) => Ok(fs::remove_file(&message.path)
                .map(|_| true)
                .ignore_not_found()?),
        }
    }

    /// Copy the message with the given UID into `dst`, returning the UID of
    /// the copy.
    ///
    /// A message in `cur` is copied into `cur` of the destination with the
    /// same flags and internal date. A message still in `new` is delivered
    /// afresh into `new` of the destination.
    pub fn copy_to(
        &self,
        namer: &UniqueNamer,
        uid: &str,
        dst: &Maildir,
    ) -> Result<String, Error> {
        let (message, data, modified) = self.with_message(uid, |message| {
            let mut file = fs::File::open(&message.path)?;
            let modified = file.metadata()?.modified()?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            Ok((message.clone(), data, modified))
        })?;

        match message.location {
            Location::New => dst.deliver(namer, &data),
            Location::Cur => dst.deliver_seen(
                namer,
                &data,
                &message.flags,
                Some(modified.into()),
            ),
        }
    }
}

/// Whether `uid` could name a message file at all.
pub fn is_plausible_uid(uid: &str) -> bool {
    is_safe_name(uid) && !uid.contains(INFO_SEPARATOR)
}

/// Format the info suffix (without the separator) for the given flags.
///
/// Flags without a Maildir code are dropped, and duplicates are collapsed.
pub fn format_info(flags: &[Flag]) -> String {
    let mut codes = flags
        .iter()
        .filter_map(|f| f.maildir_code())
        .collect::<Vec<_>>();
    codes.sort_unstable();
    codes.dedup();

    let mut info = "2,".to_owned();
    info.extend(codes);
    info
}

/// Split a file name into UID and flags.
///
/// Names without an info suffix, or with an info suffix other than the `2,`
/// kind, have no flags.
pub fn parse_file_name(name: &str) -> (&str, Vec<Flag>) {
    match name.find(INFO_SEPARATOR) {
        None => (name, Vec::new()),
        Some(ix) => {
            let info = &name[ix + 1..];
            let flags = if info.starts_with("2,") {
                let mut flags = info[2..]
                    .chars()
                    .filter_map(Flag::from_maildir_code)
                    .collect::<Vec<_>>();
                flags.sort();
                flags.dedup();
                flags
            } else {
                Vec::new()
            };
            (&name[..ix], flags)
        }
    }
}

fn cur_name(uid: &str, flags: &[Flag]) -> String {
    format!("{}{}{}", uid, INFO_SEPARATOR, format_info(flags))
}

/// List the names of the regular, non-hidden files in `dir`.
fn list_file_names(dir: &Path) -> Result<Vec<String>, Error> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }

        // Names that are not UTF-8 cannot have been delivered by us and
        // cannot be addressed by UID either.
        if let Ok(name) = entry.file_name().into_string() {
            if !name.starts_with('.') {
                names.push(name);
            }
        }
    }
    Ok(names)
}
