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

//! Miscellaneous functions for working with files.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;

use chrono::prelude::*;
use nix::sys::time::{TimeVal, TimeValLike};

use crate::support::error::Error;

/// Write `data` into a new file named exactly `name` inside `tmp`, and flush
/// it to stable storage.
///
/// The file is created exclusively, so this fails with `AlreadyExists` if
/// something with that name is already staged. The returned handle removes
/// the staged file when dropped unless it is persisted first.
pub fn stage(
    tmp: impl AsRef<Path>,
    name: &str,
    mode: u32,
    data: &[u8],
) -> io::Result<tempfile::NamedTempFile> {
    let mut tf = tempfile::Builder::new()
        .prefix(name)
        .suffix("")
        .rand_bytes(0)
        .tempfile_in(tmp)?;
    tf.as_file_mut().write_all(data)?;
    chmod(tf.path(), mode)?;
    tf.as_file_mut().sync_all()?;
    Ok(tf)
}

/// Write `data` into the file at `path`, atomically.
///
/// The file will first be staged within `tmp`.
///
/// If `overwrite` is true, this will replace anything already at `path`. If
/// false, the call will fail if `path` already exists.
pub fn spit(
    tmp: impl AsRef<Path>,
    path: impl AsRef<Path>,
    overwrite: bool,
    mode: u32,
    data: &[u8],
) -> io::Result<()> {
    let mut tf = tempfile::NamedTempFile::new_in(tmp)?;
    tf.as_file_mut().write_all(data)?;
    chmod(tf.path(), mode)?;
    tf.as_file_mut().sync_all()?;
    if overwrite {
        tf.persist(path)?;
    } else {
        tf.persist_noclobber(path)?;
    }
    Ok(())
}

/// Create `path` and any missing parents with the given mode.
pub fn mkdirs(path: impl AsRef<Path>, mode: u32) -> io::Result<()> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(path)
}

pub fn chmod(path: impl AsRef<Path>, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Set both the access and modification time of `path` to `when`.
pub fn set_times(
    path: impl AsRef<Path>,
    when: DateTime<Utc>,
) -> Result<(), Error> {
    let tv = TimeVal::microseconds(
        when.timestamp() * 1_000_000 + i64::from(when.timestamp_subsec_micros()),
    );
    nix::sys::stat::utimes(path.as_ref(), &tv, &tv)?;
    Ok(())
}

pub trait IgnoreKinds {
    fn ignore_already_exists(self) -> Self;
    fn ignore_not_found(self) -> Self;
}

impl<R: Default> IgnoreKinds for Result<R, io::Error> {
    fn ignore_already_exists(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::AlreadyExists == e.kind() => {
                Ok(R::default())
            }
            Err(e) => Err(e),
        }
    }

    fn ignore_not_found(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(R::default()),
            Err(e) => Err(e),
        }
    }
}

pub trait ErrorTransforms {
    type Coerced;
    fn on_exists(self, error: Error) -> Self::Coerced;
    fn on_not_found(self, error: Error) -> Self::Coerced;
}

impl<R, E: Into<Error>> ErrorTransforms for Result<R, E> {
    type Coerced = Result<R, Error>;

    fn on_exists(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::AlreadyExists == e.kind() => {
                Err(error)
            }
            Err(Error::Nix(nix::Error::Sys(nix::errno::Errno::EEXIST))) => {
                Err(error)
            }
            s => s,
        }
    }

    fn on_not_found(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::NotFound == e.kind() => {
                Err(error)
            }
            Err(Error::Nix(nix::Error::Sys(nix::errno::Errno::ENOENT))) => {
                Err(error)
            }
            s => s,
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    #[test]
    fn stage_is_exclusive_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let staged = stage(dir.path(), "one", 0o600, b"hello").unwrap();
        assert_eq!(dir.path().join("one"), staged.path());
        assert_eq!(b"hello", &fs::read(staged.path()).unwrap()[..]);

        let err = stage(dir.path(), "one", 0o600, b"again").unwrap_err();
        assert_eq!(io::ErrorKind::AlreadyExists, err.kind());

        drop(staged);
        assert!(!dir.path().join("one").exists());
    }

    #[test]
    fn spit_noclobber() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        spit(dir.path(), &target, false, 0o600, b"first").unwrap();
        let err =
            spit(dir.path(), &target, false, 0o600, b"second").unwrap_err();
        assert_eq!(io::ErrorKind::AlreadyExists, err.kind());
        spit(dir.path(), &target, true, 0o600, b"third").unwrap();
        assert_eq!(b"third", &fs::read(&target).unwrap()[..]);
    }

    #[test]
    fn error_transforms() {
        let r: io::Result<()> =
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_matches!(Err(Error::NxFolder), r.on_not_found(Error::NxFolder));

        let r: io::Result<()> =
            Err(io::Error::new(io::ErrorKind::AlreadyExists, "there"));
        assert_matches!(
            Err(Error::FolderExists),
            r.on_exists(Error::FolderExists)
        );

        let r: io::Result<u32> =
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(0, r.ignore_not_found().unwrap());
    }

    #[test]
    fn set_times_changes_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();
        let when = Utc.timestamp_opt(1_577_934_245, 0).unwrap();
        set_times(&path, when).unwrap();
        let mtime: DateTime<Utc> =
            fs::metadata(&path).unwrap().modified().unwrap().into();
        assert_eq!(when, mtime);
    }
}
