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

//! Mapping of mailbox identifiers and folder names to filesystem paths.
//!
//! A mailbox identifier is turned into a path relative to the storage base by
//! the configured path template, then an optional fixed subdirectory is
//! appended. Folders are Maildir++ `.name` directories directly inside the
//! mailbox directory.
//!
//! Identifiers whose expansion is absolute or contains a `..` element are
//! rejected outright, even if they would land inside the base, so that no two
//! spellings name the same mailbox. Beyond that, every path this module hands
//! out is a strict descendant of the base directory after lexical
//! normalisation. Anything that would resolve to the base itself or outside
//! it is rejected with `Error::PathTraversal`; it is never clamped into the
//! base.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

use crate::support::error::Error;
use crate::support::safe_name::is_valid_folder_name;
use crate::support::system_config::StoreConfig;

#[derive(Clone, Debug)]
pub struct MailboxPathResolver {
    base_path: PathBuf,
    maildir_subdir: String,
    path_template: String,
}

impl MailboxPathResolver {
    pub fn new(
        base_path: impl AsRef<Path>,
        maildir_subdir: impl Into<String>,
        path_template: impl Into<String>,
    ) -> Self {
        MailboxPathResolver {
            base_path: normalize(base_path.as_ref()),
            maildir_subdir: maildir_subdir.into(),
            path_template: path_template.into(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        MailboxPathResolver::new(
            &config.base_path,
            config.maildir_subdir.clone(),
            config.path_template.clone(),
        )
    }

    /// The normalised base directory.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Apply the path template to `mailbox`.
    fn expand<'a>(&self, mailbox: &'a str) -> Cow<'a, str> {
        if self.path_template.is_empty() {
            return Cow::Borrowed(mailbox);
        }

        let (localpart, domain) = match mailbox.rfind('@') {
            Some(ix) => (&mailbox[..ix], &mailbox[ix + 1..]),
            None => (mailbox, ""),
        };

        Cow::Owned(
            self.path_template
                .replace("{domain}", domain)
                .replace("{localpart}", localpart)
                .replace("{email}", mailbox),
        )
    }

    /// Return the directory holding the Maildir structure of the inbox of
    /// `mailbox`.
    pub fn mailbox_path(&self, mailbox: &str) -> Result<PathBuf, Error> {
        let expanded = self.expand(mailbox);
        if escapes(&expanded) || escapes(&self.maildir_subdir) {
            return Err(Error::PathTraversal);
        }

        let mut candidate = self.base_path.clone();
        push_relative(&mut candidate, &expanded);
        push_relative(&mut candidate, &self.maildir_subdir);

        let candidate = normalize(&candidate);
        if is_strict_descendant(&candidate, &self.base_path) {
            Ok(candidate)
        } else {
            Err(Error::PathTraversal)
        }
    }

    /// Return the directory holding the Maildir structure of `folder` within
    /// `mailbox`.
    ///
    /// The folder name is validated before anything else happens.
    pub fn folder_path(
        &self,
        mailbox: &str,
        folder: &str,
    ) -> Result<PathBuf, Error> {
        if !is_valid_folder_name(folder) {
            return Err(Error::InvalidFolderName);
        }

        let mailbox_path = self.mailbox_path(mailbox)?;
        let candidate = normalize(&mailbox_path.join(format!(".{}", folder)));
        if is_strict_descendant(&candidate, &mailbox_path) {
            Ok(candidate)
        } else {
            Err(Error::PathTraversal)
        }
    }
}

/// Whether `rel` is absolute or has a `..` element.
fn escapes(rel: &str) -> bool {
    rel.starts_with('/') || rel.split('/').any(|element| ".." == element)
}

/// Append each `/`-separated element of `rel` to `path`.
///
/// Unlike `PathBuf::push`, an absolute `rel` does not replace `path`.
fn push_relative(path: &mut PathBuf, rel: &str) {
    for element in rel.split('/') {
        if !element.is_empty() {
            path.push(element);
        }
    }
}

/// Lexically normalise `path`, folding `.` and `..` elements without
/// touching the filesystem.
///
/// `..` at the root stays at the root; leading `..` elements of a relative
/// path are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                out.push(component.as_os_str())
            }
            Component::CurDir => (),
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(name) => {
                out.push(name);
                depth += 1;
            }
        }
    }

    out
}

/// Whether `path` lies strictly below `base`, comparing whole components so
/// that `/base-other` is not considered to be under `/base`.
fn is_strict_descendant(path: &Path, base: &Path) -> bool {
    path != base && path.starts_with(base)
}
