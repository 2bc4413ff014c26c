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

//! The Maildir++ storage backend.
//!
//! # File layout
//!
//! Given a base directory and a mailbox identifier, the mailbox lives at
//! `<base>/<expanded template>[/<maildir_subdir>]`:
//!
//! ```text
//! <mailbox>/
//!   tmp/                      staging area for deliveries
//!   new/<uid>                 delivered, not yet seen by any listing
//!   cur/<uid>:2,<flags>       seen at least once by a listing
//!   .<folder>/{tmp,new,cur}/  folders, one level deep
//! ```
//!
//! All directories are created with mode 0700 and messages with mode 0600.
//!
//! Several `MaildirStore` instances, in one or several processes, may share a
//! base directory. Delivery needs no locking at all. Deletion marks are held
//! per instance, so only the instance that marked a message will expunge it,
//! and concurrent expunges of the same container from different instances
//! are not supported.

pub mod deletion;
pub mod folders;
pub mod mailbox_path;
#[allow(clippy::module_inception)]
pub mod maildir;
pub mod store;
pub mod unique_name;


pub use self::store::MaildirStore;
