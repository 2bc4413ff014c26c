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

/// The maximum length, in bytes, of a folder name.
pub const MAX_FOLDER_NAME_LEN: usize = 255;

/// Determine whether the given name is "safe" to use as a single file name
/// element, such as a user name turned into a key file name.
///
/// It excludes empty names and patterns that cause directory traversal or
/// the creation of hidden files, as well as control characters.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty() &&
        // Block directory traversal through .. and creation of hidden files on
        // UNIX
        name.chars().next() != Some('.') &&
        name.find('/').is_none() &&
        // Only a path separator on Windows, but always block since it has high
        // potential of causing problems
        name.find('\\').is_none() &&
        // Don't allow any ASCII control characters
        name.find(|c| c < ' ' || c == '\x7F').is_none()
}

/// Determine whether `name` may be used as a Maildir++ folder name.
///
/// Folder names are far more restricted than general names, since they
/// become `.name` directories right next to the `new`, `cur` and `tmp`
/// delivery directories: only ASCII alphanumerics, `-` and `_` are allowed,
/// and the delivery directory names themselves are reserved in any case.
pub fn is_valid_folder_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_FOLDER_NAME_LEN
        && !name.starts_with('.')
        && !["new", "cur", "tmp"]
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(name))
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b'-' == b || b'_' == b)
}
