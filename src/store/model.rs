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

//! Data types shared between the storage backends and their callers.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::prelude::*;

use crate::support::error::Error;

/// A message flag.
///
/// `Display` produces the IMAP system flag form (e.g. `\Seen`). `FromStr`
/// does the reverse conversion, and also understands non-standard casing.
///
/// `Recent` is only ever reported by listing; it is never stored.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    Recent,
    Draft,
    Flagged,
    Answered,
    Seen,
    Deleted,
}

impl Flag {
    /// Return the single-character code used for this flag in the info
    /// suffix of Maildir file names, if it has one.
    pub fn maildir_code(self) -> Option<char> {
        match self {
            Flag::Recent => None,
            Flag::Draft => Some('D'),
            Flag::Flagged => Some('F'),
            Flag::Answered => Some('R'),
            Flag::Seen => Some('S'),
            Flag::Deleted => Some('T'),
        }
    }

    /// The inverse of `maildir_code()`.
    ///
    /// Unknown codes (e.g. `P`, "passed", or lower-case keyword codes) map to
    /// `None`.
    pub fn from_maildir_code(code: char) -> Option<Self> {
        match code {
            'D' => Some(Flag::Draft),
            'F' => Some(Flag::Flagged),
            'R' => Some(Flag::Answered),
            'S' => Some(Flag::Seen),
            'T' => Some(Flag::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Flag::Recent => write!(f, "\\Recent"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Deleted => write!(f, "\\Deleted"),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.eq_ignore_ascii_case("\\recent") {
            Ok(Flag::Recent)
        } else if s.eq_ignore_ascii_case("\\draft") {
            Ok(Flag::Draft)
        } else if s.eq_ignore_ascii_case("\\flagged") {
            Ok(Flag::Flagged)
        } else if s.eq_ignore_ascii_case("\\answered") {
            Ok(Flag::Answered)
        } else if s.eq_ignore_ascii_case("\\seen") {
            Ok(Flag::Seen)
        } else if s.eq_ignore_ascii_case("\\deleted") {
            Ok(Flag::Deleted)
        } else {
            Err(Error::NxFlag)
        }
    }
}

/// Metadata about a stored message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageInfo {
    /// The identifier of the message within its mailbox or folder.
    ///
    /// This is the unique part of the file name the message was delivered
    /// under, and never changes.
    pub uid: String,
    /// The size of the stored message in bytes.
    pub size: u64,
    /// Flags, with `Recent` first if present, then the rest in Maildir code
    /// order.
    pub flags: Vec<Flag>,
    /// When the message was stored (or the date given to append).
    pub internal_date: DateTime<Utc>,
}

/// Metadata about message encryption, carried through delivery.
///
/// The storage backends never encrypt or decrypt; this only records what
/// the caller already did to the bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionInfo {
    /// Identifies the algorithm, e.g. `x25519-xsalsa20-poly1305`.
    pub algorithm: String,
    pub encrypted: bool,
}

/// The envelope of a message being delivered.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// The reverse path (`MAIL FROM`).
    pub from: String,
    /// The forward paths (`RCPT TO`).
    pub recipients: Vec<String>,
    pub received_time: DateTime<Utc>,
    pub client_ip: Option<IpAddr>,
    /// The name given in `HELO`/`EHLO`.
    pub client_hostname: String,
    /// `None` for plaintext messages.
    pub encryption: Option<EncryptionInfo>,
}

impl Envelope {
    /// An envelope received right now from no particular client.
    pub fn new(from: impl Into<String>, recipients: Vec<String>) -> Self {
        Envelope {
            from: from.into(),
            recipients,
            received_time: Utc::now(),
            client_ip: None,
            client_hostname: String::new(),
            encryption: None,
        }
    }
}

/// A recipient address split into its base address and subaddress
/// extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    /// The address without any `+extension`, e.g. `user@example.com`.
    pub address: String,
    /// The subaddress extension, empty if there is none.
    pub extension: String,
}

impl Recipient {
    /// Split `email` at the last `@` into local part and domain, then split
    /// the local part at its first `+`.
    ///
    /// - `user+folder@example.com` → `user@example.com` + `folder`
    /// - `user@example.com` → `user@example.com` + ``
    /// - `localuser` → `localuser` + ``
    pub fn parse(email: &str) -> Self {
        let (localpart, domain) = match email.rfind('@') {
            Some(ix) => email.split_at(ix),
            None => (email, ""),
        };

        let (base, extension) = match localpart.find('+') {
            Some(ix) => (&localpart[..ix], &localpart[ix + 1..]),
            None => (localpart, ""),
        };

        Recipient {
            address: format!("{}{}", base, domain),
            extension: extension.to_owned(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flag_strings() {
        assert_eq!("\\Seen", Flag::Seen.to_string());
        assert_eq!("\\Recent", Flag::Recent.to_string());
        assert_eq!(Flag::Answered, "\\ANSWERED".parse::<Flag>().unwrap());
        assert_eq!(Flag::Deleted, "\\deleted".parse::<Flag>().unwrap());
        assert_matches!(Err(Error::NxFlag), "\\Junk".parse::<Flag>());
        assert_matches!(Err(Error::NxFlag), "Seen".parse::<Flag>());
    }

    #[test]
    fn maildir_codes() {
        for &flag in &[
            Flag::Draft,
            Flag::Flagged,
            Flag::Answered,
            Flag::Seen,
            Flag::Deleted,
        ] {
            assert_eq!(
                Some(flag),
                Flag::from_maildir_code(flag.maildir_code().unwrap())
            );
        }
        assert_eq!(None, Flag::Recent.maildir_code());
        assert_eq!(None, Flag::from_maildir_code('P'));
        assert_eq!(None, Flag::from_maildir_code('a'));
    }

    #[test]
    fn flag_order_matches_code_order() {
        let mut flags = vec![
            Flag::Deleted,
            Flag::Seen,
            Flag::Answered,
            Flag::Flagged,
            Flag::Draft,
        ];
        flags.sort();
        let codes: String =
            flags.iter().filter_map(|f| f.maildir_code()).collect();
        assert_eq!("DFRST", codes);
    }

    #[test]
    fn parse_recipient() {
        fn check(input: &str, address: &str, extension: &str) {
            assert_eq!(
                Recipient {
                    address: address.to_owned(),
                    extension: extension.to_owned(),
                },
                Recipient::parse(input),
                "input: {}",
                input
            );
        }

        check("user@example.com", "user@example.com", "");
        check("user+folder@example.com", "user@example.com", "folder");
        check("user+a+b@example.com", "user@example.com", "a+b");
        check("user+@example.com", "user@example.com", "");
        check("localuser", "localuser", "");
        check("local+ext", "local", "ext");
        check("we@ird@example.com", "we@ird@example.com", "");
        check("", "", "");
    }
}
