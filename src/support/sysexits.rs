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

//! Exit codes from `sysexits.h`
//!
//! An MTA invoking `msgstore deliver` as its local delivery agent decides
//! between bouncing and retrying based on these.

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_NOUSER: Sysexit = Sysexit(67);
pub const EX_UNAVAILABLE: Sysexit = Sysexit(69);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_CANTCREAT: Sysexit = Sysexit(73);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_TEMPFAIL: Sysexit = Sysexit(75);
pub const EX_NOPERM: Sysexit = Sysexit(77);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }
}

impl From<&crate::support::error::Error> for Sysexit {
    fn from(e: &crate::support::error::Error) -> Self {
        use crate::support::error::Error;

        match *e {
            Error::PathTraversal
            | Error::UnsafeName
            | Error::NxMailbox
            | Error::NxUser => EX_NOUSER,
            Error::InvalidFolderName | Error::NoRecipients => EX_USAGE,
            Error::NxFolder | Error::NxMessage | Error::MessageDeleted => {
                EX_NOINPUT
            }
            Error::FolderExists | Error::KeyExists => EX_CANTCREAT,
            Error::DecryptionFailed
            | Error::BadWrappedKey
            | Error::BadKeyLength { .. } => EX_DATAERR,
            Error::KeyUnwrapFailed | Error::AuthFailed => EX_NOPERM,
            Error::NxKey => EX_UNAVAILABLE,
            Error::BadConfig(_) | Error::NxBackend => EX_CONFIG,
            Error::Io(_) | Error::Nix(_) => EX_TEMPFAIL,
            _ => EX_SOFTWARE,
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use super::*;
    use crate::support::error::Error;

    #[test]
    fn io_errors_are_temporary() {
        let e = Error::Io(io::Error::new(io::ErrorKind::Other, "disk"));
        assert_eq!(EX_TEMPFAIL, Sysexit::from(&e));
        assert_eq!(EX_NOUSER, Sysexit::from(&Error::PathTraversal));
        assert_eq!(EX_DATAERR, Sysexit::from(&Error::DecryptionFailed));
    }
}
