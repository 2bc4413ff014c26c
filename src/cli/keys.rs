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

use log::info;

use super::main::KeygenSubcommand;
use crate::account::key_store::KeyStore;
use crate::support::error::Error;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

pub(super) fn keygen(system_config: SystemConfig, cmd: KeygenSubcommand) {
    let key_dir = match system_config.keys.key_dir {
        Some(ref key_dir) => key_dir.clone(),
        None => die!(EX_CONFIG, "keys.key_dir is not configured"),
    };

    let password = match rpassword::prompt_password_stderr("Password: ")
        .and_then(|a| {
            rpassword::prompt_password_stderr("Confirm: ").map(|b| (a, b))
        }) {
        Err(e) => die!(EX_NOINPUT, "Failed to read password: {}", e),
        Ok((a, b)) if a != b => die!(EX_DATAERR, "Passwords don't match"),
        Ok((a, _)) if a.is_empty() => die!(EX_NOINPUT, "No password given"),
        Ok((a, _)) => a,
    };

    let keys = KeyStore::new(key_dir);
    match keys.generate(&cmd.user, password.as_bytes()) {
        Ok(_) => {
            info!("Generated key pair for '{}'", cmd.user);
            if !system_config.keys.encrypt_delivery {
                eprintln!(
                    "Note: keys.encrypt_delivery is off, so mail to '{}' \
                     will not be encrypted yet.",
                    cmd.user
                );
            }
        }
        Err(Error::UnsafeName) => {
            die!(EX_USAGE, "Invalid user name: {}", cmd.user)
        }
        Err(Error::KeyExists) => {
            die!(EX_CANTCREAT, "'{}' already has a key", cmd.user)
        }
        Err(e) => die!(Sysexit::from(&e), "Failed to generate key: {}", e),
    }
}
