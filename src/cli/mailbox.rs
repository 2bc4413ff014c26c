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

use std::io::{self, Read, Write};

use super::main::{
    key_store, open_store, FolderSubcommand, ListSubcommand,
    RetrieveSubcommand,
};
use crate::gateway::encrypting::key_owner;
use crate::gateway::DecryptingStore;
use crate::store::{
    DecryptingMessageStore, FolderStore, MessageInfo, MessageStore,
};
use crate::support::error::Error;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

pub(super) fn list(system_config: SystemConfig, cmd: ListSubcommand) {
    let store = open_store(&system_config);
    let listed = match cmd.folder {
        Some(ref folder) => store.list_in_folder(&cmd.mailbox, folder),
        None => store.list(&cmd.mailbox),
    };

    match listed {
        Ok(messages) => {
            let stdout = io::stdout();
            if let Err(e) = write_listing(&mut stdout.lock(), &messages) {
                die!(EX_IOERR, "Error writing listing: {}", e);
            }
        }
        Err(e) => die!(Sysexit::from(&e), "{}: {}", cmd.mailbox, e),
    }
}

fn write_listing(
    out: &mut impl Write,
    messages: &[MessageInfo],
) -> io::Result<()> {
    for message in messages {
        let flags = message
            .flags
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            message.uid,
            message.size,
            message.internal_date.to_rfc3339(),
            flags
        )?;
    }
    out.flush()
}

pub(super) fn retrieve(system_config: SystemConfig, cmd: RetrieveSubcommand) {
    let store = DecryptingStore::new(open_store(&system_config));

    if cmd.decrypt {
        let keys = match key_store(&system_config) {
            Some(keys) => keys,
            None => die!(EX_CONFIG, "No key directory is configured"),
        };

        let user = match cmd.user {
            Some(ref user) => user.clone(),
            None => key_owner(&cmd.mailbox).to_owned(),
        };

        let password = match rpassword::prompt_password_stderr("Password: ")
        {
            Ok(password) => password,
            Err(e) => die!(EX_NOINPUT, "Failed to read password: {}", e),
        };

        match keys.unlock(&user, password.as_bytes()) {
            Ok(Some(key_pair)) => store.set_session_key(key_pair.private_key),
            Ok(None) => die!(EX_UNAVAILABLE, "{} has no private key", user),
            Err(e) => die!(Sysexit::from(&e), "Can't unlock key: {}", e),
        }
    }

    let message =
        match open_message(&store, &cmd.mailbox, cmd.folder.as_deref(), &cmd.uid)
        {
            Ok(message) => message,
            Err(e) => die!(Sysexit::from(&e), "{}: {}", cmd.uid, e),
        };
    store.clear_session_key();

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    if let Err(e) = write_message(message, &mut stdout) {
        die!(EX_IOERR, "Error writing message: {}", e);
    }
}

fn open_message(
    store: &(impl MessageStore + FolderStore),
    mailbox: &str,
    folder: Option<&str>,
    uid: &str,
) -> Result<Box<dyn Read + Send>, Error> {
    match folder {
        Some(folder) => store.retrieve_from_folder(mailbox, folder, uid),
        None => store.retrieve(mailbox, uid),
    }
}

fn write_message(
    mut message: Box<dyn Read + Send>,
    out: &mut impl Write,
) -> io::Result<()> {
    io::copy(&mut message, out)?;
    out.flush()
}

pub(super) fn folder(system_config: SystemConfig, cmd: FolderSubcommand) {
    let store = open_store(&system_config);
    let (mailbox, result) = match cmd {
        FolderSubcommand::Create(c) => {
            (c.mailbox.clone(), store.create_folder(&c.mailbox, &c.folder))
        }
        FolderSubcommand::Delete(c) => {
            (c.mailbox.clone(), store.delete_folder(&c.mailbox, &c.folder))
        }
        FolderSubcommand::Rename(c) => (
            c.mailbox.clone(),
            store.rename_folder(&c.mailbox, &c.old_name, &c.new_name),
        ),
        FolderSubcommand::List(c) => {
            let folders = match store.list_folders(&c.mailbox) {
                Ok(folders) => folders,
                Err(e) => die!(Sysexit::from(&e), "{}: {}", c.mailbox, e),
            };
            for folder in folders {
                println!("{}", folder);
            }
            (c.mailbox, Ok(()))
        }
    };

    if let Err(e) = result {
        die!(Sysexit::from(&e), "{}: {}", mailbox, e);
    }
}
