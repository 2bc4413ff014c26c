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

use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use structopt::StructOpt;

use crate::account::key_store::KeyStore;
use crate::store::registry::builtin_stores;
use crate::store::MsgStore;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    Deliver(DeliverSubcommand),
    List(ListSubcommand),
    Retrieve(RetrieveSubcommand),
    Folder(FolderSubcommand),
    Keygen(KeygenSubcommand),
}

impl Command {
    fn common_options(&mut self) -> CommonOptions {
        match *self {
            Command::Deliver(ref mut c) => mem::take(&mut c.common),
            Command::List(ref mut c) => mem::take(&mut c.common),
            Command::Retrieve(ref mut c) => mem::take(&mut c.common),
            Command::Folder(FolderSubcommand::Create(ref mut c))
            | Command::Folder(FolderSubcommand::Delete(ref mut c)) => {
                mem::take(&mut c.common)
            }
            Command::Folder(FolderSubcommand::Rename(ref mut c)) => {
                mem::take(&mut c.common)
            }
            Command::Folder(FolderSubcommand::List(ref mut c)) => {
                mem::take(&mut c.common)
            }
            Command::Keygen(ref mut c) => mem::take(&mut c.common),
        }
    }
}

#[derive(StructOpt, Default)]
pub(super) struct CommonOptions {
    /// The directory containing `msgstore.toml` etc
    /// [default: /etc/msgstore or /usr/local/etc/msgstore]
    #[structopt(long, parse(from_os_str))]
    root: Option<PathBuf>,
}

/// Deliver a message read from standard input.
///
/// This is intended to be used as the local delivery agent of an MTA. The
/// exit code follows `sysexits.h`, so temporary failures are retried and
/// permanent ones bounced.
///
/// If `keys.encrypt_delivery` is enabled in the configuration, the message is
/// encrypted separately for each recipient with a key in `keys.key_dir`.
#[derive(StructOpt)]
pub(super) struct DeliverSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// The envelope sender.
    #[structopt(long, short, default_value = "MAILER-DAEMON")]
    pub(super) from: String,

    /// The recipient addresses. `user+folder@domain` delivers into `folder`
    /// if it exists.
    #[structopt(required = true)]
    pub(super) recipients: Vec<String>,
}

/// List the messages in a mailbox.
///
/// Each line gives the UID, size, internal date and flags of one message.
#[derive(StructOpt)]
pub(super) struct ListSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// List this folder instead of the inbox.
    #[structopt(long, short)]
    pub(super) folder: Option<String>,

    pub(super) mailbox: String,
}

/// Write a message to standard output.
#[derive(StructOpt)]
pub(super) struct RetrieveSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// Retrieve from this folder instead of the inbox.
    #[structopt(long, short)]
    pub(super) folder: Option<String>,

    /// Decrypt the message. Prompts for the password of the key owner.
    #[structopt(long, short)]
    pub(super) decrypt: bool,

    /// The user whose key to decrypt with
    /// [default: the local part of MAILBOX]
    #[structopt(long, short)]
    pub(super) user: Option<String>,

    pub(super) mailbox: String,
    pub(super) uid: String,
}

/// Manage the folders of a mailbox.
#[derive(StructOpt)]
pub(super) enum FolderSubcommand {
    /// Create a new, empty folder.
    Create(FolderNameOptions),
    /// Delete a folder and everything in it.
    Delete(FolderNameOptions),
    /// Rename a folder.
    Rename(FolderRenameOptions),
    /// List the folders of a mailbox.
    List(FolderListOptions),
}

#[derive(StructOpt)]
pub(super) struct FolderNameOptions {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    pub(super) mailbox: String,
    pub(super) folder: String,
}

#[derive(StructOpt)]
pub(super) struct FolderRenameOptions {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    pub(super) mailbox: String,
    pub(super) old_name: String,
    pub(super) new_name: String,
}

#[derive(StructOpt)]
pub(super) struct FolderListOptions {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    pub(super) mailbox: String,
}

/// Generate an encryption key pair for a user.
///
/// The private key is protected with a password, which is prompted for.
/// Once the key exists, mail delivered to the user is encrypted if
/// `keys.encrypt_delivery` is enabled.
///
/// There is no way to recover the private key without the password. If it
/// is forgotten, all mail encrypted to the key is lost.
#[derive(StructOpt)]
pub(super) struct KeygenSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// The user name, i.e. the local part of the user's address.
    pub(super) user: String,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let mut cmd = Command::from_clap(&match Command::clap().get_matches_safe()
    {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    let common = cmd.common_options();
    let root = common.root.unwrap_or_else(|| {
        if Path::new("/etc/msgstore/msgstore.toml").is_file() {
            "/etc/msgstore".to_owned().into()
        } else if Path::new("/usr/local/etc/msgstore/msgstore.toml").is_file()
        {
            "/usr/local/etc/msgstore".to_owned().into()
        } else {
            die!(
                EX_CONFIG,
                "Neither /etc/msgstore nor /usr/local/etc/msgstore looks like\n\
                 the msgstore root; use --root=/path/to/msgstore if your\n\
                 installation is elsewhere."
            )
        }
    });

    let system_config_path = root.join("msgstore.toml");
    let system_config = match SystemConfig::load(&system_config_path) {
        Ok(config) => config,
        Err(e) => die!(
            EX_CONFIG,
            "Error loading '{}': {}",
            system_config_path.display(),
            e
        ),
    };

    init_logging(&root);

    match cmd {
        Command::Deliver(cmd) => super::deliver::deliver(system_config, cmd),
        Command::List(cmd) => super::mailbox::list(system_config, cmd),
        Command::Retrieve(cmd) => super::mailbox::retrieve(system_config, cmd),
        Command::Folder(cmd) => super::mailbox::folder(system_config, cmd),
        Command::Keygen(cmd) => super::keys::keygen(system_config, cmd),
    }
}

fn init_logging(root: &Path) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        if let Err(e) = crate::init_simple_log(log::LevelFilter::Info) {
            die!(EX_SOFTWARE, "Failed to initialise logging: {}", e);
        }
        return;
    }

    // log4rs and syslog can't be combined, so a logging configuration
    // replaces syslog entirely.
    let log_config_file = root.join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::config::Deserializers::new(),
        ) {
            die!(
                EX_CONFIG,
                "Error in logging configuration '{}': {}",
                log_config_file.display(),
                e
            );
        }
    } else {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_owned(),
            pid: nix::unistd::getpid().as_raw(),
        };

        match syslog::unix(formatter) {
            Ok(logger) => {
                if log::set_boxed_logger(Box::new(syslog::BasicLogger::new(
                    logger,
                )))
                .is_ok()
                {
                    log::set_max_level(log::LevelFilter::Info);
                }
            }
            // Keep going; an MTA would rather have the mail delivered
            // unlogged than bounced.
            Err(e) => eprintln!("Failed to connect to syslog: {}", e),
        }
    }
}

/// Open the configured message store, exiting on failure.
pub(super) fn open_store(config: &SystemConfig) -> Arc<dyn MsgStore> {
    match builtin_stores().and_then(|stores| stores.open(&config.store)) {
        Ok(store) => store,
        Err(e) => die!(
            Sysexit::from(&e),
            "Unable to open '{}' store at '{}': {}",
            config.store.store_type,
            config.store.base_path.display(),
            e
        ),
    }
}

/// Return the key store, if one is configured.
///
/// A configured but missing key directory is treated as "no keys", so that
/// delivery keeps working before the first key is generated.
pub(super) fn key_store(config: &SystemConfig) -> Option<KeyStore> {
    let key_dir = config.keys.key_dir.as_ref()?;
    if !key_dir.is_dir() {
        warn!("Key directory '{}' does not exist", key_dir.display());
        return None;
    }

    Some(KeyStore::new(key_dir.clone()))
}
