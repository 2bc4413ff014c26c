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

use std::io::{self, Read};

use log::{error, info};

use super::main::{key_store, open_store, DeliverSubcommand};
use crate::gateway::EncryptingDeliveryAgent;
use crate::store::{DeliveryAgent, Envelope};
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

pub(super) fn deliver(system_config: SystemConfig, cmd: DeliverSubcommand) {
    let store = open_store(&system_config);
    let agent: Box<dyn DeliveryAgent> = match (
        system_config.keys.encrypt_delivery,
        key_store(&system_config),
    ) {
        (true, Some(keys)) => Box::new(EncryptingDeliveryAgent::new(store, keys)),
        _ => Box::new(store),
    };

    let envelope = Envelope::new(cmd.from, cmd.recipients);
    let stdin = io::stdin();
    if let Err(exit) = run_delivery(&*agent, &envelope, stdin.lock()) {
        exit.exit();
    }
}

fn run_delivery(
    agent: &dyn DeliveryAgent,
    envelope: &Envelope,
    mut input: impl Read,
) -> Result<(), Sysexit> {
    match agent.deliver(envelope, &mut input) {
        Ok(delivered) => {
            info!(
                "Delivered message from <{}> to {} of {} recipient(s)",
                envelope.from,
                delivered,
                envelope.recipients.len()
            );
            Ok(())
        }
        Err(e) => {
            error!(
                "Unable to deliver message from <{}> to {}: {}",
                envelope.from,
                envelope.recipients.join(", "),
                e
            );
            Err(Sysexit::from(&e))
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;
    use std::sync::Arc;

    use super::*;
    use crate::account::key_store::KeyStore;
    use crate::crypt::sealed_box::decrypt_message;
    use crate::maildir::MaildirStore;
    use crate::store::MessageStore;
    use crate::support::system_config::StoreConfig;

    fn read_only(store: &MaildirStore, mailbox: &str) -> Vec<u8> {
        let listed = store.list(mailbox).unwrap();
        assert_eq!(1, listed.len());
        let mut data = Vec::new();
        store
            .retrieve(mailbox, &listed[0].uid)
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        data
    }

    #[test]
    fn delivery_with_key_store() {
        crate::init_test_log();
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(
            MaildirStore::from_config(&StoreConfig::maildir(
                root.path().join("mail"),
            ))
            .unwrap(),
        );
        let keys = KeyStore::new(root.path().join("keys"));
        let alice = keys.generate("alice", b"pw").unwrap();

        let agent = EncryptingDeliveryAgent::new(Arc::clone(&store), keys);
        let envelope = Envelope::new(
            "sender@example.org",
            vec!["alice@example.com".to_owned(), "bob@example.com".to_owned()],
        );
        run_delivery(&agent, &envelope, Cursor::new(b"hello")).unwrap();

        assert_eq!(b"hello".to_vec(), read_only(&store, "bob@example.com"));
        assert_eq!(
            b"hello".to_vec(),
            decrypt_message(
                &read_only(&store, "alice@example.com"),
                alice.private_key.expose()
            )
            .unwrap()
        );
    }

    #[test]
    fn failures_map_to_sysexits() {
        crate::init_test_log();
        let root = tempfile::tempdir().unwrap();
        let store = MaildirStore::from_config(&StoreConfig::maildir(
            root.path(),
        ))
        .unwrap();

        let envelope = Envelope::new("x@example.org", vec!["..".to_owned()]);
        assert_eq!(
            Err(EX_NOUSER),
            run_delivery(&store, &envelope, Cursor::new(b"x"))
        );
    }
}
