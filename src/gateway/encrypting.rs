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

use std::io::{Cursor, Read};

use log::{info, warn};

use crate::account::auth::KeyProvider;
use crate::crypt::sealed_box::{encrypt_message, ALGORITHM};
use crate::store::{DeliveryAgent, EncryptionInfo, Envelope};
use crate::support::error::Error;

/// Encrypts messages for recipients with encryption enabled before passing
/// them on to the wrapped agent.
///
/// Recipients without encryption (including those whose key lookup fails)
/// share a single plaintext delivery. Every encrypted recipient gets a
/// delivery of its own, since each copy is sealed under a different key.
#[derive(Debug)]
pub struct EncryptingDeliveryAgent<D, K> {
    inner: D,
    keys: K,
    log_prefix: String,
}

impl<D: DeliveryAgent, K: KeyProvider> EncryptingDeliveryAgent<D, K> {
    pub fn new(inner: D, keys: K) -> Self {
        EncryptingDeliveryAgent {
            inner,
            keys,
            log_prefix: "encrypt".to_owned(),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Look up the public key to encrypt for `recipient`, if any.
    ///
    /// Subaddressed mail lands in the owner's mailbox, so it is sealed to the
    /// owner's key.
    fn recipient_key(&self, recipient: &str) -> Option<Vec<u8>> {
        let username = key_owner(recipient);
        match self.keys.has_encryption(username) {
            Ok(true) => (),
            Ok(false) => return None,
            Err(e) => {
                warn!(
                    "{} Can't determine whether <{}> uses encryption, \
                     delivering plaintext: {}",
                    self.log_prefix, recipient, e
                );
                return None;
            }
        }

        match self.keys.get_public_key(username) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(
                    "{} No usable key for <{}>, delivering plaintext: {}",
                    self.log_prefix, recipient, e
                );
                None
            }
        }
    }

    fn deliver_encrypted(
        &self,
        envelope: &Envelope,
        recipient: &str,
        public_key: &[u8],
        data: &[u8],
    ) -> Result<usize, Error> {
        let sealed = encrypt_message(data, public_key)?;

        let mut envelope = envelope.clone();
        envelope.recipients = vec![recipient.to_owned()];
        envelope.encryption = Some(EncryptionInfo {
            algorithm: ALGORITHM.to_owned(),
            encrypted: true,
        });

        self.inner.deliver(&envelope, &mut Cursor::new(sealed))
    }
}

impl<D: DeliveryAgent, K: KeyProvider> DeliveryAgent
    for EncryptingDeliveryAgent<D, K>
{
    fn deliver(
        &self,
        envelope: &Envelope,
        message: &mut dyn Read,
    ) -> Result<usize, Error> {
        if envelope.recipients.is_empty() {
            return Err(Error::NoRecipients);
        }

        let mut data = Vec::new();
        message.read_to_end(&mut data)?;

        let mut plaintext = Vec::new();
        let mut encrypted = Vec::new();
        for recipient in &envelope.recipients {
            match self.recipient_key(recipient) {
                Some(key) => encrypted.push((recipient, key)),
                None => plaintext.push(recipient.clone()),
            }
        }

        let mut delivered = 0;
        let mut last_error = None;

        if !plaintext.is_empty() {
            let mut envelope = envelope.clone();
            envelope.recipients = plaintext;
            envelope.encryption = None;
            match self.inner.deliver(&envelope, &mut Cursor::new(&data)) {
                Ok(n) => delivered += n,
                Err(e) => {
                    warn!(
                        "{} Plaintext delivery to {} recipient(s) failed: {}",
                        self.log_prefix,
                        envelope.recipients.len(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        for (recipient, key) in encrypted {
            match self.deliver_encrypted(envelope, recipient, &key, &data) {
                Ok(n) => {
                    info!(
                        "{} Encrypted message for <{}>",
                        self.log_prefix, recipient
                    );
                    delivered += n;
                }
                Err(e) => {
                    warn!(
                        "{} Encrypted delivery for <{}> failed: {}",
                        self.log_prefix, recipient, e
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if 0 == delivered => Err(e),
            _ => Ok(delivered),
        }
    }
}

/// Return the part of `address` before the first `@`, or all of it if there
/// is none.
///
/// This is the name under which keys are looked up.
pub fn extract_username(address: &str) -> &str {
    match address.find('@') {
        Some(ix) => &address[..ix],
        None => address,
    }
}

/// Return the user whose key protects mail for `address`: the username
/// with any `+extension` removed.
pub fn key_owner(address: &str) -> &str {
    let user = extract_username(address);
    match user.find('+') {
        Some(ix) => &user[..ix],
        None => user,
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::crypt::sealed_box::decrypt_message;
    use crate::crypt::KeyPair;

    #[derive(Default)]
    struct RecordingAgent {
        calls: Mutex<Vec<(Envelope, Vec<u8>)>>,
        fail_for: Vec<String>,
    }

    impl DeliveryAgent for RecordingAgent {
        fn deliver(
            &self,
            envelope: &Envelope,
            message: &mut dyn Read,
        ) -> Result<usize, Error> {
            let mut data = Vec::new();
            message.read_to_end(&mut data)?;

            let ok = envelope
                .recipients
                .iter()
                .filter(|r| !self.fail_for.contains(*r))
                .count();
            self.calls.lock().unwrap().push((envelope.clone(), data));

            if 0 == ok {
                Err(Error::NxMailbox)
            } else {
                Ok(ok)
            }
        }
    }

    #[derive(Default)]
    struct MemoryKeys {
        keys: HashMap<String, Vec<u8>>,
        broken: Vec<String>,
    }

    impl KeyProvider for MemoryKeys {
        fn get_public_key(&self, username: &str) -> Result<Vec<u8>, Error> {
            self.keys.get(username).cloned().ok_or(Error::NxKey)
        }

        fn has_encryption(&self, username: &str) -> Result<bool, Error> {
            if self.broken.iter().any(|b| b == username) {
                Err(Error::NxUser)
            } else {
                Ok(self.keys.contains_key(username))
            }
        }
    }

    fn envelope(recipients: &[&str]) -> Envelope {
        Envelope::new(
            "sender@example.org",
            recipients.iter().map(|&r| r.to_owned()).collect(),
        )
    }

    #[test]
    fn username_extraction() {
        assert_eq!("alice", extract_username("alice@example.com"));
        assert_eq!("alice+x", extract_username("alice+x@a@b"));
        assert_eq!("localuser", extract_username("localuser"));
        assert_eq!("", extract_username("@example.com"));

        assert_eq!("alice", key_owner("alice@example.com"));
        assert_eq!("alice", key_owner("alice+lists@example.com"));
        assert_eq!("bob", key_owner("bob"));
        assert_eq!("bob", key_owner("bob+x"));
    }

    #[test]
    fn subaddresses_use_owner_key() {
        let alice = KeyPair::generate();
        let mut keys = MemoryKeys::default();
        keys.keys
            .insert("alice".to_owned(), alice.public_key.to_vec());
        let agent =
            EncryptingDeliveryAgent::new(RecordingAgent::default(), keys);

        assert_eq!(
            1,
            agent
                .deliver(
                    &envelope(&["alice+lists@example.com"]),
                    &mut Cursor::new(b"TOP SECRET"),
                )
                .unwrap()
        );

        let calls = agent.inner().calls.lock().unwrap();
        assert_eq!(1, calls.len());
        // The recipient keeps its subaddress so the store can route it
        assert_eq!(
            vec!["alice+lists@example.com".to_owned()],
            calls[0].0.recipients
        );
        assert!(calls[0].0.encryption.is_some());
        assert_eq!(
            b"TOP SECRET".to_vec(),
            decrypt_message(&calls[0].1, alice.private_key.expose()).unwrap()
        );
    }

    #[test]
    fn mixed_recipients() {
        let alice = KeyPair::generate();
        let mut keys = MemoryKeys::default();
        keys.keys
            .insert("alice".to_owned(), alice.public_key.to_vec());
        let agent =
            EncryptingDeliveryAgent::new(RecordingAgent::default(), keys);

        let delivered = agent
            .deliver(
                &envelope(&[
                    "bob@example.com",
                    "alice@example.com",
                    "carol@example.com",
                ]),
                &mut Cursor::new(b"secret"),
            )
            .unwrap();
        assert_eq!(3, delivered);

        let calls = agent.inner().calls.lock().unwrap();
        assert_eq!(2, calls.len());

        let (plain_env, plain_data) = &calls[0];
        assert_eq!(
            vec!["bob@example.com".to_owned(), "carol@example.com".to_owned()],
            plain_env.recipients
        );
        assert!(plain_env.encryption.is_none());
        assert_eq!(b"secret", &plain_data[..]);

        let (enc_env, enc_data) = &calls[1];
        assert_eq!(vec!["alice@example.com".to_owned()], enc_env.recipients);
        assert_eq!(
            Some(EncryptionInfo {
                algorithm: ALGORITHM.to_owned(),
                encrypted: true,
            }),
            enc_env.encryption
        );
        assert_ne!(b"secret", &enc_data[..]);
        assert_eq!(
            b"secret".to_vec(),
            decrypt_message(enc_data, alice.private_key.expose()).unwrap()
        );
        assert_eq!("sender@example.org", enc_env.from);
    }

    #[test]
    fn each_encrypted_recipient_sealed_separately() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let mut keys = MemoryKeys::default();
        keys.keys.insert("a".to_owned(), a.public_key.to_vec());
        keys.keys.insert("b".to_owned(), b.public_key.to_vec());
        let agent =
            EncryptingDeliveryAgent::new(RecordingAgent::default(), keys);

        agent
            .deliver(
                &envelope(&["a@example.com", "b@example.com"]),
                &mut Cursor::new(b"hi"),
            )
            .unwrap();

        let calls = agent.inner().calls.lock().unwrap();
        assert_eq!(2, calls.len());
        assert_eq!(
            b"hi".to_vec(),
            decrypt_message(&calls[0].1, a.private_key.expose()).unwrap()
        );
        assert_eq!(
            b"hi".to_vec(),
            decrypt_message(&calls[1].1, b.private_key.expose()).unwrap()
        );
        assert_matches!(
            Err(Error::DecryptionFailed),
            decrypt_message(&calls[0].1, b.private_key.expose())
        );
    }

    #[test]
    fn lookup_failures_fall_back_to_plaintext() {
        let mut keys = MemoryKeys::default();
        keys.broken.push("dave".to_owned());
        // Claims encryption, but the key is malformed
        keys.keys.insert("erin".to_owned(), vec![0u8; 5]);
        let agent =
            EncryptingDeliveryAgent::new(RecordingAgent::default(), keys);

        assert_eq!(
            1,
            agent
                .deliver(
                    &envelope(&["dave@example.com"]),
                    &mut Cursor::new(b"x"),
                )
                .unwrap()
        );
        {
            let calls = agent.inner().calls.lock().unwrap();
            assert!(calls[0].0.encryption.is_none());
        }

        // A key of the wrong length fails at encryption time, and with
        // nothing else delivered that error is returned.
        assert_matches!(
            Err(Error::BadKeyLength { .. }),
            agent.deliver(
                &envelope(&["erin@example.com"]),
                &mut Cursor::new(b"x"),
            )
        );
    }

    #[test]
    fn partial_failure() {
        let alice = KeyPair::generate();
        let mut keys = MemoryKeys::default();
        keys.keys
            .insert("alice".to_owned(), alice.public_key.to_vec());
        let inner = RecordingAgent {
            fail_for: vec!["alice@example.com".to_owned()],
            ..RecordingAgent::default()
        };
        let agent = EncryptingDeliveryAgent::new(inner, keys);

        assert_eq!(
            1,
            agent
                .deliver(
                    &envelope(&["alice@example.com", "bob@example.com"]),
                    &mut Cursor::new(b"x"),
                )
                .unwrap()
        );
        assert_matches!(
            Err(Error::NxMailbox),
            agent.deliver(
                &envelope(&["alice@example.com"]),
                &mut Cursor::new(b"x"),
            )
        );
    }

    #[test]
    fn no_recipients() {
        let agent = EncryptingDeliveryAgent::new(
            RecordingAgent::default(),
            MemoryKeys::default(),
        );
        assert_matches!(
            Err(Error::NoRecipients),
            agent.deliver(&envelope(&[]), &mut Cursor::new(b"x"))
        );
        assert!(agent.inner().calls.lock().unwrap().is_empty());
    }
}
