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

//! Encryption at rest, layered over any store.
//!
//! `EncryptingDeliveryAgent` sits in front of a `DeliveryAgent` and seals
//! each message to the public key of every recipient that has one;
//! `DecryptingStore` sits in front of a `MessageStore` and opens messages
//! again once a session key has been supplied. The stores underneath never
//! see key material.

pub mod decrypting;
pub mod encrypting;

pub use self::decrypting::DecryptingStore;
pub use self::encrypting::EncryptingDeliveryAgent;
