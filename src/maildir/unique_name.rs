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

//! Generation of unique Maildir file names.
//!
//! Names have the form `<secs>.M<micros>P<pid>.<host>.<random>`, where
//! `<random>` is 6 bytes from the OS random source in lower-case hex. The
//! combination of time, process and randomness makes collisions between
//! concurrent deliverers on different hosts sharing a store negligible; a
//! collision that does happen anyway is caught by the exclusive creation of
//! the staging file.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::prelude::*;
use rand::{rngs::OsRng, RngCore};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;
type RandomSource = Box<dyn Fn(&mut [u8]) -> Result<(), rand::Error> + Send + Sync>;

/// Process-wide state for naming new messages.
///
/// One of these is normally shared (via `Arc`) by every store in the process.
pub struct UniqueNamer {
    hostname: String,
    pid: u32,
    counter: AtomicU64,
    clock: Clock,
    random: RandomSource,
}

impl fmt::Debug for UniqueNamer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("UniqueNamer")
            .field("hostname", &self.hostname)
            .field("pid", &self.pid)
            .field("counter", &self.counter)
            .finish()
    }
}

impl Default for UniqueNamer {
    fn default() -> Self {
        Self::new()
    }
}

impl UniqueNamer {
    /// Create a namer using the system host name, the current process ID,
    /// the system clock and the OS random source.
    pub fn new() -> Self {
        Self::with_sources(
            &system_hostname(),
            nix::unistd::getpid().as_raw() as u32,
            Utc::now,
            |buf| OsRng.try_fill_bytes(buf),
        )
    }

    /// Create a namer with explicit time and randomness sources.
    pub fn with_sources(
        hostname: &str,
        pid: u32,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
        random: impl Fn(&mut [u8]) -> Result<(), rand::Error>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        UniqueNamer {
            hostname: sanitize_hostname(hostname),
            pid,
            counter: AtomicU64::new(0),
            clock: Box::new(clock),
            random: Box::new(random),
        }
    }

    /// Generate the next name.
    ///
    /// If the random source fails, a per-namer counter stands in for the
    /// random part.
    pub fn next_name(&self) -> String {
        let now = (self.clock)();
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;

        let mut random = [0u8; 6];
        let unique = match (self.random)(&mut random) {
            Ok(()) => random.iter().map(|b| format!("{:02x}", b)).collect(),
            Err(_) => counter.to_string(),
        };

        format!(
            "{}.M{}P{}.{}.{}",
            now.timestamp(),
            now.timestamp_subsec_micros(),
            self.pid,
            self.hostname,
            unique
        )
    }
}

/// Make `hostname` safe for use within a Maildir file name.
///
/// `/` and `:` become `_` and NUL characters are removed.
pub fn sanitize_hostname(hostname: &str) -> String {
    hostname
        .chars()
        .filter(|&c| '\0' != c)
        .map(|c| if '/' == c || ':' == c { '_' } else { c })
        .collect()
}

fn system_hostname() -> String {
    let mut buf = [0u8; 256];
    match nix::unistd::gethostname(&mut buf) {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(_) => "localhost".to_owned(),
    }
}
