// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Change counters that let the map surface know when to redraw.

use tokio::sync::watch;

/// Monotonic revision owned by a stateful component.
///
/// The owner bumps it after every observable change; observers hold a
/// [`watch::Receiver`] and wait for the value to move.
#[derive(Debug)]
pub struct Revision {
    tx: watch::Sender<u64>,
}

impl Default for Revision {
    fn default() -> Self {
        Self::new()
    }
}

impl Revision {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Mark the owner dirty.
    pub fn bump(&self) {
        self.tx.send_modify(|rev| *rev += 1);
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}
