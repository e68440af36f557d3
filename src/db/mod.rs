// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote document store.
//!
//! The rest of the crate only sees [`RemoteStore`]: one-shot reads, typed
//! mutations, and push-based watches that deliver full snapshots into an
//! [`EventSink`]. Two backends implement it:
//! - [`FirestoreStore`] for deployments (and the Firestore emulator)
//! - [`MemoryStore`] for local development and tests

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use crate::models::{Area, NewArea, ProfilePatch, PublicProfile, UserProfile};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Collection names as constants.
pub mod collections {
    /// Per-user profile documents, keyed by uid
    pub const USERS: &str = "users";
    /// Public profile index, keyed by uid, queried by email
    pub const PUBLIC_PROFILES: &str = "user_profiles";
    /// Shared map areas, keyed by generated ID
    pub const AREAS: &str = "areas";
}

/// Snapshot pushed by a watch.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// Latest state of `users/{uid}`; `None` once the document is gone.
    Profile {
        uid: String,
        snapshot: Option<UserProfile>,
    },
    /// Full contents of the areas collection.
    Areas(Vec<Area>),
    /// The watch hit an error. Consumers keep their last snapshot.
    WatchFailed { path: String, error: String },
}

/// Where watches deliver their events.
pub type EventSink = mpsc::UnboundedSender<StoreEvent>;

/// Remote store failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Malformed document at {path}: {message}")]
    Serialization { path: String, message: String },
}

/// Handle for an open watch. The watch stops on [`Subscription::cancel`] or drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Operations the core needs from the replicated document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// One-shot read of `users/{uid}`.
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Write a new profile together with its public index entry.
    ///
    /// Returns `false` and writes nothing if `users/{uid}` already exists.
    async fn create_profile(
        &self,
        profile: &UserProfile,
        public: &PublicProfile,
    ) -> Result<bool, StoreError>;

    /// Idempotently write `user_profiles/{uid}`.
    async fn upsert_public_profile(&self, public: &PublicProfile) -> Result<(), StoreError>;

    /// Write only the fields set in `patch`.
    async fn update_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<(), StoreError>;

    /// Set-union `friend_uid` into the `friends` array of `users/{uid}`.
    async fn add_friend(&self, uid: &str, friend_uid: &str) -> Result<(), StoreError>;

    /// Exact match on the (already normalized) email of the public index.
    async fn find_public_profile_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PublicProfile>, StoreError>;

    /// Persist an area and return its generated ID.
    async fn add_area(&self, area: &NewArea) -> Result<String, StoreError>;

    async fn delete_area(&self, id: &str) -> Result<(), StoreError>;

    /// Push every change of `users/{uid}` into `sink`.
    async fn watch_profile(&self, uid: &str, sink: EventSink) -> Result<Subscription, StoreError>;

    /// Push the full areas collection into `sink` on every change.
    async fn watch_areas(&self, sink: EventSink) -> Result<Subscription, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_subscription_cancels_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_cancels_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _sub = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
