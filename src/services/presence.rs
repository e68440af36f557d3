// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Presence synchronizer: the live view of the current user and their friends.
//!
//! The self-profile watch is the only thing that decides who counts as a
//! friend. Friend snapshots only ever update their own entry in the live
//! set, so observing a friend can never pull in more friends.
//!
//! Friend watches are only ever added during a session. Removing a uid from
//! `friends` leaves its watch open until sign-out, which tears everything
//! down at once.

use crate::db::{EventSink, RemoteStore, StoreError, Subscription};
use crate::models::{normalize_email, Area, Identity, ProfilePatch, PublicProfile, UserProfile};
use crate::revision::Revision;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::watch;

/// Errors from presence operations.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("No user found for {0}")]
    NotFound(String),

    #[error("You can't add yourself as a friend")]
    SelfReference,

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Area has no vertices: {0}")]
    EmptyArea(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the live friend set and the watches that feed it.
pub struct PresenceSync {
    store: Arc<dyn RemoteStore>,
    sink: EventSink,
    self_uid: Option<String>,
    self_watch: Option<Subscription>,
    friend_uids: BTreeSet<String>,
    live: BTreeMap<String, UserProfile>,
    friend_watches: HashMap<String, Subscription>,
    revision: Revision,
}

impl PresenceSync {
    /// Watches opened by this synchronizer deliver into `sink`; the owner
    /// routes [`crate::db::StoreEvent::Profile`] events back to
    /// [`PresenceSync::on_profile_snapshot`].
    pub fn new(store: Arc<dyn RemoteStore>, sink: EventSink) -> Self {
        Self {
            store,
            sink,
            self_uid: None,
            self_watch: None,
            friend_uids: BTreeSet::new(),
            live: BTreeMap::new(),
            friend_watches: HashMap::new(),
            revision: Revision::new(),
        }
    }

    pub fn self_uid(&self) -> Option<&str> {
        self.self_uid.as_deref()
    }

    /// Latest snapshot of the current user's own profile.
    pub fn self_profile(&self) -> Option<&UserProfile> {
        self.self_uid.as_ref().and_then(|uid| self.live.get(uid))
    }

    pub fn friend_uids(&self) -> &BTreeSet<String> {
        &self.friend_uids
    }

    /// Self plus every friend that has produced a snapshot.
    pub fn live_friends(&self) -> &BTreeMap<String, UserProfile> {
        &self.live
    }

    /// UIDs of friends with an open watch.
    pub fn active_subscriptions(&self) -> BTreeSet<String> {
        self.friend_watches.keys().cloned().collect()
    }

    pub fn revision(&self) -> u64 {
        self.revision.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Make sure the profile and its public index entry exist, then watch it.
    ///
    /// Signing in as a different user first tears down the previous session.
    /// Signing in again as the same user is a no-op.
    pub async fn on_authenticated(&mut self, identity: &Identity) -> Result<(), PresenceError> {
        match self.self_uid.as_deref() {
            Some(uid) if uid == identity.uid => return Ok(()),
            Some(_) => self.on_sign_out(),
            None => {}
        }

        ensure_profile(self.store.as_ref(), identity).await?;
        let watch = self
            .store
            .watch_profile(&identity.uid, self.sink.clone())
            .await?;

        self.self_uid = Some(identity.uid.clone());
        self.self_watch = Some(watch);
        tracing::info!(uid = %identity.uid, "Presence session started");
        Ok(())
    }

    /// Apply a snapshot pushed by one of our profile watches.
    pub async fn on_profile_snapshot(&mut self, uid: &str, snapshot: Option<UserProfile>) {
        if self.self_uid.as_deref() == Some(uid) {
            self.on_self_snapshot(uid, snapshot).await;
        } else if self.friend_watches.contains_key(uid) {
            self.on_friend_snapshot(uid, snapshot);
        } else {
            tracing::debug!(uid, "Ignoring snapshot for unwatched profile");
        }
    }

    async fn on_self_snapshot(&mut self, uid: &str, snapshot: Option<UserProfile>) {
        let Some(profile) = snapshot else {
            tracing::warn!(uid, "Own profile document missing; keeping last snapshot");
            return;
        };

        self.friend_uids = profile
            .friends
            .iter()
            .filter(|f| f.as_str() != uid)
            .cloned()
            .collect();
        self.live.insert(uid.to_string(), profile);
        self.reconcile_watches().await;
        self.revision.bump();
    }

    /// Open a watch for every friend that doesn't have one yet.
    ///
    /// A failed watch is retried on the next self snapshot.
    async fn reconcile_watches(&mut self) {
        let missing: Vec<String> = self
            .friend_uids
            .iter()
            .filter(|uid| !self.friend_watches.contains_key(*uid))
            .cloned()
            .collect();

        for friend_uid in missing {
            match self
                .store
                .watch_profile(&friend_uid, self.sink.clone())
                .await
            {
                Ok(watch) => {
                    tracing::debug!(friend_uid = %friend_uid, "Watching friend");
                    self.friend_watches.insert(friend_uid, watch);
                }
                Err(e) => {
                    tracing::warn!(friend_uid = %friend_uid, error = %e, "Failed to watch friend");
                }
            }
        }
    }

    fn on_friend_snapshot(&mut self, uid: &str, snapshot: Option<UserProfile>) {
        match snapshot {
            Some(profile) => {
                self.live.insert(uid.to_string(), profile);
                self.revision.bump();
            }
            None => {
                tracing::debug!(uid, "Friend profile gone; keeping last snapshot");
            }
        }
    }

    /// Resolve an email to a uid through the public profile index.
    pub async fn resolve_friend_by_email(&self, email: &str) -> Result<String, PresenceError> {
        let email = normalize_email(email);
        self.store
            .find_public_profile_by_email(&email)
            .await?
            .map(|p| p.uid)
            .ok_or(PresenceError::NotFound(email))
    }

    /// Follow `uid`. Adding someone already followed changes nothing.
    pub async fn add_friend(&self, uid: &str) -> Result<(), PresenceError> {
        let self_uid = self
            .self_uid
            .as_deref()
            .ok_or(PresenceError::NotAuthenticated)?;
        if uid == self_uid {
            return Err(PresenceError::SelfReference);
        }
        self.store.add_friend(self_uid, uid).await?;
        tracing::info!(uid = self_uid, friend_uid = uid, "Friend added");
        Ok(())
    }

    /// Resolve `email` and follow the matching user.
    pub async fn add_friend_by_email(&self, email: &str) -> Result<String, PresenceError> {
        let friend_uid = self.resolve_friend_by_email(email).await?;
        self.add_friend(&friend_uid).await?;
        Ok(friend_uid)
    }

    pub async fn set_use_gps(&self, enabled: bool) -> Result<(), PresenceError> {
        let uid = self.self_uid.as_deref().ok_or(PresenceError::NotAuthenticated)?;
        self.store
            .update_profile(uid, &ProfilePatch::use_gps(enabled))
            .await?;
        tracing::info!(uid, enabled, "GPS mode changed");
        Ok(())
    }

    /// Set our location to the area's centroid and label it with the area name.
    pub async fn check_in(&self, area: &Area) -> Result<ProfilePatch, PresenceError> {
        let uid = self.self_uid.as_deref().ok_or(PresenceError::NotAuthenticated)?;
        let centroid = area
            .centroid()
            .ok_or_else(|| PresenceError::EmptyArea(area.id.clone()))?;
        let patch = ProfilePatch::position(centroid, area.name.clone());
        self.store.update_profile(uid, &patch).await?;
        tracing::info!(uid, area_id = %area.id, "Checked in");
        Ok(patch)
    }

    /// Close every watch and forget everything learned in this session.
    pub fn on_sign_out(&mut self) {
        if let Some(watch) = self.self_watch.take() {
            watch.cancel();
        }
        let closed = self.friend_watches.len();
        for (_, watch) in self.friend_watches.drain() {
            watch.cancel();
        }
        self.friend_uids.clear();
        self.live.clear();
        if let Some(uid) = self.self_uid.take() {
            tracing::info!(uid = %uid, closed, "Presence session ended");
        }
        self.revision.bump();
    }
}

/// Create the profile and index entry on first sign-in.
///
/// Creation never overwrites an existing profile. For an existing profile
/// the index entry is rewritten from it, which repairs an index write lost
/// on an earlier login.
async fn ensure_profile(
    store: &dyn RemoteStore,
    identity: &Identity,
) -> Result<UserProfile, StoreError> {
    let existing = match store.get_profile(&identity.uid).await? {
        Some(existing) => existing,
        None => {
            let profile = UserProfile::for_identity(identity);
            if store
                .create_profile(&profile, &PublicProfile::from(&profile))
                .await?
            {
                return Ok(profile);
            }
            tracing::debug!(uid = %identity.uid, "Profile created by a concurrent sign-in");
            store.get_profile(&identity.uid).await?.ok_or_else(|| {
                StoreError::Backend(format!("users/{} vanished during sign-in", identity.uid))
            })?
        }
    };
    store
        .upsert_public_profile(&PublicProfile::from(&existing))
        .await?;
    Ok(existing)
}
