// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store with the same push semantics as Firestore listeners.
//!
//! Watches receive the current snapshot as soon as they open and a fresh
//! snapshot after every write to what they watch. Used for local
//! development (`STORE_BACKEND=memory`) and throughout the test suite.

use crate::db::{collections, EventSink, RemoteStore, StoreError, StoreEvent, Subscription};
use crate::models::{Area, NewArea, ProfilePatch, PublicProfile, UserProfile};
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory replica of the three collections.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    profiles: HashMap<String, UserProfile>,
    public_profiles: HashMap<String, PublicProfile>,
    areas: BTreeMap<String, Area>,
    watchers: Vec<Watcher>,
    next_watcher_id: u64,
    next_area_id: u64,
    unavailable: bool,
}

struct Watcher {
    id: u64,
    target: WatchTarget,
    sink: EventSink,
}

#[derive(Clone, PartialEq)]
enum WatchTarget {
    Profile(String),
    Areas,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock the store, failing if it is simulating an outage.
    fn lock_available(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let inner = self.lock();
        if inner.unavailable {
            return Err(StoreError::Unavailable(
                "memory store is offline".to_string(),
            ));
        }
        Ok(inner)
    }

    /// Simulate a network outage: every operation fails until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Write a profile as if another session had done it.
    pub fn put_profile(&self, profile: UserProfile) {
        let mut inner = self.lock();
        let uid = profile.uid.clone();
        inner
            .public_profiles
            .insert(uid.clone(), PublicProfile::from(&profile));
        inner.profiles.insert(uid.clone(), profile);
        inner.notify_profile(&uid);
    }

    /// Remove a profile document as if it were deleted remotely.
    pub fn delete_profile(&self, uid: &str) {
        let mut inner = self.lock();
        inner.profiles.remove(uid);
        inner.notify_profile(uid);
    }

    /// Drop an index entry, leaving the profile in place.
    pub fn delete_public_profile(&self, uid: &str) {
        self.lock().public_profiles.remove(uid);
    }

    pub fn profile(&self, uid: &str) -> Option<UserProfile> {
        self.lock().profiles.get(uid).cloned()
    }

    pub fn public_profile(&self, uid: &str) -> Option<PublicProfile> {
        self.lock().public_profiles.get(uid).cloned()
    }

    pub fn areas(&self) -> Vec<Area> {
        self.lock().areas.values().cloned().collect()
    }

    /// Number of open watches on `users/{uid}`.
    pub fn profile_watchers(&self, uid: &str) -> usize {
        let target = WatchTarget::Profile(uid.to_string());
        self.lock()
            .watchers
            .iter()
            .filter(|w| w.target == target)
            .count()
    }

    /// Number of open watches of any kind.
    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }

    fn open_watch(&self, target: WatchTarget, sink: EventSink) -> Result<Subscription, StoreError> {
        let mut inner = self.lock_available()?;
        let id = inner.next_watcher_id;
        inner.next_watcher_id += 1;

        // Initial snapshot, like a Firestore listener's first response.
        let initial = inner.snapshot(&target);
        if let Some(event) = initial {
            let _ = sink.send(event);
        }
        inner.watchers.push(Watcher { id, target, sink });

        let store = self.inner.clone();
        Ok(Subscription::new(move || {
            let mut inner = store
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            inner.watchers.retain(|w| w.id != id);
        }))
    }
}

impl Inner {
    fn snapshot(&self, target: &WatchTarget) -> Option<StoreEvent> {
        match target {
            WatchTarget::Profile(uid) => self.profiles.get(uid).map(|p| StoreEvent::Profile {
                uid: uid.clone(),
                snapshot: Some(p.clone()),
            }),
            WatchTarget::Areas => Some(StoreEvent::Areas(self.areas.values().cloned().collect())),
        }
    }

    fn notify(&mut self, target: &WatchTarget, event: StoreEvent) {
        // Drop watchers whose receiving side has gone away.
        self.watchers
            .retain(|w| &w.target != target || w.sink.send(event.clone()).is_ok());
    }

    fn notify_profile(&mut self, uid: &str) {
        let event = StoreEvent::Profile {
            uid: uid.to_string(),
            snapshot: self.profiles.get(uid).cloned(),
        };
        self.notify(&WatchTarget::Profile(uid.to_string()), event);
    }

    fn notify_areas(&mut self) {
        let event = StoreEvent::Areas(self.areas.values().cloned().collect());
        self.notify(&WatchTarget::Areas, event);
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.lock_available()?.profiles.get(uid).cloned())
    }

    async fn create_profile(
        &self,
        profile: &UserProfile,
        public: &PublicProfile,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock_available()?;
        match inner.profiles.entry(profile.uid.clone()) {
            Entry::Occupied(_) => return Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(profile.clone());
            }
        }
        inner
            .public_profiles
            .insert(public.uid.clone(), public.clone());
        inner.notify_profile(&profile.uid);
        Ok(true)
    }

    async fn upsert_public_profile(&self, public: &PublicProfile) -> Result<(), StoreError> {
        self.lock_available()?
            .public_profiles
            .insert(public.uid.clone(), public.clone());
        Ok(())
    }

    async fn update_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<(), StoreError> {
        let mut inner = self.lock_available()?;
        let profile = inner.profiles.get_mut(uid).ok_or_else(|| {
            StoreError::Backend(format!("{}/{} does not exist", collections::USERS, uid))
        })?;
        patch.apply_to(profile);
        inner.notify_profile(uid);
        Ok(())
    }

    async fn add_friend(&self, uid: &str, friend_uid: &str) -> Result<(), StoreError> {
        let mut inner = self.lock_available()?;
        let profile = inner.profiles.get_mut(uid).ok_or_else(|| {
            StoreError::Backend(format!("{}/{} does not exist", collections::USERS, uid))
        })?;
        profile.friends.insert(friend_uid.to_string());
        inner.notify_profile(uid);
        Ok(())
    }

    async fn find_public_profile_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PublicProfile>, StoreError> {
        let inner = self.lock_available()?;
        let mut matches: Vec<&PublicProfile> = inner
            .public_profiles
            .values()
            .filter(|p| p.email.as_deref() == Some(email))
            .collect();
        matches.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(matches.first().map(|p| (*p).clone()))
    }

    async fn add_area(&self, area: &NewArea) -> Result<String, StoreError> {
        let mut inner = self.lock_available()?;
        inner.next_area_id += 1;
        let id = format!("area-{:04}", inner.next_area_id);
        inner
            .areas
            .insert(id.clone(), area.clone().with_id(id.clone()));
        inner.notify_areas();
        Ok(id)
    }

    async fn delete_area(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock_available()?;
        if inner.areas.remove(id).is_some() {
            inner.notify_areas();
        }
        Ok(())
    }

    async fn watch_profile(&self, uid: &str, sink: EventSink) -> Result<Subscription, StoreError> {
        self.open_watch(WatchTarget::Profile(uid.to_string()), sink)
    }

    async fn watch_areas(&self, sink: EventSink) -> Result<Subscription, StoreError> {
        self.open_watch(WatchTarget::Areas, sink)
    }
}
