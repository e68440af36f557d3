// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed remote store.
//!
//! Provides typed operations for:
//! - Profiles (`users/{uid}`) and their public index (`user_profiles/{uid}`)
//! - Areas (`areas/{id}`, generated IDs)
//! - Listeners that forward document snapshots into an [`EventSink`]

use crate::db::{collections, EventSink, RemoteStore, StoreError, StoreEvent, Subscription};
use crate::models::{Area, NewArea, ProfilePatch, PublicProfile, UserProfile};
use async_trait::async_trait;
use firestore::{
    FirestoreDb, FirestoreListenEvent, FirestoreListener, FirestoreListenerTarget,
    FirestoreMemListenStateStorage, FirestoreWritePrecondition,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

const PROFILE_TARGET_ID: u32 = 1;
const AREAS_TARGET_ID: u32 = 2;

type Listener = FirestoreListener<FirestoreDb, FirestoreMemListenStateStorage>;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreStore {
    client: FirestoreDb,
}

fn backend_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = FirestoreDb::new(project_id).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    async fn new_listener(&self) -> Result<Listener, StoreError> {
        self.client
            .create_listener(FirestoreMemListenStateStorage::new())
            .await
            .map_err(backend_error)
    }
}

#[async_trait]
impl RemoteStore for FirestoreStore {
    // ─── Profile Operations ──────────────────────────────────────

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(uid)
            .await
            .map_err(backend_error)
    }

    /// Both documents go through one transaction so neither exists without the other.
    /// The profile write carries an `exists: false` precondition, so a
    /// concurrent first sign-in cannot overwrite a profile created meanwhile.
    async fn create_profile(
        &self,
        profile: &UserProfile,
        public: &PublicProfile,
    ) -> Result<bool, StoreError> {
        let mut transaction = self.client.begin_transaction().await.map_err(|e| {
            StoreError::Backend(format!("Failed to begin transaction: {}", e))
        })?;

        self.client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&profile.uid)
            .object(profile)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                StoreError::Backend(format!("Failed to add profile to transaction: {}", e))
            })?;

        self.client
            .fluent()
            .update()
            .in_col(collections::PUBLIC_PROFILES)
            .document_id(&public.uid)
            .object(public)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                StoreError::Backend(format!(
                    "Failed to add public profile to transaction: {}",
                    e
                ))
            })?;

        if let Err(e) = transaction.commit().await {
            // A failed precondition means another sign-in got there first.
            if self.get_profile(&profile.uid).await?.is_some() {
                tracing::debug!(uid = %profile.uid, "Profile already exists");
                return Ok(false);
            }
            return Err(StoreError::Backend(format!(
                "Transaction commit failed: {}",
                e
            )));
        }

        tracing::info!(uid = %profile.uid, "Profile created");
        Ok(true)
    }

    async fn upsert_public_profile(&self, public: &PublicProfile) -> Result<(), StoreError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::PUBLIC_PROFILES)
            .document_id(&public.uid)
            .object(public)
            .execute()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn update_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<(), StoreError> {
        let fields = patch.fields();
        if fields.is_empty() {
            return Ok(());
        }

        let _: () = self
            .client
            .fluent()
            .update()
            .fields(fields)
            .in_col(collections::USERS)
            .document_id(uid)
            .object(patch)
            .execute()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    /// Uses an append-missing-elements transform, so concurrent adds never clobber each other.
    async fn add_friend(&self, uid: &str, friend_uid: &str) -> Result<(), StoreError> {
        let mut transaction = self.client.begin_transaction().await.map_err(|e| {
            StoreError::Backend(format!("Failed to begin transaction: {}", e))
        })?;

        self.client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(uid)
            .transforms(|t| t.fields([t.field("friends").append_missing_elements([friend_uid])]))
            .only_transform()
            .add_to_transaction(&mut transaction)
            .map_err(backend_error)?;

        transaction
            .commit()
            .await
            .map_err(|e| StoreError::Backend(format!("Transaction commit failed: {}", e)))?;
        Ok(())
    }

    async fn find_public_profile_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PublicProfile>, StoreError> {
        let email = email.to_string();
        let matches: Vec<PublicProfile> = self
            .client
            .fluent()
            .select()
            .from(collections::PUBLIC_PROFILES)
            .filter(move |q| q.for_all([q.field("email").eq(email.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(backend_error)?;
        Ok(matches.into_iter().next())
    }

    // ─── Area Operations ─────────────────────────────────────────

    async fn add_area(&self, area: &NewArea) -> Result<String, StoreError> {
        let created: Area = self
            .client
            .fluent()
            .insert()
            .into(collections::AREAS)
            .generate_document_id()
            .object(area)
            .execute()
            .await
            .map_err(backend_error)?;
        Ok(created.id)
    }

    async fn delete_area(&self, id: &str) -> Result<(), StoreError> {
        self.client
            .fluent()
            .delete()
            .from(collections::AREAS)
            .document_id(id)
            .execute()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    // ─── Listeners ───────────────────────────────────────────────

    async fn watch_profile(&self, uid: &str, sink: EventSink) -> Result<Subscription, StoreError> {
        let mut listener = self.new_listener().await?;

        self.client
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .batch_listen([uid.to_string()])
            .add_target(FirestoreListenerTarget::new(PROFILE_TARGET_ID), &mut listener)
            .map_err(backend_error)?;

        let owner = uid.to_string();
        listener
            .start(move |event| {
                forward_profile_event(&owner, event, &sink);
                async move { Ok(()) }
            })
            .await
            .map_err(backend_error)?;

        Ok(stop_on_cancel(
            listener,
            format!("{}/{}", collections::USERS, uid),
        ))
    }

    async fn watch_areas(&self, sink: EventSink) -> Result<Subscription, StoreError> {
        let mut listener = self.new_listener().await?;

        self.client
            .fluent()
            .select()
            .from(collections::AREAS)
            .listen()
            .add_target(FirestoreListenerTarget::new(AREAS_TARGET_ID), &mut listener)
            .map_err(backend_error)?;

        // Listener events are per document; keep the collection here so each
        // event can be forwarded as a full result set.
        let areas: Arc<Mutex<BTreeMap<String, Area>>> = Arc::default();
        listener
            .start(move |event| {
                forward_area_event(&areas, event, &sink);
                async move { Ok(()) }
            })
            .await
            .map_err(backend_error)?;

        Ok(stop_on_cancel(listener, collections::AREAS.to_string()))
    }
}

/// Shut the listener down once the returned subscription is cancelled or dropped.
fn stop_on_cancel(mut listener: Listener, path: String) -> Subscription {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = stop_rx.await;
        if let Err(e) = listener.shutdown().await {
            tracing::warn!(path = %path, error = %e, "Failed to shut down listener");
        } else {
            tracing::debug!(path = %path, "Listener stopped");
        }
    });
    Subscription::new(move || {
        let _ = stop_tx.send(());
    })
}

/// Last path segment of a full document name.
fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn forward_profile_event(uid: &str, event: FirestoreListenEvent, sink: &EventSink) {
    let snapshot = match event {
        FirestoreListenEvent::DocumentChange(change) => {
            let Some(doc) = change.document else {
                return;
            };
            match FirestoreDb::deserialize_doc_to::<UserProfile>(&doc) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    let _ = sink.send(StoreEvent::WatchFailed {
                        path: format!("{}/{}", collections::USERS, uid),
                        error: e.to_string(),
                    });
                    return;
                }
            }
        }
        FirestoreListenEvent::DocumentDelete(_) | FirestoreListenEvent::DocumentRemove(_) => None,
        _ => return,
    };

    let _ = sink.send(StoreEvent::Profile {
        uid: uid.to_string(),
        snapshot,
    });
}

fn forward_area_event(
    areas: &Mutex<BTreeMap<String, Area>>,
    event: FirestoreListenEvent,
    sink: &EventSink,
) {
    let mut areas = areas
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    match event {
        FirestoreListenEvent::DocumentChange(change) => {
            let Some(doc) = change.document else {
                return;
            };
            match FirestoreDb::deserialize_doc_to::<Area>(&doc) {
                Ok(mut area) => {
                    if area.id.is_empty() {
                        area.id = document_id(&doc.name).to_string();
                    }
                    areas.insert(area.id.clone(), area);
                }
                Err(e) => {
                    let _ = sink.send(StoreEvent::WatchFailed {
                        path: doc.name.clone(),
                        error: e.to_string(),
                    });
                    return;
                }
            }
        }
        FirestoreListenEvent::DocumentDelete(deleted) => {
            areas.remove(document_id(&deleted.document));
        }
        FirestoreListenEvent::DocumentRemove(removed) => {
            areas.remove(document_id(&removed.document));
        }
        _ => return,
    }

    let _ = sink.send(StoreEvent::Areas(areas.values().cloned().collect()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_from_full_name() {
        assert_eq!(
            document_id("projects/p/databases/(default)/documents/areas/abc123"),
            "abc123"
        );
        assert_eq!(document_id("abc123"), "abc123");
    }
}
