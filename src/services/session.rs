// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user session runtime.
//!
//! Each signed-in user gets one [`SessionActor`] task. It owns the geofence
//! model, the presence synchronizer, the receiving end of every watch they
//! open, and the motion ticker. All state changes happen inside its single
//! `select!` loop; request handlers talk to it through a [`SessionHandle`].

use crate::db::{RemoteStore, StoreEvent, Subscription};
use crate::models::{Area, Identity, Point, ProfilePatch, UserProfile};
use crate::services::geofence::{
    AuthoringState, DraftOutcome, GeofenceConfig, GeofenceError, GeofenceModel,
};
use crate::services::motion::{next_position, MotionConfig};
use crate::services::presence::{PresenceError, PresenceSync};
use crate::services::projection::{
    self, PixelPoint, ProjectionError, Scene, SceneInput, Surface,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

const COMMAND_BUFFER: usize = 32;

const MIN_MOTION_INTERVAL: Duration = Duration::from_millis(1);

/// Label shown for a member with no area.
const UNKNOWN_AREA_LABEL: &str = "Unknown";

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub geofence: GeofenceConfig,
    pub motion: MotionConfig,
    pub developer_passcode: String,
    /// Shut the session down after this long without a request
    pub idle_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Geofence(#[from] GeofenceError),

    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("Incorrect passcode")]
    WrongPasscode,

    #[error("Developer mode is locked")]
    DeveloperLocked,

    #[error("Session has ended")]
    Closed,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Requests served by the session actor.
pub enum Command {
    Status(Reply<SessionStatus>),
    Squad(Reply<Vec<SquadMember>>),
    AddFriend { email: String, reply: Reply<String> },
    SetUseGps { enabled: bool, reply: Reply<()> },
    CheckIn { area_id: String, reply: Reply<ProfilePatch> },
    Areas(Reply<Vec<Area>>),
    RemoveArea { area_id: String, reply: Reply<()> },
    Unlock { passcode: String, reply: Reply<()> },
    StartAuthoring(Reply<AuthoringView>),
    CancelAuthoring(Reply<AuthoringView>),
    Click {
        pixel: PixelPoint,
        surface: Surface,
        reply: Reply<ClickResult>,
    },
    Commit { name: String, reply: Reply<Area> },
    Scene { surface: Surface, reply: Reply<Scene> },
    Subscribe(Reply<Revisions>),
    SignOut(oneshot::Sender<()>),
}

/// Snapshot of the session for `GET /api/me`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub uid: String,
    pub profile: Option<UserProfile>,
    pub developer: bool,
    pub authoring: AuthoringView,
    pub areas_revision: u64,
    pub presence_revision: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoringView {
    pub state: AuthoringState,
    pub draft: Vec<Point>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickResult {
    pub outcome: DraftOutcome,
    /// The click in normalized map coordinates
    pub point: Point,
    pub authoring: AuthoringView,
}

/// One row of the squad list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SquadMember {
    pub uid: String,
    pub display_name: String,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    /// Self-reported area label, `Unknown` when empty
    pub current_area: String,
    pub location: Option<Point>,
    /// Name of the area the location falls in, if any
    pub inside_area: Option<String>,
    pub is_you: bool,
}

/// Receivers for the two dirty counters of a session.
#[derive(Debug, Clone)]
pub struct Revisions {
    pub areas: watch::Receiver<u64>,
    pub presence: watch::Receiver<u64>,
}

impl Revisions {
    pub fn current(&self) -> (u64, u64) {
        (*self.areas.borrow(), *self.presence.borrow())
    }

    /// Wait until either counter differs from what the caller last saw, or
    /// until `timeout`. Returns the counters at that point.
    pub async fn wait_for_change(
        mut self,
        since_areas: u64,
        since_presence: u64,
        timeout: Duration,
    ) -> (u64, u64) {
        let changed = async {
            loop {
                let (areas, presence) = self.current();
                if areas != since_areas || presence != since_presence {
                    return;
                }
                tokio::select! {
                    res = self.areas.changed() => if res.is_err() { return },
                    res = self.presence.changed() => if res.is_err() { return },
                }
            }
        };
        let _ = tokio::time::timeout(timeout, changed).await;
        self.current()
    }
}

/// Cheap, cloneable front door to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    uid: String,
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send a command and wait for its reply.
    pub async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.request(Command::Status).await
    }

    pub async fn squad(&self) -> Result<Vec<SquadMember>, SessionError> {
        self.request(Command::Squad).await
    }

    pub async fn add_friend(&self, email: String) -> Result<String, SessionError> {
        self.request(|reply| Command::AddFriend { email, reply }).await
    }

    pub async fn set_use_gps(&self, enabled: bool) -> Result<(), SessionError> {
        self.request(|reply| Command::SetUseGps { enabled, reply })
            .await
    }

    pub async fn check_in(&self, area_id: String) -> Result<ProfilePatch, SessionError> {
        self.request(|reply| Command::CheckIn { area_id, reply })
            .await
    }

    pub async fn areas(&self) -> Result<Vec<Area>, SessionError> {
        self.request(Command::Areas).await
    }

    pub async fn remove_area(&self, area_id: String) -> Result<(), SessionError> {
        self.request(|reply| Command::RemoveArea { area_id, reply })
            .await
    }

    pub async fn unlock(&self, passcode: String) -> Result<(), SessionError> {
        self.request(|reply| Command::Unlock { passcode, reply })
            .await
    }

    pub async fn start_authoring(&self) -> Result<AuthoringView, SessionError> {
        self.request(Command::StartAuthoring).await
    }

    pub async fn cancel_authoring(&self) -> Result<AuthoringView, SessionError> {
        self.request(Command::CancelAuthoring).await
    }

    pub async fn click(
        &self,
        pixel: PixelPoint,
        surface: Surface,
    ) -> Result<ClickResult, SessionError> {
        self.request(|reply| Command::Click {
            pixel,
            surface,
            reply,
        })
        .await
    }

    pub async fn commit(&self, name: String) -> Result<Area, SessionError> {
        self.request(|reply| Command::Commit { name, reply }).await
    }

    pub async fn scene(&self, surface: Surface) -> Result<Scene, SessionError> {
        self.request(|reply| Command::Scene { surface, reply })
            .await
    }

    pub async fn subscribe(&self) -> Result<Revisions, SessionError> {
        self.request(Command::Subscribe).await
    }

    /// Tear the session down and wait until every watch is closed.
    pub async fn sign_out(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::SignOut(reply)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

enum Step {
    Event(StoreEvent),
    Command(Command),
    Tick,
    Idle,
    Stop,
}

/// Single-task owner of one user's session state.
pub struct SessionActor {
    uid: String,
    store: Arc<dyn RemoteStore>,
    settings: Arc<SessionSettings>,
    geofence: GeofenceModel,
    presence: PresenceSync,
    events: mpsc::UnboundedReceiver<StoreEvent>,
    commands: mpsc::Receiver<Command>,
    ticker: Interval,
    idle_deadline: Instant,
    rng: StdRng,
    developer: bool,
    _areas_watch: Subscription,
}

impl SessionActor {
    /// Authenticate, open the area watch, and spawn the actor.
    pub async fn start(
        identity: &Identity,
        store: Arc<dyn RemoteStore>,
        settings: Arc<SessionSettings>,
    ) -> Result<SessionHandle, SessionError> {
        let (sink, events) = mpsc::unbounded_channel();
        let mut presence = PresenceSync::new(store.clone(), sink.clone());
        presence.on_authenticated(identity).await?;
        let areas_watch = store
            .watch_areas(sink)
            .await
            .map_err(PresenceError::from)?;

        let period = settings.motion.interval.max(MIN_MOTION_INTERVAL);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let idle_deadline = Instant::now() + settings.idle_timeout;

        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let actor = SessionActor {
            uid: identity.uid.clone(),
            geofence: GeofenceModel::new(store.clone(), settings.geofence),
            store,
            settings,
            presence,
            events,
            commands,
            ticker,
            idle_deadline,
            rng: StdRng::from_os_rng(),
            developer: false,
            _areas_watch: areas_watch,
        };
        tokio::spawn(actor.run());

        Ok(SessionHandle {
            uid: identity.uid.clone(),
            tx,
        })
    }

    async fn run(mut self) {
        tracing::info!(uid = %self.uid, "Session started");
        loop {
            // Pending snapshots are applied before the next command is served.
            let step = tokio::select! {
                biased;
                Some(event) = self.events.recv() => Step::Event(event),
                command = self.commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => Step::Stop,
                },
                _ = self.ticker.tick() => Step::Tick,
                _ = tokio::time::sleep_until(self.idle_deadline) => Step::Idle,
            };

            match step {
                Step::Event(event) => self.apply(event).await,
                Step::Command(Command::SignOut(reply)) => {
                    self.shut_down();
                    let _ = reply.send(());
                    break;
                }
                Step::Command(command) => {
                    self.idle_deadline = Instant::now() + self.settings.idle_timeout;
                    self.handle(command).await
                }
                Step::Tick => self.simulate_motion(),
                Step::Idle => {
                    tracing::info!(uid = %self.uid, "Session idle; shutting down");
                    self.shut_down();
                    break;
                }
                Step::Stop => break,
            }
        }
        tracing::info!(uid = %self.uid, "Session stopped");
    }

    /// Close every watch and drop the draft.
    fn shut_down(&mut self) {
        self.presence.on_sign_out();
        self.geofence.discard();
    }

    async fn apply(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Areas(areas) => self.geofence.replace_areas(areas),
            StoreEvent::Profile { uid, snapshot } => {
                self.presence.on_profile_snapshot(&uid, snapshot).await
            }
            StoreEvent::WatchFailed { path, error } => {
                tracing::warn!(uid = %self.uid, path = %path, error = %error, "Watch failed; keeping last snapshot");
            }
        }
    }

    /// Write a random position if GPS mode is on. The write runs detached so
    /// a slow store never stalls the loop; overlapping writes are fine.
    fn simulate_motion(&mut self) {
        let Some(patch) = next_position(
            self.presence.self_profile(),
            &self.settings.motion,
            &mut self.rng,
        ) else {
            return;
        };
        let store = self.store.clone();
        let uid = self.uid.clone();
        tokio::spawn(async move {
            if let Err(e) = store.update_profile(&uid, &patch).await {
                tracing::warn!(uid = %uid, error = %e, "Simulated position write failed");
            }
        });
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Status(reply) => {
                let _ = reply.send(Ok(self.status()));
            }
            Command::Squad(reply) => {
                let _ = reply.send(Ok(self.squad()));
            }
            Command::AddFriend { email, reply } => {
                let result = self.presence.add_friend_by_email(&email).await;
                let _ = reply.send(result.map_err(Into::into));
            }
            Command::SetUseGps { enabled, reply } => {
                let result = self.presence.set_use_gps(enabled).await;
                let _ = reply.send(result.map_err(Into::into));
            }
            Command::CheckIn { area_id, reply } => {
                let _ = reply.send(self.check_in(&area_id).await);
            }
            Command::Areas(reply) => {
                let _ = reply.send(Ok(self.geofence.areas().cloned().collect()));
            }
            Command::RemoveArea { area_id, reply } => {
                let result = match self.require_developer() {
                    Ok(()) => self.geofence.remove(&area_id).await.map_err(Into::into),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Unlock { passcode, reply } => {
                let _ = reply.send(self.unlock(&passcode));
            }
            Command::StartAuthoring(reply) => {
                let result = self.require_developer().map(|()| {
                    self.geofence.start_authoring();
                    self.authoring_view()
                });
                let _ = reply.send(result);
            }
            Command::CancelAuthoring(reply) => {
                self.geofence.discard();
                let _ = reply.send(Ok(self.authoring_view()));
            }
            Command::Click {
                pixel,
                surface,
                reply,
            } => {
                let _ = reply.send(self.click(pixel, &surface));
            }
            Command::Commit { name, reply } => {
                let result = self.geofence.commit(&name).await;
                let _ = reply.send(result.map_err(Into::into));
            }
            Command::Scene { surface, reply } => {
                let _ = reply.send(Ok(self.scene(&surface)));
            }
            Command::Subscribe(reply) => {
                let _ = reply.send(Ok(Revisions {
                    areas: self.geofence.subscribe(),
                    presence: self.presence.subscribe(),
                }));
            }
            Command::SignOut(reply) => {
                // Handled by the run loop.
                let _ = reply.send(());
            }
        }
    }

    fn require_developer(&self) -> Result<(), SessionError> {
        if self.developer {
            Ok(())
        } else {
            Err(SessionError::DeveloperLocked)
        }
    }

    fn unlock(&mut self, passcode: &str) -> Result<(), SessionError> {
        if passcode != self.settings.developer_passcode {
            tracing::warn!(uid = %self.uid, "Developer unlock rejected");
            return Err(SessionError::WrongPasscode);
        }
        self.developer = true;
        tracing::info!(uid = %self.uid, "Developer mode unlocked");
        Ok(())
    }

    fn click(&mut self, pixel: PixelPoint, surface: &Surface) -> Result<ClickResult, SessionError> {
        let point = projection::to_normalized(pixel, surface)?;
        let outcome = self.geofence.click(point)?;
        Ok(ClickResult {
            outcome,
            point,
            authoring: self.authoring_view(),
        })
    }

    async fn check_in(&self, area_id: &str) -> Result<ProfilePatch, SessionError> {
        let area = self
            .geofence
            .area(area_id)
            .ok_or_else(|| GeofenceError::UnknownArea(area_id.to_string()))?;
        Ok(self.presence.check_in(area).await?)
    }

    fn authoring_view(&self) -> AuthoringView {
        AuthoringView {
            state: self.geofence.state(),
            draft: self.geofence.draft().to_vec(),
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            uid: self.uid.clone(),
            profile: self.presence.self_profile().cloned(),
            developer: self.developer,
            authoring: self.authoring_view(),
            areas_revision: self.geofence.revision(),
            presence_revision: self.presence.revision(),
        }
    }

    /// The current user first, then friends in uid order.
    fn squad(&self) -> Vec<SquadMember> {
        let live = self.presence.live_friends();
        let you = live.get(&self.uid);
        let friends = live.iter().filter(|(uid, _)| **uid != self.uid).map(|(_, p)| p);
        you.into_iter()
            .chain(friends)
            .map(|profile| self.squad_member(profile))
            .collect()
    }

    fn squad_member(&self, profile: &UserProfile) -> SquadMember {
        let current_area = if profile.current_area.trim().is_empty() {
            UNKNOWN_AREA_LABEL.to_string()
        } else {
            profile.current_area.clone()
        };
        SquadMember {
            uid: profile.uid.clone(),
            display_name: profile.display_name.clone(),
            photo_url: profile.photo_url.clone(),
            current_area,
            location: profile.location,
            inside_area: profile
                .location
                .and_then(|p| self.geofence.area_at(&p))
                .map(|a| a.name.clone()),
            is_you: profile.uid == self.uid,
        }
    }

    fn scene(&self, surface: &Surface) -> Scene {
        let input = SceneInput {
            areas: self.geofence.areas().collect(),
            draft: self.geofence.draft(),
            authoring: self.geofence.is_authoring(),
            friends: self.presence.live_friends().values().collect(),
        };
        projection::render(&input, surface)
    }
}

/// Registry of running sessions, keyed by uid.
#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn RemoteStore>,
    settings: Arc<SessionSettings>,
    running: Arc<DashMap<String, SessionHandle>>,
}

impl Sessions {
    pub fn new(store: Arc<dyn RemoteStore>, settings: SessionSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
            running: Arc::new(DashMap::new()),
        }
    }

    /// The running session for `identity`, starting one if needed.
    ///
    /// Two concurrent first requests may both authenticate; the first to
    /// register wins and the other actor stops when its handle drops.
    pub async fn get_or_start(&self, identity: &Identity) -> Result<SessionHandle, SessionError> {
        if let Some(handle) = self.get(&identity.uid) {
            return Ok(handle);
        }

        let started =
            SessionActor::start(identity, self.store.clone(), self.settings.clone()).await?;
        let handle = match self.running.entry(identity.uid.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    entry.insert(started.clone());
                    self.remove_when_closed(started);
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                self.remove_when_closed(started.clone());
                entry.insert(started).value().clone()
            }
        };
        Ok(handle)
    }

    /// Drop the registry entry once the actor behind `handle` has stopped,
    /// unless a newer session has replaced it by then.
    fn remove_when_closed(&self, handle: SessionHandle) {
        let running = Arc::downgrade(&self.running);
        tokio::spawn(async move {
            handle.tx.closed().await;
            if let Some(running) = running.upgrade() {
                running.remove_if(&handle.uid, |_, current| {
                    current.tx.same_channel(&handle.tx)
                });
            }
        });
    }

    /// The running session for `uid`, if any.
    pub fn get(&self, uid: &str) -> Option<SessionHandle> {
        self.running
            .get(uid)
            .map(|h| h.value().clone())
            .filter(|h| !h.is_closed())
    }

    pub async fn sign_out(&self, uid: &str) -> bool {
        match self.running.remove(uid) {
            Some((_, handle)) => {
                handle.sign_out().await;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_change_returns_immediately_when_behind() {
        let (areas_tx, areas) = watch::channel(3u64);
        let (_presence_tx, presence) = watch::channel(0u64);
        let revisions = Revisions { areas, presence };

        let seen = revisions
            .wait_for_change(1, 0, Duration::from_secs(30))
            .await;
        assert_eq!(seen, (3, 0));
        drop(areas_tx);
    }

    #[tokio::test]
    async fn test_wait_for_change_wakes_on_bump() {
        let (_areas_tx, areas) = watch::channel(0u64);
        let (presence_tx, presence) = watch::channel(0u64);
        let revisions = Revisions { areas, presence };

        let waiter = tokio::spawn(revisions.wait_for_change(0, 0, Duration::from_secs(30)));
        presence_tx.send_modify(|v| *v += 1);
        assert_eq!(waiter.await.unwrap(), (0, 1));
    }

    #[tokio::test]
    async fn test_wait_for_change_times_out() {
        let (_areas_tx, areas) = watch::channel(5u64);
        let (_presence_tx, presence) = watch::channel(7u64);
        let revisions = Revisions { areas, presence };

        let started = Instant::now();
        let seen = revisions
            .wait_for_change(5, 7, Duration::from_millis(50))
            .await;
        assert_eq!(seen, (5, 7));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
