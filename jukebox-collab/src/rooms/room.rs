use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use argon2::{password_hash::Encoding, Argon2, PasswordHash, PasswordVerifier};
use log::warn;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::{input::ResolvedTrack, RoomRecord, SharedDatabase, UserData};

use super::state::{
    HistoryEntry, RoomState, Settings, SettingsPatch, SuggestOutcome, Suggester, Track, TrackId,
    VoteDirection,
};
use super::RoomError;

pub type RoomId = String;
pub type ConnectionId = u64;

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

const TICK_INTERVAL: Duration = Duration::from_secs(1);

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// One client's attachment to a room
#[derive(Debug, Clone)]
pub struct RoomConnection {
    pub id: ConnectionId,
    pub user_id: Option<String>,
    sender: mpsc::UnboundedSender<RoomBroadcast>,
}

impl RoomConnection {
    pub fn new(user_id: Option<String>, sender: mpsc::UnboundedSender<RoomBroadcast>) -> Self {
        Self {
            id: CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            user_id,
            sender,
        }
    }

    fn send(&self, broadcast: RoomBroadcast) {
        // A dead receiver is cleaned up by the gateway's detach
        self.sender.send(broadcast).ok();
    }
}

/// Pushed from a room actor to its attached connections
#[derive(Debug, Clone)]
pub enum RoomBroadcast {
    /// The full state after a mutation. Clients mirror this verbatim.
    State(SerializedRoom),
    /// The room was torn down and the attachment is gone
    Deleted,
    /// A suggestion awaits moderation, sent to the owner only
    PendingSuggestion { track: Track },
}

/// The full wire view of a room
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedRoom {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub is_public: bool,
    pub queue: Vec<Track>,
    pub progress: u32,
    pub is_playing: bool,
    pub pending_suggestions: Vec<Track>,
    pub banned_video_ids: Vec<String>,
    pub history: Vec<HistoryEntry>,
    pub settings: Settings,
    pub listeners: usize,
}

pub(super) enum RoomCommand {
    Tick,
    Attach {
        connection: RoomConnection,
    },
    Detach {
        connection_id: ConnectionId,
    },
    Suggest {
        suggested_by: Suggester,
        resolved: ResolvedTrack,
        reply: Reply<SuggestOutcome>,
    },
    Vote {
        client_id: String,
        track_id: TrackId,
        direction: VoteDirection,
        reply: Reply<()>,
    },
    Approve {
        user_id: Option<String>,
        track_id: TrackId,
        reply: Reply<()>,
    },
    Reject {
        user_id: Option<String>,
        track_id: TrackId,
        reply: Reply<()>,
    },
    Ban {
        user_id: Option<String>,
        track_id: TrackId,
        reply: Reply<()>,
    },
    Unban {
        user_id: Option<String>,
        video_id: String,
        reply: Reply<()>,
    },
    DeleteTrack {
        user_id: Option<String>,
        track_id: TrackId,
        reply: Reply<()>,
    },
    PlayPause {
        user_id: Option<String>,
        playing: bool,
        reply: Reply<()>,
    },
    Seek {
        user_id: Option<String>,
        seconds: u32,
        reply: Reply<()>,
    },
    UpdateDuration {
        seconds: u32,
        reply: Reply<()>,
    },
    UpdateSettings {
        user_id: Option<String>,
        patch: SettingsPatch,
        reply: Reply<()>,
    },
    RemoveFromLibrary {
        user_id: Option<String>,
        video_id: String,
        reply: Reply<()>,
    },
    Shutdown,
}

/// A cheap, cloneable reference to a live room actor
#[derive(Clone)]
pub struct RoomHandle {
    data: Arc<RoomRecord>,
    sender: mpsc::UnboundedSender<RoomCommand>,
    listeners: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub fn id(&self) -> &str {
        &self.data.id
    }

    pub fn data(&self) -> &RoomRecord {
        &self.data
    }

    pub fn listeners(&self) -> usize {
        self.listeners.load(Ordering::Relaxed)
    }

    pub fn is_owner(&self, user_id: Option<&str>) -> bool {
        match (&self.data.owner_id, user_id) {
            (Some(owner), Some(user)) => owner == user,
            _ => false,
        }
    }

    /// The password gate for joining. Owners and admins skip it.
    pub fn check_password(
        &self,
        user: Option<&UserData>,
        password: Option<&str>,
    ) -> Result<(), RoomError> {
        let Some(hash) = self.data.password_hash.as_deref() else {
            return Ok(());
        };

        let is_privileged = user
            .map(|u| self.is_owner(Some(&u.id)) || u.is_admin())
            .unwrap_or(false);

        if is_privileged {
            return Ok(());
        }

        let Some(password) = password else {
            return Err(RoomError::PasswordRequired);
        };

        let parsed =
            PasswordHash::parse(hash, Encoding::default()).map_err(|_| RoomError::WrongPassword)?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| RoomError::WrongPassword)
    }

    pub fn attach(&self, connection: RoomConnection) {
        self.sender.send(RoomCommand::Attach { connection }).ok();
    }

    pub fn detach(&self, connection_id: ConnectionId) {
        self.sender.send(RoomCommand::Detach { connection_id }).ok();
    }

    pub async fn suggest(
        &self,
        suggested_by: Suggester,
        resolved: ResolvedTrack,
    ) -> Result<SuggestOutcome, RoomError> {
        self.request(|reply| RoomCommand::Suggest {
            suggested_by,
            resolved,
            reply,
        })
        .await
    }

    pub async fn vote(
        &self,
        client_id: String,
        track_id: TrackId,
        direction: VoteDirection,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Vote {
            client_id,
            track_id,
            direction,
            reply,
        })
        .await
    }

    pub async fn approve(
        &self,
        user_id: Option<String>,
        track_id: TrackId,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Approve {
            user_id,
            track_id,
            reply,
        })
        .await
    }

    pub async fn reject(
        &self,
        user_id: Option<String>,
        track_id: TrackId,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Reject {
            user_id,
            track_id,
            reply,
        })
        .await
    }

    pub async fn ban(&self, user_id: Option<String>, track_id: TrackId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Ban {
            user_id,
            track_id,
            reply,
        })
        .await
    }

    pub async fn unban(&self, user_id: Option<String>, video_id: String) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Unban {
            user_id,
            video_id,
            reply,
        })
        .await
    }

    pub async fn delete_track(
        &self,
        user_id: Option<String>,
        track_id: TrackId,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::DeleteTrack {
            user_id,
            track_id,
            reply,
        })
        .await
    }

    pub async fn play_pause(
        &self,
        user_id: Option<String>,
        playing: bool,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::PlayPause {
            user_id,
            playing,
            reply,
        })
        .await
    }

    pub async fn seek(&self, user_id: Option<String>, seconds: u32) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Seek {
            user_id,
            seconds,
            reply,
        })
        .await
    }

    pub async fn update_duration(&self, seconds: u32) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::UpdateDuration { seconds, reply })
            .await
    }

    pub async fn update_settings(
        &self,
        user_id: Option<String>,
        patch: SettingsPatch,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::UpdateSettings {
            user_id,
            patch,
            reply,
        })
        .await
    }

    pub async fn remove_from_library(
        &self,
        user_id: Option<String>,
        video_id: String,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::RemoveFromLibrary {
            user_id,
            video_id,
            reply,
        })
        .await
    }

    pub(super) fn shutdown(&self) {
        self.sender.send(RoomCommand::Shutdown).ok();
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply, response) = oneshot::channel();

        self.sender
            .send(build(reply))
            .map_err(|_| RoomError::NotFound)?;

        response.await.map_err(|_| RoomError::NotFound)?
    }
}

/// Spawns the actor task and its ticker, returning the handle.
pub(super) fn spawn_room(data: RoomRecord, db: SharedDatabase) -> RoomHandle {
    let (sender, inbox) = mpsc::unbounded_channel();
    let listeners = Arc::new(AtomicUsize::new(0));
    let data = Arc::new(data);

    let actor = RoomActor {
        data: data.clone(),
        db,
        state: RoomState::new(),
        connections: Vec::new(),
        listeners: listeners.clone(),
    };

    tokio::spawn(actor.run(inbox));

    // The clock is just another message in the inbox, so a tick can
    // never interleave with a half-applied vote or suggestion.
    let ticker = sender.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);

        loop {
            interval.tick().await;

            if ticker.send(RoomCommand::Tick).is_err() {
                break;
            }
        }
    });

    RoomHandle {
        data,
        sender,
        listeners,
    }
}

struct RoomActor {
    data: Arc<RoomRecord>,
    db: SharedDatabase,
    state: RoomState,
    connections: Vec<RoomConnection>,
    listeners: Arc<AtomicUsize>,
}

impl RoomActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<RoomCommand>) {
        while let Some(command) = inbox.recv().await {
            if !self.handle(command) {
                break;
            }
        }
    }

    /// Processes one command. Returns false when the room shuts down.
    fn handle(&mut self, command: RoomCommand) -> bool {
        match command {
            RoomCommand::Tick => {
                if self.state.tick() {
                    self.broadcast_state();
                }
            }
            RoomCommand::Attach { connection } => {
                self.connections.push(connection);
                self.update_listeners();

                // The newcomer gets the full state right away
                if let Some(connection) = self.connections.last() {
                    connection.send(RoomBroadcast::State(self.snapshot()));
                }
            }
            RoomCommand::Detach { connection_id } => {
                self.connections.retain(|c| c.id != connection_id);
                self.update_listeners();
            }
            RoomCommand::Suggest {
                suggested_by,
                resolved,
                reply,
            } => {
                let is_owner = self.is_owner(suggested_by.user_id.as_deref());
                let result = self.state.suggest(&resolved, suggested_by, is_owner);

                if let Ok(outcome) = &result {
                    if *outcome == SuggestOutcome::Pending && self.state.settings.owner_popups {
                        self.notify_owner();
                    }

                    self.after_mutation();
                }

                reply.send(result).ok();
            }
            RoomCommand::Vote {
                client_id,
                track_id,
                direction,
                reply,
            } => {
                let result = self.state.vote(&client_id, track_id, direction);
                self.finish(result, reply);
            }
            RoomCommand::Approve {
                user_id,
                track_id,
                reply,
            } => {
                let result = self
                    .authorize(user_id.as_deref())
                    .and_then(|_| self.state.approve(track_id));
                self.finish(result, reply);
            }
            RoomCommand::Reject {
                user_id,
                track_id,
                reply,
            } => {
                let result = self
                    .authorize(user_id.as_deref())
                    .and_then(|_| self.state.reject(track_id));
                self.finish(result, reply);
            }
            RoomCommand::Ban {
                user_id,
                track_id,
                reply,
            } => {
                let result = self
                    .authorize(user_id.as_deref())
                    .and_then(|_| self.state.ban(track_id));
                self.finish(result, reply);
            }
            RoomCommand::Unban {
                user_id,
                video_id,
                reply,
            } => {
                let result = self.authorize(user_id.as_deref()).map(|_| {
                    self.state.unban(&video_id);
                });
                self.finish(result, reply);
            }
            RoomCommand::DeleteTrack {
                user_id,
                track_id,
                reply,
            } => {
                let result = self
                    .authorize(user_id.as_deref())
                    .and_then(|_| self.state.delete_track(track_id));
                self.finish(result, reply);
            }
            RoomCommand::PlayPause {
                user_id,
                playing,
                reply,
            } => {
                let result = self.authorize(user_id.as_deref()).map(|_| {
                    self.state.set_playing(playing);
                });
                self.finish(result, reply);
            }
            RoomCommand::Seek {
                user_id,
                seconds,
                reply,
            } => {
                let result = self.authorize(user_id.as_deref()).map(|_| {
                    self.state.seek(seconds);
                });
                self.finish(result, reply);
            }
            RoomCommand::UpdateDuration { seconds, reply } => {
                self.state.update_duration(seconds);
                self.finish(Ok(()), reply);
            }
            RoomCommand::UpdateSettings {
                user_id,
                patch,
                reply,
            } => {
                let result = self.authorize(user_id.as_deref()).map(|_| {
                    self.state.update_settings(patch);
                });
                self.finish(result, reply);
            }
            RoomCommand::RemoveFromLibrary {
                user_id,
                video_id,
                reply,
            } => {
                let result = self.authorize(user_id.as_deref()).map(|_| {
                    self.state.remove_from_library(&video_id);
                });
                self.finish(result, reply);
            }
            RoomCommand::Shutdown => {
                for connection in &self.connections {
                    connection.send(RoomBroadcast::Deleted);
                }

                return false;
            }
        }

        true
    }

    /// The capability check every owner-only operation goes through
    fn authorize(&self, user_id: Option<&str>) -> Result<(), RoomError> {
        if self.is_owner(user_id) {
            Ok(())
        } else {
            Err(RoomError::Forbidden)
        }
    }

    fn is_owner(&self, user_id: Option<&str>) -> bool {
        match (&self.data.owner_id, user_id) {
            (Some(owner), Some(user)) => owner == user,
            _ => false,
        }
    }

    fn finish(&mut self, result: Result<(), RoomError>, reply: Reply<()>) {
        if result.is_ok() {
            self.after_mutation();
        }

        reply.send(result).ok();
    }

    /// Broadcast happens after the mutation is fully applied, so a
    /// client can never observe a half-applied vote or suggestion.
    fn after_mutation(&mut self) {
        self.broadcast_state();
        self.touch();
    }

    fn broadcast_state(&self) {
        let snapshot = self.snapshot();

        for connection in &self.connections {
            connection.send(RoomBroadcast::State(snapshot.clone()));
        }
    }

    fn notify_owner(&self) {
        let Some(track) = self.state.pending_suggestions.last() else {
            return;
        };

        for connection in &self.connections {
            if self.is_owner(connection.user_id.as_deref()) {
                connection.send(RoomBroadcast::PendingSuggestion {
                    track: track.clone(),
                });
            }
        }
    }

    fn snapshot(&self) -> SerializedRoom {
        SerializedRoom {
            id: self.data.id.clone(),
            name: self.data.name.clone(),
            owner_id: self.data.owner_id.clone(),
            is_public: self.data.is_public,
            queue: self.state.queue.clone(),
            progress: self.state.progress,
            is_playing: self.state.is_playing,
            pending_suggestions: self.state.pending_suggestions.clone(),
            banned_video_ids: self.state.banned_video_ids.iter().cloned().collect(),
            history: self.state.history.clone(),
            settings: self.state.settings.clone(),
            listeners: self.connections.len(),
        }
    }

    fn update_listeners(&self) {
        self.listeners.store(self.connections.len(), Ordering::Relaxed);
    }

    /// Best-effort activity checkpoint. A failing store never stalls
    /// the room.
    fn touch(&self) {
        let db = self.db.clone();
        let room_id = self.data.id.clone();

        tokio::spawn(async move {
            if let Err(error) = db.touch_room(&room_id).await {
                warn!("Failed to update activity for room {room_id}: {error}");
            }
        });
    }
}
