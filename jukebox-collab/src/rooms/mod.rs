mod room;
mod state;

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHasher,
};
use dashmap::DashMap;
use log::info;
use serde::Serialize;
use thiserror::Error;

pub use room::*;
pub use state::*;

use crate::{
    util::{random_string, slugify},
    DatabaseError, NewRoomRecord, SharedDatabase, UserData,
};

const MAX_NAME_LENGTH: usize = 48;
const DISAMBIGUATOR_LENGTH: usize = 4;

/// The registry of live room actors. Reads go straight through the
/// map, only creation and teardown are serialized per entry.
pub struct RoomManager {
    db: SharedDatabase,
    rooms: DashMap<RoomId, RoomHandle>,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("A room name is required")]
    NameRequired,
    #[error("Room names are limited to {MAX_NAME_LENGTH} characters")]
    NameTooLong,
    #[error("Room does not exist")]
    NotFound,
    #[error("Only the room owner can do this")]
    Forbidden,
    #[error("This room requires a password")]
    PasswordRequired,
    #[error("Incorrect room password")]
    WrongPassword,
    #[error("Track does not exist")]
    TrackNotFound,
    #[error("Voting is disabled in this room")]
    VotesDisabled,
    #[error("The playing track cannot be voted on")]
    CurrentTrackVote,
    #[error("Suggestions are disabled in this room")]
    SuggestionsDisabled,
    #[error("This video was banned by the room owner")]
    Banned,
    #[error("Only music can be suggested in this room")]
    NotMusic,
    #[error("This video exceeds the room's duration limit")]
    TooLong,
    #[error("This video was played too recently")]
    RecentlyPlayed,
    #[error("The queue is full")]
    QueueFull,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

#[derive(Debug)]
pub struct NewRoom {
    pub name: String,
    pub owner_id: Option<String>,
    pub is_public: bool,
    pub password: Option<String>,
}

/// What a room looks like in listings. Never carries the password.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub is_public: bool,
    pub password_protected: bool,
    pub listeners: usize,
}

#[derive(Debug, Clone)]
pub enum RoomFilter {
    Public,
    Private,
    OwnedBy(String),
}

impl RoomManager {
    pub fn new(db: &SharedDatabase) -> Self {
        Self {
            db: db.clone(),
            rooms: DashMap::new(),
        }
    }

    /// Respawns an actor for every registry row on boot
    pub async fn restore(&self) -> Result<(), DatabaseError> {
        let records = self.db.list_rooms().await?;
        let count = records.len();

        for record in records {
            let handle = spawn_room(record, self.db.clone());
            self.rooms.insert(handle.id().to_string(), handle);
        }

        info!("Restored {count} rooms");
        Ok(())
    }

    pub async fn create_room(&self, new_room: NewRoom) -> Result<RoomSummary, RoomError> {
        let name = new_room.name.trim();

        if name.is_empty() {
            return Err(RoomError::NameRequired);
        }

        if name.len() > MAX_NAME_LENGTH {
            return Err(RoomError::NameTooLong);
        }

        let password_hash = new_room
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(hash_password)
            .transpose()?;

        let id = self.vacant_id(name).await?;

        let record = self
            .db
            .create_room(NewRoomRecord {
                id,
                name: name.to_string(),
                owner_id: new_room.owner_id,
                is_public: new_room.is_public,
                password_hash,
            })
            .await
            .map_err(RoomError::Db)?;

        info!("Room {} created", record.id);

        let handle = spawn_room(record, self.db.clone());
        let summary = summarize(&handle);

        self.rooms.insert(handle.id().to_string(), handle);
        Ok(summary)
    }

    pub fn room_by_id(&self, room_id: &str) -> Result<RoomHandle, RoomError> {
        self.rooms
            .get(&room_id.to_lowercase())
            .map(|entry| entry.value().clone())
            .ok_or(RoomError::NotFound)
    }

    pub async fn list(&self, filter: RoomFilter) -> Result<Vec<RoomSummary>, RoomError> {
        let records = match &filter {
            RoomFilter::OwnedBy(user_id) => self.db.rooms_by_owner(user_id).await,
            _ => self.db.list_rooms().await,
        }
        .map_err(RoomError::Db)?;

        let summaries = records
            .into_iter()
            .filter(|record| match filter {
                RoomFilter::Public => record.is_public,
                RoomFilter::Private => !record.is_public,
                RoomFilter::OwnedBy(_) => true,
            })
            .map(|record| RoomSummary {
                listeners: self
                    .rooms
                    .get(&record.id)
                    .map(|r| r.listeners())
                    .unwrap_or_default(),
                password_protected: record.password_hash.is_some(),
                id: record.id,
                name: record.name,
                is_public: record.is_public,
            })
            .collect();

        Ok(summaries)
    }

    /// Tears the room down for good. Only the owner or an admin may.
    pub async fn delete_room(&self, room_id: &str, requester: &UserData) -> Result<(), RoomError> {
        let handle = self.room_by_id(room_id)?;

        if !handle.is_owner(Some(&requester.id)) && !requester.is_admin() {
            return Err(RoomError::Forbidden);
        }

        // The registry row goes first so a failing store leaves the
        // live room untouched
        self.db
            .delete_room(handle.id())
            .await
            .map_err(RoomError::Db)?;

        self.evict(handle.id());
        info!("Room {room_id} deleted");
        Ok(())
    }

    /// Stops a live actor without touching the registry. Used after
    /// the database cascade of an account deletion.
    pub(crate) fn evict(&self, room_id: &str) {
        if let Some((_, handle)) = self.rooms.remove(&room_id.to_lowercase()) {
            handle.shutdown();
        }
    }

    /// Finds an unused identifier derived from the name
    async fn vacant_id(&self, name: &str) -> Result<String, RoomError> {
        let slug = match slugify(name) {
            s if s.is_empty() => "room".to_string(),
            s => s,
        };

        loop {
            let candidate = format!(
                "{slug}-{}",
                random_string(DISAMBIGUATOR_LENGTH).to_lowercase()
            );

            match self.db.room_by_id(&candidate).await {
                Err(DatabaseError::NotFound { .. }) => return Ok(candidate),
                Err(e) => return Err(RoomError::Db(e)),
                Ok(_) => continue,
            }
        }
    }
}

fn summarize(handle: &RoomHandle) -> RoomSummary {
    let record = handle.data();

    RoomSummary {
        id: record.id.clone(),
        name: record.name.clone(),
        is_public: record.is_public,
        password_protected: record.password_hash.is_some(),
        listeners: handle.listeners(),
    }
}

fn hash_password(password: &str) -> Result<String, RoomError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| RoomError::Db(DatabaseError::Internal(e.to_string().into())))
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::db::memory::MemoryDatabase;
    use crate::input::ResolvedTrack;

    fn manager() -> RoomManager {
        let db: SharedDatabase = Arc::new(MemoryDatabase::new());
        RoomManager::new(&db)
    }

    fn owner() -> UserData {
        UserData {
            id: "owner-1".to_string(),
            email: "owner@example.com".to_string(),
            name: "Owner".to_string(),
            picture: String::new(),
            role: "user".to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    fn new_room(name: &str, password: Option<&str>) -> NewRoom {
        NewRoom {
            name: name.to_string(),
            owner_id: Some("owner-1".to_string()),
            is_public: true,
            password: password.map(str::to_string),
        }
    }

    fn resolved(video_id: &str) -> ResolvedTrack {
        ResolvedTrack {
            video_id: video_id.to_string(),
            title: "A track".to_string(),
            channel: "A channel".to_string(),
            thumbnail: String::new(),
            duration: 120,
            is_music: true,
        }
    }

    #[tokio::test]
    async fn created_rooms_are_found_case_insensitively() {
        let manager = manager();

        let summary = manager
            .create_room(new_room("Friday Bangers", None))
            .await
            .unwrap();

        assert!(summary.id.starts_with("friday-bangers-"));
        assert!(manager.room_by_id(&summary.id.to_uppercase()).is_ok());
    }

    #[tokio::test]
    async fn empty_names_are_rejected() {
        let manager = manager();

        let result = manager.create_room(new_room("   ", None)).await;
        assert!(matches!(result, Err(RoomError::NameRequired)));
    }

    #[tokio::test]
    async fn overlong_names_are_rejected() {
        let manager = manager();

        let result = manager.create_room(new_room(&"x".repeat(60), None)).await;
        assert!(matches!(result, Err(RoomError::NameTooLong)));
    }

    #[tokio::test]
    async fn strangers_cannot_delete_rooms() {
        let manager = manager();

        let summary = manager
            .create_room(new_room("Owner's Den", None))
            .await
            .unwrap();

        let mut stranger = owner();
        stranger.id = "stranger".to_string();

        let result = manager.delete_room(&summary.id, &stranger).await;
        assert!(matches!(result, Err(RoomError::Forbidden)));
        assert!(manager.room_by_id(&summary.id).is_ok());
    }

    #[tokio::test]
    async fn admins_can_delete_any_room() {
        let manager = manager();

        let summary = manager.create_room(new_room("Doomed", None)).await.unwrap();

        let mut admin = owner();
        admin.id = "site-admin".to_string();
        admin.role = "admin".to_string();

        manager.delete_room(&summary.id, &admin).await.unwrap();
        assert!(manager.room_by_id(&summary.id).is_err());
    }

    #[tokio::test]
    async fn protected_rooms_verify_passwords() {
        let manager = manager();

        let summary = manager
            .create_room(new_room("Secret Club", Some("hunter2")))
            .await
            .unwrap();
        assert!(summary.password_protected);

        let handle = manager.room_by_id(&summary.id).unwrap();

        assert!(matches!(
            handle.check_password(None, None),
            Err(RoomError::PasswordRequired)
        ));
        assert!(matches!(
            handle.check_password(None, Some("wrong")),
            Err(RoomError::WrongPassword)
        ));
        assert!(handle.check_password(None, Some("hunter2")).is_ok());

        // The owner never needs the password
        assert!(handle.check_password(Some(&owner()), None).is_ok());
    }

    #[tokio::test]
    async fn attached_connections_receive_state_broadcasts() {
        let manager = manager();

        let summary = manager
            .create_room(new_room("Broadcast Test", None))
            .await
            .unwrap();
        let handle = manager.room_by_id(&summary.id).unwrap();

        let (sender, mut receiver) = mpsc::unbounded_channel();
        handle.attach(RoomConnection::new(None, sender));

        // Attaching immediately mirrors the full state
        let first = receiver.recv().await.unwrap();
        let RoomBroadcast::State(state) = first else {
            panic!("expected a state broadcast");
        };
        assert!(state.queue.is_empty());
        assert_eq!(state.listeners, 1);

        let suggester = Suggester {
            user_id: None,
            display_name: "Guest".to_string(),
        };
        let outcome = handle.suggest(suggester, resolved("abc123")).await.unwrap();
        assert_eq!(outcome, SuggestOutcome::Queued);

        let second = receiver.recv().await.unwrap();
        let RoomBroadcast::State(state) = second else {
            panic!("expected a state broadcast");
        };
        assert_eq!(state.queue.len(), 1);
        assert!(state.is_playing);
    }

    #[tokio::test]
    async fn deleting_a_room_notifies_attached_connections() {
        let manager = manager();

        let summary = manager.create_room(new_room("Short Lived", None)).await.unwrap();
        let handle = manager.room_by_id(&summary.id).unwrap();

        let (sender, mut receiver) = mpsc::unbounded_channel();
        handle.attach(RoomConnection::new(None, sender));
        receiver.recv().await.unwrap();

        manager.delete_room(&summary.id, &owner()).await.unwrap();

        let broadcast = receiver.recv().await.unwrap();
        assert!(matches!(broadcast, RoomBroadcast::Deleted));
    }

    #[tokio::test]
    async fn owner_only_operations_require_the_owner() {
        let manager = manager();

        let summary = manager.create_room(new_room("Moderated", None)).await.unwrap();
        let handle = manager.room_by_id(&summary.id).unwrap();

        let result = handle.play_pause(Some("stranger".to_string()), true).await;
        assert!(matches!(result, Err(RoomError::Forbidden)));

        let result = handle.play_pause(None, true).await;
        assert!(matches!(result, Err(RoomError::Forbidden)));

        handle
            .play_pause(Some("owner-1".to_string()), true)
            .await
            .unwrap();
    }
}
