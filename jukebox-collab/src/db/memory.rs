//! In-memory [Database] used as the test double for auth and room tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{
    Database, DatabaseError, NewRoomRecord, NewSession, NewUser, Result, RoomRecord, SessionData,
    UserData,
};

#[derive(Default)]
pub struct MemoryDatabase {
    users: Mutex<HashMap<String, UserData>>,
    sessions: Mutex<HashMap<String, (String, chrono::DateTime<Utc>)>>,
    rooms: Mutex<HashMap<String, RoomRecord>>,
    /// When set, every write fails before touching any row. Used to
    /// simulate an unavailable store.
    pub fail_writes: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(DatabaseError::Internal("store unavailable".into()))
        } else {
            Ok(())
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: &str) -> Result<UserData> {
        self.users
            .lock()
            .get(user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    async fn upsert_user(&self, new_user: NewUser) -> Result<UserData> {
        self.check_writable()?;

        let mut users = self.users.lock();
        let user = users
            .entry(new_user.id.clone())
            .and_modify(|existing| {
                existing.email = new_user.email.clone();
                existing.name = new_user.name.clone();
                existing.picture = new_user.picture.clone();
            })
            .or_insert_with(|| UserData {
                id: new_user.id.clone(),
                email: new_user.email.clone(),
                name: new_user.name.clone(),
                picture: new_user.picture.clone(),
                role: "user".to_string(),
                created_at: Utc::now(),
            });

        Ok(user.clone())
    }

    async fn delete_user_cascade(&self, user_id: &str) -> Result<()> {
        let _ = self.user_by_id(user_id).await?;
        self.check_writable()?;

        self.rooms
            .lock()
            .retain(|_, room| room.owner_id.as_deref() != Some(user_id));
        self.sessions.lock().retain(|_, (owner, _)| owner != user_id);
        self.users.lock().remove(user_id);

        Ok(())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let (user_id, expires_at) =
            self.sessions
                .lock()
                .get(token)
                .cloned()
                .ok_or(DatabaseError::NotFound {
                    resource: "session",
                    identifier: "token",
                })?;

        let user = self.user_by_id(&user_id).await?;

        Ok(SessionData {
            token: token.to_string(),
            expires_at,
            user,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.check_writable()?;

        self.sessions.lock().insert(
            new_session.token.clone(),
            (new_session.user_id.clone(), new_session.expires_at),
        );

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        self.sessions.lock().remove(token);
        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();
        self.sessions.lock().retain(|_, (_, expiry)| *expiry > now);
        Ok(())
    }

    async fn room_by_id(&self, room_id: &str) -> Result<RoomRecord> {
        self.rooms
            .lock()
            .get(&room_id.to_lowercase())
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            })
    }

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>> {
        let mut rooms: Vec<_> = self.rooms.lock().values().cloned().collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rooms)
    }

    async fn rooms_by_owner(&self, user_id: &str) -> Result<Vec<RoomRecord>> {
        let mut rooms: Vec<_> = self
            .rooms
            .lock()
            .values()
            .filter(|room| room.owner_id.as_deref() == Some(user_id))
            .cloned()
            .collect();

        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rooms)
    }

    async fn create_room(&self, new_room: NewRoomRecord) -> Result<RoomRecord> {
        self.check_writable()?;

        let record = RoomRecord {
            id: new_room.id.to_lowercase(),
            name: new_room.name,
            owner_id: new_room.owner_id,
            is_public: new_room.is_public,
            password_hash: new_room.password_hash,
            created_at: Utc::now(),
            last_active_at: Utc::now(),
        };

        self.rooms.lock().insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete_room(&self, room_id: &str) -> Result<()> {
        self.rooms
            .lock()
            .remove(&room_id.to_lowercase())
            .map(|_| ())
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            })
    }

    async fn touch_room(&self, room_id: &str) -> Result<()> {
        if let Some(room) = self.rooms.lock().get_mut(&room_id.to_lowercase()) {
            room.last_active_at = Utc::now();
        }

        Ok(())
    }
}
