use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod pg;
pub use pg::*;

#[cfg(test)]
pub(crate) mod memory;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type SharedDatabase = Arc<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Represents a type that can fetch and store jukebox data durably
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn user_by_id(&self, user_id: &str) -> Result<UserData>;
    /// Creates the user on first login, refreshes profile fields on
    /// every subsequent one.
    async fn upsert_user(&self, new_user: NewUser) -> Result<UserData>;
    /// Deletes the user's rooms, sessions, and account in one atomic
    /// step. Partial failure must leave every row in place.
    async fn delete_user_cascade(&self, user_id: &str) -> Result<()>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self) -> Result<()>;

    async fn room_by_id(&self, room_id: &str) -> Result<RoomRecord>;
    async fn list_rooms(&self) -> Result<Vec<RoomRecord>>;
    async fn rooms_by_owner(&self, user_id: &str) -> Result<Vec<RoomRecord>>;
    async fn create_room(&self, new_room: NewRoomRecord) -> Result<RoomRecord>;
    async fn delete_room(&self, room_id: &str) -> Result<()>;
    /// Bumps the room's last-activity timestamp.
    async fn touch_room(&self, room_id: &str) -> Result<()>;
}
