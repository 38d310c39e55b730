use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A jukebox account, keyed by the identity provider's subject id.
#[derive(Debug, Clone, FromRow)]
pub struct UserData {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A room registry row. The live queue and playback state belong to the
/// room actor, not the database.
#[derive(Debug, Clone, FromRow)]
pub struct RoomRecord {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub is_public: bool,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: String,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewRoomRecord {
    pub id: String,
    pub name: String,
    /// The owner of the new room. System-seeded rooms have no owner.
    pub owner_id: Option<String>,
    pub is_public: bool,
    pub password_hash: Option<String>,
}

impl UserData {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}
