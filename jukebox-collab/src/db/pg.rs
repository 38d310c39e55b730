use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, query, query_as, Error as SqlxError, PgPool, Row};

use super::{
    Database, DatabaseError, IntoDatabaseError, NewRoomRecord, NewSession, NewUser, Result,
    RoomRecord, SessionData, UserData,
};

/// A postgres database implementation for jukebox
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: &str) -> Result<UserData> {
        query_as::<_, UserData>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn upsert_user(&self, new_user: NewUser) -> Result<UserData> {
        query_as::<_, UserData>(
            "INSERT INTO users (id, email, name, picture, role)
             VALUES ($1, $2, $3, $4, 'user')
             ON CONFLICT (id) DO UPDATE
             SET email = $2, name = $3, picture = $4
             RETURNING *",
        )
        .bind(&new_user.id)
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&new_user.picture)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn delete_user_cascade(&self, user_id: &str) -> Result<()> {
        // Ensure user exists
        let _ = self.user_by_id(user_id).await?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query("DELETE FROM rooms WHERE owner_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row = query("SELECT token, user_id, expires_at FROM sessions WHERE token = $1")
            .bind(token)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("session", "token"))?;

        let user = self.user_by_id(row.get("user_id")).await?;

        Ok(SessionData {
            token: row.get("token"),
            expires_at: row.get("expires_at"),
            user,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&new_session.token)
            .bind(&new_session.user_id)
            .bind(new_session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        query("DELETE FROM sessions WHERE timezone('UTC', now()) > expires_at")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn room_by_id(&self, room_id: &str) -> Result<RoomRecord> {
        query_as::<_, RoomRecord>("SELECT * FROM rooms WHERE id = LOWER($1)")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "id"))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>> {
        query_as::<_, RoomRecord>("SELECT * FROM rooms ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn rooms_by_owner(&self, user_id: &str) -> Result<Vec<RoomRecord>> {
        query_as::<_, RoomRecord>("SELECT * FROM rooms WHERE owner_id = $1 ORDER BY created_at")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn create_room(&self, new_room: NewRoomRecord) -> Result<RoomRecord> {
        query(
            "INSERT INTO rooms (id, name, owner_id, is_public, password_hash)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&new_room.id)
        .bind(&new_room.name)
        .bind(&new_room.owner_id)
        .bind(new_room.is_public)
        .bind(&new_room.password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.room_by_id(&new_room.id).await
    }

    async fn delete_room(&self, room_id: &str) -> Result<()> {
        // Ensure room exists
        let _ = self.room_by_id(room_id).await?;

        query("DELETE FROM rooms WHERE id = LOWER($1)")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn touch_room(&self, room_id: &str) -> Result<()> {
        query("UPDATE rooms SET last_active_at = timezone('UTC', now()) WHERE id = LOWER($1)")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
