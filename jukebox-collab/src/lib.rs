mod auth;
mod db;
mod identity;
mod input;
mod rooms;
mod util;

use std::sync::Arc;

use log::info;

pub use auth::*;
pub use db::*;
pub use identity::*;
pub use input::*;
pub use rooms::*;

/// The jukebox collab system, facilitating rooms, queues,
/// authentication, and moderation.
pub struct Collab {
    pub database: SharedDatabase,
    pub auth: Auth,
    pub resolver: Arc<dyn TrackResolver>,
    pub rooms: RoomManager,
}

impl Collab {
    pub fn new(
        database: SharedDatabase,
        identity: Arc<dyn IdentityProvider>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Self {
        let auth = Auth::new(&database, identity);
        let rooms = RoomManager::new(&database);

        Self {
            database,
            auth,
            resolver,
            rooms,
        }
    }

    /// Brings every persisted room back to life. Called once on boot.
    pub async fn restore(&self) -> std::result::Result<(), DatabaseError> {
        self.rooms.restore().await
    }

    /// Erases an account: every owned room, every session, then the
    /// user row, atomically. Live actors are only torn down once the
    /// store has committed, so a failure leaves everything running.
    pub async fn delete_account(&self, user_id: &str) -> std::result::Result<(), AuthError> {
        let owned = self
            .database
            .rooms_by_owner(user_id)
            .await
            .map_err(AuthError::Db)?;

        self.database
            .delete_user_cascade(user_id)
            .await
            .map_err(AuthError::Db)?;

        for record in owned {
            self.rooms.evict(&record.id);
        }

        info!("Account {user_id} deleted");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::auth::test::MockIdentity;
    use crate::db::memory::MemoryDatabase;

    struct NoResolver;

    #[async_trait::async_trait]
    impl TrackResolver for NoResolver {
        async fn resolve(&self, _query: &str) -> std::result::Result<ResolvedTrack, ResolveError> {
            Err(ResolveError::NotFound)
        }
    }

    fn collab_with_db() -> (Collab, Arc<MemoryDatabase>) {
        let db = Arc::new(MemoryDatabase::new());
        let shared: SharedDatabase = db.clone();
        let collab = Collab::new(shared, Arc::new(MockIdentity), Arc::new(NoResolver));

        (collab, db)
    }

    async fn seed_account_with_rooms(collab: &Collab) -> String {
        let session = collab.auth.login("token-for:prolific").await.unwrap();

        for name in ["First Room", "Second Room"] {
            collab
                .rooms
                .create_room(NewRoom {
                    name: name.to_string(),
                    owner_id: Some(session.user.id.clone()),
                    is_public: true,
                    password: None,
                })
                .await
                .unwrap();
        }

        session.user.id
    }

    #[tokio::test]
    async fn account_deletion_cascades() {
        let (collab, db) = collab_with_db();
        let user_id = seed_account_with_rooms(&collab).await;

        collab.delete_account(&user_id).await.unwrap();

        assert_eq!(db.room_count(), 0);
        assert_eq!(db.session_count(), 0);
        assert!(db.user_by_id(&user_id).await.is_err());
        assert!(collab.rooms.list(RoomFilter::Public).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_account_deletion_leaves_everything_in_place() {
        let (collab, db) = collab_with_db();
        let user_id = seed_account_with_rooms(&collab).await;

        db.fail_writes.store(true, Ordering::SeqCst);

        let result = collab.delete_account(&user_id).await;
        assert!(result.is_err());

        db.fail_writes.store(false, Ordering::SeqCst);

        assert_eq!(db.room_count(), 2);
        assert_eq!(db.session_count(), 1);
        assert!(db.user_by_id(&user_id).await.is_ok());

        // The live actors survived too
        let rooms = collab.rooms.list(RoomFilter::Public).await.unwrap();
        assert_eq!(rooms.len(), 2);
        for room in rooms {
            assert!(collab.rooms.room_by_id(&room.id).is_ok());
        }
    }
}
