use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;

use crate::{
    util::random_string, DatabaseError, IdentityError, IdentityProvider, NewSession, NewUser,
    SessionData, SharedDatabase, UserData,
};

pub struct Auth {
    db: SharedDatabase,
    identity: Arc<dyn IdentityProvider>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// The supplied credential was rejected by the identity provider
    #[error("Invalid credential")]
    InvalidCredential,
    #[error("Session is invalid or expired")]
    SessionInvalid,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error(transparent)]
    Identity(IdentityError),
}

impl Auth {
    const SESSION_DURATION_IN_DAYS: i64 = 30;

    pub fn new(db: &SharedDatabase, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            db: db.clone(),
            identity,
        }
    }

    /// Logs in a user via the identity provider, returning a new session
    pub async fn login(&self, credential: &str) -> Result<SessionData, AuthError> {
        self.clear_expired().await;

        let profile = self.identity.verify(credential).await.map_err(|e| match e {
            IdentityError::InvalidCredential => AuthError::InvalidCredential,
            err => AuthError::Identity(err),
        })?;

        let user = self
            .db
            .upsert_user(NewUser {
                id: profile.subject,
                email: profile.email,
                name: profile.name,
                picture: profile.picture,
            })
            .await
            .map_err(AuthError::Db)?;

        let new_session = NewSession {
            token: random_string(32),
            user_id: user.id,
            expires_at: Utc::now() + Duration::days(Self::SESSION_DURATION_IN_DAYS),
        };

        self.db
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)
    }

    /// Returns the session's user while the session is live. Never
    /// extends the expiry.
    pub async fn resume(&self, token: &str) -> Result<SessionData, AuthError> {
        let session = self.db.session_by_token(token).await.map_err(|e| match e {
            DatabaseError::NotFound { .. } => AuthError::SessionInvalid,
            err => AuthError::Db(err),
        })?;

        if session.expires_at <= Utc::now() {
            // Expired rows are dead weight, drop them as we notice them
            self.db.delete_session_by_token(token).await.ok();
            return Err(AuthError::SessionInvalid);
        }

        Ok(session)
    }

    /// Deletes the associated session. Idempotent.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        match self.db.delete_session_by_token(token).await {
            Ok(()) => Ok(()),
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(e) => Err(AuthError::Db(e)),
        }
    }

    pub async fn user_by_id(&self, user_id: &str) -> Result<UserData, AuthError> {
        self.db.user_by_id(user_id).await.map_err(AuthError::Db)
    }

    async fn clear_expired(&self) {
        if let Err(error) = self.db.clear_expired_sessions().await {
            log::warn!("Failed to clear expired sessions: {error}");
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use async_trait::async_trait;

    use super::*;
    use crate::db::memory::MemoryDatabase;
    use crate::{Database, IdentityProfile};

    /// Accepts any credential of the form "token-for:<subject>".
    pub struct MockIdentity;

    #[async_trait]
    impl IdentityProvider for MockIdentity {
        async fn verify(&self, credential: &str) -> Result<IdentityProfile, IdentityError> {
            let subject = credential
                .strip_prefix("token-for:")
                .ok_or(IdentityError::InvalidCredential)?;

            Ok(IdentityProfile {
                subject: subject.to_string(),
                email: format!("{subject}@example.com"),
                name: subject.to_string(),
                picture: String::new(),
            })
        }
    }

    fn auth_with_db() -> (Auth, Arc<MemoryDatabase>) {
        let db = Arc::new(MemoryDatabase::new());
        let shared: SharedDatabase = db.clone();
        (Auth::new(&shared, Arc::new(MockIdentity)), db)
    }

    #[tokio::test]
    async fn login_then_resume_returns_the_same_user() {
        let (auth, _) = auth_with_db();

        let session = auth.login("token-for:alice").await.unwrap();
        let resumed = auth.resume(&session.token).await.unwrap();

        assert_eq!(resumed.user.id, "alice");
        assert_eq!(resumed.user.email, "alice@example.com");
        assert_eq!(resumed.token, session.token);
    }

    #[tokio::test]
    async fn resume_rejects_expired_sessions() {
        let (auth, db) = auth_with_db();

        auth.login("token-for:bob").await.unwrap();

        let expired = NewSession {
            token: "stale-token-stale-token-stale-tok".to_string(),
            user_id: "bob".to_string(),
            expires_at: Utc::now() - Duration::hours(1),
        };
        db.create_session(expired).await.unwrap();

        let result = auth.resume("stale-token-stale-token-stale-tok").await;
        assert!(matches!(result, Err(AuthError::SessionInvalid)));
    }

    #[tokio::test]
    async fn resume_does_not_extend_expiry() {
        let (auth, _) = auth_with_db();

        let session = auth.login("token-for:carol").await.unwrap();
        let resumed = auth.resume(&session.token).await.unwrap();

        assert_eq!(resumed.expires_at, session.expires_at);
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let (auth, _) = auth_with_db();

        let session = auth.login("token-for:dave").await.unwrap();

        auth.logout(&session.token).await.unwrap();
        auth.logout(&session.token).await.unwrap();

        let result = auth.resume(&session.token).await;
        assert!(matches!(result, Err(AuthError::SessionInvalid)));
    }

    #[tokio::test]
    async fn bad_credential_is_rejected() {
        let (auth, _) = auth_with_db();

        let result = auth.login("not-a-real-token").await;
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[tokio::test]
    async fn login_refreshes_profile_fields() {
        let (auth, db) = auth_with_db();

        auth.login("token-for:erin").await.unwrap();
        auth.login("token-for:erin").await.unwrap();

        let user = db.user_by_id("erin").await.unwrap();
        assert_eq!(user.email, "erin@example.com");
        // Two logins, two live sessions for the same account
        assert_eq!(db.session_count(), 2);
    }
}
