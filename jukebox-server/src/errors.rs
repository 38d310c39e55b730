use jukebox_collab::{AuthError, ResolveError, RoomError};

use crate::messages::{ErrorCode, ServerMessage};

/// A failure on its way back to the requesting connection. Converted
/// into an `error` event, never into a crash.
#[derive(Debug)]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn into_message(self) -> ServerMessage {
        ServerMessage::Error {
            code: self.code,
            message: self.message,
        }
    }
}

impl From<RoomError> for GatewayError {
    fn from(error: RoomError) -> Self {
        let code = match &error {
            RoomError::NameRequired => ErrorCode::NameRequired,
            RoomError::NameTooLong => ErrorCode::NameTooLong,
            RoomError::NotFound => ErrorCode::RoomNotFound,
            RoomError::Forbidden => ErrorCode::Forbidden,
            RoomError::PasswordRequired => ErrorCode::PasswordRequired,
            RoomError::WrongPassword => ErrorCode::WrongPassword,
            RoomError::TrackNotFound => ErrorCode::TrackNotFound,
            RoomError::VotesDisabled => ErrorCode::VotesDisabled,
            RoomError::CurrentTrackVote => ErrorCode::CannotVoteCurrent,
            RoomError::SuggestionsDisabled => ErrorCode::SuggestionsDisabled,
            RoomError::Banned => ErrorCode::Banned,
            RoomError::NotMusic => ErrorCode::NotMusic,
            RoomError::TooLong => ErrorCode::TooLong,
            RoomError::RecentlyPlayed => ErrorCode::RecentlyPlayed,
            RoomError::QueueFull => ErrorCode::QueueFull,
            RoomError::Db(_) => ErrorCode::DatabaseUnavailable,
        };

        Self::new(code, error.to_string())
    }
}

impl From<AuthError> for GatewayError {
    fn from(error: AuthError) -> Self {
        let code = match &error {
            AuthError::InvalidCredential => ErrorCode::InvalidCredential,
            AuthError::SessionInvalid => ErrorCode::SessionInvalid,
            AuthError::Identity(_) => ErrorCode::InvalidCredential,
            AuthError::Db(_) => ErrorCode::DatabaseUnavailable,
        };

        Self::new(code, error.to_string())
    }
}

impl From<ResolveError> for GatewayError {
    fn from(error: ResolveError) -> Self {
        let code = match &error {
            ResolveError::NotFound => ErrorCode::VideoNotFound,
            ResolveError::LiveBroadcast => ErrorCode::LiveVideo,
            ResolveError::QuotaExhausted | ResolveError::Unavailable(_) => {
                ErrorCode::ResolverUnavailable
            }
            ResolveError::ParseError(_) => ErrorCode::ResolverUnavailable,
        };

        Self::new(code, error.to_string())
    }
}
