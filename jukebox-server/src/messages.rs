use jukebox_collab::{
    RoomSummary, SerializedRoom, SettingsPatch, TrackId, UserData, VoteDirection,
};
use serde::{Deserialize, Serialize};

/// Everything a client may ask of the server. One JSON object per
/// message, `{ "type": ..., "payload": ... }`. Adding an intent here
/// forces the gateway's match to handle it.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientIntent {
    #[serde(rename = "LOGIN")]
    Login { token: String },
    #[serde(rename = "RESUME_SESSION")]
    ResumeSession { token: String },
    #[serde(rename = "LOGOUT")]
    Logout { token: String },
    #[serde(rename = "LIST_ROOMS")]
    ListRooms {
        #[serde(default, rename = "type")]
        kind: RoomListKind,
    },
    #[serde(rename = "CREATE_ROOM", rename_all = "camelCase")]
    CreateRoom {
        name: String,
        #[serde(default)]
        is_private: bool,
        #[serde(default)]
        password: Option<String>,
    },
    #[serde(rename = "DELETE_ROOM")]
    DeleteRoom,
    #[serde(rename = "DELETE_ACCOUNT")]
    DeleteAccount,
    #[serde(rename = "JOIN_ROOM", rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        #[serde(default)]
        password: Option<String>,
    },
    #[serde(rename = "SUGGEST_SONG", rename_all = "camelCase")]
    SuggestSong {
        query: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    #[serde(rename = "VOTE", rename_all = "camelCase")]
    Vote {
        track_id: TrackId,
        vote_type: VoteDirection,
    },
    #[serde(rename = "APPROVE_SUGGESTION", rename_all = "camelCase")]
    ApproveSuggestion { track_id: TrackId },
    #[serde(rename = "REJECT_SUGGESTION", rename_all = "camelCase")]
    RejectSuggestion { track_id: TrackId },
    #[serde(rename = "BAN_SUGGESTION", rename_all = "camelCase")]
    BanSuggestion { track_id: TrackId },
    #[serde(rename = "UNBAN_SONG", rename_all = "camelCase")]
    UnbanSong { video_id: String },
    #[serde(rename = "DELETE_SONG", rename_all = "camelCase")]
    DeleteSong { track_id: TrackId },
    #[serde(rename = "REMOVE_FROM_LIBRARY", rename_all = "camelCase")]
    RemoveFromLibrary { video_id: String },
    #[serde(rename = "PLAY_PAUSE")]
    PlayPause(bool),
    #[serde(rename = "SEEK_TO")]
    SeekTo { seconds: u32 },
    #[serde(rename = "UPDATE_DURATION")]
    UpdateDuration { seconds: u32 },
    #[serde(rename = "UPDATE_SETTINGS")]
    UpdateSettings(SettingsPatch),
    #[serde(rename = "PING")]
    Ping,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomListKind {
    #[default]
    Public,
    Private,
    Owned,
}

/// Everything the server pushes to a client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "state")]
    State(SerializedRoom),
    #[serde(rename = "error")]
    Error { code: ErrorCode, message: String },
    #[serde(rename = "info")]
    Info { message: String },
    #[serde(rename = "success")]
    Success { message: String },
    #[serde(rename = "LOGIN_SUCCESS")]
    LoginSuccess { user: SerializedUser, token: String },
    #[serde(rename = "SESSION_INVALID")]
    SessionInvalid,
    #[serde(rename = "ROOM_CREATED")]
    RoomCreated { room: RoomSummary },
    #[serde(rename = "ROOM_LIST")]
    RoomList { rooms: Vec<RoomSummary> },
    #[serde(rename = "ROOM_DELETED")]
    RoomDeleted,
    #[serde(rename = "DELETE_ACCOUNT_SUCCESS")]
    DeleteAccountSuccess,
    #[serde(rename = "PONG")]
    Pong,
}

/// Stable codes the client matches on, distinct from the free-text
/// message next to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NameRequired,
    NameTooLong,
    RoomNotFound,
    PasswordRequired,
    WrongPassword,
    Forbidden,
    NotInRoom,
    NotAuthenticated,
    SessionInvalid,
    InvalidCredential,
    SuggestionsDisabled,
    VotesDisabled,
    CannotVoteCurrent,
    TrackNotFound,
    Banned,
    NotMusic,
    TooLong,
    RecentlyPlayed,
    QueueFull,
    VideoNotFound,
    LiveVideo,
    ResolverUnavailable,
    DatabaseUnavailable,
    BadMessage,
}

/// The wire view of an account, without internal bookkeeping
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: String,
    pub role: String,
}

impl From<&UserData> for SerializedUser {
    fn from(user: &UserData) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            picture: user.picture.clone(),
            role: user.role.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn intents_deserialize_from_the_envelope() {
        let intent: ClientIntent =
            serde_json::from_str(r#"{"type":"LOGIN","payload":{"token":"abc"}}"#).unwrap();
        assert!(matches!(intent, ClientIntent::Login { token } if token == "abc"));

        let intent: ClientIntent = serde_json::from_str(
            r#"{"type":"JOIN_ROOM","payload":{"roomId":"friday-bangers-x1y2","password":"pw"}}"#,
        )
        .unwrap();
        assert!(
            matches!(intent, ClientIntent::JoinRoom { room_id, password: Some(p) }
                if room_id == "friday-bangers-x1y2" && p == "pw")
        );

        let intent: ClientIntent =
            serde_json::from_str(r#"{"type":"VOTE","payload":{"trackId":7,"voteType":"down"}}"#)
                .unwrap();
        assert!(matches!(
            intent,
            ClientIntent::Vote {
                track_id: 7,
                vote_type: VoteDirection::Down
            }
        ));

        let intent: ClientIntent =
            serde_json::from_str(r#"{"type":"PLAY_PAUSE","payload":true}"#).unwrap();
        assert!(matches!(intent, ClientIntent::PlayPause(true)));

        let intent: ClientIntent = serde_json::from_str(r#"{"type":"PING"}"#).unwrap();
        assert!(matches!(intent, ClientIntent::Ping));
    }

    #[test]
    fn settings_updates_are_partial() {
        let intent: ClientIntent = serde_json::from_str(
            r#"{"type":"UPDATE_SETTINGS","payload":{"maxQueueSize":10,"smartQueue":true}}"#,
        )
        .unwrap();

        let ClientIntent::UpdateSettings(patch) = intent else {
            panic!("expected a settings update");
        };

        assert_eq!(patch.max_queue_size, Some(10));
        assert_eq!(patch.smart_queue, Some(true));
        assert_eq!(patch.votes_enabled, None);
    }

    #[test]
    fn unknown_intents_are_rejected() {
        let result = serde_json::from_str::<ClientIntent>(r#"{"type":"FORMAT_DISK"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn events_serialize_with_stable_codes() {
        let message = ServerMessage::Error {
            code: ErrorCode::PasswordRequired,
            message: "This room requires a password".to_string(),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"]["code"], "PASSWORD_REQUIRED");

        let json = serde_json::to_value(ServerMessage::Pong).unwrap();
        assert_eq!(json["type"], "PONG");
    }
}
