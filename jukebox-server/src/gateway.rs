use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use jukebox_collab::{
    AuthError, ConnectionId, NewRoom, RoomBroadcast, RoomConnection, RoomFilter, RoomHandle,
    SessionData, SuggestOutcome, Suggester,
};
use log::{debug, info};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    context::ServerContext,
    errors::GatewayError,
    messages::{ClientIntent, ErrorCode, RoomListKind, SerializedUser, ServerMessage},
};

/// How often the server probes a connection for liveness
const PING_INTERVAL: Duration = Duration::from_secs(30);
/// Silence longer than this closes the socket. Must exceed one probe
/// interval so a single lost frame is not fatal.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(75);

static ANONYMOUS_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

type Outgoing = SplitSink<WebSocket, Message>;

#[derive(Debug, Deserialize)]
pub struct GatewayParams {
    /// The client-generated pseudo-identity used as the voting key,
    /// persisted locally by the client across visits
    #[serde(default, rename = "clientId")]
    client_id: Option<String>,
}

pub async fn gateway(
    ws: WebSocketUpgrade,
    Query(params): Query<GatewayParams>,
    State(context): State<ServerContext>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, context, params.client_id))
}

async fn handle_socket(socket: WebSocket, context: ServerContext, client_id: Option<String>) {
    let (mut outgoing, mut incoming) = socket.split();
    let (broadcast_sender, mut broadcasts) = mpsc::unbounded_channel();

    let mut connection = Connection::new(context, client_id, broadcast_sender);
    let mut pinger = tokio::time::interval(PING_INTERVAL);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = incoming.next() => {
                let Some(Ok(frame)) = frame else { break };

                last_seen = Instant::now();

                match frame {
                    Message::Text(text) => {
                        let reply = connection.handle_text(&text).await;

                        if let Some(reply) = reply {
                            if send(&mut outgoing, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    // Pongs and stray frames only refresh last_seen
                    _ => {}
                }
            }
            Some(broadcast) = broadcasts.recv() => {
                let message = connection.handle_broadcast(broadcast);

                if let Some(message) = message {
                    if send(&mut outgoing, &message).await.is_err() {
                        break;
                    }
                }
            }
            _ = pinger.tick() => {
                if last_seen.elapsed() > CLIENT_TIMEOUT {
                    debug!("Closing dead connection {}", connection.client_id);
                    break;
                }

                if outgoing.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    connection.leave_room();
}

async fn send(outgoing: &mut Outgoing, message: &ServerMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).expect("server messages serialize");
    outgoing.send(Message::Text(text)).await
}

/// A room the connection is currently attached to
struct ActiveRoom {
    handle: RoomHandle,
    connection_id: ConnectionId,
}

/// The per-socket state machine: authentication, room membership, and
/// intent routing.
struct Connection {
    context: ServerContext,
    client_id: String,
    session: Option<SessionData>,
    room: Option<ActiveRoom>,
    broadcast_sender: mpsc::UnboundedSender<RoomBroadcast>,
}

impl Connection {
    fn new(
        context: ServerContext,
        client_id: Option<String>,
        broadcast_sender: mpsc::UnboundedSender<RoomBroadcast>,
    ) -> Self {
        let client_id = client_id.filter(|id| !id.is_empty()).unwrap_or_else(|| {
            format!("anon-{}", ANONYMOUS_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
        });

        Self {
            context,
            client_id,
            session: None,
            room: None,
            broadcast_sender,
        }
    }

    async fn handle_text(&mut self, text: &str) -> Option<ServerMessage> {
        let intent: ClientIntent = match serde_json::from_str(text) {
            Ok(intent) => intent,
            Err(error) => {
                return Some(
                    GatewayError::new(ErrorCode::BadMessage, error.to_string()).into_message(),
                )
            }
        };

        match self.handle_intent(intent).await {
            Ok(reply) => reply,
            Err(error) => Some(error.into_message()),
        }
    }

    async fn handle_intent(
        &mut self,
        intent: ClientIntent,
    ) -> Result<Option<ServerMessage>, GatewayError> {
        match intent {
            ClientIntent::Login { token } => {
                let session = self.context.collab.auth.login(&token).await?;
                let reply = login_reply(&session);

                info!("{} logged in", session.user.name);
                self.session = Some(session);
                Ok(Some(reply))
            }
            ClientIntent::ResumeSession { token } => {
                match self.context.collab.auth.resume(&token).await {
                    Ok(session) => {
                        let reply = login_reply(&session);
                        self.session = Some(session);
                        Ok(Some(reply))
                    }
                    Err(AuthError::SessionInvalid) => Ok(Some(ServerMessage::SessionInvalid)),
                    Err(error) => Err(error.into()),
                }
            }
            ClientIntent::Logout { token } => {
                self.context.collab.auth.logout(&token).await?;

                if self.session.as_ref().is_some_and(|s| s.token == token) {
                    self.session = None;
                }

                Ok(Some(ServerMessage::Success {
                    message: "Logged out".to_string(),
                }))
            }
            ClientIntent::ListRooms { kind } => {
                let filter = match kind {
                    RoomListKind::Public => RoomFilter::Public,
                    RoomListKind::Private => RoomFilter::Private,
                    RoomListKind::Owned => {
                        let session = self.require_session()?;
                        RoomFilter::OwnedBy(session.user.id.clone())
                    }
                };

                let rooms = self.context.collab.rooms.list(filter).await?;
                Ok(Some(ServerMessage::RoomList { rooms }))
            }
            ClientIntent::CreateRoom {
                name,
                is_private,
                password,
            } => {
                let session = self.require_session()?;

                let room = self
                    .context
                    .collab
                    .rooms
                    .create_room(NewRoom {
                        name,
                        owner_id: Some(session.user.id.clone()),
                        is_public: !is_private,
                        password,
                    })
                    .await?;

                Ok(Some(ServerMessage::RoomCreated { room }))
            }
            ClientIntent::DeleteRoom => {
                let session = self.require_session()?;
                let user = session.user.clone();
                let room_id = self.require_room()?.handle.id().to_string();

                self.context
                    .collab
                    .rooms
                    .delete_room(&room_id, &user)
                    .await?;

                // The ROOM_DELETED event arrives through the broadcast
                // channel like it does for everyone else in the room
                Ok(None)
            }
            ClientIntent::DeleteAccount => {
                let session = self.require_session()?;
                let user_id = session.user.id.clone();

                self.leave_room();
                self.context.collab.delete_account(&user_id).await?;
                self.session = None;

                Ok(Some(ServerMessage::DeleteAccountSuccess))
            }
            ClientIntent::JoinRoom { room_id, password } => {
                self.leave_room();

                let handle = self.context.collab.rooms.room_by_id(&room_id)?;
                handle.check_password(
                    self.session.as_ref().map(|s| &s.user),
                    password.as_deref(),
                )?;

                let connection = RoomConnection::new(
                    self.session.as_ref().map(|s| s.user.id.clone()),
                    self.broadcast_sender.clone(),
                );
                let connection_id = connection.id;

                handle.attach(connection);
                self.room = Some(ActiveRoom {
                    handle,
                    connection_id,
                });

                // The full state arrives as a broadcast immediately
                Ok(None)
            }
            ClientIntent::SuggestSong { query, .. } => {
                let room = self.require_room()?.handle.clone();

                // Resolution happens out here so a slow lookup never
                // blocks the room's inbox
                let resolved = self.context.collab.resolver.resolve(&query).await?;

                let suggested_by = Suggester {
                    user_id: self.session.as_ref().map(|s| s.user.id.clone()),
                    display_name: self
                        .session
                        .as_ref()
                        .map(|s| s.user.name.clone())
                        .unwrap_or_else(|| "Guest".to_string()),
                };

                let outcome = room.suggest(suggested_by, resolved).await?;

                let reply = match outcome {
                    SuggestOutcome::Queued => ServerMessage::Success {
                        message: "Added to the queue".to_string(),
                    },
                    SuggestOutcome::Pending => ServerMessage::Info {
                        message: "Sent to the room owner for approval".to_string(),
                    },
                };

                Ok(Some(reply))
            }
            ClientIntent::Vote {
                track_id,
                vote_type,
            } => {
                let room = self.require_room()?.handle.clone();
                room.vote(self.client_id.clone(), track_id, vote_type)
                    .await?;
                Ok(None)
            }
            ClientIntent::ApproveSuggestion { track_id } => {
                let room = self.require_room()?.handle.clone();
                room.approve(self.user_id(), track_id).await?;
                Ok(None)
            }
            ClientIntent::RejectSuggestion { track_id } => {
                let room = self.require_room()?.handle.clone();
                room.reject(self.user_id(), track_id).await?;
                Ok(None)
            }
            ClientIntent::BanSuggestion { track_id } => {
                let room = self.require_room()?.handle.clone();
                room.ban(self.user_id(), track_id).await?;
                Ok(None)
            }
            ClientIntent::UnbanSong { video_id } => {
                let room = self.require_room()?.handle.clone();
                room.unban(self.user_id(), video_id).await?;
                Ok(None)
            }
            ClientIntent::DeleteSong { track_id } => {
                let room = self.require_room()?.handle.clone();
                room.delete_track(self.user_id(), track_id).await?;
                Ok(None)
            }
            ClientIntent::RemoveFromLibrary { video_id } => {
                let room = self.require_room()?.handle.clone();
                room.remove_from_library(self.user_id(), video_id).await?;
                Ok(None)
            }
            ClientIntent::PlayPause(playing) => {
                let room = self.require_room()?.handle.clone();
                room.play_pause(self.user_id(), playing).await?;
                Ok(None)
            }
            ClientIntent::SeekTo { seconds } => {
                let room = self.require_room()?.handle.clone();
                room.seek(self.user_id(), seconds).await?;
                Ok(None)
            }
            ClientIntent::UpdateDuration { seconds } => {
                let room = self.require_room()?.handle.clone();
                room.update_duration(seconds).await?;
                Ok(None)
            }
            ClientIntent::UpdateSettings(patch) => {
                let room = self.require_room()?.handle.clone();
                room.update_settings(self.user_id(), patch).await?;
                Ok(None)
            }
            ClientIntent::Ping => Ok(Some(ServerMessage::Pong)),
        }
    }

    fn handle_broadcast(&mut self, broadcast: RoomBroadcast) -> Option<ServerMessage> {
        match broadcast {
            RoomBroadcast::State(state) => Some(ServerMessage::State(state)),
            RoomBroadcast::Deleted => {
                self.room = None;
                Some(ServerMessage::RoomDeleted)
            }
            RoomBroadcast::PendingSuggestion { track } => Some(ServerMessage::Info {
                message: format!(
                    "{} suggested \"{}\"",
                    track.suggested_by.display_name, track.title
                ),
            }),
        }
    }

    fn leave_room(&mut self) {
        if let Some(active) = self.room.take() {
            active.handle.detach(active.connection_id);
        }
    }

    fn user_id(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.user.id.clone())
    }

    fn require_session(&self) -> Result<&SessionData, GatewayError> {
        self.session.as_ref().ok_or_else(|| {
            GatewayError::new(ErrorCode::NotAuthenticated, "You need to sign in first")
        })
    }

    fn require_room(&self) -> Result<&ActiveRoom, GatewayError> {
        self.room
            .as_ref()
            .ok_or_else(|| GatewayError::new(ErrorCode::NotInRoom, "Join a room first"))
    }
}

fn login_reply(session: &SessionData) -> ServerMessage {
    ServerMessage::LoginSuccess {
        user: SerializedUser::from(&session.user),
        token: session.token.clone(),
    }
}
