mod context;
mod errors;
mod gateway;
mod messages;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::{routing::get, Router};
use jukebox_collab::Collab;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use context::ServerContext;

pub use messages::{ClientIntent, ErrorCode, ServerMessage};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9400;

/// Starts the jukebox gateway server
pub async fn run_server(collab: Arc<Collab>) {
    let port = env::var("JUKEBOX_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let context = ServerContext { collab };

    let router = Router::new()
        .route("/gateway", get(gateway::gateway))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {port}");

    axum::serve(listener, router.into_make_service())
        .await
        .unwrap();
}
