//! codeshare server: WebSocket rooms plus the HTTP control endpoint.
//!
//! Configuration comes from `CODESHARE_*` environment variables (see
//! [`config`]); logging honours `RUST_LOG` and defaults to `info`.

mod config;

use std::sync::Arc;

use codeshare_collab::{serve_control, CollabServer, DisabledReviewer, RoomManager};
use codeshare_exec::ExecutionDispatcher;
use tokio::net::TcpListener;

use crate::config::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env()?;
    log::info!(
        "Scratch directory {}, execution timeout {:?}",
        settings.dispatcher.scratch_dir.display(),
        settings.dispatcher.sandbox.wall_clock
    );
    if settings.dispatcher.sandbox.launcher.is_none() {
        log::warn!("No sandbox launcher configured; programs run with resource limits only");
    }

    let rooms = Arc::new(RoomManager::new(
        Arc::new(ExecutionDispatcher::new(settings.dispatcher)),
        Arc::new(DisabledReviewer),
        settings.room,
    ));

    let ws_listener = TcpListener::bind(&settings.server.bind_addr).await?;
    let http_listener = TcpListener::bind(&settings.http.bind_addr).await?;
    let server = CollabServer::new(settings.server, rooms.clone());

    tokio::try_join!(server.serve(ws_listener), serve_control(http_listener, rooms))?;
    Ok(())
}
