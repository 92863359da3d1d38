//! Arena - game server with an HTTP status surface.

use axum::{
    Json, Router,
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use server::server::ConnectionLimits;
use server::{Config, ServerHandle, ServerStatus};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    handle: ServerHandle,
    limits: Arc<RwLock<ConnectionLimits>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Mass Arena v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  Border: {}x{}", config.border.width, config.border.height);
    info!("  Rates: {} Hz tick, {} Hz broadcast", config.server.tick_rate, config.server.broadcast_rate);

    let handle = ServerHandle::new(&config);
    handle.start().await;

    let state = AppState {
        handle,
        limits: Arc::new(RwLock::new(ConnectionLimits::new(
            config.server.max_connections,
            config.server.ip_limit,
        ))),
    };

    let app = Router::new()
        .route("/game", get(websocket_handler))
        .route("/", get(serve_banner))
        .route("/status", get(serve_status))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Game WebSocket endpoint: ws://{}/game", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

async fn serve_banner(State(state): State<AppState>) -> String {
    let name = state.handle.read(|game| game.config.server.name.clone()).await;
    format!("{} v{}\n", name, env!("CARGO_PKG_VERSION"))
}

async fn serve_status(State(state): State<AppState>) -> Json<ServerStatus> {
    Json(state.handle.read(|game| game.status()).await)
}

/// Handle WebSocket connections for the game
async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    if !state.limits.write().await.try_add(addr.ip()) {
        warn!("Connection rejected (limit reached): {}", addr);
        return (StatusCode::SERVICE_UNAVAILABLE, "Server full").into_response();
    }

    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_game_connection(socket, addr, state.handle.clone()).await {
            error!("Connection error from {}: {}", addr, e);
        }
        state.limits.write().await.remove(addr.ip());
    })
}

/// Drive one game session over an axum WebSocket.
async fn handle_game_connection(socket: WebSocket, addr: SocketAddr, handle: ServerHandle) -> anyhow::Result<()> {
    let (mut write, mut read) = socket.split();

    let mut outbound_rx = handle.subscribe();
    let client_id = handle.with_game(|game| game.add_client(addr)).await;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        handle.with_game(|game| game.handle_packet(client_id, &data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    _ => {}
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Ok(out) => {
                        if !out.is_for(client_id) {
                            continue;
                        }
                        if let Err(e) = write.send(Message::Binary(out.payload)).await {
                            warn!("Failed to send to {}: {}", addr, e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        handle.recover_lagged(client_id, skipped).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    handle.with_game(|game| game.remove_client(client_id)).await;
    Ok(())
}
