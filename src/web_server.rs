// src/web_server.rs
// ------------------------------------------------------------
// Web Control API: start, stop, status, event stream
//
// Ziel
// - kleiner axum router fuer die lokale steuerung
// - events gehen als json frames ueber einen websocket raus
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use tokio::sync::broadcast::error::RecvError;

use crate::p2p_error::GatewayError;
use crate::p2p_gateway::P2pGateway;
use crate::web_api::{OkResponse, StartResponse};

#[derive(Clone)]
pub struct WebAppState {
    pub o_gateway: Arc<P2pGateway>,
}

pub fn build_router(o_state: WebAppState) -> Router {
    let o_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/p2p/start", post(api_p2p_start))
        .route("/api/p2p/stop", post(api_p2p_stop))
        .route("/api/p2p/status", get(api_p2p_status))
        .route("/api/p2p/events", get(api_p2p_events))
        .layer(o_cors)
        .with_state(o_state)
}

async fn api_p2p_start(
    State(o_state): State<WebAppState>,
) -> Result<Json<StartResponse>, (StatusCode, Json<OkResponse>)> {
    match o_state.o_gateway.start().await {
        Ok(o_info) => Ok(Json(StartResponse::from(o_info))),
        Err(e) => {
            let o_code = match e {
                GatewayError::AlreadyRunning => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((o_code, Json(OkResponse::err(e.to_string()))))
        }
    }
}

async fn api_p2p_stop(State(o_state): State<WebAppState>) -> Json<OkResponse> {
    match o_state.o_gateway.stop().await {
        Ok(()) => Json(OkResponse::ok()),
        Err(e) => Json(OkResponse::err(e.to_string())),
    }
}

async fn api_p2p_status(State(o_state): State<WebAppState>) -> impl IntoResponse {
    Json(o_state.o_gateway.status().await)
}

async fn api_p2p_events(
    State(o_state): State<WebAppState>,
    o_upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    o_upgrade.on_upgrade(move |o_socket| ws_event_session(o_socket, o_state))
}

async fn ws_event_session(mut o_socket: WebSocket, o_state: WebAppState) {
    let mut o_rx = o_state.o_gateway.subscribe();

    loop {
        let o_evt = match o_rx.recv().await {
            Ok(o_evt) => o_evt,
            Err(RecvError::Lagged(i_missed)) => {
                println!("event stream haengt {} events hinterher", i_missed);
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        let s_json = match serde_json::to_string(&o_evt) {
            Ok(s) => s,
            Err(e) => {
                println!("event serialisierung fehlgeschlagen: {}", e);
                continue;
            }
        };

        if o_socket.send(Message::Text(s_json)).await.is_err() {
            // client weg
            return;
        }
    }
}

pub async fn run_web_server(o_state: WebAppState, i_port: u16) -> Result<(), String> {
    let s_bind = format!("0.0.0.0:{}", i_port);
    let o_listener = tokio::net::TcpListener::bind(&s_bind)
        .await
        .map_err(|e| format!("web bind {} fehlgeschlagen: {}", s_bind, e))?;

    println!("web control api auf http://{}", s_bind);

    axum::serve(o_listener, build_router(o_state))
        .await
        .map_err(|e| format!("web server: {}", e))
}
