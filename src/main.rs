// src/main.rs
// ------------------------------------------------------------
// llama-p2p-gateway
//
// Ziel
// - lokalen llama.cpp server ueber ein verschluesseltes libp2p
//   overlay fuer remote peers freigeben
// - steuerung ueber eine kleine web control api
// - events gehen auf stdout und an websocket clients
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

mod gateway_config;
mod llama_client;
mod p2p_admission;
mod p2p_codec;
mod p2p_error;
mod p2p_events;
mod p2p_gateway;
mod p2p_handler;
mod p2p_node;
mod p2p_wire;
mod web_api;
mod web_server;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use crate::gateway_config::GatewayConfig;
use crate::p2p_events::GatewayEvent;
use crate::p2p_gateway::P2pGateway;
use crate::web_server::{run_web_server, WebAppState};

fn env_bool(s_key: &str) -> bool {
    match std::env::var(s_key) {
        Ok(s_val) => {
            s_val == "1" || s_val.eq_ignore_ascii_case("true") || s_val.eq_ignore_ascii_case("on")
        }
        Err(_) => false,
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let o_cfg = GatewayConfig::from_env();

    println!("llama-p2p-gateway");
    println!(
        "llama endpoint: http://{}:{}",
        o_cfg.s_llama_host, o_cfg.i_llama_port
    );
    println!("max peers: {}", o_cfg.i_max_connections);
    println!(
        "api key gesetzt: {}",
        if o_cfg.s_api_key.is_some() { "ja" } else { "nein" }
    );

    let i_web_port = o_cfg.i_web_port;
    let o_gateway = Arc::new(P2pGateway::new(o_cfg));

    // stdout observer, laeuft parallel zu den websocket sessions
    let mut o_event_rx = o_gateway.subscribe();
    tokio::spawn(async move {
        loop {
            match o_event_rx.recv().await {
                Ok(GatewayEvent::Connected { s_peer_id }) => {
                    println!("[event] connected: {}", s_peer_id);
                }
                Ok(GatewayEvent::Disconnected { s_peer_id }) => {
                    println!("[event] disconnected: {}", s_peer_id);
                }
                Ok(GatewayEvent::Error { s_message }) => {
                    println!("[event] error: {}", s_message);
                }
                Ok(GatewayEvent::StatusUpdate { o_status }) => {
                    println!(
                        "[event] status: running={} connections={}",
                        o_status.b_running, o_status.i_connections
                    );
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    if env_bool("P2P_AUTOSTART") {
        match o_gateway.start().await {
            Ok(o_info) => {
                println!("teilbare url: {}", o_info.s_shareable_url);
            }
            Err(e) => {
                println!("autostart fehlgeschlagen: {}", e);
            }
        }
    }

    run_web_server(
        WebAppState {
            o_gateway: o_gateway.clone(),
        },
        i_web_port,
    )
    .await
}
