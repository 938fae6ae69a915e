// src/p2p_events.rs
// ------------------------------------------------------------
// Gateway Events und Status Snapshot
//
// Ziel
// - ein getypter event kanal statt vier einzelner callbacks
// - status snapshot wird bei jedem uebergang neu gebaut
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    #[serde(rename = "isRunning")]
    pub b_running: bool,
    #[serde(rename = "peerId")]
    pub s_peer_id: Option<String>,
    #[serde(rename = "connections")]
    pub i_connections: usize,
    #[serde(rename = "multiaddrs")]
    pub v_multiaddrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    Connected {
        #[serde(rename = "peerId")]
        s_peer_id: String,
    },
    Disconnected {
        #[serde(rename = "peerId")]
        s_peer_id: String,
    },
    Error {
        #[serde(rename = "message")]
        s_message: String,
    },
    StatusUpdate {
        #[serde(rename = "status")]
        o_status: GatewayStatus,
    },
}

// geteilter node zustand, nur vom swarm task und lifecycle manager beschrieben
#[derive(Debug, Default)]
pub struct NodeInfo {
    pub b_running: bool,
    pub s_peer_id: Option<String>,
    pub v_multiaddrs: Vec<String>,
}

pub type SharedNodeInfo = Arc<Mutex<NodeInfo>>;
pub type EventSender = broadcast::Sender<GatewayEvent>;

pub fn new_shared_node_info() -> SharedNodeInfo {
    Arc::new(Mutex::new(NodeInfo::default()))
}

pub async fn build_status(o_info: &SharedNodeInfo, i_connections: usize) -> GatewayStatus {
    let o_guard = o_info.lock().await;
    GatewayStatus {
        b_running: o_guard.b_running,
        s_peer_id: o_guard.s_peer_id.clone(),
        i_connections,
        v_multiaddrs: o_guard.v_multiaddrs.clone(),
    }
}

pub fn emit_event(o_tx: &EventSender, o_evt: GatewayEvent) {
    // kein abonnent ist ok
    let _ = o_tx.send(o_evt);
}
