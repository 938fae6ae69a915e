// src/p2p_admission.rs
// ------------------------------------------------------------
// Admission Control: verbundene peers plus limit
//
// Ziel
// - set der verbundenen peer ids, nur event handler mutieren es
// - admit prueft das limit bevor ein request verarbeitet wird
// - jede aenderung schickt events an den observer kanal
//
// Hinweis
// - admit ist weich: der transport nimmt die verbindung schon an,
//   geprueft wird erst beim protocol request
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::p2p_events::{build_status, emit_event, EventSender, GatewayEvent, SharedNodeInfo};

#[derive(Clone)]
pub struct AdmissionControl {
    i_max_connections: usize,
    set_peers: Arc<Mutex<HashSet<String>>>,
    o_node_info: SharedNodeInfo,
    o_event_tx: EventSender,
}

impl AdmissionControl {
    pub fn new(
        i_max_connections: usize,
        o_node_info: SharedNodeInfo,
        o_event_tx: EventSender,
    ) -> Self {
        Self {
            i_max_connections,
            set_peers: Arc::new(Mutex::new(HashSet::new())),
            o_node_info,
            o_event_tx,
        }
    }

    pub async fn on_peer_connect(&self, s_peer_id: &str) {
        let i_count = {
            let mut set_guard = self.set_peers.lock().await;
            // insert ist idempotent, doppelte events sind harmlos
            set_guard.insert(s_peer_id.to_string());
            set_guard.len()
        };

        println!("peer verbunden: {}", s_peer_id);
        println!("aktive verbindungen: {}", i_count);

        emit_event(
            &self.o_event_tx,
            GatewayEvent::Connected {
                s_peer_id: s_peer_id.to_string(),
            },
        );
        self.emit_status(i_count).await;
    }

    pub async fn on_peer_disconnect(&self, s_peer_id: &str) {
        let i_count = {
            let mut set_guard = self.set_peers.lock().await;
            set_guard.remove(s_peer_id);
            set_guard.len()
        };

        println!("peer getrennt: {}", s_peer_id);
        println!("aktive verbindungen: {}", i_count);

        emit_event(
            &self.o_event_tx,
            GatewayEvent::Disconnected {
                s_peer_id: s_peer_id.to_string(),
            },
        );
        self.emit_status(i_count).await;
    }

    // true solange noch platz unter dem limit ist
    pub async fn admit(&self) -> bool {
        let set_guard = self.set_peers.lock().await;
        set_guard.len() < self.i_max_connections
    }

    pub async fn count(&self) -> usize {
        let set_guard = self.set_peers.lock().await;
        set_guard.len()
    }

    pub async fn clear(&self) {
        let mut set_guard = self.set_peers.lock().await;
        set_guard.clear();
    }

    async fn emit_status(&self, i_connections: usize) {
        let o_status = build_status(&self.o_node_info, i_connections).await;
        emit_event(&self.o_event_tx, GatewayEvent::StatusUpdate { o_status });
    }
}
