// src/p2p_gateway.rs
// ------------------------------------------------------------
// Gateway Lifecycle: start, stop, status, shareable url
//
// Ziel
// - zustandsmaschine Stopped -> Starting -> Running -> Stopping
// - start baut swarm, wartet auf listen adressen, spawnt den task
// - stop ist idempotent und reisst offene request handler mit ab
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::gateway_config::GatewayConfig;
use crate::llama_client::LlamaClient;
use crate::p2p_admission::AdmissionControl;
use crate::p2p_error::GatewayError;
use crate::p2p_events::{
    build_status, emit_event, new_shared_node_info, EventSender, GatewayEvent, GatewayStatus,
    SharedNodeInfo,
};
use crate::p2p_handler::RequestCtx;
use crate::p2p_node::{
    build_swarm, listen_local, listen_relay, spawn_swarm_task, SwarmCtl, SwarmTaskDeps,
};

// wartezeit auf die erste listen adresse, danach kurze settle phase
const LISTEN_WAIT_MS: u64 = 2000;
const LISTEN_SETTLE_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct StartInfo {
    pub s_peer_id: String,
    pub v_multiaddrs: Vec<String>,
    pub s_shareable_url: String,
}

enum NodeState {
    Stopped,
    Starting,
    Running(RunningNode),
    Stopping,
}

struct RunningNode {
    o_task: JoinHandle<()>,
    o_ctl_tx: mpsc::Sender<SwarmCtl>,
}

pub struct P2pGateway {
    o_cfg: GatewayConfig,
    o_state: Arc<Mutex<NodeState>>,
    o_admission: AdmissionControl,
    o_node_info: SharedNodeInfo,
    o_event_tx: EventSender,
}

impl P2pGateway {
    pub fn new(o_cfg: GatewayConfig) -> Self {
        let (o_event_tx, _) = broadcast::channel(64);
        let o_node_info = new_shared_node_info();
        let o_admission = AdmissionControl::new(
            o_cfg.i_max_connections,
            o_node_info.clone(),
            o_event_tx.clone(),
        );

        Self {
            o_cfg,
            o_state: Arc::new(Mutex::new(NodeState::Stopped)),
            o_admission,
            o_node_info,
            o_event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.o_event_tx.subscribe()
    }

    pub async fn start(&self) -> Result<StartInfo, GatewayError> {
        {
            let mut o_guard = self.o_state.lock().await;
            match *o_guard {
                NodeState::Stopped => {
                    *o_guard = NodeState::Starting;
                }
                _ => return Err(GatewayError::AlreadyRunning),
            }
        }

        match self.start_inner().await {
            Ok(o_info) => Ok(o_info),
            Err(e) => {
                let mut o_guard = self.o_state.lock().await;
                *o_guard = NodeState::Stopped;
                emit_event(
                    &self.o_event_tx,
                    GatewayEvent::Error {
                        s_message: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> Result<StartInfo, GatewayError> {
        // identitaet lebt nur fuer diesen lauf, keine persistenz
        let o_key = libp2p::identity::Keypair::generate_ed25519();

        let mut o_swarm =
            build_swarm(&self.o_cfg, &o_key).map_err(GatewayError::Transport)?;

        let s_peer_id = o_swarm.local_peer_id().to_string();

        listen_local(&mut o_swarm).map_err(GatewayError::Transport)?;

        if let Some(s_relay_addr) = self.o_cfg.s_relay_addr.as_deref() {
            // relay ist best effort, lokal lauscht der node trotzdem
            if let Err(e) = listen_relay(&mut o_swarm, s_relay_addr) {
                println!("relay listen uebersprungen: {}", e);
            }
        }

        let o_llama = LlamaClient::new(
            &self.o_cfg.s_llama_host,
            self.o_cfg.i_llama_port,
            self.o_cfg.i_upstream_timeout_sec,
        )
        .map_err(GatewayError::Internal)?;

        let o_request_ctx = Arc::new(RequestCtx {
            o_admission: self.o_admission.clone(),
            o_llama,
            s_api_key: self.o_cfg.s_api_key.clone(),
            i_max_payload_bytes: self.o_cfg.i_max_payload_bytes,
        });

        {
            let mut o_guard = self.o_node_info.lock().await;
            o_guard.b_running = true;
            o_guard.s_peer_id = Some(s_peer_id.clone());
            o_guard.v_multiaddrs.clear();
        }

        let (o_ctl_tx, o_ctl_rx) = mpsc::channel::<SwarmCtl>(8);

        // task zuerst: schon waehrend des wartens auf listen adressen
        // gehen connects und andere swarm events den normalen weg
        let o_task = spawn_swarm_task(
            o_swarm,
            o_ctl_rx,
            SwarmTaskDeps {
                o_admission: self.o_admission.clone(),
                o_node_info: self.o_node_info.clone(),
                o_event_tx: self.o_event_tx.clone(),
                o_request_ctx,
            },
        );

        let v_multiaddrs = wait_for_listen_addrs(&self.o_node_info).await;
        if v_multiaddrs.is_empty() {
            o_task.abort();
            let _ = o_task.await;
            let mut o_guard = self.o_node_info.lock().await;
            o_guard.b_running = false;
            o_guard.s_peer_id = None;
            o_guard.v_multiaddrs.clear();
            return Err(GatewayError::Transport(
                "keine listen adresse erhalten".to_string(),
            ));
        }

        {
            let mut o_guard = self.o_state.lock().await;
            *o_guard = NodeState::Running(RunningNode { o_task, o_ctl_tx });
        }

        let o_status = build_status(&self.o_node_info, 0).await;
        emit_event(&self.o_event_tx, GatewayEvent::StatusUpdate { o_status });

        println!("p2p gateway gestartet");
        println!("peer id: {}", s_peer_id);
        for s_addr in v_multiaddrs.iter() {
            println!("listen: {}", s_addr);
        }

        let s_shareable_url =
            generate_shareable_url(&s_peer_id, &self.o_cfg.s_rendezvous_host);

        Ok(StartInfo {
            s_peer_id,
            v_multiaddrs,
            s_shareable_url,
        })
    }

    pub async fn stop(&self) -> Result<(), GatewayError> {
        // entscheidung und uebergang unter einem lock, ein paralleler
        // start darf sich nicht dazwischen schieben
        let o_node = {
            let mut o_guard = self.o_state.lock().await;
            if !matches!(*o_guard, NodeState::Running(_)) {
                // stop ohne laufenden node ist ein no op
                return Ok(());
            }
            match std::mem::replace(&mut *o_guard, NodeState::Stopping) {
                NodeState::Running(o_node) => o_node,
                _ => return Ok(()),
            }
        };

        let _ = o_node.o_ctl_tx.send(SwarmCtl::Shutdown).await;
        // abort raeumt auch offene request handler ab
        o_node.o_task.abort();
        let _ = o_node.o_task.await;

        self.o_admission.clear().await;

        {
            let mut o_guard = self.o_node_info.lock().await;
            o_guard.b_running = false;
            o_guard.s_peer_id = None;
            o_guard.v_multiaddrs.clear();
        }

        {
            let mut o_guard = self.o_state.lock().await;
            *o_guard = NodeState::Stopped;
        }

        let o_status = build_status(&self.o_node_info, 0).await;
        emit_event(&self.o_event_tx, GatewayEvent::StatusUpdate { o_status });

        println!("p2p gateway gestoppt");
        Ok(())
    }

    pub async fn status(&self) -> GatewayStatus {
        build_status(&self.o_node_info, self.o_admission.count().await).await
    }
}

// url die an clients weitergegeben wird, aufloesung laeuft
// ueber den rendezvous host
pub fn generate_shareable_url(s_peer_id: &str, s_rendezvous_host: &str) -> String {
    format!("p2p://{}@{}", s_peer_id.trim(), s_rendezvous_host.trim())
}

// wartet bis der swarm task die erste listen adresse eingetragen hat,
// danach kurze settle phase fuer weitere interfaces
async fn wait_for_listen_addrs(o_info: &SharedNodeInfo) -> Vec<String> {
    let o_deadline = tokio::time::Instant::now() + Duration::from_millis(LISTEN_WAIT_MS);

    loop {
        {
            let o_guard = o_info.lock().await;
            if !o_guard.v_multiaddrs.is_empty() {
                break;
            }
        }
        if tokio::time::Instant::now() >= o_deadline {
            return Vec::new();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    tokio::time::sleep(Duration::from_millis(LISTEN_SETTLE_MS)).await;

    let o_guard = o_info.lock().await;
    o_guard.v_multiaddrs.clone()
}
