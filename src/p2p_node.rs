// src/p2p_node.rs
// ------------------------------------------------------------
// libp2p Node Glue: Swarm Aufbau plus Swarm Task
//
// Ziel
// - ein task besitzt den swarm
// - eingehende requests laufen in einem JoinSet, ein langsamer
//   upstream call blockiert die anderen streams nicht
// - connect und disconnect events gehen an die admission control
// - listen adressen werden im geteilten node info gepflegt
// - drop des tasks bricht alle offenen request handler ab
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// - 2026-01-04 Marcus Schlieper: relay client transport fuer nat traversal
// ------------------------------------------------------------

use libp2p::{
    core::transport::OrTransport,
    core::upgrade,
    dns, identify, mdns, noise, ping, relay, request_response,
    swarm::{behaviour::toggle::Toggle, NetworkBehaviour, Swarm, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, Transport,
};

use libp2p::futures::StreamExt;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::gateway_config::GatewayConfig;
use crate::p2p_admission::AdmissionControl;
use crate::p2p_codec::{LlamaCodec, LlamaProto, PROTOCOL_ID};
use crate::p2p_events::{build_status, emit_event, EventSender, GatewayEvent, SharedNodeInfo};
use crate::p2p_handler::{handle_llama_request, RequestCtx};

// ---------------- Types ----------------

pub type SwarmType = Swarm<GatewayBehaviour>;

type PendingResponse = (request_response::ResponseChannel<Vec<u8>>, Vec<u8>);

const REQUEST_TIMEOUT_SEC: u64 = 60;

#[derive(Debug)]
pub enum SwarmCtl {
    Shutdown,
}

#[derive(NetworkBehaviour)]
pub struct GatewayBehaviour {
    pub rr: request_response::Behaviour<LlamaCodec>,
    pub relay: relay::client::Behaviour,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
}

pub struct SwarmTaskDeps {
    pub o_admission: AdmissionControl,
    pub o_node_info: SharedNodeInfo,
    pub o_event_tx: EventSender,
    pub o_request_ctx: Arc<RequestCtx>,
}

// ---------------- Aufbau ----------------

pub fn build_swarm(
    o_cfg: &GatewayConfig,
    o_key: &libp2p::identity::Keypair,
) -> Result<SwarmType, String> {
    let o_peer_id = PeerId::from(o_key.public());

    let (o_relay_transport, o_relay) = relay::client::new(o_peer_id);

    let o_tcp = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true));
    let o_dns = dns::tokio::Transport::system(o_tcp).map_err(|e| format!("dns: {}", e))?;

    let o_noise = noise::Config::new(o_key).map_err(|e| format!("noise: {}", e))?;
    let o_yamux = yamux::Config::default();

    let o_transport = OrTransport::new(o_relay_transport, o_dns)
        .upgrade(upgrade::Version::V1)
        .authenticate(o_noise)
        .multiplex(o_yamux)
        .boxed();

    let mut o_rr_cfg = request_response::Config::default();
    o_rr_cfg.set_request_timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SEC));

    let o_rr = request_response::Behaviour::with_codec(
        LlamaCodec::new(o_cfg.i_max_payload_bytes),
        [(LlamaProto, request_response::ProtocolSupport::Full)],
        o_rr_cfg,
    );

    let o_mdns = if o_cfg.b_mdns {
        match mdns::tokio::Behaviour::new(mdns::Config::default(), o_peer_id) {
            Ok(v) => Some(v),
            Err(e) => {
                println!("mdns nicht verfuegbar: {}", e);
                None
            }
        }
    } else {
        None
    };

    let o_identify = identify::Behaviour::new(identify::Config::new(
        "llama-gateway/1".to_string(),
        o_key.public(),
    ));

    let o_ping = ping::Behaviour::new(ping::Config::new());

    let o_behaviour = GatewayBehaviour {
        rr: o_rr,
        relay: o_relay,
        mdns: Toggle::from(o_mdns),
        identify: o_identify,
        ping: o_ping,
    };

    let o_swarm = Swarm::new(
        o_transport,
        o_behaviour,
        o_peer_id,
        libp2p::swarm::Config::with_tokio_executor(),
    );

    println!("protocol registriert: {}", PROTOCOL_ID);

    Ok(o_swarm)
}

pub fn listen_local(o_swarm: &mut SwarmType) -> Result<(), String> {
    let a_listen: Multiaddr = "/ip4/0.0.0.0/tcp/0"
        .parse()
        .map_err(|_| "listen addr parse fehler".to_string())?;

    Swarm::listen_on(o_swarm, a_listen).map_err(|e| format!("listen_on: {}", e))?;
    Ok(())
}

pub fn listen_relay(o_swarm: &mut SwarmType, s_relay_addr: &str) -> Result<(), String> {
    let a_relay: Multiaddr = s_relay_addr
        .trim()
        .parse()
        .map_err(|_| "relay addr parse fehler".to_string())?;

    let a_circuit = a_relay.with(libp2p::multiaddr::Protocol::P2pCircuit);

    Swarm::listen_on(o_swarm, a_circuit).map_err(|e| format!("relay listen_on: {}", e))?;
    Ok(())
}

// ---------------- Swarm Task ----------------

pub fn spawn_swarm_task(
    mut o_swarm: SwarmType,
    mut o_ctl_rx: mpsc::Receiver<SwarmCtl>,
    o_deps: SwarmTaskDeps,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // laufende request handler
        let mut o_handlers: JoinSet<PendingResponse> = JoinSet::new();

        loop {
            tokio::select! {
                o_ctl_opt = o_ctl_rx.recv() => {
                    match o_ctl_opt {
                        Some(SwarmCtl::Shutdown) | None => break,
                    }
                }

                Some(o_join) = o_handlers.join_next(), if !o_handlers.is_empty() => {
                    match o_join {
                        Ok((o_channel, v_resp)) => {
                            if o_swarm.behaviour_mut().rr.send_response(o_channel, v_resp).is_err() {
                                println!("response senden fehlgeschlagen, stream schon zu");
                            }
                        }
                        Err(e) => {
                            println!("request handler abgebrochen: {}", e);
                        }
                    }
                }

                o_evt = o_swarm.select_next_some() => {
                    handle_swarm_event(&mut o_swarm, o_evt, &o_deps, &mut o_handlers).await;
                }
            }
        }
    })
}

async fn handle_swarm_event(
    o_swarm: &mut SwarmType,
    o_evt: SwarmEvent<GatewayBehaviourEvent>,
    o_deps: &SwarmTaskDeps,
    o_handlers: &mut JoinSet<PendingResponse>,
) {
    match o_evt {
        SwarmEvent::NewListenAddr { address, .. } => {
            println!("listen addr: {}", address);
            {
                let mut o_guard = o_deps.o_node_info.lock().await;
                let s_addr = address.to_string();
                if !o_guard.v_multiaddrs.contains(&s_addr) {
                    o_guard.v_multiaddrs.push(s_addr);
                }
            }
            let i_count = o_deps.o_admission.count().await;
            let o_status = build_status(&o_deps.o_node_info, i_count).await;
            emit_event(&o_deps.o_event_tx, GatewayEvent::StatusUpdate { o_status });
        }

        SwarmEvent::ExpiredListenAddr { address, .. } => {
            let s_addr = address.to_string();
            let mut o_guard = o_deps.o_node_info.lock().await;
            o_guard.v_multiaddrs.retain(|s| s != &s_addr);
        }

        SwarmEvent::ListenerError { error, .. } => {
            println!("listener error: {}", error);
            emit_event(
                &o_deps.o_event_tx,
                GatewayEvent::Error {
                    s_message: format!("listener error: {}", error),
                },
            );
        }

        SwarmEvent::ConnectionEstablished { peer_id, .. } => {
            o_deps.o_admission.on_peer_connect(&peer_id.to_string()).await;
        }

        SwarmEvent::ConnectionClosed {
            peer_id,
            num_established,
            ..
        } => {
            // erst austragen wenn die letzte verbindung des peers weg ist
            if num_established == 0 {
                o_deps
                    .o_admission
                    .on_peer_disconnect(&peer_id.to_string())
                    .await;
            }
        }

        SwarmEvent::Behaviour(GatewayBehaviourEvent::Mdns(mdns::Event::Discovered(v_list))) => {
            for (o_peer, o_addr) in v_list {
                o_swarm.behaviour_mut().rr.add_address(&o_peer, o_addr);
            }
        }

        SwarmEvent::Behaviour(GatewayBehaviourEvent::Mdns(mdns::Event::Expired(v_list))) => {
            for (o_peer, o_addr) in v_list {
                o_swarm.behaviour_mut().rr.remove_address(&o_peer, &o_addr);
            }
        }

        SwarmEvent::Behaviour(GatewayBehaviourEvent::Rr(request_response::Event::Message {
            peer,
            message,
            ..
        })) => {
            match message {
                request_response::Message::Request {
                    request, channel, ..
                } => {
                    let o_ctx = o_deps.o_request_ctx.clone();
                    let s_peer_id = peer.to_string();
                    o_handlers.spawn(async move {
                        let v_resp = handle_llama_request(o_ctx, s_peer_id, request).await;
                        (channel, v_resp)
                    });
                }

                request_response::Message::Response { .. } => {
                    // das gateway stellt keine outbound requests
                }
            }
        }

        SwarmEvent::Behaviour(GatewayBehaviourEvent::Rr(
            request_response::Event::InboundFailure { peer, error, .. },
        )) => {
            println!("inbound request von {} fehlgeschlagen: {}", peer, error);
        }

        _ => {}
    }
}
