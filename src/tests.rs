// src/tests.rs
// Zweck: Integration nahe Unit-Tests fuer Kernmodule.
// Ausfuehrung: cargo test
// Hinweis: Stelle sicher, dass in src/main.rs steht:
//   #[cfg(test)]
//   mod tests;

#[cfg(test)]

mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;

    use tokio::sync::broadcast;

    use crate::gateway_config::GatewayConfig;
    use crate::llama_client::LlamaClient;
    use crate::p2p_admission::AdmissionControl;
    use crate::p2p_codec::LlamaCodec;
    use crate::p2p_error::GatewayError;
    use crate::p2p_events::{new_shared_node_info, GatewayEvent};
    use crate::p2p_gateway::{generate_shareable_url, P2pGateway};
    use crate::p2p_handler::{handle_llama_request, RequestCtx};
    use crate::p2p_wire::{LlamaRequest, LlamaResponse};

    // ---------------- Helper ----------------

    // request ctx mit eigenem admission set und event kanal
    fn build_ctx(
        i_max_conns: usize,
        s_api_key: Option<&str>,
        i_llama_port: u16,
        i_max_payload_bytes: usize,
    ) -> (
        Arc<RequestCtx>,
        AdmissionControl,
        broadcast::Receiver<GatewayEvent>,
    ) {
        let (o_event_tx, o_event_rx) = broadcast::channel(64);
        let o_node_info = new_shared_node_info();
        let o_admission = AdmissionControl::new(i_max_conns, o_node_info, o_event_tx);

        let o_llama = LlamaClient::new("127.0.0.1", i_llama_port, 5).unwrap();

        let o_ctx = Arc::new(RequestCtx {
            o_admission: o_admission.clone(),
            o_llama,
            s_api_key: s_api_key.map(|s| s.to_string()),
            i_max_payload_bytes,
        });

        (o_ctx, o_admission, o_event_rx)
    }

    async fn call_handler(o_ctx: Arc<RequestCtx>, v_req: Vec<u8>) -> LlamaResponse {
        let v_resp = handle_llama_request(o_ctx, "test-peer".to_string(), v_req).await;
        serde_json::from_slice(&v_resp).expect("response muss json sein")
    }

    // kleiner llama.cpp ersatz: antwortet auf POST /completion
    async fn spawn_stub_llama(o_status: StatusCode, s_body: &'static str) -> u16 {
        let o_router = Router::new().route(
            "/completion",
            post(move || async move { (o_status, s_body) }),
        );

        let o_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub bind");
        let i_port = o_listener.local_addr().expect("stub addr").port();

        tokio::spawn(async move {
            let _ = axum::serve(o_listener, o_router).await;
        });

        i_port
    }

    // stub der seine antwort verzoegert, fuer tests mit haengendem request
    async fn spawn_slow_stub_llama(i_delay_ms: u64) -> u16 {
        let o_router = Router::new().route(
            "/completion",
            post(move || async move {
                tokio::time::sleep(std::time::Duration::from_millis(i_delay_ms)).await;
                (StatusCode::OK, r#"{"content":"spaet"}"#)
            }),
        );

        let o_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub bind");
        let i_port = o_listener.local_addr().expect("stub addr").port();

        tokio::spawn(async move {
            let _ = axum::serve(o_listener, o_router).await;
        });

        i_port
    }

    // minimaler client swarm der mit dem gateway spricht
    fn build_client_swarm() -> libp2p::swarm::Swarm<libp2p::request_response::Behaviour<LlamaCodec>>
    {
        use libp2p::{core::upgrade, noise, request_response, tcp, yamux, PeerId, Transport};

        let o_key = libp2p::identity::Keypair::generate_ed25519();
        let o_peer_id = PeerId::from(o_key.public());

        let o_tcp = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true));
        let o_noise = noise::Config::new(&o_key).unwrap();
        let o_transport = o_tcp
            .upgrade(upgrade::Version::V1)
            .authenticate(o_noise)
            .multiplex(yamux::Config::default())
            .boxed();

        let o_rr = request_response::Behaviour::with_codec(
            LlamaCodec::default(),
            [(
                crate::p2p_codec::LlamaProto,
                request_response::ProtocolSupport::Full,
            )],
            request_response::Config::default(),
        );

        libp2p::swarm::Swarm::new(
            o_transport,
            o_rr,
            o_peer_id,
            libp2p::swarm::Config::with_tokio_executor(),
        )
    }

    // ---------------- p2p_gateway.rs ----------------

    #[test]
    fn test_shareable_url_format() {
        let s_url = generate_shareable_url(" 12D3KooWTest ", " relay.example.org ");
        assert_eq!(s_url, "p2p://12D3KooWTest@relay.example.org");
    }

    // ---------------- p2p_wire.rs ----------------

    #[test]
    fn test_wire_request_defaults() {
        let o_req: LlamaRequest = serde_json::from_str(r#"{"prompt":"hallo"}"#).unwrap();

        assert_eq!(o_req.s_prompt, "hallo");
        assert_eq!(o_req.i_max_tokens, 100);
        assert!((o_req.d_temperature - 0.7).abs() < 1e-6);
        assert!((o_req.d_top_p - 0.9).abs() < 1e-6);
        assert!(!o_req.b_stream);
        assert!(o_req.map_parameters.is_empty());
        assert!(o_req.s_api_key.is_none());
    }

    #[test]
    fn test_wire_request_full() {
        let s_json = r#"{
            "prompt": "p",
            "max_tokens": 7,
            "temperature": 0.2,
            "top_p": 0.5,
            "stream": true,
            "parameters": {"n_predict": 32},
            "apiKey": "geheim"
        }"#;

        let o_req: LlamaRequest = serde_json::from_str(s_json).unwrap();
        assert_eq!(o_req.i_max_tokens, 7);
        assert!(o_req.b_stream);
        assert_eq!(o_req.map_parameters.get("n_predict").unwrap(), 32);
        assert_eq!(o_req.s_api_key.as_deref(), Some("geheim"));
    }

    #[test]
    fn test_wire_response_variants() {
        let s_ok = serde_json::to_string(&LlamaResponse::ok(serde_json::json!({"c": 1}))).unwrap();
        assert!(s_ok.contains("\"success\":true"));
        assert!(s_ok.contains("\"data\""));
        assert!(!s_ok.contains("\"error\""));

        let s_fail = serde_json::to_string(&LlamaResponse::fail("kaputt")).unwrap();
        assert!(s_fail.contains("\"success\":false"));
        assert!(s_fail.contains("\"error\""));
        assert!(!s_fail.contains("\"data\""));
    }

    // ---------------- llama_client.rs ----------------

    #[test]
    fn test_llama_client_base_url() {
        let o_client = LlamaClient::new(" 127.0.0.1 ", 15876, 5).unwrap();
        assert_eq!(o_client.base_url(), "http://127.0.0.1:15876");
    }

    #[test]
    fn test_completion_payload_defaults() {
        let o_req = LlamaRequest {
            s_prompt: "frage".to_string(),
            ..LlamaRequest::default()
        };

        let map_payload = LlamaClient::build_completion_payload(&o_req);
        assert_eq!(map_payload.get("prompt").unwrap(), "frage");
        assert_eq!(map_payload.get("max_tokens").unwrap(), 100);
        assert_eq!(map_payload.get("stream").unwrap(), false);
    }

    #[test]
    fn test_completion_payload_parameter_precedence() {
        let mut o_req = LlamaRequest::default();
        o_req
            .map_parameters
            .insert("temperature".to_string(), serde_json::json!(0.1));
        o_req
            .map_parameters
            .insert("n_predict".to_string(), serde_json::json!(64));

        let map_payload = LlamaClient::build_completion_payload(&o_req);

        // bei kollision gewinnt parameters
        assert_eq!(map_payload.get("temperature").unwrap(), 0.1);
        assert_eq!(map_payload.get("n_predict").unwrap(), 64);
    }

    // ---------------- p2p_codec.rs ----------------

    #[tokio::test]
    async fn test_codec_roundtrip() {
        use libp2p::futures::io::Cursor;
        use libp2p::request_response::Codec;

        let mut o_codec = LlamaCodec::default();
        let o_proto = crate::p2p_codec::LlamaProto;

        let v_in = br#"{"prompt":"hallo","max_tokens":5}"#.to_vec();

        let mut o_writer = Cursor::new(Vec::new());
        o_codec
            .write_request(&o_proto, &mut o_writer, v_in.clone())
            .await
            .unwrap();

        let v_wire = o_writer.into_inner();
        let mut o_reader = Cursor::new(v_wire);
        let v_out = o_codec.read_request(&o_proto, &mut o_reader).await.unwrap();

        assert_eq!(v_out, v_in);

        let o_req: LlamaRequest = serde_json::from_slice(&v_out).unwrap();
        assert_eq!(o_req.i_max_tokens, 5);
    }

    #[tokio::test]
    async fn test_codec_read_cap() {
        use libp2p::futures::io::Cursor;
        use libp2p::request_response::Codec;

        let mut o_codec = LlamaCodec::new(8);
        let o_proto = crate::p2p_codec::LlamaProto;

        // 32 bytes rein, der codec liest hoechstens max plus eins
        let mut o_reader = Cursor::new(vec![b'x'; 32]);
        let v_out = o_codec.read_request(&o_proto, &mut o_reader).await.unwrap();
        assert_eq!(v_out.len(), 9);

        // leerer stream bleibt leer
        let mut o_empty = Cursor::new(Vec::new());
        let v_none = o_codec.read_request(&o_proto, &mut o_empty).await.unwrap();
        assert!(v_none.is_empty());
    }

    // ---------------- p2p_handler.rs ----------------

    #[tokio::test]
    async fn test_handler_empty_and_malformed() {
        let (o_ctx, _, _) = build_ctx(5, None, 9, 1024);

        let o_resp = call_handler(o_ctx.clone(), Vec::new()).await;
        assert!(!o_resp.b_success);
        assert_eq!(o_resp.s_error.as_deref(), Some("No request data received"));

        let o_resp = call_handler(o_ctx, b"{not json".to_vec()).await;
        assert!(!o_resp.b_success);
        assert_eq!(o_resp.s_error.as_deref(), Some("Invalid JSON request"));
    }

    #[tokio::test]
    async fn test_handler_payload_too_large() {
        let (o_ctx, _, _) = build_ctx(5, None, 9, 16);

        let v_big = vec![b'a'; 32];
        let o_resp = call_handler(o_ctx, v_big).await;
        assert!(!o_resp.b_success);
        assert_eq!(o_resp.s_error.as_deref(), Some("Request payload too large"));
    }

    #[tokio::test]
    async fn test_handler_api_key_gating() {
        let (o_ctx, _, _) = build_ctx(5, Some("secret"), 9, 1024);

        // ohne key
        let o_resp = call_handler(o_ctx.clone(), br#"{"prompt":"x"}"#.to_vec()).await;
        assert_eq!(o_resp.s_error.as_deref(), Some("Invalid API key"));

        // falscher key
        let o_resp =
            call_handler(o_ctx.clone(), br#"{"prompt":"x","apiKey":"falsch"}"#.to_vec()).await;
        assert_eq!(o_resp.s_error.as_deref(), Some("Invalid API key"));

        // richtiger key: der forward laeuft los und scheitert am
        // nicht erreichbaren upstream, aber nicht mehr an der auth
        let o_resp =
            call_handler(o_ctx, br#"{"prompt":"x","apiKey":"secret"}"#.to_vec()).await;
        assert!(!o_resp.b_success);
        assert_ne!(o_resp.s_error.as_deref(), Some("Invalid API key"));
    }

    // ---------------- p2p_admission.rs ----------------

    #[tokio::test]
    async fn test_admission_limit() {
        let (o_ctx, o_admission, _) = build_ctx(2, None, 9, 1024);

        o_admission.on_peer_connect("peer-a").await;
        o_admission.on_peer_connect("peer-b").await;

        let o_resp = call_handler(o_ctx.clone(), br#"{"prompt":"x"}"#.to_vec()).await;
        assert_eq!(o_resp.s_error.as_deref(), Some("Connection limit reached"));

        // nach einem disconnect ist wieder platz
        o_admission.on_peer_disconnect("peer-a").await;
        let o_resp = call_handler(o_ctx, br#"{"prompt":"x"}"#.to_vec()).await;
        assert_ne!(o_resp.s_error.as_deref(), Some("Connection limit reached"));
    }

    #[tokio::test]
    async fn test_admission_idempotent_count() {
        let (_, o_admission, _) = build_ctx(5, None, 9, 1024);

        o_admission.on_peer_connect("peer-a").await;
        o_admission.on_peer_connect("peer-a").await;
        assert_eq!(o_admission.count().await, 1);

        // disconnect eines unbekannten peers ist harmlos
        o_admission.on_peer_disconnect("peer-z").await;
        assert_eq!(o_admission.count().await, 1);

        o_admission.on_peer_disconnect("peer-a").await;
        assert_eq!(o_admission.count().await, 0);
    }

    #[tokio::test]
    async fn test_admission_events() {
        let (_, o_admission, mut o_event_rx) = build_ctx(5, None, 9, 1024);

        o_admission.on_peer_connect("peer-a").await;

        match o_event_rx.recv().await.unwrap() {
            GatewayEvent::Connected { s_peer_id } => assert_eq!(s_peer_id, "peer-a"),
            o_other => panic!("unerwartetes event: {:?}", o_other),
        }

        match o_event_rx.recv().await.unwrap() {
            GatewayEvent::StatusUpdate { o_status } => {
                assert_eq!(o_status.i_connections, 1);
            }
            o_other => panic!("unerwartetes event: {:?}", o_other),
        }
    }

    // ---------------- upstream forward ----------------

    #[tokio::test]
    async fn test_handler_upstream_error_status() {
        let i_port =
            spawn_stub_llama(StatusCode::INTERNAL_SERVER_ERROR, "kaputt").await;
        let (o_ctx, _, _) = build_ctx(5, None, i_port, 1024);

        let o_resp = call_handler(o_ctx.clone(), br#"{"prompt":"x"}"#.to_vec()).await;
        assert!(!o_resp.b_success);
        assert!(o_resp.s_error.as_deref().unwrap().contains("500"));

        // der node lebt weiter, naechster request kommt auch durch
        let o_resp = call_handler(o_ctx, br#"{"prompt":"x"}"#.to_vec()).await;
        assert!(!o_resp.b_success);
    }

    #[tokio::test]
    async fn test_handler_upstream_success() {
        let i_port = spawn_stub_llama(StatusCode::OK, r#"{"content":"ok"}"#).await;
        let (o_ctx, _, _) = build_ctx(5, None, i_port, 1024);

        let o_resp = call_handler(o_ctx, br#"{"prompt":"x"}"#.to_vec()).await;
        assert!(o_resp.b_success);
        assert!(o_resp.s_error.is_none());

        let o_data = o_resp.o_data.unwrap();
        assert_eq!(o_data.get("content").unwrap(), "ok");
    }

    // ---------------- Lifecycle ----------------

    #[tokio::test]
    async fn test_gateway_lifecycle() {
        let o_cfg = GatewayConfig {
            b_mdns: false,
            s_relay_addr: None,
            ..GatewayConfig::default()
        };

        let o_gateway = P2pGateway::new(o_cfg);

        let o_info = o_gateway.start().await.expect("start muss klappen");
        assert!(!o_info.s_peer_id.is_empty());
        assert!(o_info.s_shareable_url.starts_with("p2p://"));
        assert!(!o_info.v_multiaddrs.is_empty());

        // doppelter start wird abgewiesen
        match o_gateway.start().await {
            Err(GatewayError::AlreadyRunning) => {}
            o_other => panic!("erwartet AlreadyRunning, bekam {:?}", o_other.map(|_| ())),
        }

        let o_status = o_gateway.status().await;
        assert!(o_status.b_running);
        assert_eq!(o_status.s_peer_id.as_deref(), Some(o_info.s_peer_id.as_str()));
        assert_eq!(o_status.i_connections, 0);

        o_gateway.stop().await.unwrap();
        let o_status = o_gateway.status().await;
        assert!(!o_status.b_running);
        assert!(o_status.s_peer_id.is_none());

        // stop ist idempotent
        o_gateway.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_with_inflight_request() {
        use libp2p::futures::StreamExt;
        use libp2p::swarm::SwarmEvent;

        let i_port = spawn_slow_stub_llama(10_000).await;

        let o_cfg = GatewayConfig {
            b_mdns: false,
            s_relay_addr: None,
            i_llama_port: i_port,
            ..GatewayConfig::default()
        };
        let o_gateway = P2pGateway::new(o_cfg);
        let o_info = o_gateway.start().await.expect("start muss klappen");

        let s_addr = o_info
            .v_multiaddrs
            .iter()
            .find(|s| s.contains("127.0.0.1"))
            .expect("loopback listen adresse")
            .clone();

        let mut o_client = build_client_swarm();
        o_client
            .dial(s_addr.parse::<libp2p::Multiaddr>().unwrap())
            .unwrap();

        let o_client_task = tokio::spawn(async move {
            loop {
                match o_client.select_next_some().await {
                    SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                        o_client
                            .behaviour_mut()
                            .send_request(&peer_id, br#"{"prompt":"x"}"#.to_vec());
                    }
                    _ => {}
                }
            }
        });

        // warten bis der peer beim gateway registriert ist
        let mut i_connections = 0;
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            i_connections = o_gateway.status().await.i_connections;
            if i_connections == 1 {
                break;
            }
        }
        assert_eq!(i_connections, 1);

        // kurz warten bis der request am langsamen upstream haengt
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        // stop mit laufendem request: kommt sauber zurueck,
        // der haengende handler wird mit abgeraeumt
        o_gateway.stop().await.unwrap();
        let o_status = o_gateway.status().await;
        assert!(!o_status.b_running);
        assert_eq!(o_status.i_connections, 0);

        o_client_task.abort();
    }

    #[tokio::test]
    async fn test_concurrent_start_stop_state_machine() {
        let o_cfg = GatewayConfig {
            b_mdns: false,
            s_relay_addr: None,
            ..GatewayConfig::default()
        };
        let o_gateway = Arc::new(P2pGateway::new(o_cfg));

        for _ in 0..5 {
            let o_g1 = o_gateway.clone();
            let o_g2 = o_gateway.clone();
            let o_start = tokio::spawn(async move { o_g1.start().await });
            let o_stop = tokio::spawn(async move { o_g2.stop().await });

            let _ = o_start.await.unwrap();
            o_stop.await.unwrap().unwrap();
            o_gateway.stop().await.unwrap();

            // egal wie sich die beiden verzahnt haben, danach muss
            // ein frischer start moeglich sein
            let o_info = o_gateway.start().await.expect("start muss klappen");
            assert!(!o_info.s_peer_id.is_empty());
            o_gateway.stop().await.unwrap();
        }
    }
}
