// src/gateway_config.rs
// ------------------------------------------------------------
// Gateway Konfiguration
//
// Ziel
// - defaults fuer llama endpoint, peer limit, relay, web port
// - alles per ENV ueberschreibbar
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub s_llama_host: String,
    pub i_llama_port: u16,
    pub i_max_connections: usize,
    pub s_api_key: Option<String>,
    pub s_relay_addr: Option<String>,
    pub s_rendezvous_host: String,
    pub i_web_port: u16,
    pub i_max_payload_bytes: usize,
    pub i_upstream_timeout_sec: u64,
    pub b_mdns: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            s_llama_host: "127.0.0.1".to_string(),
            // port aus run.sh, dahinter sitzt der llama.cpp server
            i_llama_port: 15876,
            i_max_connections: 5,
            s_api_key: None,
            s_relay_addr: Some("/dns4/signal.expchat.ai/tcp/4001".to_string()),
            s_rendezvous_host: "signal.expchat.ai".to_string(),
            i_web_port: 3180,
            i_max_payload_bytes: 1024 * 1024,
            i_upstream_timeout_sec: 120,
            b_mdns: true,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let o_def = Self::default();

        // P2P_RELAY_ADDR="off" schaltet den relay listen aus
        let s_relay_raw = env_string("P2P_RELAY_ADDR", o_def.s_relay_addr.as_deref().unwrap_or(""));
        let s_relay_addr = if s_relay_raw.trim().is_empty() || s_relay_raw.trim().eq_ignore_ascii_case("off") {
            None
        } else {
            Some(s_relay_raw.trim().to_string())
        };

        Self {
            s_llama_host: env_string("P2P_LLAMA_HOST", &o_def.s_llama_host),
            i_llama_port: env_u16("P2P_LLAMA_PORT", o_def.i_llama_port),
            i_max_connections: env_usize("P2P_MAX_CONNECTIONS", o_def.i_max_connections),
            s_api_key: env_string_opt("P2P_API_KEY"),
            s_relay_addr,
            s_rendezvous_host: env_string("P2P_RENDEZVOUS_HOST", &o_def.s_rendezvous_host),
            i_web_port: env_u16("P2P_WEB_PORT", o_def.i_web_port),
            i_max_payload_bytes: env_usize("P2P_MAX_PAYLOAD", o_def.i_max_payload_bytes),
            i_upstream_timeout_sec: env_u64("P2P_UPSTREAM_TIMEOUT_SEC", o_def.i_upstream_timeout_sec),
            b_mdns: env_bool_default("P2P_MDNS", o_def.b_mdns),
        }
    }
}

// kleine ENV-Helper

fn env_string(s_key: &str, s_default: &str) -> String {
    std::env::var(s_key).unwrap_or_else(|_| s_default.to_string())
}

fn env_string_opt(s_key: &str) -> Option<String> {
    std::env::var(s_key).ok().filter(|s| !s.trim().is_empty())
}

fn env_u16(s_key: &str, i_default: u16) -> u16 {
    std::env::var(s_key)
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(i_default)
}

fn env_u64(s_key: &str, i_default: u64) -> u64 {
    std::env::var(s_key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(i_default)
}

fn env_usize(s_key: &str, i_default: usize) -> usize {
    std::env::var(s_key)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(i_default)
}

fn env_bool_default(s_key: &str, b_default: bool) -> bool {
    match std::env::var(s_key) {
        Ok(s_val) => {
            s_val == "1" || s_val.eq_ignore_ascii_case("true") || s_val.eq_ignore_ascii_case("on")
        }
        Err(_) => b_default,
    }
}
