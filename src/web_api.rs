// src/web_api.rs
// ------------------------------------------------------------
// DTOs fuer die Web Control API
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

use serde::Serialize;

use crate::p2p_gateway::StartInfo;

#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    #[serde(rename = "peerId")]
    pub s_peer_id: String,
    #[serde(rename = "multiaddrs")]
    pub v_multiaddrs: Vec<String>,
    #[serde(rename = "shareableUrl")]
    pub s_shareable_url: String,
}

impl From<StartInfo> for StartResponse {
    fn from(o_info: StartInfo) -> Self {
        Self {
            s_peer_id: o_info.s_peer_id,
            v_multiaddrs: o_info.v_multiaddrs,
            s_shareable_url: o_info.s_shareable_url,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OkResponse {
    pub b_ok: bool,
    pub s_error: String,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self {
            b_ok: true,
            s_error: String::new(),
        }
    }

    pub fn err(s_error: impl Into<String>) -> Self {
        Self {
            b_ok: false,
            s_error: s_error.into(),
        }
    }
}
