// src/p2p_wire.rs
// ------------------------------------------------------------
// Wire Format fuer den inference relay ueber libp2p
//
// Ziel
// - request und response als json structs
// - fehlende felder bekommen die dokumentierten defaults
// - response traegt genau eine der varianten data oder error
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

use serde::{Deserialize, Serialize};

fn default_max_tokens() -> u32 {
    100
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlamaRequest {
    #[serde(rename = "prompt", default)]
    pub s_prompt: String,

    #[serde(rename = "max_tokens", default = "default_max_tokens")]
    pub i_max_tokens: u32,

    #[serde(rename = "temperature", default = "default_temperature")]
    pub d_temperature: f32,

    #[serde(rename = "top_p", default = "default_top_p")]
    pub d_top_p: f32,

    #[serde(rename = "stream", default)]
    pub b_stream: bool,

    // zusaetzliche backend parameter, werden opak durchgereicht
    #[serde(rename = "parameters", default)]
    pub map_parameters: serde_json::Map<String, serde_json::Value>,

    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub s_api_key: Option<String>,
}

impl Default for LlamaRequest {
    fn default() -> Self {
        Self {
            s_prompt: String::new(),
            i_max_tokens: default_max_tokens(),
            d_temperature: default_temperature(),
            d_top_p: default_top_p(),
            b_stream: false,
            map_parameters: serde_json::Map::new(),
            s_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlamaResponse {
    #[serde(rename = "success")]
    pub b_success: bool,

    #[serde(rename = "data", default, skip_serializing_if = "Option::is_none")]
    pub o_data: Option<serde_json::Value>,

    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub s_error: Option<String>,
}

impl LlamaResponse {
    pub fn ok(o_data: serde_json::Value) -> Self {
        Self {
            b_success: true,
            o_data: Some(o_data),
            s_error: None,
        }
    }

    pub fn fail(s_error: impl Into<String>) -> Self {
        Self {
            b_success: false,
            o_data: None,
            s_error: Some(s_error.into()),
        }
    }
}
