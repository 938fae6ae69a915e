// src/llama_client.rs
// ------------------------------------------------------------
// Client fuer den lokalen llama.cpp server
//
// Ziel
// - request auf das completion format des backends mappen
// - ein http post, timeout gedeckelt
// - fehler kommen als failure response zurueck, nie als panic
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

use std::time::Duration;

use crate::p2p_wire::{LlamaRequest, LlamaResponse};

#[derive(Debug, Clone)]
pub struct LlamaClient {
    o_http: reqwest::Client,
    s_base_url: String,
}

impl LlamaClient {
    pub fn new(s_host: &str, i_port: u16, i_timeout_sec: u64) -> Result<Self, String> {
        let o_http = reqwest::Client::builder()
            .timeout(Duration::from_secs(i_timeout_sec))
            .build()
            .map_err(|e| format!("http client aufbau fehlgeschlagen: {}", e))?;

        Ok(Self {
            o_http,
            s_base_url: format!("http://{}:{}", s_host.trim(), i_port),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.s_base_url
    }

    // benannte felder zuerst, parameters zuletzt:
    // bei gleichem key gewinnt der wert aus parameters
    pub fn build_completion_payload(
        o_req: &LlamaRequest,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut map_payload = serde_json::Map::new();

        map_payload.insert(
            "prompt".to_string(),
            serde_json::Value::from(o_req.s_prompt.clone()),
        );
        map_payload.insert(
            "max_tokens".to_string(),
            serde_json::Value::from(o_req.i_max_tokens),
        );
        map_payload.insert(
            "temperature".to_string(),
            serde_json::Value::from(o_req.d_temperature),
        );
        map_payload.insert("top_p".to_string(), serde_json::Value::from(o_req.d_top_p));
        map_payload.insert(
            "stream".to_string(),
            serde_json::Value::from(o_req.b_stream),
        );

        for (s_key, o_val) in o_req.map_parameters.iter() {
            map_payload.insert(s_key.clone(), o_val.clone());
        }

        map_payload
    }

    pub async fn forward(&self, o_req: &LlamaRequest) -> LlamaResponse {
        let map_payload = Self::build_completion_payload(o_req);
        let s_url = format!("{}/completion", self.s_base_url);

        println!("forward an llama server: {}", s_url);

        let o_result = self.o_http.post(&s_url).json(&map_payload).send().await;

        let o_http_resp = match o_result {
            Ok(v) => v,
            Err(e) => {
                println!("llama server nicht erreichbar: {}", e);
                return LlamaResponse::fail(format!("{}", e));
            }
        };

        let o_status = o_http_resp.status();
        if !o_status.is_success() {
            println!("llama server status: {}", o_status.as_u16());
            return LlamaResponse::fail(format!(
                "Llama-cpp server responded with status: {}",
                o_status.as_u16()
            ));
        }

        match o_http_resp.json::<serde_json::Value>().await {
            Ok(o_data) => LlamaResponse::ok(o_data),
            Err(e) => {
                println!("llama response decode fehlgeschlagen: {}", e);
                LlamaResponse::fail(format!("response decode failed: {}", e))
            }
        }
    }
}
