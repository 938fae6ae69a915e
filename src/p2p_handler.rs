// src/p2p_handler.rs
// ------------------------------------------------------------
// P2P Server: llama request aus dem stream verarbeiten
//
// Ziel
// - admission und api key pruefen
// - request decode, forward an den lokalen llama server
// - response encode
// - jeder fehler wird eine wire response, der node laeuft weiter
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

use std::sync::Arc;

use crate::llama_client::LlamaClient;
use crate::p2p_admission::AdmissionControl;
use crate::p2p_error::RequestFault;
use crate::p2p_wire::{LlamaRequest, LlamaResponse};

pub struct RequestCtx {
    pub o_admission: AdmissionControl,
    pub o_llama: LlamaClient,
    pub s_api_key: Option<String>,
    pub i_max_payload_bytes: usize,
}

// top level pro stream: liefert immer encodete response bytes
pub async fn handle_llama_request(
    o_ctx: Arc<RequestCtx>,
    s_peer_id: String,
    v_req: Vec<u8>,
) -> Vec<u8> {
    let o_resp = match handle_inner(&o_ctx, &s_peer_id, &v_req).await {
        Ok(o_resp) => o_resp,
        Err(o_fault) => {
            println!("request von {} abgelehnt: {:?}", s_peer_id, o_fault);
            LlamaResponse::fail(o_fault.wire_message())
        }
    };

    encode_response(&o_resp)
}

async fn handle_inner(
    o_ctx: &RequestCtx,
    s_peer_id: &str,
    v_req: &[u8],
) -> Result<LlamaResponse, RequestFault> {
    if !o_ctx.o_admission.admit().await {
        println!(
            "verbindungslimit erreicht, request von {} abgewiesen",
            s_peer_id
        );
        return Err(RequestFault::ConnectionLimitExceeded);
    }

    if v_req.is_empty() {
        return Err(RequestFault::EmptyRequest);
    }

    if v_req.len() > o_ctx.i_max_payload_bytes {
        return Err(RequestFault::PayloadTooLarge);
    }

    let s_raw = std::str::from_utf8(v_req).map_err(|_| RequestFault::MalformedRequest)?;
    let o_req: LlamaRequest =
        serde_json::from_str(s_raw).map_err(|_| RequestFault::MalformedRequest)?;

    if let Some(s_expected) = o_ctx.s_api_key.as_deref() {
        if o_req.s_api_key.as_deref() != Some(s_expected) {
            return Err(RequestFault::Unauthorized);
        }
    }

    println!("llm request von peer {}", s_peer_id);

    // upstream fehler kommen schon als failure response zurueck
    Ok(o_ctx.o_llama.forward(&o_req).await)
}

fn encode_response(o_resp: &LlamaResponse) -> Vec<u8> {
    match serde_json::to_vec(o_resp) {
        Ok(v_out) => v_out,
        Err(e) => {
            let o_fault = RequestFault::Internal(format!("response encode: {}", e));
            println!("{:?}", o_fault);
            serde_json::to_vec(&LlamaResponse::fail(o_fault.wire_message()))
                .unwrap_or_else(|_| Vec::new())
        }
    }
}
