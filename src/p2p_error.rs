// src/p2p_error.rs
// ------------------------------------------------------------
// Fehler Taxonomie
//
// Ziel
// - lifecycle fehler fuer start/stop als enum
// - request fehler pro stream, wird als wire error text gesendet
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("p2p gateway laeuft bereits")]
    AlreadyRunning,

    #[error("transport fehler: {0}")]
    Transport(String),

    #[error("interner fehler: {0}")]
    Internal(String),
}

// fehler waehrend einem request, verlaesst den stream nie
// wire_message geht als error feld an den remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestFault {
    ConnectionLimitExceeded,
    EmptyRequest,
    PayloadTooLarge,
    MalformedRequest,
    Unauthorized,
    Internal(String),
}

impl RequestFault {
    pub fn wire_message(&self) -> &'static str {
        match self {
            RequestFault::ConnectionLimitExceeded => "Connection limit reached",
            RequestFault::EmptyRequest => "No request data received",
            RequestFault::PayloadTooLarge => "Request payload too large",
            RequestFault::MalformedRequest => "Invalid JSON request",
            RequestFault::Unauthorized => "Invalid API key",
            RequestFault::Internal(_) => "Internal server error",
        }
    }
}
