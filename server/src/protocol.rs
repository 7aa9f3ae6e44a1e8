//! JSON codec for the WebSocket text frames.

pub use soaring_shared::protocol::{
    ClientMsg, GamePhase, GliderWire, ServerMsg, WelcomeMsg, WorldReport, PROTOCOL_VERSION,
};

/// Why an inbound frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Oversized,
    Malformed,
}

/// Decode a client frame. Oversized frames are rejected before parsing;
/// anything that is not a known message is malformed.
pub fn decode_client_msg(text: &str, max_bytes: usize) -> Result<ClientMsg, DropReason> {
    if text.len() > max_bytes {
        return Err(DropReason::Oversized);
    }
    serde_json::from_str(text).map_err(|e| {
        tracing::debug!("Dropping malformed client frame: {}", e);
        DropReason::Malformed
    })
}

pub fn encode_server_msg(msg: &ServerMsg) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("Failed to encode server message: {}", e);
            None
        }
    }
}

pub fn report_json(report: WorldReport) -> Option<String> {
    encode_server_msg(&ServerMsg::Report { report })
}
