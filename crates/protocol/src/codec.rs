//! JSON framing for events and commands.

use crate::packets::{ClientCommand, ServerEvent};
use crate::ProtocolError;

/// Encode an outbound event as a text frame.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|source| ProtocolError::Encode {
        event: event.name(),
        source,
    })
}

/// Decode an inbound text frame into a command.
pub fn decode(frame: &str) -> Result<ClientCommand, ProtocolError> {
    if frame.trim().is_empty() {
        return Err(ProtocolError::Empty);
    }
    serde_json::from_str(frame).map_err(ProtocolError::Malformed)
}
