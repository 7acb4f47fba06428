//! Wire codec for bus payloads.
//!
//! Every process in the fleet must agree on this encoding. Messages are JSON
//! encoded into `Bytes` so they can be handed to the bus without copying.

use bytes::Bytes;

use crate::shared::error::SharedError;
use crate::shared::message::SyncMessage;

/// Encode a message for publication
pub fn encode(message: &SyncMessage) -> Result<Bytes, SharedError> {
    let buf = serde_json::to_vec(message)?;
    Ok(Bytes::from(buf))
}

/// Decode and validate a message received from the bus
pub fn decode(payload: &[u8]) -> Result<SyncMessage, SharedError> {
    let message: SyncMessage = serde_json::from_slice(payload)?;
    message.validate()?;
    Ok(message)
}

/// Decode a request received on `document_id`'s subject; a message naming
/// another document is rejected
pub fn decode_for(payload: &[u8], document_id: &str) -> Result<SyncMessage, SharedError> {
    let message = decode(payload)?;
    if message.document_id != document_id {
        return Err(SharedError::message(format!(
            "request for {} arrived on the subject of {}",
            message.document_id, document_id
        )));
    }
    Ok(message)
}
