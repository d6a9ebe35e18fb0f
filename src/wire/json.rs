use crate::wire::{DecodeError, EncodeError, WireMessage};

pub(super) fn encode(message: &WireMessage) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(message)?)
}

pub(super) fn decode(data: &[u8]) -> Result<WireMessage, DecodeError> {
    Ok(serde_json::from_slice(data)?)
}
