use cld_types::ClusterdError;

/// Encode a stored row with the workspace-wide bincode configuration.
pub fn encode<T: serde::Serialize>(val: &T) -> Result<Vec<u8>, ClusterdError> {
    bincode::serde::encode_to_vec(val, bincode::config::standard())
        .map_err(|e| ClusterdError::Storage(format!("failed to encode row: {e}")))
}

pub fn decode<T: for<'de> serde::Deserialize<'de>>(bytes: &[u8]) -> Result<T, ClusterdError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(v, _)| v)
        .map_err(|e| ClusterdError::Storage(format!("failed to decode row: {e}")))
}
