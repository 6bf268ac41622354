use crate::utils::error::AppError;
use mongodb::bson::oid::ObjectId;
use rand::RngCore;

/// Parses a hex ObjectId coming from a path or body, naming the entity in the error.
pub fn parse_object_id(value: &str, what: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(value.trim()).map_err(|_| AppError::invalid_id(what))
}

pub fn hex_id(id: &Option<ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_default()
}

/// 32 random bytes rendered as 64 lowercase hex chars.
pub fn random_hex_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
