use uuid::Uuid;

use crate::db::error::{DbError, DbResult};

/// Parse a UUID string from the database, returning a DbError on failure
pub fn parse_uuid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::Internal(format!("Invalid UUID in database: {}", e)))
}

/// Encode an embedding vector as JSON text for storage.
pub fn vector_to_json(vector: &[f32]) -> DbResult<String> {
    serde_json::to_string(vector).map_err(DbError::Json)
}

/// Decode a stored embedding vector, if present.
pub fn vector_from_json(text: Option<String>) -> DbResult<Option<Vec<f32>>> {
    match text {
        Some(text) => {
            let vector: Vec<f32> = serde_json::from_str(&text).map_err(DbError::Json)?;
            Ok(Some(vector))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_json_round_trip() {
        let v = vec![0.25f32, -1.0, 3.5];
        let text = vector_to_json(&v).unwrap();
        let back = vector_from_json(Some(text)).unwrap().unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_vector_from_missing_column() {
        assert!(vector_from_json(None).unwrap().is_none());
    }
}
