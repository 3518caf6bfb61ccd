use serde_json::Value;

use crate::error::ApiError;
use crate::models::{FeatureRecord, RequestBatch};

const MISSING_FIELDS: &str = "Missing 'features' or 'data'.";

/// Transforme le corps brut de la requête en lot d'enregistrements.
///
/// Accepte `{"features": {...}}` (unitaire) ou `{"data": [{...}, ...]}` (lot).
/// Un corps vide vaut `{}`.
pub fn normalize(body: &[u8]) -> Result<RequestBatch, ApiError> {
    let parsed: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Malformed JSON: {}", e)))?
    };

    if let Some(Value::Array(items)) = parsed.get("data") {
        let records = items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(record) => Ok(record.clone()),
                _ => Err(ApiError::InvalidRequest(format!(
                    "data[{}] must be an object",
                    i
                ))),
            })
            .collect::<Result<Vec<FeatureRecord>, _>>()?;
        return Ok(RequestBatch::batch(records));
    }

    if let Some(Value::Object(record)) = parsed.get("features") {
        return Ok(RequestBatch::single(record.clone()));
    }

    Err(ApiError::InvalidRequest(MISSING_FIELDS.to_string()))
}
