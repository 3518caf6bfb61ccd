use serde::Serialize;
use serde_json::{Map, Value};

/// Un enregistrement de features : nom -> valeur JSON quelconque.
pub type FeatureRecord = Map<String, Value>;

/// Lot normalisé d'enregistrements pour une requête.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBatch {
    records: Vec<FeatureRecord>,
    is_single: bool,
}

impl RequestBatch {
    pub fn single(record: FeatureRecord) -> Self {
        RequestBatch {
            records: vec![record],
            is_single: true,
        }
    }

    pub fn batch(records: Vec<FeatureRecord>) -> Self {
        RequestBatch {
            records,
            is_single: false,
        }
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn is_single(&self) -> bool {
        self.is_single
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Enveloppe `{"ok": ..., "message": ...}` commune aux réponses simples.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse {
    pub fn success() -> Self {
        ApiResponse {
            ok: true,
            message: None,
        }
    }

    pub fn error(message: &str) -> Self {
        ApiResponse {
            ok: false,
            message: Some(message.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionBody {
    pub prediction: Value,
}

/// Réponse de `POST /predict`.
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub ok: bool,
    pub result: PredictionBody,
    pub probabilities: Value,
}

impl PredictResponse {
    pub fn new(prediction: Value, probabilities: Option<Value>) -> Self {
        PredictResponse {
            ok: true,
            result: PredictionBody { prediction },
            probabilities: probabilities.unwrap_or(Value::Null),
        }
    }
}
