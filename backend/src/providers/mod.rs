//! Fournisseurs de modèle disponibles au chargement.

pub mod linear;
pub mod onnx;

use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::models::FeatureRecord;

/// Valeur numérique d'une feature ; absente ou `null` vaut 0.
pub(crate) fn feature_value(record: &FeatureRecord, name: &str) -> ModelResult<f64> {
    let value = match record.get(name) {
        None | Some(Value::Null) => return Ok(0.0),
        Some(value) => value,
    };
    let parsed = match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    // "NaN" / "inf" passent le parse mais ne sont pas des features exploitables
    parsed.filter(|v| v.is_finite()).ok_or_else(|| ModelError::NonNumericFeature {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Matrice `records.len() x features.len()` dans l'ordre des features.
pub(crate) fn feature_matrix(
    records: &[FeatureRecord],
    features: &[String],
) -> ModelResult<ndarray::Array2<f64>> {
    let mut values = Vec::with_capacity(records.len() * features.len());
    for record in records {
        for name in features {
            values.push(feature_value(record, name)?);
        }
    }
    ndarray::Array2::from_shape_vec((records.len(), features.len()), values)
        .map_err(|e| ModelError::Backend(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> FeatureRecord {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_feature_coercion() {
        let r = record(json!({"n": 2.5, "b": true, "s": " 4 ", "z": null}));
        assert_eq!(feature_value(&r, "n").unwrap(), 2.5);
        assert_eq!(feature_value(&r, "b").unwrap(), 1.0);
        assert_eq!(feature_value(&r, "s").unwrap(), 4.0);
        assert_eq!(feature_value(&r, "z").unwrap(), 0.0);
        assert_eq!(feature_value(&r, "missing").unwrap(), 0.0);
    }

    #[test]
    fn test_non_numeric_feature() {
        let r = record(json!({"color": "red", "list": [1]}));
        let err = feature_value(&r, "color").unwrap_err();
        assert_eq!(err.to_string(), "feature 'color' is not numeric: \"red\"");
        assert!(feature_value(&r, "list").is_err());
    }

    #[test]
    fn test_non_finite_strings_rejected() {
        let r = record(json!({"a": "NaN", "b": "inf", "c": "-Infinity"}));
        for name in ["a", "b", "c"] {
            assert!(matches!(
                feature_value(&r, name),
                Err(ModelError::NonNumericFeature { .. })
            ));
        }
    }

    #[test]
    fn test_feature_matrix_order() {
        let records = vec![record(json!({"a": 1, "b": 2})), record(json!({"b": 4, "a": 3}))];
        let m = feature_matrix(&records, &["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(m, ndarray::arr2(&[[2.0, 1.0], [4.0, 3.0]]));
    }
}
