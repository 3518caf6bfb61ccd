//! Conversion des sorties natives du modèle en JSON.
//!
//! Les fournisseurs de modèle décrivent leurs sorties avec [`NativeValue`] ;
//! [`to_json`] les réduit en `serde_json::Value`, une règle par variante.

use ndarray::{ArrayD, ArrayViewD, Axis};
use serde_json::{Map, Number, Value};

use crate::error::{ApiError, ModelError};
use crate::models::RequestBatch;

/// Sortie brute d'un fournisseur de modèle.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Entier au-delà de `i64::MAX`.
    UInt(u64),
    Float(f64),
    Str(String),
    IntArray(ArrayD<i64>),
    FloatArray(ArrayD<f64>),
    BoolArray(ArrayD<bool>),
    /// Tableau ligne/colonne : une ligne par enregistrement.
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<NativeValue>>,
    },
    /// Colonne unique.
    Series(Vec<NativeValue>),
    Mapping(Vec<(String, NativeValue)>),
    Sequence(Vec<NativeValue>),
    /// Type que le codec ne sait pas convertir (nom du type).
    Opaque(String),
}

impl NativeValue {
    /// Nombre d'entrées sur le premier axe, `None` pour un scalaire ou un mapping.
    fn entry_count(&self) -> Option<usize> {
        match self {
            NativeValue::IntArray(a) => leading_len(a.shape()),
            NativeValue::FloatArray(a) => leading_len(a.shape()),
            NativeValue::BoolArray(a) => leading_len(a.shape()),
            NativeValue::Table { rows, .. } => Some(rows.len()),
            NativeValue::Series(items) | NativeValue::Sequence(items) => Some(items.len()),
            _ => None,
        }
    }
}

impl From<Value> for NativeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => NativeValue::Null,
            Value::Bool(b) => NativeValue::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => NativeValue::Int(i),
                (None, Some(u)) => NativeValue::UInt(u),
                _ => NativeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => NativeValue::Str(s),
            Value::Array(items) => {
                NativeValue::Sequence(items.into_iter().map(NativeValue::from).collect())
            }
            Value::Object(map) => NativeValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, NativeValue::from(v)))
                    .collect(),
            ),
        }
    }
}

fn leading_len(shape: &[usize]) -> Option<usize> {
    shape.first().copied()
}

/// NaN et ±inf deviennent `null`.
fn float_to_json(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn array_to_json<T>(view: ArrayViewD<'_, T>, leaf: &dyn Fn(&T) -> Value) -> Value {
    if view.ndim() == 0 {
        return view.iter().next().map(leaf).unwrap_or(Value::Null);
    }
    Value::Array(
        view.outer_iter()
            .map(|sub| array_to_json(sub, leaf))
            .collect(),
    )
}

fn row_to_mapping(
    columns: &[String],
    row: Vec<NativeValue>,
) -> Result<Vec<(String, NativeValue)>, ApiError> {
    if row.len() != columns.len() {
        return Err(ApiError::SerializationViolation(format!(
            "table row has {} cells for {} columns",
            row.len(),
            columns.len()
        )));
    }
    Ok(columns.iter().cloned().zip(row).collect())
}

/// Convertit récursivement une sortie native en JSON.
pub fn to_json(value: NativeValue) -> Result<Value, ApiError> {
    match value {
        NativeValue::IntArray(a) => Ok(array_to_json(a.view(), &|x: &i64| Value::from(*x))),
        NativeValue::FloatArray(a) => Ok(array_to_json(a.view(), &|x: &f64| float_to_json(*x))),
        NativeValue::BoolArray(a) => Ok(array_to_json(a.view(), &|x: &bool| Value::Bool(*x))),
        NativeValue::Int(i) => Ok(Value::from(i)),
        NativeValue::UInt(u) => Ok(Value::from(u)),
        NativeValue::Float(f) => Ok(float_to_json(f)),
        NativeValue::Bool(b) => Ok(Value::Bool(b)),
        NativeValue::Table { columns, rows } => rows
            .into_iter()
            .map(|row| to_json(NativeValue::Mapping(row_to_mapping(&columns, row)?)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        NativeValue::Series(items) | NativeValue::Sequence(items) => items
            .into_iter()
            .map(to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        NativeValue::Mapping(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (k, v) in entries {
                map.insert(k, to_json(v)?);
            }
            Ok(Value::Object(map))
        }
        NativeValue::Null => Ok(Value::Null),
        NativeValue::Str(s) => Ok(Value::String(s)),
        NativeValue::Opaque(type_name) => Err(ApiError::SerializationViolation(type_name)),
    }
}

fn first_of_array<T: Clone>(a: ArrayD<T>) -> Option<ArrayD<T>> {
    if a.ndim() == 0 {
        return Some(a);
    }
    if a.shape()[0] == 0 {
        return None;
    }
    Some(a.index_axis(Axis(0), 0).to_owned())
}

fn first_entry(value: NativeValue) -> Result<NativeValue, ApiError> {
    let empty = || ApiError::from(ModelError::OutputLength { expected: 1, got: 0 });
    match value {
        NativeValue::IntArray(a) => first_of_array(a).map(NativeValue::IntArray).ok_or_else(empty),
        NativeValue::FloatArray(a) => {
            first_of_array(a).map(NativeValue::FloatArray).ok_or_else(empty)
        }
        NativeValue::BoolArray(a) => {
            first_of_array(a).map(NativeValue::BoolArray).ok_or_else(empty)
        }
        NativeValue::Table { columns, rows } => {
            let row = rows.into_iter().next().ok_or_else(empty)?;
            Ok(NativeValue::Mapping(row_to_mapping(&columns, row)?))
        }
        NativeValue::Series(items) | NativeValue::Sequence(items) => {
            items.into_iter().next().ok_or_else(empty)
        }
        scalar => Ok(scalar),
    }
}

/// Applique la règle de forme aux prédictions.
///
/// Requête unitaire : la valeur est extraite de son conteneur.
/// Lot : la sortie reste une séquence d'exactement `batch.len()` entrées.
pub fn shape_prediction(value: NativeValue, batch: &RequestBatch) -> Result<NativeValue, ApiError> {
    if batch.is_single() {
        return first_entry(value);
    }
    match value.entry_count() {
        Some(got) if got == batch.len() => Ok(value),
        Some(got) => Err(ModelError::OutputLength {
            expected: batch.len(),
            got,
        }
        .into()),
        None if batch.len() == 1 => Ok(NativeValue::Sequence(vec![value])),
        None => Err(ModelError::OutputLength {
            expected: batch.len(),
            got: 1,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use serde_json::json;

    fn batch_of(n: usize) -> RequestBatch {
        RequestBatch::batch(vec![Map::new(); n])
    }

    fn single() -> RequestBatch {
        RequestBatch::single(Map::new())
    }

    #[test]
    fn test_int_array_stays_integral() {
        let v = to_json(NativeValue::IntArray(arr1(&[1i64, -2, 3]).into_dyn())).unwrap();
        assert_eq!(v, json!([1, -2, 3]));
        assert!(v[0].is_i64());
    }

    #[test]
    fn test_float_matrix_nested() {
        let v = to_json(NativeValue::FloatArray(
            arr2(&[[0.25, 0.75], [0.5, 0.5]]).into_dyn(),
        ))
        .unwrap();
        assert_eq!(v, json!([[0.25, 0.75], [0.5, 0.5]]));
    }

    #[test]
    fn test_non_finite_floats_become_null() {
        assert_eq!(to_json(NativeValue::Float(f64::NAN)).unwrap(), Value::Null);
        assert_eq!(to_json(NativeValue::Float(f64::INFINITY)).unwrap(), Value::Null);
        let v = to_json(NativeValue::FloatArray(
            arr1(&[1.5, f64::NEG_INFINITY]).into_dyn(),
        ))
        .unwrap();
        assert_eq!(v, json!([1.5, null]));
    }

    #[test]
    fn test_numbers_round_trip() {
        let values = [0.1, -1234.5678, 1e-300, f64::MAX, 2.0f64.powi(53)];
        for f in values {
            let text = serde_json::to_string(&to_json(NativeValue::Float(f)).unwrap()).unwrap();
            let back: f64 = serde_json::from_str(&text).unwrap();
            assert_eq!(back, f);
        }
        let text = serde_json::to_string(&to_json(NativeValue::Int(i64::MIN)).unwrap()).unwrap();
        assert_eq!(serde_json::from_str::<i64>(&text).unwrap(), i64::MIN);
    }

    #[test]
    fn test_table_becomes_records() {
        let table = NativeValue::Table {
            columns: vec!["cat".into(), "dog".into()],
            rows: vec![
                vec![NativeValue::Float(0.9), NativeValue::Float(0.1)],
                vec![NativeValue::Float(0.2), NativeValue::Float(0.8)],
            ],
        };
        assert_eq!(
            to_json(table).unwrap(),
            json!([{"cat": 0.9, "dog": 0.1}, {"cat": 0.2, "dog": 0.8}])
        );
    }

    #[test]
    fn test_ragged_table_is_rejected() {
        let table = NativeValue::Table {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec![NativeValue::Int(1)]],
        };
        assert!(matches!(
            to_json(table),
            Err(ApiError::SerializationViolation(_))
        ));
    }

    #[test]
    fn test_nested_mapping_keeps_order() {
        let value = NativeValue::Mapping(vec![
            ("z".into(), NativeValue::Series(vec![NativeValue::Bool(true)])),
            ("a".into(), NativeValue::Str("x".into())),
        ]);
        let v = to_json(value).unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"{"z":[true],"a":"x"}"#);
    }

    #[test]
    fn test_opaque_fails_fast() {
        let nested = NativeValue::Sequence(vec![
            NativeValue::Int(1),
            NativeValue::Opaque("Timestamp".into()),
        ]);
        match to_json(nested) {
            Err(ApiError::SerializationViolation(name)) => assert_eq!(name, "Timestamp"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_large_unsigned_label_stays_integral() {
        let big = json!(u64::MAX);
        let native = NativeValue::from(big.clone());
        assert_eq!(native, NativeValue::UInt(u64::MAX));
        let v = to_json(native).unwrap();
        assert!(v.is_u64());
        assert_eq!(serde_json::to_string(&v).unwrap(), "18446744073709551615");
        assert_eq!(v, big);
    }

    #[test]
    fn test_from_json_value() {
        let native = NativeValue::from(json!({"label": "a", "n": 3, "p": 0.5, "l": [null]}));
        assert_eq!(
            to_json(native).unwrap(),
            json!({"label": "a", "n": 3, "p": 0.5, "l": [null]})
        );
    }

    #[test]
    fn test_single_unwraps_series() {
        let shaped = shape_prediction(
            NativeValue::Series(vec![NativeValue::Str("yes".into())]),
            &single(),
        )
        .unwrap();
        assert_eq!(to_json(shaped).unwrap(), json!("yes"));
    }

    #[test]
    fn test_single_unwraps_array_row() {
        let shaped = shape_prediction(
            NativeValue::FloatArray(arr2(&[[1.0, 2.0]]).into_dyn()),
            &single(),
        )
        .unwrap();
        assert_eq!(to_json(shaped).unwrap(), json!([1.0, 2.0]));

        let shaped =
            shape_prediction(NativeValue::IntArray(arr1(&[7i64]).into_dyn()), &single()).unwrap();
        assert_eq!(to_json(shaped).unwrap(), json!(7));
    }

    #[test]
    fn test_single_table_row_becomes_mapping() {
        let table = NativeValue::Table {
            columns: vec!["score".into()],
            rows: vec![vec![NativeValue::Float(0.5)]],
        };
        let shaped = shape_prediction(table, &single()).unwrap();
        assert_eq!(to_json(shaped).unwrap(), json!({"score": 0.5}));
    }

    #[test]
    fn test_single_scalar_passes_through() {
        let shaped = shape_prediction(NativeValue::Int(4), &single()).unwrap();
        assert_eq!(shaped, NativeValue::Int(4));
    }

    #[test]
    fn test_single_empty_output_is_error() {
        assert!(matches!(
            shape_prediction(NativeValue::Series(vec![]), &single()),
            Err(ApiError::ModelInvocation(_))
        ));
    }

    #[test]
    fn test_batch_keeps_sequence() {
        let shaped = shape_prediction(
            NativeValue::IntArray(arr1(&[3i64, 1, 2]).into_dyn()),
            &batch_of(3),
        )
        .unwrap();
        assert_eq!(to_json(shaped).unwrap(), json!([3, 1, 2]));
    }

    #[test]
    fn test_batch_of_one_stays_wrapped() {
        let shaped = shape_prediction(
            NativeValue::Series(vec![NativeValue::Int(9)]),
            &batch_of(1),
        )
        .unwrap();
        assert_eq!(to_json(shaped).unwrap(), json!([9]));

        let shaped = shape_prediction(NativeValue::Int(9), &batch_of(1)).unwrap();
        assert_eq!(to_json(shaped).unwrap(), json!([9]));
    }

    #[test]
    fn test_batch_length_mismatch() {
        let err = shape_prediction(
            NativeValue::Series(vec![NativeValue::Int(1)]),
            &batch_of(2),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "model returned 1 predictions for 2 records");
    }
}
