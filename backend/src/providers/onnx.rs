use std::path::{Path, PathBuf};

use anyhow::Context;
use log::debug;
use ndarray::{ArrayD, Axis, IxDyn};
use tract_onnx::prelude::*;

use super::feature_value;
use crate::codec::NativeValue;
use crate::error::{ModelError, ModelResult};
use crate::inference::Model;
use crate::models::FeatureRecord;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Modèle ONNX exécuté avec tract, un enregistrement à la fois (entrée `1 x n`).
///
/// L'ordre des features est lu dans `<modèle>.features.json`. La première
/// sortie donne les prédictions, la seconde (si présente) les probabilités.
pub struct OnnxModel {
    plan: Plan,
    features: Vec<String>,
    output_count: usize,
}

pub fn features_path(model_path: &Path) -> PathBuf {
    model_path.with_extension("features.json")
}

fn backend(e: impl std::fmt::Display) -> ModelError {
    ModelError::Backend(e.to_string())
}

impl OnnxModel {
    pub fn load<P: AsRef<Path>>(model_path: P) -> anyhow::Result<Self> {
        let model_path = model_path.as_ref();
        let sidecar = features_path(model_path);
        let raw = std::fs::read_to_string(&sidecar)
            .with_context(|| format!("Lecture des features {}", sidecar.display()))?;
        let features: Vec<String> = serde_json::from_str(&raw)
            .with_context(|| format!("Liste de features invalide {}", sidecar.display()))?;

        let plan = tract_onnx::onnx()
            .model_for_path(model_path)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, features.len())),
            )?
            .into_optimized()?
            .into_runnable()?;
        let output_count = plan.model().outputs.len();

        Ok(Self {
            plan,
            features,
            output_count,
        })
    }

    fn run_one(&self, record: &FeatureRecord) -> ModelResult<TVec<TValue>> {
        let values = self
            .features
            .iter()
            .map(|name| feature_value(record, name).map(|v| v as f32))
            .collect::<ModelResult<Vec<f32>>>()?;
        let input = Tensor::from_shape(&[1, values.len()], &values).map_err(backend)?;
        self.plan.run(tvec!(input.into())).map_err(backend)
    }

    fn output(&self, records: &[FeatureRecord], index: usize) -> ModelResult<NativeValue> {
        let runs = records
            .iter()
            .map(|r| self.run_one(r))
            .collect::<ModelResult<Vec<_>>>()?;
        let tensors = runs
            .iter()
            .map(|outputs| {
                outputs
                    .get(index)
                    .map(|t| &**t)
                    .ok_or_else(|| backend(format!("missing model output #{}", index)))
            })
            .collect::<ModelResult<Vec<&Tensor>>>()?;
        gather(&tensors)
    }
}

/// Concatène les sorties de chaque enregistrement sur l'axe 0.
fn gather(tensors: &[&Tensor]) -> ModelResult<NativeValue> {
    let dt = match tensors.first() {
        Some(t) => t.datum_type(),
        None => return Ok(NativeValue::Sequence(Vec::new())),
    };
    if dt == String::datum_type() {
        let mut labels = Vec::new();
        for t in tensors {
            let view = t.to_array_view::<String>().map_err(backend)?;
            labels.extend(view.iter().cloned().map(NativeValue::Str));
        }
        return Ok(NativeValue::Series(labels));
    }
    if dt == bool::datum_type() {
        return stacked::<bool>(tensors).map(NativeValue::BoolArray);
    }
    if dt.is_integer() {
        return stacked::<i64>(tensors).map(NativeValue::IntArray);
    }
    stacked::<f64>(tensors).map(NativeValue::FloatArray)
}

fn stacked<T: Datum + Clone>(tensors: &[&Tensor]) -> ModelResult<ArrayD<T>> {
    let mut rows = 0;
    let mut inner: Option<Vec<usize>> = None;
    let mut values = Vec::new();
    for t in tensors {
        let cast = t.cast_to::<T>().map_err(backend)?;
        let view = cast.to_array_view::<T>().map_err(backend)?;
        let (lead, rest) = match view.shape().split_first() {
            Some((lead, rest)) => (*lead, rest.to_vec()),
            None => (1, Vec::new()),
        };
        match &inner {
            Some(expected) if *expected != rest => {
                return Err(backend(format!(
                    "inconsistent output shapes {:?} and {:?}",
                    expected, rest
                )))
            }
            Some(_) => {}
            None => inner = Some(rest),
        }
        rows += lead;
        values.extend(view.iter().cloned());
    }
    let mut shape = vec![rows];
    shape.extend(inner.unwrap_or_default());
    ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(backend)
}

/// `[n, 1]` devient `[n]` : une prédiction par enregistrement.
fn squeeze_column(value: NativeValue) -> NativeValue {
    fn squeeze<T>(a: ArrayD<T>) -> ArrayD<T> {
        if a.ndim() == 2 && a.shape()[1] == 1 {
            a.index_axis_move(Axis(1), 0)
        } else {
            a
        }
    }
    match value {
        NativeValue::IntArray(a) => NativeValue::IntArray(squeeze(a)),
        NativeValue::FloatArray(a) => NativeValue::FloatArray(squeeze(a)),
        NativeValue::BoolArray(a) => NativeValue::BoolArray(squeeze(a)),
        other => other,
    }
}

impl Model for OnnxModel {
    fn predict(&self, records: &[FeatureRecord]) -> ModelResult<NativeValue> {
        self.output(records, 0).map(squeeze_column)
    }

    fn predict_proba(&self, records: &[FeatureRecord]) -> Option<NativeValue> {
        if self.output_count < 2 {
            return None;
        }
        self.output(records, 1)
            .map_err(|e| debug!("predict_proba indisponible: {}", e))
            .ok()
    }

    fn is_concurrent_safe(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
