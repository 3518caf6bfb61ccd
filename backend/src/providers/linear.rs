use std::path::Path;

use anyhow::Context;
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1, Axis};
use serde::Deserialize;
use serde_json::Value;

use super::feature_matrix;
use crate::codec::NativeValue;
use crate::error::{ModelError, ModelResult};
use crate::inference::Model;
use crate::models::FeatureRecord;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Classification,
    Regression,
}

/// Fichier de poids exporté, tel que lu sur disque.
#[derive(Debug, Deserialize)]
struct LinearDefinition {
    task: Task,
    features: Vec<String>,
    #[serde(default)]
    classes: Vec<Value>,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

/// Modèle linéaire (régression ou classification multi-classes).
///
/// Une ligne de coefficients par classe ; une seule ligne pour une
/// classification binaire (sigmoïde) ou une régression.
#[derive(Debug)]
pub struct LinearModel {
    task: Task,
    features: Vec<String>,
    classes: Vec<Value>,
    weights: Array2<f64>,
    intercepts: Array1<f64>,
}

impl LinearModel {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Lecture du modèle {}", path.display()))?;
        let definition: LinearDefinition = serde_json::from_str(&raw)
            .with_context(|| format!("Modèle invalide {}", path.display()))?;
        Ok(Self::from_definition(definition)?)
    }

    fn from_definition(def: LinearDefinition) -> ModelResult<Self> {
        let invalid = |msg: String| Err(ModelError::InvalidDefinition(msg));
        let rows = def.coefficients.len();
        let width = def.features.len();

        if rows == 0 {
            return invalid("no coefficients".into());
        }
        if def.intercepts.len() != rows {
            return invalid(format!(
                "{} intercepts for {} coefficient rows",
                def.intercepts.len(),
                rows
            ));
        }
        if let Some(bad) = def.coefficients.iter().position(|r| r.len() != width) {
            return invalid(format!(
                "coefficient row {} has {} values for {} features",
                bad,
                def.coefficients[bad].len(),
                width
            ));
        }
        match def.task {
            Task::Regression if rows != 1 => {
                return invalid("regression expects a single coefficient row".into())
            }
            Task::Classification if def.classes.len() < 2 => {
                return invalid("classification expects at least two classes".into())
            }
            Task::Classification
                if rows != def.classes.len() && !(rows == 1 && def.classes.len() == 2) =>
            {
                return invalid(format!(
                    "{} coefficient rows for {} classes",
                    rows,
                    def.classes.len()
                ))
            }
            _ => {}
        }

        let flat: Vec<f64> = def.coefficients.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((rows, width), flat)
            .map_err(|e| ModelError::InvalidDefinition(e.to_string()))?;

        Ok(LinearModel {
            task: def.task,
            features: def.features,
            classes: def.classes,
            weights,
            intercepts: Array1::from(def.intercepts),
        })
    }

    #[cfg(test)]
    fn task(&self) -> Task {
        self.task
    }

    /// Scores bruts : `X · Wᵀ + b`, une ligne par enregistrement.
    fn scores(&self, records: &[FeatureRecord]) -> ModelResult<Array2<f64>> {
        let x = feature_matrix(records, &self.features)?;
        Ok(x.dot(&self.weights.t()) + &self.intercepts)
    }

    /// Probabilités par classe, une ligne par enregistrement.
    fn probabilities(&self, records: &[FeatureRecord]) -> ModelResult<Array2<f64>> {
        let mut scores = self.scores(records)?;
        if scores.ncols() == 1 {
            let positive = scores.column(0).mapv(sigmoid);
            let negative = positive.mapv(|p| 1.0 - p);
            return ndarray::stack(Axis(1), &[negative.view(), positive.view()])
                .map_err(|e| ModelError::Backend(e.to_string()));
        }
        for row in scores.rows_mut() {
            softmax_in_place(row);
        }
        Ok(scores)
    }

    fn class_columns(&self) -> Vec<String> {
        self.classes
            .iter()
            .map(|c| match c {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax_in_place(mut row: ArrayViewMut1<'_, f64>) {
    let max = row.fold(f64::NEG_INFINITY, |m, v| m.max(*v));
    row.mapv_inplace(|v| (v - max).exp());
    let total = row.sum();
    row /= total;
}

fn argmax(row: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    for (i, v) in row.iter().enumerate() {
        if *v > row[best] {
            best = i;
        }
    }
    best
}

impl Model for LinearModel {
    fn predict(&self, records: &[FeatureRecord]) -> ModelResult<NativeValue> {
        match self.task {
            Task::Regression => {
                let scores = self.scores(records)?;
                Ok(NativeValue::FloatArray(scores.column(0).to_owned().into_dyn()))
            }
            Task::Classification => {
                let probs = self.probabilities(records)?;
                Ok(NativeValue::Series(
                    probs
                        .rows()
                        .into_iter()
                        .map(|row| NativeValue::from(self.classes[argmax(row)].clone()))
                        .collect(),
                ))
            }
        }
    }

    fn predict_proba(&self, records: &[FeatureRecord]) -> Option<NativeValue> {
        if self.task == Task::Regression {
            return None;
        }
        let probs = match self.probabilities(records) {
            Ok(probs) => probs,
            Err(e) => {
                debug!("predict_proba indisponible: {}", e);
                return None;
            }
        };
        Some(NativeValue::Table {
            columns: self.class_columns(),
            rows: probs
                .rows()
                .into_iter()
                .map(|row| row.iter().map(|p| NativeValue::Float(*p)).collect())
                .collect(),
        })
    }

    fn is_concurrent_safe(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}
