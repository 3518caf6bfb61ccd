use std::path::Path;
use std::sync::Mutex;

use log::{debug, info};

use crate::codec::NativeValue;
use crate::error::{ModelError, ModelResult};
use crate::models::FeatureRecord;
use crate::providers::{linear::LinearModel, onnx::OnnxModel};

/// Fournisseur de modèle chargé une seule fois au démarrage.
pub trait Model: Send + Sync {
    fn predict(&self, records: &[FeatureRecord]) -> ModelResult<NativeValue>;

    /// Probabilités par classe, `None` si le modèle ne les fournit pas
    /// (ou n'a pas pu les calculer pour ces enregistrements).
    fn predict_proba(&self, _records: &[FeatureRecord]) -> Option<NativeValue> {
        None
    }

    /// `true` si `predict`/`predict_proba` peuvent être appelés en parallèle.
    fn is_concurrent_safe(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// Sorties brutes d'un appel au modèle.
#[derive(Debug)]
pub struct Inference {
    pub predictions: NativeValue,
    pub probabilities: Option<NativeValue>,
}

/// Handle partagé (via `Arc`) sur le modèle, immuable après chargement.
pub struct ModelHandle {
    model: Box<dyn Model>,
    lock: Option<Mutex<()>>,
}

impl ModelHandle {
    pub fn new(model: Box<dyn Model>) -> Self {
        let lock = if model.is_concurrent_safe() {
            None
        } else {
            Some(Mutex::new(()))
        };
        ModelHandle { model, lock }
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    pub fn is_serialized(&self) -> bool {
        self.lock.is_some()
    }

    /// Appelle `predict` puis `predict_proba`, sans jamais réessayer.
    pub fn run(&self, records: &[FeatureRecord]) -> ModelResult<Inference> {
        let _guard = match &self.lock {
            Some(lock) => Some(lock.lock().map_err(|_| ModelError::LockPoisoned)?),
            None => None,
        };

        let predictions = self.model.predict(records)?;
        let probabilities = self.model.predict_proba(records);
        if probabilities.is_none() {
            debug!("Probabilités indisponibles pour {}", self.model.name());
        }

        Ok(Inference {
            predictions,
            probabilities,
        })
    }
}

/// Charge le modèle depuis le disque, selon l'extension du fichier.
pub fn load_model<P: AsRef<Path>>(path: P) -> anyhow::Result<ModelHandle> {
    let path = path.as_ref();
    let model: Box<dyn Model> = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Box::new(LinearModel::load(path)?),
        Some("onnx") => Box::new(OnnxModel::load(path)?),
        _ => anyhow::bail!("Format de modèle non supporté: {}", path.display()),
    };

    let handle = ModelHandle::new(model);
    info!(
        "Modèle {} chargé depuis {} (appels sérialisés: {})",
        handle.model_name(),
        path.display(),
        handle.is_serialized()
    );
    Ok(handle)
}
