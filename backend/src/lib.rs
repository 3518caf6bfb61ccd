//! Serveur d'inférence : `POST /predict` sur un modèle chargé une seule fois.
//!
//! Requête HTTP -> [`normalizer`] -> [`inference::ModelHandle`] -> [`codec`] -> réponse JSON.

pub mod codec;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod normalizer;
pub mod providers;
pub mod routes;

pub use config::ServerConfig;
pub use inference::{load_model, Model, ModelHandle};
pub use routes::create_app;
