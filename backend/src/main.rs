use actix_web::HttpServer;
use log::{error, info};
use std::sync::Arc;

use predict_server::{create_app, load_model, ServerConfig};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    info!("🚀 Démarrage du serveur de prédiction");

    let config = ServerConfig::from_env();

    // Chargé une seule fois, jamais rechargé
    let model = match load_model(&config.model_path) {
        Ok(model) => Arc::new(model),
        Err(e) => {
            error!("❌ Impossible de charger le modèle {}: {:#}", config.model_path, e);
            return Err(e);
        }
    };
    info!("✅ Modèle {} prêt", model.model_name());

    let bind_address = config.bind_address();
    let max_payload_bytes = config.max_payload_bytes;

    info!("🌐 Serveur démarré sur: http://{}", bind_address);
    info!("👷 Workers: {}", config.workers);
    info!("🔧 Endpoints API:");
    info!("   GET     /health   - Vérification santé");
    info!("   POST    /predict  - Prédiction (features | data)");
    info!("   OPTIONS *         - Préflight CORS");

    HttpServer::new(move || create_app(model.clone(), max_payload_bytes))
        .workers(config.workers)
        .bind(&bind_address)?
        .run()
        .await?;

    Ok(())
}
