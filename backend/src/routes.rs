use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::Method;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpRequest, HttpResponse};
use futures::StreamExt;
use log::{error, info, warn};
use serde_json::Value;

use crate::codec::{shape_prediction, to_json};
use crate::error::ApiError;
use crate::inference::ModelHandle;
use crate::models::{ApiResponse, PredictResponse};
use crate::normalizer::normalize;

/// Taille maximale du corps de `POST /predict`, en octets.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimit(pub usize);

/// Application complète : routes, en-têtes CORS, logs et limite de taille du corps.
pub fn create_app(
    model: Arc<ModelHandle>,
    max_payload_bytes: usize,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .wrap(Logger::default())
        .wrap(
            DefaultHeaders::new()
                .add(("Access-Control-Allow-Origin", "*"))
                .add(("Access-Control-Allow-Methods", "POST, OPTIONS, GET"))
                .add(("Access-Control-Allow-Headers", "Content-Type"))
                .add(("X-Content-Type-Options", "nosniff")),
        )
        .app_data(web::Data::new(model))
        .app_data(web::Data::new(BodyLimit(max_payload_bytes)))
        .service(
            web::resource("/health")
                .route(web::get().to(health_check))
                .default_service(web::to(fallback)),
        )
        .service(
            web::resource("/predict")
                .route(web::post().to(predict))
                .default_service(web::to(fallback)),
        )
        .default_service(web::to(fallback))
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success())
}

// Préflight CORS sur n'importe quel chemin, 404 sinon
async fn fallback(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    if req.method() == Method::OPTIONS {
        Ok(HttpResponse::Ok().json(ApiResponse::success()))
    } else {
        Err(ApiError::NotFound)
    }
}

// Lecture du corps en flux, bornée à `limit` octets
async fn read_body(mut payload: web::Payload, limit: usize) -> Result<web::BytesMut, ApiError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

async fn predict(
    model: web::Data<Arc<ModelHandle>>,
    limit: web::Data<BodyLimit>,
    payload: web::Payload,
) -> Result<HttpResponse, ApiError> {
    let result = async {
        let body = read_body(payload, limit.0).await?;
        run_prediction(model, &body).await
    }
    .await;
    match &result {
        Err(e @ (ApiError::InvalidRequest(_) | ApiError::PayloadTooLarge(_))) => {
            warn!("Requête rejetée: {}", e)
        }
        Err(e) => error!("Erreur de prédiction: {}", e),
        Ok(_) => {}
    }
    result
}

async fn run_prediction(
    model: web::Data<Arc<ModelHandle>>,
    body: &[u8],
) -> Result<HttpResponse, ApiError> {
    let batch = normalize(body)?;
    if batch.is_empty() {
        return Ok(HttpResponse::Ok().json(PredictResponse::new(Value::Array(Vec::new()), None)));
    }

    let model_clone = model.clone();
    let (batch, inference) = web::block(move || {
        let inference = model_clone.run(batch.records());
        (batch, inference)
    })
    .await
    .map_err(|e| ApiError::ModelInvocation(format!("Erreur d'exécution: {}", e)))?;
    let inference = inference?;

    let prediction = to_json(shape_prediction(inference.predictions, &batch)?)?;
    let probabilities = inference.probabilities.map(to_json).transpose()?;

    info!(
        "Prédiction réussie: {} enregistrement(s), probabilités: {}",
        batch.len(),
        probabilities.is_some()
    );
    Ok(HttpResponse::Ok().json(PredictResponse::new(prediction, probabilities)))
}
