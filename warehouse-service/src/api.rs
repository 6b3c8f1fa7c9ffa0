use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::models::{Product, ProductRequest};
use crate::registry::{ClaimGuard, ProductRegistry};
use crate::services::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProductRegistry>,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReserveResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reserved_products: Vec<Product>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_valid: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicted: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExemptResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exempted_products: Vec<Product>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_valid: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicted: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReceivingResponse {
    pub message: String,
    pub count_all_products: i64,
    pub remaining_products: Vec<Product>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/product/reservation", post(reserve_products))
        .route("/product/exemption", delete(exempt_products))
        .route("/storage/products", get(receive_products))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

/// Splits a payload into pattern-valid requests and rejected codes, before
/// any locking or I/O.
fn split_valid(requests: Vec<ProductRequest>) -> (Vec<ProductRequest>, Vec<String>) {
    let mut valid = Vec::with_capacity(requests.len());
    let mut not_valid = Vec::new();
    for request in requests {
        if request.has_valid_code() {
            valid.push(request);
        } else {
            warn!(code = %request.code, "product failed code validation");
            not_valid.push(request.code);
        }
    }
    (valid, not_valid)
}

pub async fn reserve_products(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(requests): Json<Vec<ProductRequest>>,
) -> Result<(StatusCode, Json<ReserveResponse>), (StatusCode, Json<ErrorResponse>)> {
    let (valid, not_valid) = split_valid(requests);
    if valid.is_empty() {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ReserveResponse {
                message: "all products failed code validation".to_string(),
                reserved_products: vec![],
                not_valid,
                conflicted: vec![],
                missing: vec![],
            }),
        ));
    }

    let codes: Vec<String> = valid.iter().map(|p| p.code.clone()).collect();
    let holder = peer.to_string();
    let conflicted = state.registry.try_claim(&codes, &holder);
    if !conflicted.is_empty() {
        warn!(%peer, ?conflicted, "product codes already in use by another caller");
        return Ok((
            StatusCode::CONFLICT,
            Json(ReserveResponse {
                message: "one or more products are already in use by another caller".to_string(),
                reserved_products: vec![],
                not_valid,
                conflicted,
                missing: vec![],
            }),
        ));
    }
    let _claims = ClaimGuard::new(state.registry.clone(), codes);

    match state.orchestrator.reserve(&valid).await {
        Ok(outcome) => {
            let partial = !not_valid.is_empty() || !outcome.missing.is_empty();
            let (status, message) = if partial {
                (StatusCode::MULTI_STATUS, "not all products were reserved")
            } else {
                (StatusCode::OK, "reservation complete")
            };
            Ok((
                status,
                Json(ReserveResponse {
                    message: message.to_string(),
                    reserved_products: outcome.products,
                    not_valid,
                    conflicted: vec![],
                    missing: outcome.missing,
                }),
            ))
        }
        Err(err) => {
            error!(%peer, "reservation failed: {err}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            ))
        }
    }
}

pub async fn exempt_products(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(requests): Json<Vec<ProductRequest>>,
) -> Result<(StatusCode, Json<ExemptResponse>), (StatusCode, Json<ErrorResponse>)> {
    let (valid, not_valid) = split_valid(requests);
    if valid.is_empty() {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ExemptResponse {
                message: "all products failed code validation".to_string(),
                exempted_products: vec![],
                not_valid,
                conflicted: vec![],
                missing: vec![],
            }),
        ));
    }

    let codes: Vec<String> = valid.iter().map(|p| p.code.clone()).collect();
    let holder = peer.to_string();
    let conflicted = state.registry.try_claim(&codes, &holder);
    if !conflicted.is_empty() {
        warn!(%peer, ?conflicted, "product codes already in use by another caller");
        return Ok((
            StatusCode::CONFLICT,
            Json(ExemptResponse {
                message: "one or more products are already in use by another caller".to_string(),
                exempted_products: vec![],
                not_valid,
                conflicted,
                missing: vec![],
            }),
        ));
    }
    let _claims = ClaimGuard::new(state.registry.clone(), codes);

    match state.orchestrator.exempt(&valid).await {
        Ok(outcome) => {
            let partial = !not_valid.is_empty() || !outcome.missing.is_empty();
            let (status, message) = if partial {
                (StatusCode::MULTI_STATUS, "not all products were exempted")
            } else {
                (StatusCode::OK, "exemption complete")
            };
            Ok((
                status,
                Json(ExemptResponse {
                    message: message.to_string(),
                    exempted_products: outcome.products,
                    not_valid,
                    conflicted: vec![],
                    missing: outcome.missing,
                }),
            ))
        }
        Err(err) => {
            error!(%peer, "exemption failed: {err}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReceivingParams {
    pub id: i32,
}

pub async fn receive_products(
    State(state): State<AppState>,
    Query(params): Query<ReceivingParams>,
) -> Result<Json<ReceivingResponse>, (StatusCode, Json<ErrorResponse>)> {
    if params.id < 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "storage id must be a non-negative integer".to_string(),
            }),
        ));
    }

    match state.orchestrator.remaining_on_storage(params.id).await {
        Ok(remaining_products) => {
            let count_all_products = remaining_products.iter().map(|p| i64::from(p.count)).sum();
            Ok(Json(ReceivingResponse {
                message: "remaining products on storage".to_string(),
                count_all_products,
                remaining_products,
            }))
        }
        Err(err) => {
            error!(storage_id = params.id, "receiving report failed: {err}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            ))
        }
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}
