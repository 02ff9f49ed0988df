use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::cache::FastCache;
use crate::metrics;
use crate::repository::CounterStore;

pub struct HealthState {
    pub cache: Arc<dyn FastCache>,
    pub store: Arc<dyn CounterStore>,
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Ready only when both backing stores answer
pub async fn ready(state: web::Data<HealthState>) -> HttpResponse {
    let cache = state.cache.ping().await;
    let store = state.store.ping().await;

    match (&cache, &store) {
        (Ok(()), Ok(())) => HttpResponse::Ok().body("READY"),
        _ => {
            tracing::warn!(
                cache_error = ?cache.as_ref().err(),
                store_error = ?store.as_ref().err(),
                "Readiness check failed"
            );
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "cache": cache.is_ok(),
                "database": store.is_ok(),
            }))
        }
    }
}

pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::render() {
        Ok((content_type, body)) => HttpResponse::Ok().content_type(content_type).body(body),
        Err(e) => HttpResponse::InternalServerError().body(format!("error: {}", e)),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/ready", web::get().to(ready))
        .route("/metrics", web::get().to(metrics_endpoint));
}
