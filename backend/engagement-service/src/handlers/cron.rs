//! Reconciliation trigger, called by an external scheduler on a fixed interval

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use std::sync::Arc;

use crate::error::CronError;
use crate::services::{CounterReconciler, ReconcileReport};

/// State shared by the cron routes
pub struct CronState {
    pub reconciler: Arc<CounterReconciler>,
    /// `None` means the deployment is missing `CRON_SECRET`
    pub secret: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncStats {
    likes_synced: u64,
    views_synced: u64,
    like_keys_found: u64,
    view_keys_found: u64,
    failed_batches: u64,
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    success: bool,
    duration: String,
    stats: SyncStats,
    timestamp: String,
}

impl From<&ReconcileReport> for SyncResponse {
    fn from(report: &ReconcileReport) -> Self {
        Self {
            success: true,
            duration: format!("{}ms", report.duration.as_millis()),
            stats: SyncStats {
                likes_synced: report.likes.rows_synced,
                views_synced: report.views.rows_synced,
                like_keys_found: report.likes.keys_found,
                view_keys_found: report.views.keys_found,
                failed_batches: report.likes.failed_batches + report.views.failed_batches,
            },
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Check the bearer token against the configured secret before anything else runs.
/// Plain string comparison, matching what the scheduler sends.
fn authorize(req: &HttpRequest, secret: Option<&str>) -> Result<(), CronError> {
    let Some(secret) = secret else {
        tracing::error!("CRON_SECRET is not configured, refusing to run counter sync");
        return Err(CronError::ServerMisconfigured);
    };

    let provided = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok());

    if provided != Some(format!("Bearer {}", secret).as_str()) {
        let peer = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        tracing::warn!(
            peer = %peer,
            has_header = provided.is_some(),
            "Unauthorized counter sync attempt"
        );
        return Err(CronError::Unauthorized);
    }

    Ok(())
}

/// GET|POST /api/cron/sync-counters
pub async fn sync_counters(
    req: HttpRequest,
    state: web::Data<CronState>,
) -> Result<HttpResponse, CronError> {
    authorize(&req, state.secret.as_deref())?;

    tracing::info!("Counter sync triggered");
    let report = state.reconciler.run().await.map_err(|e| {
        tracing::error!(error = %e, "Counter sync failed");
        CronError::Job(e)
    })?;

    Ok(HttpResponse::Ok().json(SyncResponse::from(&report)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/cron/sync-counters")
            .route(web::get().to(sync_counters))
            .route(web::post().to(sync_counters)),
    );
}
