//! Health check handler

use crate::protocol::{HealthcheckResponse, KoJson};

/// GET /healthcheck - Liveness probe used by the client before syncing
#[utoipa::path(
    get,
    path = "/sync/healthcheck",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up", body = HealthcheckResponse,
            content_type = "application/vnd.koreader.v1+json")
    )
)]
pub async fn healthcheck() -> KoJson<HealthcheckResponse> {
    KoJson(HealthcheckResponse {
        state: "OK".to_string(),
    })
}
