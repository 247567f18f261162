//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 document for the KOReader sync protocol.

use utoipa::OpenApi;

use crate::protocol::{
    AuthorizedResponse, HealthcheckResponse, ProgressResponse, UpdateProgressRequest,
    UpdateProgressResponse,
};

/// KOSync API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "KOSync - Reading Progress Sync API",
        version = "0.1.0",
        description = r#"
## KOReader progress synchronization

Implements the KOReader sync protocol so reading position follows a user
across devices.

- Clients authenticate every request with `x-auth-user` and `x-auth-key`
  (the MD5 of the user's password).
- Documents are identified by a fingerprint the client computes: an MD5 over
  sampled byte ranges of the file, or over its filename.
- Unknown fingerprints are resolved by fingerprinting the user's library.
  Progress is stored even when no document matches.

All responses use `application/vnd.koreader.v1+json; charset=utf-8`.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Users", description = "Credential check"),
        (name = "Progress", description = "Read and write reading progress by document fingerprint"),
        (name = "Health", description = "Service liveness")
    ),
    paths(
        crate::handlers::health::healthcheck,
        crate::handlers::users::authorize,
        crate::handlers::progress::get_progress,
        crate::handlers::progress::update_progress,
    ),
    components(
        schemas(
            AuthorizedResponse,
            HealthcheckResponse,
            ProgressResponse,
            UpdateProgressRequest,
            UpdateProgressResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_protocol_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/sync/healthcheck",
            "/sync/users/auth",
            "/sync/syncs/progress",
            "/sync/syncs/progress/{document}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
