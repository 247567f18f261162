//! User authorization handler

use crate::auth::KoreaderAuth;
use crate::protocol::{AuthorizedResponse, KoJson};

/// GET /users/auth - Confirm the client's credentials
///
/// All the work happens in the [`KoreaderAuth`] extractor; reaching the body
/// means the headers verified.
#[utoipa::path(
    get,
    path = "/sync/users/auth",
    tag = "Users",
    params(
        ("x-auth-user" = String, Header, description = "Sync username"),
        ("x-auth-key" = String, Header, description = "MD5 of the user's password")
    ),
    responses(
        (status = 200, description = "Credentials accepted", body = AuthorizedResponse,
            content_type = "application/vnd.koreader.v1+json"),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
pub async fn authorize(auth: KoreaderAuth) -> KoJson<AuthorizedResponse> {
    tracing::debug!(owner = auth.user.id, "Client authorized");
    KoJson(AuthorizedResponse {
        authorized: "OK".to_string(),
    })
}
