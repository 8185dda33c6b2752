use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dto::auth::{CredentialsRequest, SessionResponse},
    error::AppError,
    services::auth_service,
    state::SharedState,
};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "tictac_session";

/// Account endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

#[utoipa::path(
    post,
    path = "/signup",
    tag = "auth",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Account created and session opened", body = SessionResponse),
        (status = 400, description = "Username or password rejected by validation"),
        (status = 409, description = "Username already taken"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Create an account and log it in.
pub async fn signup(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CredentialsRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let session = auth_service::signup(&state, payload).await?;
    let cookie = session_cookie(&session);
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(session),
    ))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Session opened", body = SessionResponse),
        (status = 401, description = "Invalid username or password"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Verify credentials and open a session.
pub async fn login(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CredentialsRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let session = auth_service::login(&state, payload).await?;
    let cookie = session_cookie(&session);
    Ok(([(header::SET_COOKIE, cookie)], Json(session)))
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = "auth",
    responses((status = 204, description = "Session closed"))
)]
/// Close the session named by the cookie.
pub async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        auth_service::logout(&state, &token);
    }
    (
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            format!("{SESSION_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0"),
        )],
    )
}

fn session_cookie(session: &SessionResponse) -> String {
    format!(
        "{SESSION_COOKIE}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        session.token, session.expires_in
    )
}

/// Extract the session token from the `Cookie` headers.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_owned())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn finds_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("lang=en; tictac_session=abc123"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn empty_or_missing_cookie_yields_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("tictac_session="));
        assert_eq!(session_token(&headers), None);
    }
}
