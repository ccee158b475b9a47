//! Public session routes: login, logout and token refresh

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    routing::post,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::info;

use crate::{
    AppState,
    error::{GateError, GateResult, TokenError},
    extract::Payload,
    jwt::{IssuedToken, find_token},
    middleware::unauthorized,
    models::LoginCredentials,
    response::Envelope,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/base/login", post(login))
        .route("/base/logout", post(logout))
        .route("/base/refreshToken", post(refresh_token))
}

/// Exchange credentials for a token
pub async fn login(
    State(state): State<AppState>,
    Payload(payload): Payload<LoginCredentials>,
) -> GateResult<Envelope<IssuedToken>> {
    info!("Login attempt for user: {}", payload.username);
    let issued = state.auth.login(&payload).await?;
    Ok(Envelope::success(issued))
}

/// Tokens are stateless; logout only clears the `jwt` cookie
pub async fn logout(jar: CookieJar) -> (CookieJar, Envelope<()>) {
    (jar.remove(Cookie::from("jwt")), Envelope::empty())
}

/// Mint a new token from one still inside its refresh window
pub async fn refresh_token(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let strict = state.config.jwt.strict_token_lookup;
    let refreshed = find_token(&headers, &uri, &method, strict)
        .ok_or_else(|| GateError::from(TokenError::Missing))
        .and_then(|token| state.auth.refresh(&token));

    match refreshed {
        Ok(issued) => Envelope::success(issued).into_response(),
        Err(err) => unauthorized(&state, err),
    }
}
