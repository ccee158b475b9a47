//! The request gate: rate limiting, language, audit, authentication and
//! authorization, each as a `from_fn_with_state` layer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    AppState,
    audit::should_skip,
    error::{ErrorReport, GateError, GateResult, TokenError},
    i18n::Lang,
    jwt::find_token,
    models::{Admin, NewOperationLog},
};

/// The authenticated admin, inserted into request extensions
#[derive(Debug, Clone)]
pub struct CurrentAdmin(pub Admin);

/// Username the audit row is attributed to, set on the response by
/// [`authenticate`]
#[derive(Debug, Clone)]
pub struct AuditIdentity(pub String);

/// Token bucket in front of everything else
pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if state.rate_limiter.try_acquire().await {
        return next.run(req).await;
    }

    debug!("Rate limited {} {}", req.method(), req.uri().path());
    let lang = Lang::negotiate(req.uri(), req.headers());
    ErrorReport(Arc::new(GateError::RateLimited)).render(lang)
}

/// Pick the response language and re-render failures in it
pub async fn negotiate_lang(mut req: Request<Body>, next: Next) -> Response {
    let lang = Lang::negotiate(req.uri(), req.headers());
    req.extensions_mut().insert(lang);

    let response = next.run(req).await;
    if lang == Lang::default() {
        return response;
    }
    ErrorReport::localize(response, lang)
}

/// Record one operation-log row per routed request
pub async fn audit(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if req.extensions().get::<MatchedPath>().is_none() {
        return next.run(req).await;
    }
    let path = route_template(&state, &req);
    if should_skip(&path) || should_skip(req.uri().path()) {
        return next.run(req).await;
    }

    let lang = req.extensions().get::<Lang>().copied().unwrap_or_default();
    let method = req.method().to_string();
    let ip = client_ip(&req);
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let start_time = Utc::now();
    let started = Instant::now();

    let response = next.run(req).await;

    let username = response
        .extensions()
        .get::<AuditIdentity>()
        .map(|identity| identity.0.clone())
        .unwrap_or_else(|| lang.not_logged_in().to_string());

    state.audit.emit(NewOperationLog {
        username,
        ip,
        method,
        path,
        desc: String::new(),
        status: i32::from(response.status().as_u16()),
        start_time,
        time_cost: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
        user_agent,
    });

    response
}

/// Resolve the bearer token into the current admin
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = find_token(
        req.headers(),
        req.uri(),
        req.method(),
        state.config.jwt.strict_token_lookup,
    );
    let admin = match resolve_admin(&state, token).await {
        Ok(admin) => admin,
        Err(err) => {
            debug!("Authentication failed for {}: {}", req.uri().path(), err);
            return unauthorized(&state, err);
        }
    };

    let identity = AuditIdentity(admin.username.clone());
    if !admin.is_active() {
        warn!("Disabled admin {} presented a valid token", admin.username);
        let mut response = GateError::UserDisabled.into_response();
        response.extensions_mut().insert(identity);
        return response;
    }

    req.extensions_mut().insert(CurrentAdmin(admin));
    let mut response = next.run(req).await;
    response.extensions_mut().insert(identity);
    response
}

async fn resolve_admin(state: &AppState, token: Option<String>) -> GateResult<Admin> {
    let token = token.ok_or(TokenError::Missing)?;
    let claims = state.auth.issuer().parse(&token)?;
    state.auth.current(&claims).await
}

/// Check `(role keyword, route pattern, method)` against the policy set
pub async fn authorize(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let Some(CurrentAdmin(admin)) = req.extensions().get::<CurrentAdmin>().cloned() else {
        return unauthorized(&state, TokenError::Missing.into());
    };

    let object = route_template(&state, &req);
    let action = req.method().as_str().to_string();
    if state.enforcer.check_admin(&admin, &object, &action).await {
        return next.run(req).await;
    }

    warn!("Admin {} denied {} {}", admin.username, action, object);
    GateError::Forbidden.into_response()
}

/// Render an error, adding the `WWW-Authenticate` challenge on 401
pub fn unauthorized(state: &AppState, err: GateError) -> Response {
    let mut response = err.into_response();
    if response.status() == StatusCode::UNAUTHORIZED {
        let challenge = format!("JWT realm=\"{}\"", state.config.jwt.realm);
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
    }
    response
}

/// Matched route pattern relative to the URL prefix; this is both the
/// policy object and the audited path
fn route_template(state: &AppState, req: &Request<Body>) -> String {
    let matched = req
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or_else(|| req.uri().path());
    let prefix = state.config.system.path_prefix();
    match matched.strip_prefix(prefix.as_str()) {
        Some(rest) if !prefix.is_empty() && rest.starts_with('/') => rest.to_string(),
        _ => matched.to_string(),
    }
}

/// Peer address, else the first forwarded address
fn client_ip(req: &Request<Body>) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    let headers = req.headers();
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
        })
        .map(|ip| ip.trim().to_string())
        .unwrap_or_default()
}
