//! Error kinds surfaced by the gate and their HTTP rendering

use std::sync::Arc;

use axum::{
    http::{StatusCode, header::CONTENT_LENGTH},
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use thiserror::Error;
use tracing::error;

use crate::i18n::{Lang, rule_text};
use crate::rank::RankViolation;
use crate::response::Envelope;
use crate::validation::ValidationError;

/// Bearer token failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token missing")]
    Missing,
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
    #[error("token signature invalid")]
    Signature,
    #[error("refresh window closed")]
    RefreshWindowClosed,
    #[error("token identity no longer exists")]
    UnknownIdentity,
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl TokenError {
    fn zh(&self) -> &'static str {
        match self {
            TokenError::Missing => "缺少token",
            TokenError::Expired => "token已过期",
            TokenError::Malformed => "token格式错误",
            TokenError::Signature => "token签名无效",
            TokenError::RefreshWindowClosed => "token已超过刷新期限",
            TokenError::UnknownIdentity => "token对应的用户不存在",
            TokenError::Encoding(_) => "token生成失败",
        }
    }
}

/// Why a login was refused; logged, never returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoginFailure {
    #[error("user not found")]
    UserNotFound,
    #[error("user disabled")]
    UserDisabled,
    #[error("user has no active role")]
    UserRoleDisabled,
    #[error("password incorrect")]
    PasswordIncorrect,
}

/// Presentation-facing error kind
#[derive(Debug, Error)]
pub enum GateError {
    #[error("rate limited")]
    RateLimited,

    #[error("authentication failed: {0}")]
    Unauthenticated(#[from] TokenError),

    #[error("bad credentials")]
    BadCredentials,

    #[error("user disabled")]
    UserDisabled,

    #[error(transparent)]
    Rank(#[from] RankViolation),

    #[error("permission denied")]
    Forbidden,

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<LoginFailure> for GateError {
    fn from(_: LoginFailure) -> Self {
        GateError::BadCredentials
    }
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GateError::Unauthenticated(TokenError::Encoding(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GateError::Unauthenticated(_) | GateError::BadCredentials => StatusCode::UNAUTHORIZED,
            GateError::UserDisabled | GateError::Forbidden => StatusCode::FORBIDDEN,
            GateError::Rank(_) => StatusCode::BAD_REQUEST,
            GateError::Conflict(_) => StatusCode::CONFLICT,
            GateError::NotFound(_) => StatusCode::NOT_FOUND,
            GateError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GateError::Database(err) if err.is_unique_violation() => StatusCode::CONFLICT,
            GateError::Internal(_) | GateError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body `code`: HTTP status for transport errors, 1001-1010 for business errors
    pub fn code(&self) -> u16 {
        match self {
            GateError::RateLimited => 429,
            GateError::UserDisabled => 1002,
            GateError::BadCredentials => 1003,
            GateError::Unauthenticated(TokenError::Expired) => 1005,
            GateError::Unauthenticated(TokenError::Encoding(_)) => 1009,
            GateError::Unauthenticated(_) => 1004,
            GateError::Forbidden => 1006,
            GateError::NotFound(_) => 1007,
            GateError::Conflict(_) => 1008,
            GateError::Database(err) if err.is_unique_violation() => 1008,
            GateError::Internal(_) | GateError::Database(_) => 1009,
            GateError::Rank(_) => 400,
            GateError::Validation(_) => 422,
        }
    }

    /// Message in the negotiated language; never includes SQL or secrets
    pub fn message(&self, lang: Lang) -> String {
        match (self, lang) {
            (GateError::Unauthenticated(cause), Lang::En) => {
                format!("authentication failed: {cause}")
            }
            (GateError::Unauthenticated(cause), Lang::Zh) => format!("认证失败: {}", cause.zh()),
            (GateError::RateLimited, _) => lang.pick("请求过于频繁", "too many requests").into(),
            (GateError::BadCredentials, _) => lang
                .pick("用户名或密码错误", "incorrect username or password")
                .into(),
            (GateError::UserDisabled, _) => lang.pick("用户已被禁用", "user disabled").into(),
            (GateError::Rank(violation), Lang::En) => violation.to_string(),
            (GateError::Rank(violation), Lang::Zh) => violation.zh().into(),
            (GateError::Forbidden, _) => lang.pick("没有权限", "permission denied").into(),
            (GateError::Conflict(what), Lang::En) => format!("{what} already exists"),
            (GateError::Conflict(what), Lang::Zh) => format!("{}已存在", noun_zh(what)),
            (GateError::NotFound(what), Lang::En) => format!("{what} not found"),
            (GateError::NotFound(what), Lang::Zh) => format!("{}不存在", noun_zh(what)),
            (GateError::Validation(err), _) => {
                format!("{} {}", err.field, rule_text(err.rule, lang))
            }
            (GateError::Database(err), _) if err.is_unique_violation() => {
                lang.pick("记录已存在", "record already exists").into()
            }
            (GateError::Internal(_) | GateError::Database(_), _) => {
                lang.pick("服务器内部错误", "internal server error").into()
            }
        }
    }
}

fn noun_zh(noun: &str) -> &str {
    match noun {
        "admin" => "用户",
        "username" => "用户名",
        "role" => "角色",
        "keyword" => "关键字",
        "menu" => "菜单",
        "api" => "接口",
        "operation log" => "操作日志",
        other => other,
    }
}

/// Response extension carrying the error behind a rendered failure, so
/// outer layers can re-render it in the negotiated language
#[derive(Debug, Clone)]
pub struct ErrorReport(pub Arc<GateError>);

impl ErrorReport {
    pub fn render(&self, lang: Lang) -> Response {
        let body = Envelope::failure(self.0.code(), self.0.message(lang));
        let mut response = (self.0.status(), body).into_response();
        response.extensions_mut().insert(self.clone());
        response
    }

    /// Replace the body of an already rendered failure, keeping its headers
    pub fn localize(response: Response, lang: Lang) -> Response {
        let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
            return response;
        };
        let (mut parts, _) = response.into_parts();
        parts.headers.remove(CONTENT_LENGTH);
        let body = Envelope::failure(report.0.code(), report.0.message(lang));
        (parts, body).into_response()
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }
        ErrorReport(Arc::new(self)).render(Lang::default())
    }
}

/// Type alias for gate results
pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_and_codes() {
        let expired = GateError::from(TokenError::Expired);
        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(expired.code(), 1005);
        assert_eq!(GateError::from(TokenError::Malformed).code(), 1004);
        assert_eq!(GateError::from(LoginFailure::UserRoleDisabled).code(), 1003);
        assert_eq!(GateError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(GateError::Forbidden.code(), 1006);
        assert_eq!(
            GateError::from(RankViolation::CreateAdmin).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GateError::from(DatabaseError::UniqueViolation("admin_username_key".into())).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn login_failures_are_indistinguishable() {
        let messages: Vec<String> = [
            LoginFailure::UserNotFound,
            LoginFailure::UserDisabled,
            LoginFailure::UserRoleDisabled,
            LoginFailure::PasswordIncorrect,
        ]
        .into_iter()
        .map(|cause| GateError::from(cause).message(Lang::En))
        .collect();
        assert!(messages.iter().all(|m| m == "incorrect username or password"));
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = GateError::Internal("relation \"admin\" does not exist".into());
        assert_eq!(err.message(Lang::En), "internal server error");
    }

    #[tokio::test]
    async fn localize_rewrites_body_and_keeps_headers() {
        let mut response = GateError::from(TokenError::Expired).into_response();
        response
            .headers_mut()
            .insert("www-authenticate", "JWT realm=\"test\"".parse().unwrap());

        let localized = ErrorReport::localize(response, Lang::En);
        assert_eq!(localized.status(), StatusCode::UNAUTHORIZED);
        assert!(localized.headers().contains_key("www-authenticate"));
        let body = body_of(localized).await;
        assert_eq!(body["code"], 1005);
        assert_eq!(body["message"], "authentication failed: token expired");
        assert_eq!(body["data"], Value::Null);
    }
}
