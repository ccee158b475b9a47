//! JSON response envelope `{code, message, data}`

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Uniform body for every gate response
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    /// Success without payload: `data: null`
    pub fn empty() -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: None,
        }
    }

    pub fn failure(code: u16, message: String) -> Self {
        Self {
            code,
            message,
            data: None,
        }
    }
}

/// `data` of a paged listing
#[derive(Debug, Serialize)]
pub struct PageData<T: Serialize> {
    pub list: Vec<T>,
    pub total: i64,
}

impl<T: Serialize> PageData<T> {
    pub fn new((list, total): (Vec<T>, i64)) -> Self {
        Self { list, total }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_success_carries_null_data() {
        let body = serde_json::to_value(Envelope::empty()).unwrap();
        assert_eq!(body, json!({"code": 200, "message": "success", "data": null}));
    }
}
