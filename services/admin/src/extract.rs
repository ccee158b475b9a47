//! Request body extraction

use axum::{
    Json, async_trait,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::GateError;
use crate::validation::ValidationError;

/// JSON body whose rejection renders as a `body` validation failure in the
/// response envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct Payload<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Payload(value)),
            Err(rejection) => Err(reject(rejection)),
        }
    }
}

fn reject(rejection: JsonRejection) -> GateError {
    debug!("Rejected request body: {}", rejection.body_text());
    let rule = match rejection {
        JsonRejection::MissingJsonContentType(_) => "content_type",
        _ => "format",
    };
    ValidationError::new("body", rule).into()
}
