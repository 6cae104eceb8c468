use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quillbook_core::{AdmissionError, BatchError, CapacityError, ErrorKind, FieldError};
use quillbook_export::ExportError;
use quillbook_extract::UploadError;
use quillbook_storage::StorageError;
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing or invalid bearer token")]
    Unauthenticated,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("This {0} belongs to another user")]
    NotOwned(&'static str),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl AppError {
    /// `None` only for authentication, which sits outside the domain taxonomy.
    pub fn kind(&self) -> Option<ErrorKind> {
        let kind = match self {
            AppError::Unauthenticated => return None,
            AppError::BadRequest(_)
            | AppError::Multipart(_)
            | AppError::Field(_)
            | AppError::Upload(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::NotOwned(_) => ErrorKind::Authorization,
            AppError::Admission(e) => e.kind(),
            AppError::Batch(e) => e.kind(),
            AppError::Storage(e) => e.kind(),
            AppError::Export(_) => ErrorKind::Internal,
        };
        Some(kind)
    }

    fn capacity(&self) -> Option<&CapacityError> {
        match self {
            AppError::Admission(AdmissionError::Capacity(e))
            | AppError::Storage(StorageError::Capacity(e)) => Some(e),
            _ => None,
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::Subscription => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Capacity => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::External => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let Some(kind) = self.kind() else {
            let body = json!({ "error": "unauthenticated", "message": self.to_string() });
            return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        };

        let mut body = Map::new();
        body.insert("error".into(), json!(kind));
        let mut status = status_for(kind);

        match (&self, kind) {
            (_, ErrorKind::Internal | ErrorKind::External) => {
                tracing::error!(error = %self, "Request failed");
                body.insert("message".into(), Value::from("Internal server error"));
            }
            (AppError::Field(e), _) => {
                status = StatusCode::UNPROCESSABLE_ENTITY;
                body.insert("field".into(), Value::from(e.field.as_str()));
                body.insert("message".into(), Value::from(e.reason.as_str()));
            }
            _ => {
                body.insert("message".into(), Value::from(self.to_string()));
            }
        }

        if let Some(capacity) = self.capacity() {
            body.insert("current_usage".into(), json!(capacity.current_usage));
            body.insert("requested_pages".into(), json!(capacity.requested_pages));
            body.insert("limit".into(), json!(capacity.limit));
        }

        (status, Json(Value::Object(body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillbook_core::{BatchStatus, Field, GatedAction};

    async fn body_of(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn field_errors_name_the_field() {
        let err = AppError::Field(FieldError { field: Field::Date, reason: "Month must be between 1 and 12".into() });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_of(response).await;
        assert_eq!(body["error"], "validation");
        assert_eq!(body["field"], "date");
        assert_eq!(body["message"], "Month must be between 1 and 12");
    }

    #[tokio::test]
    async fn capacity_errors_carry_the_numbers() {
        let err = AppError::Admission(AdmissionError::Capacity(CapacityError {
            current_usage: 1495,
            requested_pages: 10,
            limit: 1500,
        }));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_of(response).await;
        assert_eq!(body["error"], "capacity");
        assert_eq!(body["current_usage"], 1495);
        assert_eq!(body["requested_pages"], 10);
        assert_eq!(body["limit"], 1500);
    }

    #[tokio::test]
    async fn statuses_follow_the_taxonomy() {
        let cases = [
            (AppError::Admission(AdmissionError::SubscriptionInactive), StatusCode::PAYMENT_REQUIRED),
            (AppError::Admission(AdmissionError::AccountNotOwned), StatusCode::FORBIDDEN),
            (AppError::Admission(AdmissionError::FileCount(11)), StatusCode::BAD_REQUEST),
            (
                AppError::Batch(BatchError::NotCompleted {
                    action: GatedAction::Export,
                    status: BatchStatus::Processing,
                }),
                StatusCode::CONFLICT,
            ),
            (AppError::NotFound("batch"), StatusCode::NOT_FOUND),
            (AppError::Unauthenticated, StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn internal_errors_are_opaque() {
        let err = AppError::Storage(StorageError::corrupt("batches", "bad status 'x'"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await;
        assert_eq!(body["message"], "Internal server error");
    }
}
