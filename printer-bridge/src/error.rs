//! Bridge errors
//!
//! Every error is answered as `{ "ok": false, "error": "<message>" }`,
//! 404 for unknown routes and 400 for everything else.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pos_printer::{BridgeResponse, PrintError};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Not found")]
    NotFound,

    #[error("Invalid ip")]
    InvalidIp,

    #[error("Invalid port")]
    InvalidPort,

    #[error("Empty data")]
    EmptyData,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Body too large")]
    BodyTooLarge,

    #[error("{0}")]
    BadRequest(String),

    /// The printer could not be reached or did not take the data
    #[error("{0}")]
    Printer(#[from] PrintError),
}

impl BridgeError {
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let BridgeError::Printer(e) = &self {
            warn!(error = %e, "Print job failed");
        }
        (status, Json(BridgeResponse::error(self.to_string()))).into_response()
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(BridgeError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(BridgeError::InvalidIp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            BridgeError::from(PrintError::Timeout("printer".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(BridgeError::InvalidIp.to_string(), "Invalid ip");
        assert_eq!(BridgeError::EmptyData.to_string(), "Empty data");
        assert_eq!(BridgeError::BadRequest("boom".into()).to_string(), "boom");
    }
}
