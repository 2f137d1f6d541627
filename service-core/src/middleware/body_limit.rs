use crate::error::AppError;
use axum::{
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::Response,
};

/// Rejects oversized request bodies before any body processing happens.
///
/// POST bodies must announce their size: a missing Content-Length on a
/// chunked transfer is refused outright, since the limit could not be
/// enforced without buffering the stream.
pub async fn body_size_limit_middleware(
    State(max_bytes): State<u64>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if request.method() == Method::POST {
        let content_length = request
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        match content_length {
            Some(length) if length > max_bytes => {
                tracing::warn!(length, max_bytes, "Request body exceeds size limit");
                return Err(AppError::NotAcceptable(
                    "Request body too large".to_string(),
                ));
            }
            None => {
                tracing::warn!("POST request without Content-Length rejected");
                return Err(AppError::NotAcceptable(
                    "Content-Length is required".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(next.run(request).await)
}
