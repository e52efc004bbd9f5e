//! Request/response envelope shared by every JSON endpoint.
//!
//! Responses are always `{ "error": bool, "message": string, "data"?: any }`.
//! Requests are read through [`JsonBody`], which caps the body at
//! [`MAX_BODY_BYTES`] before any parsing and accepts exactly one JSON value.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequest, Request},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

/// 1 MiB.
pub const MAX_BODY_BYTES: usize = 1_048_576;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("body must not be larger than {limit} bytes")]
    TooLarge { limit: usize },
    #[error("body must not be empty")]
    Empty,
    #[error("body must have a single JSON value")]
    MultipleValues,
    #[error("body contains badly-formed JSON: {0}")]
    Malformed(String),
    #[error("failed to read request body: {0}")]
    Read(String),
}

impl IntoResponse for EnvelopeError {
    fn into_response(self) -> Response {
        debug!(error = %self, "request body rejected");
        error_json(self.to_string(), None).into_response()
    }
}

/// Decodes exactly one JSON value of type `T` from `bytes`.
pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EnvelopeError> {
    if bytes.len() > MAX_BODY_BYTES {
        return Err(EnvelopeError::TooLarge {
            limit: MAX_BODY_BYTES,
        });
    }
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(EnvelopeError::Empty);
    }

    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = T::deserialize(&mut de).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    de.end().map_err(|_| EnvelopeError::MultipleValues)?;
    Ok(value)
}

/// JSON extractor enforcing the body cap and single-value rule.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = EnvelopeError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let declared = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > MAX_BODY_BYTES) {
            return Err(EnvelopeError::TooLarge {
                limit: MAX_BODY_BYTES,
            });
        }

        let bytes = read_limited(req.into_body()).await?;
        decode_body(&bytes).map(JsonBody)
    }
}

async fn read_limited(body: Body) -> Result<bytes::Bytes, EnvelopeError> {
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(EnvelopeError::TooLarge {
            limit: MAX_BODY_BYTES,
        }),
        Err(e) => Err(EnvelopeError::Read(e.to_string())),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub error: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            error: false,
            message: message.into(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            data: None,
        }
    }
}

/// An envelope plus status code and any extra headers to merge in.
#[derive(Debug)]
pub struct JsonResponse<T> {
    status: StatusCode,
    headers: HeaderMap,
    body: Envelope<T>,
}

impl<T> JsonResponse<T> {
    pub fn new(status: StatusCode, body: Envelope<T>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Merges `headers` into the response. A name present in both keeps the
    /// values from `headers`. `Content-Type` is always `application/json`.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }
}

impl<T: Serialize> IntoResponse for JsonResponse<T> {
    fn into_response(self) -> Response {
        let out = match serde_json::to_vec(&self.body) {
            Ok(out) => out,
            Err(e) => {
                error!(error = %e, "failed to encode response envelope");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let mut res = (self.status, out).into_response();
        res.headers_mut().extend(self.headers);
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        res
    }
}

/// Writes `envelope` with `status`, merging any extra `headers`.
pub fn write_json<T>(
    status: StatusCode,
    envelope: Envelope<T>,
    headers: Option<HeaderMap>,
) -> JsonResponse<T> {
    let res = JsonResponse::new(status, envelope);
    match headers {
        Some(headers) => res.with_headers(headers),
        None => res,
    }
}

/// 200 success envelope.
pub fn success_json<T>(message: impl Into<String>, data: Option<T>) -> JsonResponse<T> {
    write_json(StatusCode::OK, Envelope::success(message, data), None)
}

/// Error envelope; `status` defaults to 400.
pub fn error_json(message: impl Into<String>, status: Option<StatusCode>) -> JsonResponse<()> {
    write_json(
        status.unwrap_or(StatusCode::BAD_REQUEST),
        Envelope::failure(message),
        None,
    )
}
