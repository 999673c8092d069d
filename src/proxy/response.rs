use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use tokio_util::io::ReaderStream;
use tracing::{error, warn};

use crate::error::{Error, ErrorKind};
use crate::repack::{ArchiveHandle, Staging};

const TEXT: &str = "text/plain; charset=utf-8";
const JSON: &str = "application/json";
const ZIP: &str = "application/zip";

/// Responds with plain text
pub fn respond_text(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(TEXT))],
        body.into(),
    )
        .into_response()
}

/// Responds with JSON content
pub fn respond_json(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(JSON))],
        body,
    )
        .into_response()
}

/// Streams a finished module archive. The staging directory lives as long as
/// the body does.
pub fn respond_archive(handle: ArchiveHandle, last_modified: DateTime<Utc>) -> Response {
    let ArchiveHandle {
        file, len, staging, ..
    } = handle;
    let stream = ArchiveStream {
        inner: ReaderStream::new(tokio::fs::File::from_std(file)),
        _staging: staging,
    };

    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ZIP));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    match HeaderValue::from_str(&http_date(last_modified)) {
        Ok(value) => {
            headers.insert(header::LAST_MODIFIED, value);
        }
        Err(err) => warn!(error = %err, "unrepresentable Last-Modified value"),
    }
    response
}

/// RFC 7231 IMF-fixdate.
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

struct ArchiveStream {
    inner: ReaderStream<tokio::fs::File>,
    _staging: Staging,
}

impl Stream for ArchiveStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// A failed request step and the error behind it.
#[derive(Debug)]
pub struct Failure {
    pub what: &'static str,
    pub error: Error,
}

impl Failure {
    /// Wraps errors from `what` for use with `map_err`.
    pub fn at(what: &'static str) -> impl FnOnce(Error) -> Failure {
        move |error| Failure { what, error }
    }

    pub fn status(&self) -> StatusCode {
        match self.error.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Transient | ErrorKind::Integrity | ErrorKind::Decode => {
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::Io | ErrorKind::Archive => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Logs the failure and renders the one line error body. Without
    /// `expose`, the body carries only the failing step.
    pub fn into_response(self, expose: bool) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(what = self.what, error = %self.error, status = status.as_u16(), "request step failed");
        } else {
            warn!(what = self.what, error = %self.error, status = status.as_u16(), "request step failed");
        }

        let body = if expose {
            format!("{}: {}\n", self.what, self.error)
        } else {
            format!("{}\n", self.what)
        };
        respond_text(status, body)
    }
}
