//! Newline-delimited JSON response bodies
//!
//! A producer task pushes complete lines into an [`NdjsonSender`]; the
//! matching [`NdjsonStream`] is returned from the handler and drained by the
//! transport. When the client disconnects, sends start failing and the
//! producer is expected to stop.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Lines buffered between producer and transport before the producer waits
pub const DEFAULT_BUFFER: usize = 32;

/// Create a connected sender / response-body pair
pub fn channel(buffer: usize) -> (NdjsonSender, NdjsonStream) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (NdjsonSender { tx }, NdjsonStream { rx })
}

/// Producer half
#[derive(Debug, Clone)]
pub struct NdjsonSender {
    tx: mpsc::Sender<String>,
}

impl NdjsonSender {
    /// Queue one line. Returns `false` once the receiving side is gone.
    pub async fn send_line(&self, line: String) -> bool {
        self.tx.send(line).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Response half; implements `IntoResponse`
#[derive(Debug)]
pub struct NdjsonStream {
    rx: mpsc::Receiver<String>,
}

impl IntoResponse for NdjsonStream {
    fn into_response(self) -> Response {
        let stream = ReceiverStream::new(self.rx).map(Ok::<_, Infallible>);
        let mut response = (StatusCode::OK, Body::from_stream(stream)).into_response();

        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(NDJSON_CONTENT_TYPE),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        // Disable proxy buffering (nginx) so events arrive as they are produced
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_reach_body_in_order() {
        let (tx, stream) = channel(4);
        tokio::spawn(async move {
            for i in 0..3 {
                assert!(tx.send_line(format!("{{\"n\":{}}}\n", i)).await);
            }
        });

        let response = stream.into_response();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            NDJSON_CONTENT_TYPE
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "{\"n\":0}\n{\"n\":1}\n{\"n\":2}\n"
        );
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_dropped() {
        let (tx, stream) = channel(1);
        drop(stream);
        assert!(tx.is_closed());
        assert!(!tx.send_line("x\n".to_string()).await);
    }
}
