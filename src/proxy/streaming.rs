//! Streaming response handling (SSE)

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::time::Instant;

/// Counts what went through the pipe and logs it when the pipe is dropped
struct StreamTally {
    chunks: usize,
    bytes: usize,
    completed: bool,
    start: Instant,
    span: tracing::Span,
}

impl StreamTally {
    fn new() -> Self {
        Self {
            chunks: 0,
            bytes: 0,
            completed: false,
            start: Instant::now(),
            span: tracing::Span::current(),
        }
    }

    fn record(&mut self, chunk: &Bytes) {
        self.chunks += 1;
        self.bytes += chunk.len();
    }
}

impl Drop for StreamTally {
    fn drop(&mut self) {
        let _enter = self.span.enter();
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        if self.completed {
            tracing::info!(
                chunks = self.chunks,
                bytes = self.bytes,
                elapsed_ms,
                "Completion stream finished"
            );
        } else {
            tracing::warn!(
                chunks = self.chunks,
                bytes = self.bytes,
                elapsed_ms,
                "Completion stream closed before upstream finished"
            );
        }
    }
}

/// Wrap an upstream byte stream so chunks pass through untouched and are tallied
///
/// Dropping the returned stream drops `upstream` with it.
fn tally_stream<S, E>(upstream: S) -> impl Stream<Item = Result<Bytes, E>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let upstream = Box::pin(upstream);

    stream::unfold(
        (upstream, StreamTally::new()),
        |(mut upstream, mut tally)| async move {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    tracing::trace!(
                        "SSE chunk ({} bytes): {:?}",
                        chunk.len(),
                        String::from_utf8_lossy(&chunk)
                    );
                    tally.record(&chunk);
                    Some((Ok(chunk), (upstream, tally)))
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Error reading completion stream chunk");
                    Some((Err(e), (upstream, tally)))
                }
                None => {
                    tally.completed = true;
                    None
                }
            }
        },
    )
}

/// Pipe a successful upstream completion straight to the caller as `text/event-stream`
pub fn forward_event_stream(upstream: reqwest::Response) -> Response {
    tracing::debug!(
        upstream_content_type = ?upstream.headers().get(header::CONTENT_TYPE),
        "Forwarding completion stream"
    );

    let body = Body::from_stream(tally_stream(upstream.bytes_stream()));

    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}
