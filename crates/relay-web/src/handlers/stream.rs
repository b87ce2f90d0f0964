//! Streaming invocations
//!
//! One driver task per stream. The backend runs on the dispatcher and pushes
//! chunks into an unbounded channel, so its permit is released as soon as the
//! backend call returns, however slowly the client reads. The driver renders
//! each chunk, assigns it the next event id and forwards it to the client as
//! one NDJSON line. The stream always ends with exactly one final event,
//! preceded by an error event if anything failed.

use relay_backends::{CompletionRequest, SharedBackend};
use relay_core::{Error, InvocationId, ResponseMessage, StreamEmitter, StreamEvent};
use relay_http::ndjson::{self, NdjsonSender, NdjsonStream, DEFAULT_BUFFER};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::registry::RouteSpec;
use crate::state::SharedContext;

/// Spawn the driver and return the response body it feeds
pub(crate) fn start(
    ctx: SharedContext,
    route: Arc<RouteSpec>,
    invocation_id: InvocationId,
    input: Map<String, Value>,
    backend: SharedBackend,
    request: CompletionRequest,
    interval: Duration,
) -> NdjsonStream {
    let (tx, body) = ndjson::channel(DEFAULT_BUFFER);
    let job = StreamJob {
        ctx,
        route,
        input,
        interval,
        emitter: StreamEmitter::new(invocation_id),
    };
    tokio::spawn(job.run(backend, request, tx));
    body
}

/// A stream that failed before the backend produced anything: one error
/// event carrying `message`, then the final event
pub(crate) fn failed(invocation_id: InvocationId, message: String) -> NdjsonStream {
    let (tx, body) = ndjson::channel(2);
    let mut emitter = StreamEmitter::new(invocation_id);
    tokio::spawn(async move {
        let error = emitter.error(message);
        if send(&tx, &error).await {
            send(&tx, &emitter.finish(Vec::new())).await;
        }
    });
    body
}

struct StreamJob {
    ctx: SharedContext,
    route: Arc<RouteSpec>,
    input: Map<String, Value>,
    interval: Duration,
    emitter: StreamEmitter,
}

impl StreamJob {
    async fn run(mut self, backend: SharedBackend, request: CompletionRequest, tx: NdjsonSender) {
        let invocation_id = self.emitter.invocation_id();
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<String>();

        let dispatcher = self.ctx.dispatcher.clone();
        let producer = tokio::spawn(async move {
            dispatcher
                .run(move || {
                    let mut sink = |chunk: String| chunk_tx.send(chunk).is_ok();
                    backend.stream(&request, &mut sink).map_err(Error::from)
                })
                .await
        });

        let mut failure: Option<Error> = None;
        let mut index: u64 = 0;

        while let Some(chunk) = chunk_rx.recv().await {
            if index > 0 && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }

            let vars = json!({"chunk": chunk, "index": index, "input": &self.input});
            let message = match self.ctx.templates.render(&self.route.response_template, vars) {
                Ok(message) => message,
                Err(e) => {
                    failure = Some(e.into());
                    break;
                }
            };

            let event = self
                .emitter
                .data(vec![ResponseMessage::new(message, self.route.message_type)]);
            if !send(&tx, &event).await {
                // Dropping the receiver makes the backend's sink report closure
                debug!(invocation_id = %invocation_id, "Client disconnected, stopping stream");
                return;
            }
            index += 1;
        }
        drop(chunk_rx);

        let outcome = match producer.await {
            Ok(outcome) => outcome,
            Err(e) => Err(Error::internal(format!("stream producer failed: {}", e))),
        };
        if failure.is_none() {
            failure = outcome.err();
        }

        if let Some(err) = failure {
            let detail = self.ctx.redactor.redact(&err.to_string());
            error!(
                invocation_id = %invocation_id,
                route = %self.route.path(),
                kind = err.kind(),
                events = self.emitter.emitted(),
                "Stream failed: {}",
                detail
            );

            let message = match (&err, &self.route.fallback_message) {
                (Error::Backend(_), Some(fallback)) => fallback.clone(),
                _ => detail,
            };
            let event = self.emitter.error(message);
            if !send(&tx, &event).await {
                return;
            }
        }

        let events = self.emitter.emitted() + 1;
        let last = self.emitter.finish(Vec::new());
        if send(&tx, &last).await {
            debug!(
                invocation_id = %invocation_id,
                route = %self.route.path(),
                events,
                "Stream finished"
            );
        }
    }
}

async fn send(tx: &NdjsonSender, event: &StreamEvent) -> bool {
    match event.to_line() {
        Ok(line) => tx.send_line(line).await,
        Err(e) => {
            error!("Failed to serialize stream event: {}", e);
            false
        }
    }
}
