//! Streaming invocation protocol
//!
//! Long-running routes answer with newline-delimited JSON. Every line is a
//! complete envelope extended with `event_id` and `is_final_event`:
//!
//! ```text
//! {"status":"success","invocationId":"<id>","event_id":0,"is_final_event":false,"response":[...]}
//! {"status":"success","invocationId":"<id>","event_id":1,"is_final_event":true,"response":[]}
//! ```
//!
//! `StreamEmitter` is the producer side. It hands out ids `0, 1, 2, ...` and
//! `finish` consumes it, so a second final event cannot be produced.

use serde::{Deserialize, Serialize};

use crate::envelope::{InvocationId, ResponseMessage, Status};

/// Wire form of one streamed line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEnvelope {
    pub status: Status,
    #[serde(rename = "invocationId")]
    pub invocation_id: InvocationId,
    pub event_id: u64,
    pub is_final_event: bool,
    pub response: Vec<ResponseMessage>,
}

/// A produced event; only the emitter constructs these
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Data(StreamEnvelope),
    Final(StreamEnvelope),
}

impl StreamEvent {
    pub fn envelope(&self) -> &StreamEnvelope {
        match self {
            StreamEvent::Data(env) | StreamEvent::Final(env) => env,
        }
    }

    pub fn event_id(&self) -> u64 {
        self.envelope().event_id
    }

    pub fn is_final(&self) -> bool {
        matches!(self, StreamEvent::Final(_))
    }

    /// Serialize as one NDJSON line, trailing newline included
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self.envelope())?;
        line.push('\n');
        Ok(line)
    }
}

/// Emitter lifecycle; `Finalized` is reached by consuming the emitter in `finish`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    Idle,
    Emitting,
}

/// Turns produced chunks into ordered stream events for one invocation
#[derive(Debug)]
pub struct StreamEmitter {
    invocation_id: InvocationId,
    next_event_id: u64,
    state: EmitterState,
    failed: bool,
}

impl StreamEmitter {
    /// Start a stream; the id stays fixed for every event
    pub fn new(invocation_id: InvocationId) -> Self {
        Self {
            invocation_id,
            next_event_id: 0,
            state: EmitterState::Idle,
            failed: false,
        }
    }

    pub fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }

    pub fn state(&self) -> EmitterState {
        self.state
    }

    /// Number of events produced so far
    pub fn emitted(&self) -> u64 {
        self.next_event_id
    }

    /// True once an error event has been emitted
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Emit a data event
    pub fn data(&mut self, response: Vec<ResponseMessage>) -> StreamEvent {
        StreamEvent::Data(self.next(Status::Success, false, response))
    }

    /// Emit an error-typed data event; the final event will also carry `status: "error"`
    pub fn error(&mut self, message: impl Into<String>) -> StreamEvent {
        self.failed = true;
        StreamEvent::Data(self.next(
            Status::Error,
            false,
            vec![ResponseMessage::text(message)],
        ))
    }

    /// Close the stream. `response` may be empty (sentinel) or carry a summary.
    pub fn finish(mut self, response: Vec<ResponseMessage>) -> StreamEvent {
        let status = if self.failed {
            Status::Error
        } else {
            Status::Success
        };
        StreamEvent::Final(self.next(status, true, response))
    }

    fn next(
        &mut self,
        status: Status,
        is_final_event: bool,
        response: Vec<ResponseMessage>,
    ) -> StreamEnvelope {
        let event_id = self.next_event_id;
        self.next_event_id += 1;
        self.state = EmitterState::Emitting;
        StreamEnvelope {
            status,
            invocation_id: self.invocation_id,
            event_id,
            is_final_event,
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&str]) -> Vec<StreamEvent> {
        let mut emitter = StreamEmitter::new(InvocationId::new());
        let mut events: Vec<StreamEvent> = chunks
            .iter()
            .map(|c| emitter.data(vec![ResponseMessage::text(*c)]))
            .collect();
        events.push(emitter.finish(Vec::new()));
        events
    }

    #[test]
    fn test_event_ids_are_contiguous_and_final_is_last() {
        let events = run(&["a", "b", "c", "d", "e"]);
        let ids: Vec<u64> = events.iter().map(StreamEvent::event_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);

        let finals: Vec<_> = events.iter().filter(|e| e.is_final()).collect();
        assert_eq!(finals.len(), 1);
        assert!(events.last().unwrap().is_final());
    }

    #[test]
    fn test_invocation_id_is_stable() {
        let events = run(&["x", "y"]);
        let first = events[0].envelope().invocation_id;
        assert!(events.iter().all(|e| e.envelope().invocation_id == first));
    }

    #[test]
    fn test_empty_stream_has_only_final_event() {
        let events = run(&[]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id(), 0);
        assert!(events[0].envelope().is_final_event);
        assert!(events[0].envelope().response.is_empty());
    }

    #[test]
    fn test_error_marks_final_status() {
        let mut emitter = StreamEmitter::new(InvocationId::new());
        emitter.data(vec![ResponseMessage::text("partial")]);
        let err = emitter.error("backend went away");
        assert_eq!(err.envelope().status, Status::Error);
        assert!(!err.is_final());
        assert!(emitter.has_failed());

        let last = emitter.finish(Vec::new());
        assert_eq!(last.event_id(), 2);
        assert_eq!(last.envelope().status, Status::Error);
    }

    #[test]
    fn test_state_transitions() {
        let mut emitter = StreamEmitter::new(InvocationId::new());
        assert_eq!(emitter.state(), EmitterState::Idle);
        emitter.data(vec![ResponseMessage::text("a")]);
        assert_eq!(emitter.state(), EmitterState::Emitting);
        assert_eq!(emitter.emitted(), 1);
    }

    #[test]
    fn test_line_is_single_json_document() {
        let events = run(&["hello"]);
        let line = events[0].to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let parsed: StreamEnvelope = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed.event_id, 0);
        assert!(!parsed.is_final_event);
        assert_eq!(parsed.response[0].message, "hello");
    }
}
