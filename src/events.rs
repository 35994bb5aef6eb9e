//! Event Streaming Layer.
//!
//! Two producers — the top-level graph and, for every `workflow`-kind node,
//! the sub-graph it embeds — feed one ordered consumer stream over a shared
//! `flume` channel, so ordering across the merge falls out of channel FIFO
//! semantics rather than a separate merge step.

use crate::state::{DebugRecord, ErrorRecord};
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleStatus {
    Running,
    Completed,
    Failed,
}

/// A snapshot of `GraphState` suitable for the terminal `result` event.
#[derive(Clone, Debug, Serialize)]
pub struct FinalState {
    pub workflow_data: FxHashMap<String, Value>,
    pub debug_log: Vec<DebugRecord>,
    pub execution_log: Vec<String>,
    pub error_info: Vec<ErrorRecord>,
}

/// The typed surface between the engine and any observer.
#[derive(Clone, Debug)]
pub enum Event {
    LifecycleUpdate {
        step_name: String,
        status: LifecycleStatus,
    },
    Log(DebugRecord),
    SubWorkflowEvent {
        parent_step: String,
        sub_workflow: String,
        map_index: Option<usize>,
        original_event: Box<Event>,
    },
    Result(FinalState),
}

/// The sending half installed into a run's resources; cloned into every
/// sub-workflow invocation so its events land on the same outer channel.
#[derive(Clone)]
pub struct EventSink {
    sender: flume::Sender<Event>,
}

impl EventSink {
    pub fn emit(&self, event: Event) {
        // A dropped receiver (observer walked away) is not a run failure;
        // the orchestrator is responsible for cancelling outstanding work.
        let _ = self.sender.send(event);
    }

    pub fn emit_lifecycle(&self, step_name: impl Into<String>, status: LifecycleStatus) {
        self.emit(Event::LifecycleUpdate {
            step_name: step_name.into(),
            status,
        });
    }

    pub fn emit_log(&self, record: DebugRecord) {
        self.emit(Event::Log(record));
    }

    pub fn emit_result(&self, state: FinalState) {
        self.emit(Event::Result(state));
    }

    /// Wraps and forwards an event produced by an embedded sub-workflow.
    pub fn forward_sub_event(
        &self,
        parent_step: impl Into<String>,
        sub_workflow: impl Into<String>,
        map_index: Option<usize>,
        original_event: Event,
    ) {
        self.emit(Event::SubWorkflowEvent {
            parent_step: parent_step.into(),
            sub_workflow: sub_workflow.into(),
            map_index,
            original_event: Box::new(original_event),
        });
    }
}

/// An asynchronous stream of [`Event`]s — the entire surface between the
/// engine and an observer.
pub struct EventStream {
    receiver: flume::Receiver<Event>,
}

impl EventStream {
    pub async fn recv(&self) -> Option<Event> {
        self.receiver.recv_async().await.ok()
    }

    /// Drains any events already buffered, without waiting for more. Used by
    /// the orchestrator when cancelling a run.
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }
}

/// Creates a fresh sink/stream pair for one run (top-level or sub-workflow).
pub fn channel() -> (EventSink, EventStream) {
    let (sender, receiver) = flume::unbounded();
    (EventSink { sender }, EventStream { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (sink, stream) = channel();
        sink.emit_lifecycle("a", LifecycleStatus::Running);
        sink.emit_lifecycle("a", LifecycleStatus::Completed);
        drop(sink);

        let first = stream.recv().await.unwrap();
        let second = stream.recv().await.unwrap();
        assert!(matches!(
            first,
            Event::LifecycleUpdate {
                status: LifecycleStatus::Running,
                ..
            }
        ));
        assert!(matches!(
            second,
            Event::LifecycleUpdate {
                status: LifecycleStatus::Completed,
                ..
            }
        ));
        assert!(stream.recv().await.is_none());
    }
}
