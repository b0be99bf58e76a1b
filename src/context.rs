//! Per-dispatch scratch state: the originating state, the event and its
//! argument, and the enter/exit trace recorded while the transition runs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{DynError, ExceptionOrigin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordKind {
    Enter,
    Exit,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Enter => f.write_str("enter"),
            RecordKind::Exit => f.write_str("exit"),
        }
    }
}

/// One entry of the enter/exit trace.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecord<S> {
    pub state: S,
    pub kind: RecordKind,
    pub recorded_at: DateTime<Utc>,
}

/// The firing edge handed to extensions.
#[derive(Debug, Clone)]
pub struct TransitionInfo<S, E> {
    pub source: S,
    /// `None` marks an internal transition.
    pub target: Option<S>,
    pub event: E,
}

pub struct TransitionContext<S, E> {
    source: Option<S>,
    event: Option<E>,
    argument: Option<Value>,
    records: Vec<TransitionRecord<S>>,
    pending: Vec<(ExceptionOrigin, DynError)>,
}

impl<S, E> TransitionContext<S, E> {
    pub(crate) fn for_event(source: S, event: E, argument: Option<Value>) -> Self {
        Self {
            source: Some(source),
            event: Some(event),
            argument,
            records: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Context used while entering the initial state; there is no event yet.
    pub(crate) fn initial_entry() -> Self {
        Self {
            source: None,
            event: None,
            argument: None,
            records: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn source_state(&self) -> Option<&S> {
        self.source.as_ref()
    }

    pub fn event_id(&self) -> Option<&E> {
        self.event.as_ref()
    }

    pub fn argument(&self) -> Option<&Value> {
        self.argument.as_ref()
    }

    pub fn records(&self) -> &[TransitionRecord<S>] {
        &self.records
    }

    pub(crate) fn record(&mut self, kind: RecordKind, state: S) {
        self.records.push(TransitionRecord {
            state,
            kind,
            recorded_at: Utc::now(),
        });
    }

    pub(crate) fn push_pending(&mut self, origin: ExceptionOrigin, error: DynError) {
        self.pending.push((origin, error));
    }

    pub(crate) fn take_pending(&mut self) -> Vec<(ExceptionOrigin, DynError)> {
        std::mem::take(&mut self.pending)
    }
}

impl<S: fmt::Debug, E> TransitionContext<S, E> {
    /// Compact `exit B -> enter C` rendering of the trace, for diagnostics.
    pub fn describe_records(&self) -> String {
        self.records
            .iter()
            .map(|record| format!("{} {:?}", record.kind, record.state))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
