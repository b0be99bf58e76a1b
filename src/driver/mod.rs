//! Event-processing drivers: a passive, caller-thread pump and an active,
//! worker-thread pump, sharing one queue shape and one execution engine.

mod active;
mod passive;

pub use active::ActiveStateMachine;
pub use passive::PassiveStateMachine;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde_json::Value;

use crate::event::EventInfo;
use crate::extension::ExtensionList;
use crate::machine::MachineInfo;

pub(crate) struct QueueInner<E> {
    pub(crate) events: VecDeque<EventInfo<E>>,
    pub(crate) cancelled: bool,
    /// Sticky wake request; consumed by the worker before it parks, so a
    /// wake sent while the worker is between its checks and its wait is
    /// never lost.
    pub(crate) nudged: bool,
}

/// FIFO with head insertion for priority events, a condition variable for
/// the active worker, and a cooperative cancellation flag.
pub(crate) struct EventQueue<E> {
    pub(crate) inner: Mutex<QueueInner<E>>,
    pub(crate) ready: Condvar,
}

impl<E> EventQueue<E> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                events: VecDeque::new(),
                cancelled: false,
                nudged: false,
            }),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn enqueue(&self, event: EventInfo<E>) {
        self.inner.lock().events.push_back(event);
        self.ready.notify_one();
    }

    pub(crate) fn enqueue_front(&self, event: EventInfo<E>) {
        self.inner.lock().events.push_front(event);
        self.ready.notify_one();
    }

    pub(crate) fn pop(&self) -> Option<EventInfo<E>> {
        self.inner.lock().events.pop_front()
    }

    /// Flips the cancellation flag and pulses the condition variable while
    /// still holding the queue lock, so a worker between its cancellation
    /// check and its wait cannot miss the signal.
    pub(crate) fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.cancelled = true;
        self.ready.notify_all();
    }

    pub(crate) fn reset(&self) {
        self.inner.lock().cancelled = false;
    }

    /// Wakes the worker without enqueuing, e.g. after `initialize` so a
    /// parked worker performs the pending initial entry.
    pub(crate) fn wake(&self) {
        let mut inner = self.inner.lock();
        inner.nudged = true;
        self.ready.notify_all();
    }
}

/// Cloneable enqueue-only handle. Actions hold one of these to fire
/// follow-up events from inside a dispatch: the call returns once the event
/// is queued and the owning pump drains it.
pub struct EventSender<S, E> {
    queue: Arc<EventQueue<E>>,
    extensions: ExtensionList<S, E>,
    info: Arc<MachineInfo<S>>,
}

impl<S, E> EventSender<S, E> {
    pub(crate) fn new(
        queue: Arc<EventQueue<E>>,
        extensions: ExtensionList<S, E>,
        info: Arc<MachineInfo<S>>,
    ) -> Self {
        Self {
            queue,
            extensions,
            info,
        }
    }

    pub fn fire(&self, event: E) {
        self.fire_with(event, None);
    }

    pub fn fire_with(&self, event: E, argument: Option<Value>) {
        let extensions = self.extensions.read().clone();
        for extension in &extensions {
            extension.event_queued(&self.info, &event, argument.as_ref());
        }
        self.queue.enqueue(EventInfo::new(event, argument));
    }

    pub fn fire_priority(&self, event: E) {
        self.fire_priority_with(event, None);
    }

    pub fn fire_priority_with(&self, event: E, argument: Option<Value>) {
        let extensions = self.extensions.read().clone();
        for extension in &extensions {
            extension.event_queued_with_priority(&self.info, &event, argument.as_ref());
        }
        self.queue.enqueue_front(EventInfo::new(event, argument));
    }
}

impl<S, E> Clone for EventSender<S, E> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            extensions: self.extensions.clone(),
            info: self.info.clone(),
        }
    }
}
