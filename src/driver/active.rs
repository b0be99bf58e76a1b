//! Worker-thread driver: producers enqueue under the queue lock and return;
//! one dedicated worker performs every dispatch. Stop is cooperative and
//! in-flight transitions always run to completion.

use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::context::TransitionContext;
use crate::error::{DynError, Result, StateMachineError};
use crate::extension::{Extension, ExtensionList};
use crate::machine::{MachineInfo, StateMachine};
use crate::persistence::{StateMachineLoader, StateMachineSaver};
use crate::report::StateMachineReport;

use super::{EventQueue, EventSender};

struct ActiveShared<S, E> {
    core: Mutex<StateMachine<S, E>>,
    queue: Arc<EventQueue<E>>,
    fault: Mutex<Option<StateMachineError>>,
    extensions: ExtensionList<S, E>,
    info: Arc<MachineInfo<S>>,
}

pub struct ActiveStateMachine<S, E> {
    shared: Arc<ActiveShared<S, E>>,
    worker: Option<JoinHandle<()>>,
}

impl<S, E> ActiveStateMachine<S, E>
where
    S: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    E: Clone + Eq + Hash + Debug + Send + 'static,
{
    pub(crate) fn new(core: StateMachine<S, E>) -> Self {
        let extensions = core.extensions_handle();
        let info = core.info();
        Self {
            shared: Arc::new(ActiveShared {
                core: Mutex::new(core),
                queue: Arc::new(EventQueue::new()),
                fault: Mutex::new(None),
                extensions,
                info,
            }),
            worker: None,
        }
    }

    pub fn event_sender(&self) -> EventSender<S, E> {
        EventSender::new(
            self.shared.queue.clone(),
            self.shared.extensions.clone(),
            self.shared.info.clone(),
        )
    }

    /// Records the initial state and wakes a parked worker so it performs
    /// the pending initial entry.
    pub fn initialize(&self, initial_state: S) -> Result<()> {
        let result = self.shared.core.lock().initialize(initial_state);
        self.shared.queue.wake();
        result
    }

    pub fn fire(&self, event: E) {
        self.event_sender().fire(event);
    }

    pub fn fire_with(&self, event: E, argument: Option<Value>) {
        self.event_sender().fire_with(event, argument);
    }

    pub fn fire_priority(&self, event: E) {
        self.event_sender().fire_priority(event);
    }

    pub fn fire_priority_with(&self, event: E, argument: Option<Value>) {
        self.event_sender().fire_priority_with(event, argument);
    }

    /// Spawns the worker with a fresh cancellation flag. Events queued
    /// while the machine was stopped are drained first.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(StateMachineError::AlreadyRunning);
        }
        self.shared.queue.reset();
        let extensions = self.shared.extensions.read().clone();
        for extension in &extensions {
            extension.started_state_machine(&self.shared.info);
        }
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-worker", self.shared.info.name()))
            .spawn(move || worker_loop(shared))
            .map_err(|error| StateMachineError::WorkerPanic(error.to_string()))?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Signals cancellation, wakes the worker and joins it. A worker that
    /// crashed rather than being cancelled propagates its fault here.
    /// Events still queued are retained for the next start.
    pub fn stop(&mut self) -> Result<()> {
        let handle = match self.worker.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        self.shared.queue.cancel();
        if let Err(panic) = handle.join() {
            return Err(StateMachineError::WorkerPanic(panic_message(&panic)));
        }
        if let Some(fault) = self.shared.fault.lock().take() {
            return Err(fault);
        }
        let extensions = self.shared.extensions.read().clone();
        for extension in &extensions {
            extension.stopped_state_machine(&self.shared.info);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn current_state(&self) -> Option<S> {
        self.shared.info.current_state()
    }

    pub fn info(&self) -> Arc<MachineInfo<S>> {
        self.shared.info.clone()
    }

    pub fn add_extension(&self, extension: Arc<dyn Extension<S, E>>) {
        self.shared.extensions.write().push(extension);
    }

    pub fn clear_extensions(&self) {
        self.shared.extensions.write().clear();
    }

    pub fn on_transition_begin(
        &self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>) + Send + 'static,
    ) {
        self.shared.core.lock().on_transition_begin(handler);
    }

    pub fn on_transition_completed(
        &self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>, &S) + Send + 'static,
    ) {
        self.shared.core.lock().on_transition_completed(handler);
    }

    pub fn on_transition_declined(
        &self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>) + Send + 'static,
    ) {
        self.shared.core.lock().on_transition_declined(handler);
    }

    pub fn on_transition_exception(
        &self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>, &DynError) + Send + 'static,
    ) {
        self.shared.core.lock().on_transition_exception(handler);
    }

    pub fn save(&self, saver: &mut dyn StateMachineSaver<S>) -> Result<()> {
        self.shared.core.lock().save(saver)
    }

    pub fn load(&self, loader: &dyn StateMachineLoader<S>) -> Result<()> {
        self.shared.core.lock().load(loader)
    }

    pub fn report(&self, report: &mut dyn StateMachineReport<S, E>) -> Result<()> {
        self.shared.core.lock().report(report)
    }
}

impl<S, E> Drop for ActiveStateMachine<S, E> {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.shared.queue.cancel();
            let _ = handle.join();
        }
    }
}

fn worker_loop<S, E>(shared: Arc<ActiveShared<S, E>>)
where
    S: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    E: Clone + Eq + Hash + Debug + Send + 'static,
{
    debug!(machine = shared.info.name(), "state machine worker started");
    loop {
        {
            let mut core = shared.core.lock();
            if core.pending_initial_entry() {
                if let Err(error) = core.enter_initial_state() {
                    *shared.fault.lock() = Some(error);
                    return;
                }
            }
        }

        let event = {
            let mut inner = shared.queue.inner.lock();
            if inner.cancelled {
                break;
            }
            match inner.events.pop_front() {
                Some(event) => Some(event),
                None if inner.nudged => {
                    // consume the wake and re-check pending work at the top
                    // of the loop
                    inner.nudged = false;
                    None
                }
                None => {
                    shared.queue.ready.wait(&mut inner);
                    // woken: re-check cancellation here and pending work at
                    // the top of the loop
                    inner.nudged = false;
                    if inner.cancelled {
                        break;
                    }
                    None
                }
            }
        };

        if let Some(event) = event {
            // dispatch outside the queue lock so producers never wait on
            // user actions
            let mut core = shared.core.lock();
            if let Err(error) = core.fire_with(event.id, event.argument) {
                *shared.fault.lock() = Some(error);
                return;
            }
        }
    }
    debug!(machine = shared.info.name(), "state machine worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
