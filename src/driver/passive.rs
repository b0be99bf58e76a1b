//! Caller-thread driver: events queue up and a guarded pump drains them on
//! the firing thread. Events fired from inside an action are appended to the
//! queue and drained by the already running pump, never by a nested one.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use serde_json::Value;

use crate::context::TransitionContext;
use crate::error::{DynError, Result};
use crate::extension::Extension;
use crate::graph::StateGraph;
use crate::machine::{MachineInfo, StateMachine};
use crate::persistence::{StateMachineLoader, StateMachineSaver};
use crate::report::StateMachineReport;

use super::{EventQueue, EventSender};

pub struct PassiveStateMachine<S, E> {
    core: StateMachine<S, E>,
    queue: Arc<EventQueue<E>>,
    running: bool,
    executing: bool,
}

impl<S, E> PassiveStateMachine<S, E>
where
    S: Clone + Eq + Hash + Debug + 'static,
    E: Clone + Eq + Hash + Debug + 'static,
{
    pub(crate) fn new(core: StateMachine<S, E>) -> Self {
        Self {
            core,
            queue: Arc::new(EventQueue::new()),
            running: false,
            executing: false,
        }
    }

    /// Enqueue-only handle for firing events from inside actions or from
    /// other parts of the application.
    pub fn event_sender(&self) -> EventSender<S, E> {
        EventSender::new(
            self.queue.clone(),
            self.core.extensions_handle(),
            self.core.info(),
        )
    }

    pub fn initialize(&mut self, initial_state: S) -> Result<()> {
        self.core.initialize(initial_state)
    }

    pub fn enter_initial_state(&mut self) -> Result<()> {
        self.core.enter_initial_state()
    }

    pub fn fire(&mut self, event: E) -> Result<()> {
        self.fire_with(event, None)
    }

    /// Appends the event and pumps the queue if the machine is running and
    /// no pump is already active.
    pub fn fire_with(&mut self, event: E, argument: Option<Value>) -> Result<()> {
        self.event_sender().fire_with(event, argument);
        self.execute_pending()
    }

    pub fn fire_priority(&mut self, event: E) -> Result<()> {
        self.fire_priority_with(event, None)
    }

    /// Like [`Self::fire_with`] but inserts at the head of the queue.
    pub fn fire_priority_with(&mut self, event: E, argument: Option<Value>) -> Result<()> {
        self.event_sender().fire_priority_with(event, argument);
        self.execute_pending()
    }

    /// Marks the machine running, performs a pending initial entry and
    /// drains everything queued before startup.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.running = true;
        let info = self.core.info();
        for extension in self.core.extension_snapshot() {
            extension.started_state_machine(&info);
        }
        if self.core.pending_initial_entry() {
            self.core.enter_initial_state()?;
        }
        self.execute_pending()
    }

    /// Stops pumping; queued and future events accumulate until the next
    /// [`Self::start`].
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        let info = self.core.info();
        for extension in self.core.extension_snapshot() {
            extension.stopped_state_machine(&info);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_state(&self) -> Option<S> {
        self.core.current_state()
    }

    pub fn info(&self) -> Arc<MachineInfo<S>> {
        self.core.info()
    }

    pub fn graph(&self) -> &StateGraph<S, E> {
        self.core.graph()
    }

    pub fn add_extension(&self, extension: Arc<dyn Extension<S, E>>) {
        self.core.add_extension(extension);
    }

    pub fn clear_extensions(&self) {
        self.core.clear_extensions();
    }

    pub fn on_transition_begin(
        &mut self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>) + Send + 'static,
    ) {
        self.core.on_transition_begin(handler);
    }

    pub fn on_transition_completed(
        &mut self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>, &S) + Send + 'static,
    ) {
        self.core.on_transition_completed(handler);
    }

    pub fn on_transition_declined(
        &mut self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>) + Send + 'static,
    ) {
        self.core.on_transition_declined(handler);
    }

    pub fn on_transition_exception(
        &mut self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>, &DynError) + Send + 'static,
    ) {
        self.core.on_transition_exception(handler);
    }

    pub fn save(&self, saver: &mut dyn StateMachineSaver<S>) -> Result<()> {
        self.core.save(saver)
    }

    pub fn load(&mut self, loader: &dyn StateMachineLoader<S>) -> Result<()> {
        self.core.load(loader)
    }

    pub fn report(&self, report: &mut dyn StateMachineReport<S, E>) -> Result<()> {
        self.core.report(report)
    }

    /// The pump. The `executing` flag keeps a dispatch that enqueues
    /// further events from starting a nested pump; the active pump picks
    /// those events up instead.
    fn execute_pending(&mut self) -> Result<()> {
        if !self.running || self.executing {
            return Ok(());
        }
        self.executing = true;
        let result = loop {
            match self.queue.pop() {
                Some(event) => {
                    if let Err(error) = self.core.fire_with(event.id, event.argument) {
                        break Err(error);
                    }
                }
                None => break Ok(()),
            }
        };
        self.executing = false;
        result
    }
}
