//! Observer interface: extensions receive lifecycle callbacks at fixed
//! points of a machine's life. All methods default to no-ops, so an
//! extension implements only what it cares about. Hooks taking `&mut`
//! parameters may rewrite them; with several extensions registered the last
//! write wins.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::{TransitionContext, TransitionInfo};
use crate::error::DynError;
use crate::machine::MachineInfo;

pub trait Extension<S, E>: Send + Sync {
    fn started_state_machine(&self, _machine: &MachineInfo<S>) {}

    fn stopped_state_machine(&self, _machine: &MachineInfo<S>) {}

    fn event_queued(&self, _machine: &MachineInfo<S>, _event: &E, _argument: Option<&Value>) {}

    fn event_queued_with_priority(
        &self,
        _machine: &MachineInfo<S>,
        _event: &E,
        _argument: Option<&Value>,
    ) {
    }

    fn initializing_state_machine(&self, _machine: &MachineInfo<S>, _initial_state: &mut S) {}

    fn initialized_state_machine(&self, _machine: &MachineInfo<S>, _initial_state: &S) {}

    fn entering_initial_state(&self, _machine: &MachineInfo<S>, _state: &S) {}

    fn entered_initial_state(
        &self,
        _machine: &MachineInfo<S>,
        _state: &S,
        _context: &TransitionContext<S, E>,
    ) {
    }

    fn firing_event(&self, _machine: &MachineInfo<S>, _event: &mut E, _argument: &mut Option<Value>) {}

    fn fired_event(&self, _machine: &MachineInfo<S>, _context: &TransitionContext<S, E>) {}

    fn switched_state(&self, _machine: &MachineInfo<S>, _old_state: Option<&S>, _new_state: &S) {}

    fn executing_transition(&self, _machine: &MachineInfo<S>, _transition: &TransitionInfo<S, E>) {}

    fn executed_transition(&self, _machine: &MachineInfo<S>, _transition: &TransitionInfo<S, E>) {}

    fn skipped_transition(&self, _machine: &MachineInfo<S>, _transition: &TransitionInfo<S, E>) {}

    fn handling_guard_exception(
        &self,
        _machine: &MachineInfo<S>,
        _transition: &TransitionInfo<S, E>,
        _error: &mut DynError,
    ) {
    }

    fn handled_guard_exception(
        &self,
        _machine: &MachineInfo<S>,
        _transition: &TransitionInfo<S, E>,
        _error: &DynError,
    ) {
    }

    fn handling_transition_exception(
        &self,
        _machine: &MachineInfo<S>,
        _transition: &TransitionInfo<S, E>,
        _error: &mut DynError,
    ) {
    }

    fn handled_transition_exception(
        &self,
        _machine: &MachineInfo<S>,
        _transition: &TransitionInfo<S, E>,
        _error: &DynError,
    ) {
    }

    fn handling_entry_action_exception(
        &self,
        _machine: &MachineInfo<S>,
        _state: &S,
        _error: &mut DynError,
    ) {
    }

    fn handled_entry_action_exception(&self, _machine: &MachineInfo<S>, _state: &S, _error: &DynError) {}

    fn handling_exit_action_exception(
        &self,
        _machine: &MachineInfo<S>,
        _state: &S,
        _error: &mut DynError,
    ) {
    }

    fn handled_exit_action_exception(&self, _machine: &MachineInfo<S>, _state: &S, _error: &DynError) {}
}

/// Shared, mutable extension registry. Notifications iterate over a
/// snapshot, so an extension may register or clear extensions without
/// deadlocking.
pub(crate) type ExtensionList<S, E> = Arc<RwLock<Vec<Arc<dyn Extension<S, E>>>>>;

/// Extension that logs machine activity through `tracing`.
pub struct LoggingExtension {
    prefix: String,
}

impl LoggingExtension {
    pub fn new() -> Self {
        Self {
            prefix: "[fsm]".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoggingExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Debug, E: Debug> Extension<S, E> for LoggingExtension {
    fn started_state_machine(&self, machine: &MachineInfo<S>) {
        info!("{} {} started", self.prefix, machine.name());
    }

    fn stopped_state_machine(&self, machine: &MachineInfo<S>) {
        info!("{} {} stopped", self.prefix, machine.name());
    }

    fn event_queued(&self, machine: &MachineInfo<S>, event: &E, _argument: Option<&Value>) {
        debug!("{} {} queued event {:?}", self.prefix, machine.name(), event);
    }

    fn event_queued_with_priority(&self, machine: &MachineInfo<S>, event: &E, _argument: Option<&Value>) {
        debug!(
            "{} {} queued priority event {:?}",
            self.prefix,
            machine.name(),
            event
        );
    }

    fn initialized_state_machine(&self, machine: &MachineInfo<S>, initial_state: &S) {
        info!(
            "{} {} initialized to {:?}",
            self.prefix,
            machine.name(),
            initial_state
        );
    }

    fn switched_state(&self, machine: &MachineInfo<S>, old_state: Option<&S>, new_state: &S) {
        info!(
            "{} {} switched {:?} -> {:?}",
            self.prefix,
            machine.name(),
            old_state,
            new_state
        );
    }

    fn skipped_transition(&self, machine: &MachineInfo<S>, transition: &TransitionInfo<S, E>) {
        debug!(
            "{} {} skipped transition from {:?} on {:?}",
            self.prefix,
            machine.name(),
            transition.source,
            transition.event
        );
    }

    fn handled_guard_exception(
        &self,
        machine: &MachineInfo<S>,
        transition: &TransitionInfo<S, E>,
        error: &DynError,
    ) {
        warn!(
            "{} {} guard failed from {:?} on {:?}: {}",
            self.prefix,
            machine.name(),
            transition.source,
            transition.event,
            error
        );
    }

    fn handled_transition_exception(
        &self,
        machine: &MachineInfo<S>,
        transition: &TransitionInfo<S, E>,
        error: &DynError,
    ) {
        warn!(
            "{} {} transition action failed from {:?} on {:?}: {}",
            self.prefix,
            machine.name(),
            transition.source,
            transition.event,
            error
        );
    }

    fn handled_entry_action_exception(&self, machine: &MachineInfo<S>, state: &S, error: &DynError) {
        warn!(
            "{} {} entry action failed in {:?}: {}",
            self.prefix,
            machine.name(),
            state,
            error
        );
    }

    fn handled_exit_action_exception(&self, machine: &MachineInfo<S>, state: &S, error: &DynError) {
        warn!(
            "{} {} exit action failed in {:?}: {}",
            self.prefix,
            machine.name(),
            state,
            error
        );
    }
}
