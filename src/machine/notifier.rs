//! Fan-out of lifecycle notifications and the user-code exception channel,
//! shared between the machine façade and the execution engine.

use std::sync::Arc;

use crate::context::{TransitionContext, TransitionInfo};
use crate::error::{DynError, ExceptionOrigin};
use crate::extension::Extension;

use super::{Handlers, MachineInfo};

pub(crate) struct Notifier<'a, S, E> {
    info: &'a MachineInfo<S>,
    extensions: &'a [Arc<dyn Extension<S, E>>],
    handlers: &'a Handlers<S, E>,
}

impl<'a, S, E> Notifier<'a, S, E> {
    pub(crate) fn new(
        info: &'a MachineInfo<S>,
        extensions: &'a [Arc<dyn Extension<S, E>>],
        handlers: &'a Handlers<S, E>,
    ) -> Self {
        Self {
            info,
            extensions,
            handlers,
        }
    }

    pub(crate) fn transition_begin(&self, context: &TransitionContext<S, E>) {
        for handler in &self.handlers.begin {
            handler(self.info, context);
        }
    }

    pub(crate) fn transition_completed(&self, context: &TransitionContext<S, E>, new_state: &S) {
        for handler in &self.handlers.completed {
            handler(self.info, context, new_state);
        }
    }

    pub(crate) fn transition_declined(&self, context: &TransitionContext<S, E>) {
        for handler in &self.handlers.declined {
            handler(self.info, context);
        }
    }

    pub(crate) fn executing_transition(&self, transition: &TransitionInfo<S, E>) {
        for extension in self.extensions {
            extension.executing_transition(self.info, transition);
        }
    }

    pub(crate) fn executed_transition(&self, transition: &TransitionInfo<S, E>) {
        for extension in self.extensions {
            extension.executed_transition(self.info, transition);
        }
    }

    pub(crate) fn skipped_transition(&self, transition: &TransitionInfo<S, E>) {
        for extension in self.extensions {
            extension.skipped_transition(self.info, transition);
        }
    }

    pub(crate) fn guard_error(
        &self,
        transition: &TransitionInfo<S, E>,
        mut error: DynError,
        context: &mut TransitionContext<S, E>,
    ) {
        for extension in self.extensions {
            extension.handling_guard_exception(self.info, transition, &mut error);
        }
        self.deliver(ExceptionOrigin::Guard, &error, context);
        for extension in self.extensions {
            extension.handled_guard_exception(self.info, transition, &error);
        }
        self.stash_if_unhandled(ExceptionOrigin::Guard, error, context);
    }

    pub(crate) fn transition_action_error(
        &self,
        transition: &TransitionInfo<S, E>,
        mut error: DynError,
        context: &mut TransitionContext<S, E>,
    ) {
        for extension in self.extensions {
            extension.handling_transition_exception(self.info, transition, &mut error);
        }
        self.deliver(ExceptionOrigin::TransitionAction, &error, context);
        for extension in self.extensions {
            extension.handled_transition_exception(self.info, transition, &error);
        }
        self.stash_if_unhandled(ExceptionOrigin::TransitionAction, error, context);
    }

    pub(crate) fn entry_action_error(
        &self,
        state: &S,
        mut error: DynError,
        context: &mut TransitionContext<S, E>,
    ) {
        for extension in self.extensions {
            extension.handling_entry_action_exception(self.info, state, &mut error);
        }
        self.deliver(ExceptionOrigin::EntryAction, &error, context);
        for extension in self.extensions {
            extension.handled_entry_action_exception(self.info, state, &error);
        }
        self.stash_if_unhandled(ExceptionOrigin::EntryAction, error, context);
    }

    pub(crate) fn exit_action_error(
        &self,
        state: &S,
        mut error: DynError,
        context: &mut TransitionContext<S, E>,
    ) {
        for extension in self.extensions {
            extension.handling_exit_action_exception(self.info, state, &mut error);
        }
        self.deliver(ExceptionOrigin::ExitAction, &error, context);
        for extension in self.extensions {
            extension.handled_exit_action_exception(self.info, state, &error);
        }
        self.stash_if_unhandled(ExceptionOrigin::ExitAction, error, context);
    }

    fn deliver(&self, _origin: ExceptionOrigin, error: &DynError, context: &TransitionContext<S, E>) {
        for handler in &self.handlers.exception {
            handler(self.info, context, error);
        }
    }

    /// Without a subscriber on the exception channel the error is kept on
    /// the context; the façade rethrows it wrapped once the transition has
    /// run to completion.
    fn stash_if_unhandled(
        &self,
        origin: ExceptionOrigin,
        error: DynError,
        context: &mut TransitionContext<S, E>,
    ) {
        if self.handlers.exception.is_empty() {
            context.push_pending(origin, error);
        }
    }
}
