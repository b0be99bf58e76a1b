use std::fmt;
use std::sync::Arc;

use crate::action::{ActionHolder, GuardHolder};

/// One edge of the state graph. The source is bound exactly once, when the
/// transition is added to a state's table; a transition without a target is
/// internal and fires its actions without exiting or entering any state.
pub struct Transition<S> {
    source: Option<S>,
    target: Option<S>,
    guard: Option<Arc<dyn GuardHolder>>,
    actions: Vec<Arc<dyn ActionHolder>>,
}

impl<S> Transition<S> {
    pub fn new() -> Self {
        Self {
            source: None,
            target: None,
            guard: None,
            actions: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: S) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_guard(mut self, guard: impl GuardHolder + 'static) -> Self {
        self.guard = Some(Arc::new(guard));
        self
    }

    pub fn with_action(mut self, action: impl ActionHolder + 'static) -> Self {
        self.actions.push(Arc::new(action));
        self
    }

    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    pub fn target(&self) -> Option<&S> {
        self.target.as_ref()
    }

    pub fn guard(&self) -> Option<&Arc<dyn GuardHolder>> {
        self.guard.as_ref()
    }

    pub fn actions(&self) -> &[Arc<dyn ActionHolder>] {
        &self.actions
    }

    pub fn is_internal(&self) -> bool {
        self.target.is_none()
    }

    pub(crate) fn bind_source(&mut self, source: S) {
        self.source = Some(source);
    }

    pub(crate) fn set_target(&mut self, target: S) {
        self.target = Some(target);
    }

    pub(crate) fn set_guard(&mut self, guard: Arc<dyn GuardHolder>) {
        self.guard = Some(guard);
    }

    pub(crate) fn push_action(&mut self, action: Arc<dyn ActionHolder>) {
        self.actions.push(action);
    }
}

impl<S> Default for Transition<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone> Clone for Transition<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            target: self.target.clone(),
            guard: self.guard.clone(),
            actions: self.actions.clone(),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("guard", &self.guard.as_ref().map(|g| g.describe()))
            .field(
                "actions",
                &self.actions.iter().map(|a| a.describe()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
