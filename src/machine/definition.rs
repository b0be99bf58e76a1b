//! Declarative construction of a state machine: a definition carries the
//! graph and hands out small cursor builders that mutate it step by step.
//! Configuration errors surface at the offending call, not at run time.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::action::{ActionHolder, GuardHolder};
use crate::driver::{ActiveStateMachine, PassiveStateMachine};
use crate::error::Result;
use crate::graph::{HistoryMode, StateGraph, Transition};

use super::StateMachine;

pub struct StateMachineDefinition<S, E> {
    name: String,
    graph: StateGraph<S, E>,
}

impl<S, E> StateMachineDefinition<S, E>
where
    S: Clone + Eq + Hash + Debug + 'static,
    E: Clone + Eq + Hash + Debug + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: StateGraph::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &StateGraph<S, E> {
        &self.graph
    }

    /// Opens a configuration cursor on `state`, creating it on first
    /// mention.
    pub fn in_state(&mut self, state: S) -> StateBuilder<'_, S, E> {
        self.graph.ensure_state(&state);
        StateBuilder {
            graph: &mut self.graph,
            state,
        }
    }

    /// Opens a hierarchy cursor on `superstate`, creating it on first
    /// mention.
    pub fn define_hierarchy_on(&mut self, superstate: S) -> HierarchyBuilder<'_, S, E> {
        self.graph.ensure_state(&superstate);
        HierarchyBuilder {
            graph: &mut self.graph,
            superstate,
        }
    }

    /// Finishes configuration and produces the bare machine façade.
    pub fn build(self) -> StateMachine<S, E> {
        StateMachine::new(self.name, self.graph)
    }

    /// Finishes configuration and produces a machine pumped on the caller
    /// thread.
    pub fn build_passive(self) -> PassiveStateMachine<S, E> {
        PassiveStateMachine::new(self.build())
    }
}

impl<S, E> StateMachineDefinition<S, E>
where
    S: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    E: Clone + Eq + Hash + Debug + Send + 'static,
{
    /// Finishes configuration and produces a machine pumped by a dedicated
    /// worker thread.
    pub fn build_active(self) -> ActiveStateMachine<S, E> {
        ActiveStateMachine::new(self.build())
    }
}

/// Cursor over one state.
pub struct StateBuilder<'a, S, E> {
    graph: &'a mut StateGraph<S, E>,
    state: S,
}

impl<'a, S, E> StateBuilder<'a, S, E>
where
    S: Clone + Eq + Hash + Debug + 'static,
    E: Clone + Eq + Hash + Debug + 'static,
{
    pub fn execute_on_entry(self, action: impl ActionHolder + 'static) -> Self {
        self.graph.add_entry_action(&self.state, Arc::new(action));
        self
    }

    pub fn execute_on_exit(self, action: impl ActionHolder + 'static) -> Self {
        self.graph.add_exit_action(&self.state, Arc::new(action));
        self
    }

    /// Declares a transition for `event` and moves the cursor onto it.
    /// Fails once an unguarded transition exists for the event, since that
    /// one must stay last.
    pub fn on(self, event: E) -> Result<TransitionBuilder<'a, S, E>> {
        let index = self
            .graph
            .add_transition(&self.state, event.clone(), Transition::new())?;
        Ok(TransitionBuilder {
            graph: self.graph,
            state: self.state,
            event,
            index,
        })
    }
}

/// Cursor over one declared transition.
#[derive(Debug)]
pub struct TransitionBuilder<'a, S, E> {
    graph: &'a mut StateGraph<S, E>,
    state: S,
    event: E,
    index: usize,
}

impl<'a, S, E> TransitionBuilder<'a, S, E>
where
    S: Clone + Eq + Hash + Debug + 'static,
    E: Clone + Eq + Hash + Debug + 'static,
{
    /// Guards the transition. Declared without a guard and without a
    /// target, a transition is an unguarded internal one.
    pub fn only_if(self, guard: impl GuardHolder + 'static) -> Self {
        if let Some(transition) = self.graph.transition_mut(&self.state, &self.event, self.index) {
            transition.set_guard(Arc::new(guard));
        }
        self
    }

    /// Sets the target, creating it on first mention. Without a target the
    /// transition stays internal.
    pub fn go_to(self, target: S) -> Self {
        self.graph.ensure_state(&target);
        if let Some(transition) = self.graph.transition_mut(&self.state, &self.event, self.index) {
            transition.set_target(target);
        }
        self
    }

    pub fn execute(self, action: impl ActionHolder + 'static) -> Self {
        if let Some(transition) = self.graph.transition_mut(&self.state, &self.event, self.index) {
            transition.push_action(Arc::new(action));
        }
        self
    }

    /// Declares the next transition on the same state.
    pub fn on(self, event: E) -> Result<TransitionBuilder<'a, S, E>> {
        let index = self
            .graph
            .add_transition(&self.state, event.clone(), Transition::new())?;
        Ok(TransitionBuilder {
            graph: self.graph,
            state: self.state,
            event,
            index,
        })
    }
}

/// Cursor wiring sub-states under one superstate.
#[derive(Debug)]
pub struct HierarchyBuilder<'a, S, E> {
    graph: &'a mut StateGraph<S, E>,
    superstate: S,
}

impl<'a, S, E> HierarchyBuilder<'a, S, E>
where
    S: Clone + Eq + Hash + Debug + 'static,
    E: Clone + Eq + Hash + Debug + 'static,
{
    pub fn with_history(self, history: HistoryMode) -> Self {
        self.graph.set_history(&self.superstate, history);
        self
    }

    /// Adds `child` as a sub-state and marks it initial.
    pub fn with_initial_sub_state(self, child: S) -> Result<Self> {
        self.graph.set_parent(&child, &self.superstate)?;
        self.graph.set_initial_child(&self.superstate, &child)?;
        Ok(self)
    }

    pub fn with_sub_state(self, child: S) -> Result<Self> {
        self.graph.set_parent(&child, &self.superstate)?;
        Ok(self)
    }
}
