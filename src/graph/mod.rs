//! The state graph: an arena of states keyed by id, with parent/child links,
//! per-state transition tables, initial sub-states and history memos.

mod state;
mod transition;

pub use state::{HistoryMode, StateNode};
pub use transition::Transition;

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::action::ActionHolder;
use crate::error::{Result, StateMachineError};

#[derive(Debug)]
pub struct StateGraph<S, E> {
    states: HashMap<S, StateNode<S, E>>,
    order: Vec<S>,
}

impl<S, E> StateGraph<S, E>
where
    S: Clone + Eq + Hash + Debug,
    E: Clone + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Creates the state on first mention; mentioning a state again is a
    /// no-op.
    pub fn ensure_state(&mut self, id: &S) {
        if !self.states.contains_key(id) {
            self.states.insert(id.clone(), StateNode::new(id.clone()));
            self.order.push(id.clone());
        }
    }

    pub fn contains(&self, id: &S) -> bool {
        self.states.contains_key(id)
    }

    pub fn node(&self, id: &S) -> Option<&StateNode<S, E>> {
        self.states.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: &S) -> Option<&mut StateNode<S, E>> {
        self.states.get_mut(id)
    }

    /// All states in declaration order.
    pub fn states(&self) -> impl Iterator<Item = &StateNode<S, E>> {
        self.order.iter().filter_map(|id| self.states.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn require(&self, id: &S) -> Result<&StateNode<S, E>> {
        self.node(id)
            .ok_or_else(|| StateMachineError::UnknownState(format!("{:?}", id)))
    }

    fn require_mut(&mut self, id: &S) -> Result<&mut StateNode<S, E>> {
        self.states
            .get_mut(id)
            .ok_or_else(|| StateMachineError::UnknownState(format!("{:?}", id)))
    }

    pub(crate) fn parent_of(&self, id: &S) -> Result<Option<S>> {
        Ok(self.require(id)?.parent().cloned())
    }

    pub(crate) fn depth_of(&self, id: &S) -> Result<usize> {
        Ok(self.require(id)?.depth())
    }

    /// Wires `child` under `parent`. A state has at most one parent, may not
    /// parent itself, and may not become its own ancestor; the depth of the
    /// child's whole subtree is recomputed.
    pub fn set_parent(&mut self, child: &S, parent: &S) -> Result<()> {
        if child == parent {
            return Err(StateMachineError::SelfParent(format!("{:?}", child)));
        }
        self.ensure_state(child);
        self.ensure_state(parent);

        if let Some(existing) = self.require(child)?.parent() {
            return Err(StateMachineError::AlreadyHasParent {
                child: format!("{:?}", child),
                parent: format!("{:?}", existing),
            });
        }

        let mut walker = Some(parent.clone());
        while let Some(ancestor) = walker {
            if ancestor == *child {
                return Err(StateMachineError::HierarchyCycle(format!("{:?}", child)));
            }
            walker = self.require(&ancestor)?.parent().cloned();
        }

        let parent_depth = self.require(parent)?.depth();
        self.require_mut(parent)?.add_child(child.clone());
        {
            let node = self.require_mut(child)?;
            node.set_parent(parent.clone());
            node.set_depth(parent_depth + 1);
        }

        // re-derive depth for everything below the re-parented state
        let mut stack = vec![child.clone()];
        while let Some(id) = stack.pop() {
            let (depth, children) = {
                let node = self.require(&id)?;
                (node.depth(), node.children().to_vec())
            };
            for sub in children {
                self.require_mut(&sub)?.set_depth(depth + 1);
                stack.push(sub);
            }
        }
        Ok(())
    }

    /// Marks `child` as the initial sub-state of `parent` and seeds the
    /// history memo so that deep history behaves predictably before the
    /// first exit.
    pub fn set_initial_child(&mut self, parent: &S, child: &S) -> Result<()> {
        let is_child = self.require(child)?.parent() == Some(parent);
        if !is_child {
            return Err(StateMachineError::NotADirectSubState {
                child: format!("{:?}", child),
                parent: format!("{:?}", parent),
            });
        }
        let node = self.require_mut(parent)?;
        node.set_initial_child(child.clone());
        node.set_last_active_child(child.clone());
        Ok(())
    }

    pub fn set_history(&mut self, id: &S, history: HistoryMode) {
        self.ensure_state(id);
        if let Some(node) = self.node_mut(id) {
            node.set_history(history);
        }
    }

    pub fn add_entry_action(&mut self, id: &S, action: Arc<dyn ActionHolder>) {
        self.ensure_state(id);
        if let Some(node) = self.node_mut(id) {
            node.add_entry_action(action);
        }
    }

    pub fn add_exit_action(&mut self, id: &S, action: Arc<dyn ActionHolder>) {
        self.ensure_state(id);
        if let Some(node) = self.node_mut(id) {
            node.add_exit_action(action);
        }
    }

    /// Appends a transition to `state`'s table for `event`, binding its
    /// source. Guarded transitions are evaluated in declaration order and an
    /// unguarded transition acts as the fall-through, so nothing may be
    /// declared after one.
    pub fn add_transition(&mut self, state: &S, event: E, mut transition: Transition<S>) -> Result<usize> {
        if let Some(bound) = transition.source() {
            return Err(StateMachineError::TransitionAlreadyBound(format!("{:?}", bound)));
        }
        if let Some(target) = transition.target().cloned() {
            self.ensure_state(&target);
        }
        self.ensure_state(state);
        let node = self.require_mut(state)?;
        if node.has_unguarded_transition(&event) {
            return Err(StateMachineError::UnguardedTransitionNotLast {
                state: format!("{:?}", state),
                event: format!("{:?}", event),
            });
        }
        transition.bind_source(state.clone());
        Ok(node.push_transition(event, transition))
    }

    pub(crate) fn transition_mut(&mut self, state: &S, event: &E, index: usize) -> Option<&mut Transition<S>> {
        self.node_mut(state)
            .and_then(|node| node.transition_mut(event, index))
    }

    pub(crate) fn set_last_active(&mut self, parent: &S, child: S) {
        if let Some(node) = self.node_mut(parent) {
            node.set_last_active_child(child);
        }
    }

    /// The `{superstate -> last active child}` map for every state with a
    /// non-null memo.
    pub fn history_memos(&self) -> HashMap<S, S> {
        self.states()
            .filter_map(|node| {
                node.last_active_child()
                    .map(|child| (node.id().clone(), child.clone()))
            })
            .collect()
    }
}

impl<S, E> Default for StateGraph<S, E>
where
    S: Clone + Eq + Hash + Debug,
    E: Clone + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
