use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::action::ActionHolder;

use super::transition::Transition;

/// Policy for picking the descendant to enter when a superstate is
/// re-entered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryMode {
    /// Descend along initial sub-states.
    #[default]
    None,
    /// Re-enter the remembered direct child, then its initial chain.
    Shallow,
    /// Re-enter the remembered chain recursively.
    Deep,
}

/// A node of the state graph. Nodes reference each other by id; the arena
/// owning every node is [`super::StateGraph`].
pub struct StateNode<S, E> {
    id: S,
    parent: Option<S>,
    children: Vec<S>,
    initial_child: Option<S>,
    history: HistoryMode,
    last_active_child: Option<S>,
    depth: usize,
    entry_actions: Vec<Arc<dyn ActionHolder>>,
    exit_actions: Vec<Arc<dyn ActionHolder>>,
    transitions: HashMap<E, Vec<Transition<S>>>,
    event_order: Vec<E>,
}

impl<S, E> StateNode<S, E>
where
    S: Clone + Eq + Hash,
    E: Clone + Eq + Hash,
{
    pub(crate) fn new(id: S) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            initial_child: None,
            history: HistoryMode::default(),
            last_active_child: None,
            depth: 1,
            entry_actions: Vec::new(),
            exit_actions: Vec::new(),
            transitions: HashMap::new(),
            event_order: Vec::new(),
        }
    }

    pub fn id(&self) -> &S {
        &self.id
    }

    pub fn parent(&self) -> Option<&S> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[S] {
        &self.children
    }

    pub fn initial_child(&self) -> Option<&S> {
        self.initial_child.as_ref()
    }

    pub fn history(&self) -> HistoryMode {
        self.history
    }

    pub fn last_active_child(&self) -> Option<&S> {
        self.last_active_child.as_ref()
    }

    /// Hierarchy depth; a root state has depth 1.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn entry_actions(&self) -> &[Arc<dyn ActionHolder>] {
        &self.entry_actions
    }

    pub fn exit_actions(&self) -> &[Arc<dyn ActionHolder>] {
        &self.exit_actions
    }

    /// Transitions declared for `event`, in declaration order.
    pub fn transitions_for(&self, event: &E) -> &[Transition<S>] {
        self.transitions.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Events with at least one transition, in declaration order.
    pub fn events(&self) -> impl Iterator<Item = &E> {
        self.event_order.iter()
    }

    pub(crate) fn set_parent(&mut self, parent: S) {
        self.parent = Some(parent);
    }

    pub(crate) fn add_child(&mut self, child: S) {
        self.children.push(child);
    }

    pub(crate) fn set_initial_child(&mut self, child: S) {
        self.initial_child = Some(child);
    }

    pub(crate) fn set_history(&mut self, history: HistoryMode) {
        self.history = history;
    }

    pub(crate) fn set_last_active_child(&mut self, child: S) {
        self.last_active_child = Some(child);
    }

    pub(crate) fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub(crate) fn add_entry_action(&mut self, action: Arc<dyn ActionHolder>) {
        self.entry_actions.push(action);
    }

    pub(crate) fn add_exit_action(&mut self, action: Arc<dyn ActionHolder>) {
        self.exit_actions.push(action);
    }

    pub(crate) fn has_unguarded_transition(&self, event: &E) -> bool {
        self.transitions_for(event)
            .iter()
            .any(|transition| transition.guard().is_none())
    }

    pub(crate) fn push_transition(&mut self, event: E, transition: Transition<S>) -> usize {
        let list = self.transitions.entry(event.clone()).or_default();
        if !self.event_order.contains(&event) {
            self.event_order.push(event);
        }
        list.push(transition);
        list.len() - 1
    }

    pub(crate) fn transition_mut(&mut self, event: &E, index: usize) -> Option<&mut Transition<S>> {
        self.transitions.get_mut(event).and_then(|list| list.get_mut(index))
    }
}

impl<S: fmt::Debug, E: fmt::Debug> fmt::Debug for StateNode<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("initial_child", &self.initial_child)
            .field("history", &self.history)
            .field("last_active_child", &self.last_active_child)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}
