//! Hierarchical dispatch: finds the firing transition by walking up the
//! ancestor chain, runs the exit/action/entry sequence for the chosen edge
//! and resolves the target to a leaf according to its history mode.

use std::fmt::Debug;
use std::hash::Hash;

use crate::context::{RecordKind, TransitionContext, TransitionInfo};
use crate::graph::{HistoryMode, StateGraph, Transition};
use crate::machine::notifier::Notifier;
use crate::Result;

pub(crate) enum DispatchOutcome<S> {
    /// No transition fired anywhere up the hierarchy.
    Declined,
    /// An internal transition ran its actions; the current state is
    /// unchanged.
    Internal,
    /// An external transition completed; the machine moved to a new leaf
    /// (which may equal the old one for a self transition).
    Moved(S),
}

struct Firing<S> {
    source: S,
    transition: Transition<S>,
}

enum GuardVerdict {
    Passed,
    Rejected,
    Faulted,
}

pub(crate) struct Engine<'a, S, E> {
    graph: &'a mut StateGraph<S, E>,
    notifier: &'a Notifier<'a, S, E>,
}

impl<'a, S, E> Engine<'a, S, E>
where
    S: Clone + Eq + Hash + Debug,
    E: Clone + Eq + Hash + Debug,
{
    pub(crate) fn new(graph: &'a mut StateGraph<S, E>, notifier: &'a Notifier<'a, S, E>) -> Self {
        Self { graph, notifier }
    }

    /// Enters every ancestor of the configured initial state from the root
    /// down, then descends along initial sub-states to a leaf.
    pub(crate) fn run_initial_entry(
        &mut self,
        initial: &S,
        context: &mut TransitionContext<S, E>,
    ) -> Result<S> {
        let mut chain = vec![initial.clone()];
        let mut walker = self.graph.parent_of(initial)?;
        while let Some(parent) = walker {
            walker = self.graph.parent_of(&parent)?;
            chain.push(parent);
        }
        for state in chain.iter().rev() {
            self.enter_state(state, context)?;
        }
        self.enter_initial_chain(initial, context)
    }

    pub(crate) fn dispatch(
        &mut self,
        current: &S,
        event: &E,
        context: &mut TransitionContext<S, E>,
    ) -> Result<DispatchOutcome<S>> {
        let firing = match self.find_firing(current, event, context)? {
            Some(firing) => firing,
            None => return Ok(DispatchOutcome::Declined),
        };

        let info = TransitionInfo {
            source: firing.source.clone(),
            target: firing.transition.target().cloned(),
            event: event.clone(),
        };
        self.notifier.transition_begin(context);
        self.notifier.executing_transition(&info);

        let outcome = match firing.transition.target().cloned() {
            None => {
                self.run_transition_actions(&firing.transition, &info, context);
                DispatchOutcome::Internal
            }
            Some(target) => {
                // unwind from the current leaf up to the state the dispatch
                // found the transition on
                let mut walker = current.clone();
                while walker != firing.source {
                    self.exit_state(&walker, context)?;
                    match self.graph.parent_of(&walker)? {
                        Some(parent) => walker = parent,
                        None => break,
                    }
                }
                self.traverse(
                    firing.source.clone(),
                    target.clone(),
                    &target,
                    &firing.transition,
                    &info,
                    context,
                )?;
                let leaf = self.enter_by_history(&target, context)?;
                DispatchOutcome::Moved(leaf)
            }
        };

        self.notifier.executed_transition(&info);
        Ok(outcome)
    }

    /// Walks from the current state up the ancestor chain; within a state,
    /// transitions are evaluated in declaration order and the first one
    /// whose guard passes fires.
    fn find_firing(
        &mut self,
        current: &S,
        event: &E,
        context: &mut TransitionContext<S, E>,
    ) -> Result<Option<Firing<S>>> {
        let mut walker = Some(current.clone());
        while let Some(state) = walker {
            let node = self.graph.require(&state)?;
            walker = node.parent().cloned();
            let candidates = node.transitions_for(event).to_vec();
            for transition in candidates {
                match self.evaluate_guard(&transition, &state, event, context) {
                    GuardVerdict::Passed => {
                        return Ok(Some(Firing {
                            source: state,
                            transition,
                        }))
                    }
                    GuardVerdict::Rejected => {
                        let info = TransitionInfo {
                            source: state.clone(),
                            target: transition.target().cloned(),
                            event: event.clone(),
                        };
                        self.notifier.skipped_transition(&info);
                    }
                    // the guard bracket has already been notified; the
                    // transition counts as not firing
                    GuardVerdict::Faulted => {}
                }
            }
        }
        Ok(None)
    }

    fn evaluate_guard(
        &self,
        transition: &Transition<S>,
        state: &S,
        event: &E,
        context: &mut TransitionContext<S, E>,
    ) -> GuardVerdict {
        let guard = match transition.guard() {
            None => return GuardVerdict::Passed,
            Some(guard) => guard.clone(),
        };
        match guard.execute(context.argument()) {
            Ok(true) => GuardVerdict::Passed,
            Ok(false) => GuardVerdict::Rejected,
            Err(error) => {
                let info = TransitionInfo {
                    source: state.clone(),
                    target: transition.target().cloned(),
                    event: event.clone(),
                };
                self.notifier.guard_error(&info, error, context);
                GuardVerdict::Faulted
            }
        }
    }

    /// Exit/action/entry resolution between the firing source and its
    /// declared target. The declared target rides along unchanged so that a
    /// walk up from a descendant recognizes it and re-enters it, while the
    /// recursion parameters converge.
    fn traverse(
        &mut self,
        source: S,
        target: S,
        declared_target: &S,
        transition: &Transition<S>,
        info: &TransitionInfo<S, E>,
        context: &mut TransitionContext<S, E>,
    ) -> Result<()> {
        if source == *declared_target {
            // self transition, or the walk up from a descendant arrived at
            // the declared target: exit and re-enter it
            self.exit_state(&source, context)?;
            self.run_transition_actions(transition, info, context);
            self.enter_state(&source, context)?;
        } else if source == target {
            // the walk down from the declared target arrived at the source:
            // the entries happen while the recursion unwinds
            self.run_transition_actions(transition, info, context);
        } else {
            let source_parent = self.graph.parent_of(&source)?;
            let target_parent = self.graph.parent_of(&target)?;
            if source_parent == target_parent {
                self.exit_state(&source, context)?;
                self.run_transition_actions(transition, info, context);
                self.enter_state(&target, context)?;
            } else if let (Some(source_parent), Some(target_parent)) =
                (source_parent.clone(), target_parent.clone())
            {
                let source_depth = self.graph.depth_of(&source)?;
                let target_depth = self.graph.depth_of(&target)?;
                if source_depth > target_depth {
                    self.exit_state(&source, context)?;
                    self.traverse(source_parent, target, declared_target, transition, info, context)?;
                } else if source_depth < target_depth {
                    self.traverse(source, target_parent, declared_target, transition, info, context)?;
                    self.enter_state(&target, context)?;
                } else {
                    self.exit_state(&source, context)?;
                    self.traverse(
                        source_parent,
                        target_parent,
                        declared_target,
                        transition,
                        info,
                        context,
                    )?;
                    self.enter_state(&target, context)?;
                }
            } else if let Some(source_parent) = source_parent {
                self.exit_state(&source, context)?;
                self.traverse(source_parent, target, declared_target, transition, info, context)?;
            } else if let Some(target_parent) = target_parent {
                self.traverse(source, target_parent, declared_target, transition, info, context)?;
                self.enter_state(&target, context)?;
            }
            // two parentless states fall under the sibling branch above
        }
        Ok(())
    }

    fn run_transition_actions(
        &mut self,
        transition: &Transition<S>,
        info: &TransitionInfo<S, E>,
        context: &mut TransitionContext<S, E>,
    ) {
        for action in transition.actions() {
            if let Err(error) = action.execute(context.argument()) {
                self.notifier.transition_action_error(info, error, context);
            }
        }
    }

    /// Resolves the freshly entered target to a leaf according to its
    /// history mode.
    fn enter_by_history(&mut self, target: &S, context: &mut TransitionContext<S, E>) -> Result<S> {
        let node = self.graph.require(target)?;
        let history = node.history();
        let last_active = node.last_active_child().cloned();
        match history {
            HistoryMode::None => self.enter_initial_chain(target, context),
            HistoryMode::Shallow => match last_active {
                Some(child) => {
                    self.enter_state(&child, context)?;
                    self.enter_initial_chain(&child, context)
                }
                None => self.enter_initial_chain(target, context),
            },
            HistoryMode::Deep => match last_active {
                Some(child) => self.enter_deep(&child, context),
                None => self.enter_initial_chain(target, context),
            },
        }
    }

    /// Descends along initial sub-states; `from` itself has already been
    /// entered.
    fn enter_initial_chain(&mut self, from: &S, context: &mut TransitionContext<S, E>) -> Result<S> {
        let mut leaf = from.clone();
        while let Some(next) = self.graph.require(&leaf)?.initial_child().cloned() {
            self.enter_state(&next, context)?;
            leaf = next;
        }
        Ok(leaf)
    }

    fn enter_deep(&mut self, state: &S, context: &mut TransitionContext<S, E>) -> Result<S> {
        self.enter_state(state, context)?;
        let last_active = self.graph.require(state)?.last_active_child().cloned();
        match last_active {
            Some(child) => self.enter_deep(&child, context),
            None => self.enter_initial_chain(state, context),
        }
    }

    fn enter_state(&mut self, state: &S, context: &mut TransitionContext<S, E>) -> Result<()> {
        context.record(RecordKind::Enter, state.clone());
        let actions = self.graph.require(state)?.entry_actions().to_vec();
        for action in actions {
            if let Err(error) = action.execute(context.argument()) {
                self.notifier.entry_action_error(state, error, context);
            }
        }
        Ok(())
    }

    fn exit_state(&mut self, state: &S, context: &mut TransitionContext<S, E>) -> Result<()> {
        context.record(RecordKind::Exit, state.clone());
        let (actions, parent) = {
            let node = self.graph.require(state)?;
            (node.exit_actions().to_vec(), node.parent().cloned())
        };
        for action in actions {
            if let Err(error) = action.execute(context.argument()) {
                self.notifier.exit_action_error(state, error, context);
            }
        }
        if let Some(parent) = parent {
            self.graph.set_last_active(&parent, state.clone());
        }
        Ok(())
    }
}
