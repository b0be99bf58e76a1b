//! The machine façade: owns the graph and the runtime state, emits
//! lifecycle notifications, and implements initialize / enter-initial /
//! fire / save / load / report.

pub mod definition;
pub(crate) mod notifier;

pub use definition::{HierarchyBuilder, StateBuilder, StateMachineDefinition, TransitionBuilder};

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::TransitionContext;
use crate::engine::{DispatchOutcome, Engine};
use crate::error::{DynError, Result, StateMachineError};
use crate::extension::{Extension, ExtensionList};
use crate::graph::StateGraph;
use crate::persistence::{StateMachineLoader, StateMachineSaver};
use crate::report::StateMachineReport;

use notifier::Notifier;

/// Shared handle with the machine's name and current state, handed to
/// extensions and event senders.
pub struct MachineInfo<S> {
    name: String,
    current: RwLock<Option<S>>,
}

impl<S> MachineInfo<S> {
    fn new(name: String) -> Self {
        Self {
            name,
            current: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S: Clone> MachineInfo<S> {
    pub fn current_state(&self) -> Option<S> {
        self.current.read().clone()
    }

    pub(crate) fn set_current(&self, state: S) {
        *self.current.write() = Some(state);
    }
}

type BeginHandler<S, E> = Box<dyn Fn(&MachineInfo<S>, &TransitionContext<S, E>) + Send>;
type CompletedHandler<S, E> = Box<dyn Fn(&MachineInfo<S>, &TransitionContext<S, E>, &S) + Send>;
type DeclinedHandler<S, E> = Box<dyn Fn(&MachineInfo<S>, &TransitionContext<S, E>) + Send>;
type ExceptionHandler<S, E> = Box<dyn Fn(&MachineInfo<S>, &TransitionContext<S, E>, &DynError) + Send>;

pub(crate) struct Handlers<S, E> {
    pub(crate) begin: Vec<BeginHandler<S, E>>,
    pub(crate) completed: Vec<CompletedHandler<S, E>>,
    pub(crate) declined: Vec<DeclinedHandler<S, E>>,
    pub(crate) exception: Vec<ExceptionHandler<S, E>>,
}

impl<S, E> Default for Handlers<S, E> {
    fn default() -> Self {
        Self {
            begin: Vec::new(),
            completed: Vec::new(),
            declined: Vec::new(),
            exception: Vec::new(),
        }
    }
}

/// A configured state machine with its runtime state. Drivers own one and
/// pump events into [`StateMachine::fire_with`].
pub struct StateMachine<S, E> {
    graph: StateGraph<S, E>,
    info: Arc<MachineInfo<S>>,
    extensions: ExtensionList<S, E>,
    handlers: Handlers<S, E>,
    initial: Option<S>,
    entered: bool,
    loaded: bool,
}

impl<S, E> StateMachine<S, E>
where
    S: Clone + Eq + Hash + Debug + 'static,
    E: Clone + Eq + Hash + Debug + 'static,
{
    pub(crate) fn new(name: String, graph: StateGraph<S, E>) -> Self {
        Self {
            graph,
            info: Arc::new(MachineInfo::new(name)),
            extensions: Arc::new(RwLock::new(Vec::new())),
            handlers: Handlers::default(),
            initial: None,
            entered: false,
            loaded: false,
        }
    }

    pub fn info(&self) -> Arc<MachineInfo<S>> {
        self.info.clone()
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }

    pub fn current_state(&self) -> Option<S> {
        self.info.current_state()
    }

    pub fn graph(&self) -> &StateGraph<S, E> {
        &self.graph
    }

    pub fn is_initialized(&self) -> bool {
        self.initial.is_some() || self.loaded
    }

    pub(crate) fn pending_initial_entry(&self) -> bool {
        self.initial.is_some() && !self.entered
    }

    pub(crate) fn extensions_handle(&self) -> ExtensionList<S, E> {
        self.extensions.clone()
    }

    pub(crate) fn extension_snapshot(&self) -> Vec<Arc<dyn Extension<S, E>>> {
        self.extensions.read().clone()
    }

    pub fn add_extension(&self, extension: Arc<dyn Extension<S, E>>) {
        self.extensions.write().push(extension);
    }

    pub fn clear_extensions(&self) {
        self.extensions.write().clear();
    }

    pub fn on_transition_begin(
        &mut self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>) + Send + 'static,
    ) {
        self.handlers.begin.push(Box::new(handler));
    }

    pub fn on_transition_completed(
        &mut self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>, &S) + Send + 'static,
    ) {
        self.handlers.completed.push(Box::new(handler));
    }

    pub fn on_transition_declined(
        &mut self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>) + Send + 'static,
    ) {
        self.handlers.declined.push(Box::new(handler));
    }

    /// Subscribes to user-code errors raised by guards and actions. With at
    /// least one subscriber those errors are delivered here and swallowed;
    /// without any, `fire` rethrows the first one wrapped.
    pub fn on_transition_exception(
        &mut self,
        handler: impl Fn(&MachineInfo<S>, &TransitionContext<S, E>, &DynError) + Send + 'static,
    ) {
        self.handlers.exception.push(Box::new(handler));
    }

    /// Records the initial state. May be called exactly once, before any
    /// dispatch.
    pub fn initialize(&mut self, initial_state: S) -> Result<()> {
        if self.is_initialized() {
            return Err(StateMachineError::AlreadyInitialized);
        }
        let extensions = self.extension_snapshot();
        let mut initial_state = initial_state;
        for extension in &extensions {
            extension.initializing_state_machine(&self.info, &mut initial_state);
        }
        if !self.graph.contains(&initial_state) {
            return Err(StateMachineError::UnknownState(format!("{:?}", initial_state)));
        }
        self.initial = Some(initial_state.clone());
        for extension in &extensions {
            extension.initialized_state_machine(&self.info, &initial_state);
        }
        Ok(())
    }

    /// Walks the initial state's entry chain down to a leaf, which becomes
    /// the current state. May only run once.
    pub fn enter_initial_state(&mut self) -> Result<()> {
        if !self.is_initialized() {
            return Err(StateMachineError::NotInitialized);
        }
        if self.entered {
            return Err(StateMachineError::InitialStateAlreadyEntered);
        }
        let initial = match self.initial.clone() {
            Some(initial) => initial,
            None => return Err(StateMachineError::NotInitialized),
        };

        let extensions = self.extension_snapshot();
        for extension in &extensions {
            extension.entering_initial_state(&self.info, &initial);
        }

        let mut context = TransitionContext::initial_entry();
        let leaf = {
            let notifier = Notifier::new(&self.info, &extensions, &self.handlers);
            let mut engine = Engine::new(&mut self.graph, &notifier);
            engine.run_initial_entry(&initial, &mut context)?
        };
        self.info.set_current(leaf.clone());
        self.entered = true;

        for extension in &extensions {
            extension.switched_state(&self.info, None, &leaf);
        }
        for extension in &extensions {
            extension.entered_initial_state(&self.info, &initial, &context);
        }
        self.rethrow_unhandled(context)
    }

    pub fn fire(&mut self, event: E) -> Result<()> {
        self.fire_with(event, None)
    }

    /// Dispatches one event through the hierarchy. The transition in
    /// progress always runs to completion; user-code errors go through the
    /// exception channel.
    pub fn fire_with(&mut self, event: E, argument: Option<Value>) -> Result<()> {
        if !self.is_initialized() {
            return Err(StateMachineError::NotInitialized);
        }
        if !self.entered && !self.loaded {
            return Err(StateMachineError::InitialStateNotEntered);
        }
        let current = match self.info.current_state() {
            Some(current) => current,
            None => return Err(StateMachineError::InitialStateNotEntered),
        };

        let extensions = self.extension_snapshot();
        let mut event = event;
        let mut argument = argument;
        for extension in &extensions {
            extension.firing_event(&self.info, &mut event, &mut argument);
        }

        let mut context = TransitionContext::for_event(current.clone(), event.clone(), argument);
        let notifier = Notifier::new(&self.info, &extensions, &self.handlers);
        let outcome = {
            let mut engine = Engine::new(&mut self.graph, &notifier);
            engine.dispatch(&current, &event, &mut context)?
        };

        match outcome {
            DispatchOutcome::Declined => {
                debug!(machine = self.info.name(), event = ?event, "transition declined");
                notifier.transition_declined(&context);
            }
            DispatchOutcome::Internal => {}
            DispatchOutcome::Moved(new_state) => {
                self.info.set_current(new_state.clone());
                for extension in &extensions {
                    extension.switched_state(&self.info, Some(&current), &new_state);
                }
                notifier.transition_completed(&context, &new_state);
            }
        }
        for extension in &extensions {
            extension.fired_event(&self.info, &context);
        }
        self.rethrow_unhandled(context)
    }

    /// Writes the current state (possibly still unset) and every non-null
    /// history memo.
    pub fn save(&self, saver: &mut dyn StateMachineSaver<S>) -> Result<()> {
        saver
            .save_current_state(self.info.current_state())
            .map_err(StateMachineError::Persistence)?;
        saver
            .save_history_states(self.graph.history_memos())
            .map_err(StateMachineError::Persistence)?;
        Ok(())
    }

    /// Restores a saved machine. Only legal before initialization; every
    /// history entry must name a direct child of its superstate. Installing
    /// a saved current state makes the machine ready to fire.
    pub fn load(&mut self, loader: &dyn StateMachineLoader<S>) -> Result<()> {
        if self.is_initialized() {
            return Err(StateMachineError::LoadAfterInitialization);
        }
        let current = loader
            .load_current_state()
            .map_err(StateMachineError::Persistence)?;
        let history = loader
            .load_history_states()
            .map_err(StateMachineError::Persistence)?;

        for (superstate, child) in &history {
            let node = self.graph.require(child)?;
            if node.parent() != Some(superstate) {
                return Err(StateMachineError::NotADirectSubState {
                    child: format!("{:?}", child),
                    parent: format!("{:?}", superstate),
                });
            }
        }
        for (superstate, child) in history {
            self.graph.set_last_active(&superstate, child);
        }

        if let Some(current) = current {
            self.graph.require(&current)?;
            self.info.set_current(current);
            self.loaded = true;
            self.entered = true;
        }
        Ok(())
    }

    /// Hands the machine's name, states and configured initial state to a
    /// report sink.
    pub fn report(&self, report: &mut dyn StateMachineReport<S, E>) -> Result<()> {
        let states: Vec<_> = self.graph.states().collect();
        report
            .report(self.info.name(), &states, self.initial.as_ref())
            .map_err(StateMachineError::Persistence)?;
        Ok(())
    }

    fn rethrow_unhandled(&mut self, mut context: TransitionContext<S, E>) -> Result<()> {
        let mut pending = context.take_pending();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > 1 {
            warn!(
                machine = self.info.name(),
                dropped = pending.len() - 1,
                "multiple unhandled errors in one dispatch; rethrowing the first"
            );
        }
        let (origin, source) = pending.remove(0);
        Err(StateMachineError::Unhandled { origin, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::action::{FnAction, FnGuard};
    use crate::error::ExceptionOrigin;
    use crate::graph::HistoryMode;
    use crate::persistence::MachineSnapshot;

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    enum State {
        A,
        B,
        C,
        C1,
        C2,
        D,
        D1,
    }

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    enum Ev {
        E1,
        E2,
        E3,
        E4,
    }

    /// Captures traces and notification counts, in the style of a test
    /// double observer.
    #[derive(Default)]
    struct Recorder {
        traces: Arc<Mutex<Vec<String>>>,
        skipped: Arc<Mutex<usize>>,
        switched: Arc<Mutex<Vec<(Option<State>, State)>>>,
        guard_handled: Arc<Mutex<usize>>,
    }

    impl Extension<State, Ev> for Recorder {
        fn entered_initial_state(
            &self,
            _machine: &MachineInfo<State>,
            _state: &State,
            context: &TransitionContext<State, Ev>,
        ) {
            self.traces.lock().push(context.describe_records());
        }

        fn fired_event(&self, _machine: &MachineInfo<State>, context: &TransitionContext<State, Ev>) {
            self.traces.lock().push(context.describe_records());
        }

        fn skipped_transition(
            &self,
            _machine: &MachineInfo<State>,
            _transition: &crate::context::TransitionInfo<State, Ev>,
        ) {
            *self.skipped.lock() += 1;
        }

        fn switched_state(
            &self,
            _machine: &MachineInfo<State>,
            old_state: Option<&State>,
            new_state: &State,
        ) {
            self.switched.lock().push((old_state.copied(), *new_state));
        }

        fn handled_guard_exception(
            &self,
            _machine: &MachineInfo<State>,
            _transition: &crate::context::TransitionInfo<State, Ev>,
            _error: &DynError,
        ) {
            *self.guard_handled.lock() += 1;
        }
    }

    /// `A` parent of `{B, C}` with `B` initial, `D` a separate root.
    fn fixture() -> StateMachineDefinition<State, Ev> {
        let mut def = StateMachineDefinition::new("fixture");
        def.define_hierarchy_on(State::A)
            .with_initial_sub_state(State::B)
            .unwrap()
            .with_sub_state(State::C)
            .unwrap();
        def.in_state(State::D);
        def
    }

    /// `A` parent of `{B, C}`, `C` parent of `{C1, C2}`, `D` a separate
    /// root; `B` and `C1` initial.
    fn nested_fixture(history: HistoryMode) -> StateMachineDefinition<State, Ev> {
        let mut def = fixture();
        def.define_hierarchy_on(State::C)
            .with_initial_sub_state(State::C1)
            .unwrap()
            .with_sub_state(State::C2)
            .unwrap();
        def.define_hierarchy_on(State::A).with_history(history);
        def.in_state(State::B).on(Ev::E1).unwrap().go_to(State::C2);
        def.in_state(State::C2).on(Ev::E2).unwrap().go_to(State::D);
        def.in_state(State::D).on(Ev::E3).unwrap().go_to(State::A);
        def
    }

    fn machine_with_recorder(
        def: StateMachineDefinition<State, Ev>,
    ) -> (StateMachine<State, Ev>, Recorder) {
        let machine = def.build();
        let recorder = Recorder::default();
        let handle = Recorder {
            traces: recorder.traces.clone(),
            skipped: recorder.skipped.clone(),
            switched: recorder.switched.clone(),
            guard_handled: recorder.guard_handled.clone(),
        };
        machine.add_extension(Arc::new(handle));
        (machine, recorder)
    }

    fn last_trace(recorder: &Recorder) -> String {
        recorder.traces.lock().last().cloned().unwrap_or_default()
    }

    #[test]
    fn test_initial_entry_descends_to_leaf() {
        let (mut machine, recorder) = machine_with_recorder(fixture());
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        assert_eq!(machine.current_state(), Some(State::B));
        assert_eq!(last_trace(&recorder), "enter A -> enter B");
        assert_eq!(*recorder.switched.lock(), vec![(None, State::B)]);
    }

    #[test]
    fn test_sibling_transition_updates_history_memo() {
        let mut def = fixture();
        def.in_state(State::B).on(Ev::E1).unwrap().go_to(State::C);
        let (mut machine, recorder) = machine_with_recorder(def);
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E1).unwrap();

        assert_eq!(machine.current_state(), Some(State::C));
        assert_eq!(last_trace(&recorder), "exit B -> enter C");
        assert_eq!(
            machine.graph().node(&State::A).unwrap().last_active_child(),
            Some(&State::C)
        );
    }

    #[test]
    fn test_dispatch_ascends_to_find_transition() {
        // the edge lives on the ancestor; A itself is neither exited nor
        // re-entered
        let mut def = fixture();
        def.in_state(State::A).on(Ev::E2).unwrap().go_to(State::C);
        let (mut machine, recorder) = machine_with_recorder(def);
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E2).unwrap();

        assert_eq!(machine.current_state(), Some(State::C));
        assert_eq!(last_trace(&recorder), "exit B -> enter C");
    }

    #[test]
    fn test_descendant_to_ancestor_reenters_the_ancestor() {
        let mut def = fixture();
        def.in_state(State::B).on(Ev::E1).unwrap().go_to(State::C);
        def.in_state(State::C).on(Ev::E3).unwrap().go_to(State::A);
        let (mut machine, recorder) = machine_with_recorder(def);
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();
        machine.fire(Ev::E1).unwrap();

        machine.fire(Ev::E3).unwrap();

        assert_eq!(machine.current_state(), Some(State::B));
        assert_eq!(
            last_trace(&recorder),
            "exit C -> exit A -> enter A -> enter B"
        );
    }

    #[test]
    fn test_self_transition_exits_and_reenters() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let mut def = fixture();
        def.in_state(State::B)
            .on(Ev::E4)
            .unwrap()
            .go_to(State::B)
            .execute(FnAction::new("count", move || {
                *counter.lock() += 1;
                Ok(())
            }));
        let (mut machine, recorder) = machine_with_recorder(def);
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E4).unwrap();

        assert_eq!(machine.current_state(), Some(State::B));
        assert_eq!(last_trace(&recorder), "exit B -> enter B");
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_internal_transition_changes_nothing() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let mut def = fixture();
        def.in_state(State::B)
            .on(Ev::E4)
            .unwrap()
            .execute(FnAction::new("count", move || {
                *counter.lock() += 1;
                Ok(())
            }));
        let (mut machine, recorder) = machine_with_recorder(def);
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E4).unwrap();

        assert_eq!(machine.current_state(), Some(State::B));
        assert_eq!(*hits.lock(), 1);
        // no exits, no entries
        assert_eq!(last_trace(&recorder), "");
        assert_eq!(recorder.switched.lock().len(), 1);
    }

    #[test]
    fn test_cross_hierarchy_transition_meets_at_common_level() {
        let mut def = nested_fixture(HistoryMode::None);
        def.define_hierarchy_on(State::D)
            .with_initial_sub_state(State::D1)
            .unwrap();
        def.in_state(State::C2).on(Ev::E4).unwrap().go_to(State::D1);
        let (mut machine, recorder) = machine_with_recorder(def);
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();
        machine.fire(Ev::E1).unwrap();

        machine.fire(Ev::E4).unwrap();

        assert_eq!(machine.current_state(), Some(State::D1));
        assert_eq!(
            last_trace(&recorder),
            "exit C2 -> exit C -> exit A -> enter D -> enter D1"
        );
    }

    #[test]
    fn test_deep_history_restores_the_remembered_chain() {
        let (mut machine, recorder) = machine_with_recorder(nested_fixture(HistoryMode::Deep));
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E1).unwrap();
        assert_eq!(machine.current_state(), Some(State::C2));
        machine.fire(Ev::E2).unwrap();
        assert_eq!(machine.current_state(), Some(State::D));

        machine.fire(Ev::E3).unwrap();

        assert_eq!(machine.current_state(), Some(State::C2));
        assert_eq!(
            last_trace(&recorder),
            "exit D -> enter A -> enter C -> enter C2"
        );
    }

    #[test]
    fn test_shallow_history_restores_child_then_initial_chain() {
        let (mut machine, recorder) = machine_with_recorder(nested_fixture(HistoryMode::Shallow));
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E1).unwrap();
        machine.fire(Ev::E2).unwrap();
        machine.fire(Ev::E3).unwrap();

        // the remembered direct child is C, but below C the initial chain
        // wins over C's own memo
        assert_eq!(machine.current_state(), Some(State::C1));
        assert_eq!(
            last_trace(&recorder),
            "exit D -> enter A -> enter C -> enter C1"
        );
    }

    #[test]
    fn test_no_history_restores_initial_chain() {
        let (mut machine, recorder) = machine_with_recorder(nested_fixture(HistoryMode::None));
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E1).unwrap();
        machine.fire(Ev::E2).unwrap();
        machine.fire(Ev::E3).unwrap();

        assert_eq!(machine.current_state(), Some(State::B));
        assert_eq!(last_trace(&recorder), "exit D -> enter A -> enter B");
    }

    #[test]
    fn test_guard_fall_through_to_unguarded_transition() {
        let mut def = fixture();
        def.in_state(State::B)
            .on(Ev::E1)
            .unwrap()
            .only_if(FnGuard::new("never", || Ok(false)))
            .go_to(State::D)
            .on(Ev::E1)
            .unwrap()
            .go_to(State::C);
        let (mut machine, recorder) = machine_with_recorder(def);
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E1).unwrap();

        assert_eq!(machine.current_state(), Some(State::C));
        assert_eq!(*recorder.skipped.lock(), 1);
    }

    #[test]
    fn test_guard_error_counts_as_false() {
        let mut def = fixture();
        def.in_state(State::B)
            .on(Ev::E1)
            .unwrap()
            .only_if(FnGuard::new("broken", || Err("guard broke".into())))
            .go_to(State::D)
            .on(Ev::E1)
            .unwrap()
            .go_to(State::C);
        let (mut machine, recorder) = machine_with_recorder(def);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        machine.on_transition_exception(move |_machine, _context, error| {
            sink.lock().push(error.to_string());
        });
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E1).unwrap();

        assert_eq!(machine.current_state(), Some(State::C));
        assert_eq!(*recorder.guard_handled.lock(), 1);
        assert_eq!(*errors.lock(), vec!["guard broke".to_string()]);
    }

    #[test]
    fn test_unhandled_action_error_is_rethrown_after_completion() {
        let mut def = fixture();
        def.in_state(State::B)
            .on(Ev::E1)
            .unwrap()
            .go_to(State::C)
            .execute(FnAction::new("explode", || Err("action broke".into())));
        let (mut machine, _recorder) = machine_with_recorder(def);
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        let err = machine.fire(Ev::E1).unwrap_err();

        assert!(matches!(
            err,
            StateMachineError::Unhandled {
                origin: ExceptionOrigin::TransitionAction,
                ..
            }
        ));
        // the transition still ran to completion
        assert_eq!(machine.current_state(), Some(State::C));
    }

    #[test]
    fn test_subscribed_exception_channel_swallows_errors() {
        let mut def = fixture();
        def.in_state(State::B)
            .on(Ev::E1)
            .unwrap()
            .go_to(State::C)
            .execute(FnAction::new("explode", || Err("action broke".into())));
        let (mut machine, _recorder) = machine_with_recorder(def);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        machine.on_transition_exception(move |_machine, _context, error| {
            sink.lock().push(error.to_string());
        });
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E1).unwrap();

        assert_eq!(machine.current_state(), Some(State::C));
        assert_eq!(*errors.lock(), vec!["action broke".to_string()]);
    }

    #[test]
    fn test_actions_run_exactly_once_per_fired_transition() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let mut def = fixture();
        def.in_state(State::B).on(Ev::E1).unwrap().go_to(State::C);
        def.in_state(State::C)
            .on(Ev::E3)
            .unwrap()
            .go_to(State::A)
            .execute(FnAction::new("count", move || {
                *counter.lock() += 1;
                Ok(())
            }));
        let (mut machine, _recorder) = machine_with_recorder(def);
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();
        machine.fire(Ev::E1).unwrap();

        // crosses two hierarchy levels, still one action execution
        machine.fire(Ev::E3).unwrap();

        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_declined_event_reports_and_keeps_state() {
        let (mut machine, _recorder) = machine_with_recorder(fixture());
        let declined = Arc::new(Mutex::new(0));
        let counter = declined.clone();
        machine.on_transition_declined(move |_machine, _context| {
            *counter.lock() += 1;
        });
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E3).unwrap();

        assert_eq!(machine.current_state(), Some(State::B));
        assert_eq!(*declined.lock(), 1);
    }

    #[test]
    fn test_lifecycle_guards() {
        let mut machine = fixture().build();
        assert!(matches!(
            machine.fire(Ev::E1),
            Err(StateMachineError::NotInitialized)
        ));
        assert!(matches!(
            machine.enter_initial_state(),
            Err(StateMachineError::NotInitialized)
        ));

        machine.initialize(State::A).unwrap();
        assert!(matches!(
            machine.fire(Ev::E1),
            Err(StateMachineError::InitialStateNotEntered)
        ));
        assert!(matches!(
            machine.initialize(State::D),
            Err(StateMachineError::AlreadyInitialized)
        ));

        machine.enter_initial_state().unwrap();
        assert!(matches!(
            machine.enter_initial_state(),
            Err(StateMachineError::InitialStateAlreadyEntered)
        ));
    }

    #[test]
    fn test_initialize_rejects_unknown_state() {
        let mut machine = StateMachineDefinition::<State, Ev>::new("empty").build();
        assert!(matches!(
            machine.initialize(State::A),
            Err(StateMachineError::UnknownState(_))
        ));
    }

    #[test]
    fn test_extension_may_rewrite_initial_state() {
        struct PickD;
        impl Extension<State, Ev> for PickD {
            fn initializing_state_machine(
                &self,
                _machine: &MachineInfo<State>,
                initial_state: &mut State,
            ) {
                *initial_state = State::D;
            }
        }

        let mut machine = fixture().build();
        machine.add_extension(Arc::new(PickD));
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        assert_eq!(machine.current_state(), Some(State::D));
    }

    #[test]
    fn test_extension_may_rewrite_fired_event() {
        struct AlwaysE2;
        impl Extension<State, Ev> for AlwaysE2 {
            fn firing_event(
                &self,
                _machine: &MachineInfo<State>,
                event: &mut Ev,
                _argument: &mut Option<Value>,
            ) {
                *event = Ev::E2;
            }
        }

        let mut def = fixture();
        def.in_state(State::B).on(Ev::E2).unwrap().go_to(State::C);
        let mut machine = def.build();
        machine.add_extension(Arc::new(AlwaysE2));
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E1).unwrap();

        assert_eq!(machine.current_state(), Some(State::C));
    }

    #[test]
    fn test_save_load_round_trip() {
        let (mut machine, _recorder) = machine_with_recorder(nested_fixture(HistoryMode::Deep));
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();
        machine.fire(Ev::E1).unwrap();
        machine.fire(Ev::E2).unwrap();

        let mut snapshot = MachineSnapshot::new();
        machine.save(&mut snapshot).unwrap();

        let mut fresh = nested_fixture(HistoryMode::Deep).build();
        fresh.load(&snapshot).unwrap();

        assert_eq!(fresh.current_state(), machine.current_state());
        assert_eq!(fresh.graph().history_memos(), machine.graph().history_memos());

        // the restored machine can fire straight away and honors history
        fresh.fire(Ev::E3).unwrap();
        assert_eq!(fresh.current_state(), Some(State::C2));
    }

    #[test]
    fn test_save_before_entering_round_trips_as_uninitialized() {
        let mut machine = fixture().build();
        machine.initialize(State::A).unwrap();

        let mut snapshot = MachineSnapshot::new();
        machine.save(&mut snapshot).unwrap();
        assert_eq!(snapshot.current_state, None);

        let mut fresh = fixture().build();
        fresh.load(&snapshot).unwrap();
        assert_eq!(fresh.current_state(), None);
        // loading no current state leaves initialization open
        fresh.initialize(State::A).unwrap();
        fresh.enter_initial_state().unwrap();
        assert_eq!(fresh.current_state(), Some(State::B));
    }

    #[test]
    fn test_load_after_initialization_fails() {
        let mut machine = fixture().build();
        machine.initialize(State::A).unwrap();

        let snapshot: MachineSnapshot<State> = MachineSnapshot::new();
        assert!(matches!(
            machine.load(&snapshot),
            Err(StateMachineError::LoadAfterInitialization)
        ));
    }

    #[test]
    fn test_load_rejects_history_entry_that_is_not_a_child() {
        let mut machine = fixture().build();
        let mut snapshot = MachineSnapshot::new();
        snapshot.history_states.insert(State::A, State::D);

        assert!(matches!(
            machine.load(&snapshot),
            Err(StateMachineError::NotADirectSubState { .. })
        ));
    }

    #[test]
    fn test_typed_action_receives_event_argument() {
        let floors = Arc::new(Mutex::new(Vec::new()));
        let sink = floors.clone();
        let mut def = fixture();
        def.in_state(State::B)
            .on(Ev::E1)
            .unwrap()
            .go_to(State::C)
            .execute(FnAction::with_arg("record floor", move |floor: u32| {
                sink.lock().push(floor);
                Ok(())
            }));
        let (mut machine, _recorder) = machine_with_recorder(def);
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine
            .fire_with(Ev::E1, Some(serde_json::json!(12)))
            .unwrap();

        assert_eq!(*floors.lock(), vec![12]);
    }

    #[test]
    fn test_transition_begin_and_completed_handlers() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut def = fixture();
        def.in_state(State::B).on(Ev::E1).unwrap().go_to(State::C);
        let mut machine = def.build();
        let begin_order = order.clone();
        machine.on_transition_begin(move |_machine, _context| {
            begin_order.lock().push("begin".to_string());
        });
        let completed_order = order.clone();
        machine.on_transition_completed(move |_machine, _context, new_state| {
            completed_order.lock().push(format!("completed:{:?}", new_state));
        });
        machine.initialize(State::A).unwrap();
        machine.enter_initial_state().unwrap();

        machine.fire(Ev::E1).unwrap();

        assert_eq!(*order.lock(), vec!["begin".to_string(), "completed:C".to_string()]);
    }
}
