//! Report sinks: a machine hands its name, states and configured initial
//! state to a report, which renders them however it likes.

use std::fmt::Debug;
use std::hash::Hash;
use std::io::Write;

use crate::error::DynError;
use crate::graph::StateNode;

pub trait StateMachineReport<S, E> {
    fn report(
        &mut self,
        name: &str,
        states: &[&StateNode<S, E>],
        initial_state: Option<&S>,
    ) -> Result<(), DynError>;
}

/// Writes one `Source;Event;Guard;Target;Actions` row per declared
/// transition. Internal transitions carry `internal transition` in the
/// target column; guard and action names come from their `describe()`.
pub struct CsvStateMachineReport<W: Write> {
    writer: W,
}

impl<W: Write> CsvStateMachineReport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<S, E, W> StateMachineReport<S, E> for CsvStateMachineReport<W>
where
    S: Clone + Eq + Hash + Debug,
    E: Clone + Eq + Hash + Debug,
    W: Write,
{
    fn report(
        &mut self,
        _name: &str,
        states: &[&StateNode<S, E>],
        _initial_state: Option<&S>,
    ) -> Result<(), DynError> {
        writeln!(self.writer, "Source;Event;Guard;Target;Actions")?;
        for state in states {
            for event in state.events() {
                for transition in state.transitions_for(event) {
                    let guard = transition
                        .guard()
                        .map(|guard| guard.describe())
                        .unwrap_or_default();
                    let target = transition
                        .target()
                        .map(|target| format!("{:?}", target))
                        .unwrap_or_else(|| "internal transition".to_string());
                    let actions = transition
                        .actions()
                        .iter()
                        .map(|action| action.describe())
                        .collect::<Vec<_>>()
                        .join(", ");
                    writeln!(
                        self.writer,
                        "{:?};{:?};{};{};{}",
                        state.id(),
                        event,
                        guard,
                        target,
                        actions
                    )?;
                }
            }
        }
        Ok(())
    }
}
