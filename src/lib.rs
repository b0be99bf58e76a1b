//! Stratum: a hierarchical finite-state-machine runtime
//!
//! A machine is described declaratively (states, nested sub-states,
//! entry/exit actions, guarded transitions with actions, history modes) and
//! then driven by events. Dispatch walks up the state hierarchy, guards are
//! evaluated in declaration order with fall-through, and re-entering a
//! superstate honors its shallow or deep history.
//!
//! Two drivers share the same engine: [`PassiveStateMachine`] pumps events
//! on the caller thread and is safe to fire from inside actions through an
//! [`EventSender`]; [`ActiveStateMachine`] runs a dedicated worker thread
//! consuming a shared queue with normal and priority insertion.
//!
//! # Example
//!
//! ```rust
//! use stratum::{FnAction, StateMachineDefinition};
//!
//! #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
//! enum Door {
//!     Open,
//!     Closed,
//! }
//!
//! #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
//! enum Input {
//!     Close,
//!     Open,
//! }
//!
//! # fn main() -> stratum::Result<()> {
//! let mut def = StateMachineDefinition::new("door");
//! def.in_state(Door::Open)
//!     .on(Input::Close)?
//!     .go_to(Door::Closed)
//!     .execute(FnAction::new("latch", || Ok(())));
//! def.in_state(Door::Closed).on(Input::Open)?.go_to(Door::Open);
//!
//! let mut door = def.build_passive();
//! door.initialize(Door::Open)?;
//! door.start()?;
//! door.fire(Input::Close)?;
//! assert_eq!(door.current_state(), Some(Door::Closed));
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod context;
pub mod driver;
mod engine;
pub mod error;
pub mod event;
pub mod extension;
pub mod graph;
pub mod machine;
pub mod persistence;
pub mod report;

pub use action::{ActionHolder, ArgumentError, FnAction, FnGuard, GuardHolder};
pub use context::{RecordKind, TransitionContext, TransitionInfo, TransitionRecord};
pub use driver::{ActiveStateMachine, EventSender, PassiveStateMachine};
pub use error::{DynError, ExceptionOrigin, Result, StateMachineError};
pub use event::EventInfo;
pub use extension::{Extension, LoggingExtension};
pub use graph::{HistoryMode, StateGraph, StateNode, Transition};
pub use machine::{
    HierarchyBuilder, MachineInfo, StateBuilder, StateMachine, StateMachineDefinition,
    TransitionBuilder,
};
pub use persistence::{MachineSnapshot, StateMachineLoader, StateMachineSaver};
pub use report::{CsvStateMachineReport, StateMachineReport};
