//! Saving and restoring the externally relevant machine state: the current
//! leaf (possibly still unset) and the per-superstate history memos.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DynError;

pub trait StateMachineSaver<S> {
    fn save_current_state(&mut self, state: Option<S>) -> Result<(), DynError>;

    fn save_history_states(&mut self, history: HashMap<S, S>) -> Result<(), DynError>;
}

pub trait StateMachineLoader<S> {
    fn load_current_state(&self) -> Result<Option<S>, DynError>;

    fn load_history_states(&self) -> Result<HashMap<S, S>, DynError>;
}

/// Serde-friendly snapshot implementing both sides of the persistence
/// contract. A machine saved before it entered its initial state round-trips
/// with an unset current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSnapshot<S: Eq + Hash> {
    pub current_state: Option<S>,
    #[serde(default)]
    pub history_states: HashMap<S, S>,
    pub saved_at: DateTime<Utc>,
}

impl<S: Eq + Hash> MachineSnapshot<S> {
    pub fn new() -> Self {
        Self {
            current_state: None,
            history_states: HashMap::new(),
            saved_at: Utc::now(),
        }
    }
}

impl<S: Eq + Hash> Default for MachineSnapshot<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Eq + Hash> StateMachineSaver<S> for MachineSnapshot<S> {
    fn save_current_state(&mut self, state: Option<S>) -> Result<(), DynError> {
        self.current_state = state;
        self.saved_at = Utc::now();
        Ok(())
    }

    fn save_history_states(&mut self, history: HashMap<S, S>) -> Result<(), DynError> {
        self.history_states = history;
        Ok(())
    }
}

impl<S: Clone + Eq + Hash> StateMachineLoader<S> for MachineSnapshot<S> {
    fn load_current_state(&self) -> Result<Option<S>, DynError> {
        Ok(self.current_state.clone())
    }

    fn load_history_states(&self) -> Result<HashMap<S, S>, DynError> {
        Ok(self.history_states.clone())
    }
}
