//! Guard and action capabilities attached to states and transitions.
//!
//! Both capabilities receive the opaque event argument and describe
//! themselves for reporting. The `with_arg` constructors deserialize the
//! argument into a typed value and fail cleanly when it is missing or has
//! the wrong shape; those failures travel through the machine's exception
//! channel like any other user-code error.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DynError;

pub trait ActionHolder: Send + Sync {
    fn execute(&self, argument: Option<&Value>) -> std::result::Result<(), DynError>;

    fn describe(&self) -> String;
}

pub trait GuardHolder: Send + Sync {
    fn execute(&self, argument: Option<&Value>) -> std::result::Result<bool, DynError>;

    fn describe(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum ArgumentError {
    #[error("event argument is required but none was supplied")]
    Missing,
    #[error("event argument has the wrong shape: {0}")]
    Mismatch(#[from] serde_json::Error),
}

/// A closure-backed action.
pub struct FnAction {
    description: String,
    action: Box<dyn Fn(Option<&Value>) -> std::result::Result<(), DynError> + Send + Sync>,
}

impl FnAction {
    pub fn new(
        description: impl Into<String>,
        action: impl Fn() -> std::result::Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            action: Box::new(move |_| action()),
        }
    }

    /// Action over a typed event argument.
    pub fn with_arg<T: DeserializeOwned>(
        description: impl Into<String>,
        action: impl Fn(T) -> std::result::Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            action: Box::new(move |argument| {
                let value = argument.ok_or(ArgumentError::Missing)?;
                let typed: T = serde_json::from_value(value.clone()).map_err(ArgumentError::Mismatch)?;
                action(typed)
            }),
        }
    }
}

impl ActionHolder for FnAction {
    fn execute(&self, argument: Option<&Value>) -> std::result::Result<(), DynError> {
        (self.action)(argument)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// A closure-backed guard predicate.
pub struct FnGuard {
    description: String,
    guard: Box<dyn Fn(Option<&Value>) -> std::result::Result<bool, DynError> + Send + Sync>,
}

impl FnGuard {
    pub fn new(
        description: impl Into<String>,
        guard: impl Fn() -> std::result::Result<bool, DynError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            guard: Box::new(move |_| guard()),
        }
    }

    /// Guard over a typed event argument.
    pub fn with_arg<T: DeserializeOwned>(
        description: impl Into<String>,
        guard: impl Fn(T) -> std::result::Result<bool, DynError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            guard: Box::new(move |argument| {
                let value = argument.ok_or(ArgumentError::Missing)?;
                let typed: T = serde_json::from_value(value.clone()).map_err(ArgumentError::Mismatch)?;
                guard(typed)
            }),
        }
    }
}

impl GuardHolder for FnGuard {
    fn execute(&self, argument: Option<&Value>) -> std::result::Result<bool, DynError> {
        (self.guard)(argument)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
