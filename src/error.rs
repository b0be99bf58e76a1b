use std::fmt;

/// Opaque error produced by user-supplied guards and actions.
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, StateMachineError>;

#[derive(Debug, thiserror::Error)]
pub enum StateMachineError {
    #[error("state '{0}' is not defined in the state graph")]
    UnknownState(String),
    #[error("state '{0}' cannot be its own parent")]
    SelfParent(String),
    #[error("state '{0}' cannot be made a descendant of itself")]
    HierarchyCycle(String),
    #[error("state '{child}' already has parent '{parent}'")]
    AlreadyHasParent { child: String, parent: String },
    #[error("state '{child}' is not a direct sub-state of '{parent}'")]
    NotADirectSubState { child: String, parent: String },
    #[error("state '{state}' already has an unguarded transition for event '{event}'; it must stay last")]
    UnguardedTransitionNotLast { state: String, event: String },
    #[error("transition is already bound to state '{0}'")]
    TransitionAlreadyBound(String),
    #[error("state machine is already initialized")]
    AlreadyInitialized,
    #[error("state machine is not initialized")]
    NotInitialized,
    #[error("initial state has already been entered")]
    InitialStateAlreadyEntered,
    #[error("initial state has not been entered yet")]
    InitialStateNotEntered,
    #[error("state machine cannot be loaded after initialization")]
    LoadAfterInitialization,
    #[error("state machine is already running")]
    AlreadyRunning,
    #[error("unhandled {origin} error: {source}")]
    Unhandled {
        origin: ExceptionOrigin,
        source: DynError,
    },
    #[error("state machine worker terminated abnormally: {0}")]
    WorkerPanic(String),
    #[error("persistence failed: {0}")]
    Persistence(DynError),
}

/// Where a user-code error was raised during a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionOrigin {
    Guard,
    TransitionAction,
    EntryAction,
    ExitAction,
}

impl fmt::Display for ExceptionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExceptionOrigin::Guard => "guard",
            ExceptionOrigin::TransitionAction => "transition action",
            ExceptionOrigin::EntryAction => "entry action",
            ExceptionOrigin::ExitAction => "exit action",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StateMachineError::UnknownState("Idle".into());
        assert_eq!(err.to_string(), "state 'Idle' is not defined in the state graph");

        let err = StateMachineError::UnguardedTransitionNotLast {
            state: "Idle".into(),
            event: "Start".into(),
        };
        assert!(err.to_string().contains("unguarded transition"));
    }

    #[test]
    fn test_unhandled_wraps_origin_and_source() {
        let source: DynError = "guard blew up".into();
        let err = StateMachineError::Unhandled {
            origin: ExceptionOrigin::Guard,
            source,
        };
        assert_eq!(err.to_string(), "unhandled guard error: guard blew up");
    }
}
