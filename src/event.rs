use chrono::{DateTime, Utc};
use serde_json::Value;

/// An event together with its optional argument, as it travels through a
/// driver queue.
#[derive(Debug, Clone)]
pub struct EventInfo<E> {
    pub id: E,
    pub argument: Option<Value>,
    pub queued_at: DateTime<Utc>,
}

impl<E> EventInfo<E> {
    pub fn new(id: E, argument: Option<Value>) -> Self {
        Self {
            id,
            argument,
            queued_at: Utc::now(),
        }
    }
}
