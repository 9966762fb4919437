use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{StateMap, Visibility};

/// Why an execution step failed. Timeouts are kept distinct from every
/// other failure so callers can react to them separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Tool,
    Cancelled,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

/// Side effects requested by an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub state_delta: StateMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to: Option<String>,
    /// Control signal: stop the enclosing loop or pause for approval.
    #[serde(default)]
    pub escalate: bool,
}

/// One event emitted by a runtime while executing a compiled workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(default)]
    pub invocation_id: String,
    /// Name of the node that authored the event.
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub actions: EventActions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    /// A streaming fragment; more content follows.
    #[serde(default)]
    pub partial: bool,
    pub timestamp: DateTime<Utc>,
    /// Stamped by the event filter under the annotate policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl Event {
    fn base(author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: String::new(),
            author: author.into(),
            content: None,
            actions: EventActions::default(),
            failure: None,
            partial: false,
            timestamp: Utc::now(),
            visibility: None,
        }
    }

    /// A final text reply.
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::base(author)
        }
    }

    /// A streaming text fragment.
    pub fn partial_text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            partial: true,
            ..Self::base(author)
        }
    }

    /// A state update with no text.
    pub fn state(author: impl Into<String>, delta: StateMap) -> Self {
        let mut event = Self::base(author);
        event.actions.state_delta = delta;
        event
    }

    /// A reported execution failure.
    pub fn failure(author: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            failure: Some(Failure {
                kind,
                message: message.into(),
            }),
            ..Self::base(author)
        }
    }

    /// An escalation control event (loop exit, approval pause).
    pub fn escalate(author: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut event = Self::base(author);
        event.content = Some(reason.into());
        event.actions.escalate = true;
        event
    }

    /// A hand-off to another node.
    pub fn transfer(author: impl Into<String>, target: impl Into<String>) -> Self {
        let mut event = Self::base(author);
        event.actions.transfer_to = Some(target.into());
        event
    }

    pub fn with_invocation(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = invocation_id.into();
        self
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    pub fn is_escalation(&self) -> bool {
        self.actions.escalate
    }

    /// Final response: complete, and not handing control elsewhere.
    pub fn is_final(&self) -> bool {
        !self.partial && self.actions.transfer_to.is_none()
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_constructors() {
        let e = Event::text("writer", "done");
        assert_eq!(e.content.as_deref(), Some("done"));
        assert!(e.is_final());
        assert!(!e.is_failure());

        let e = Event::partial_text("writer", "do");
        assert!(!e.is_final());
        assert!(e.is_partial());

        let e = Event::transfer("router", "billing");
        assert!(!e.is_final());
        assert_eq!(e.actions.transfer_to.as_deref(), Some("billing"));
    }

    #[test]
    fn test_failure_and_escalation_are_distinct() {
        let fail = Event::failure("slow", FailureKind::Timeout, "deadline 500ms exceeded");
        let esc = Event::escalate("gate", "awaiting approval");
        assert!(fail.is_failure() && !fail.is_escalation());
        assert!(esc.is_escalation() && !esc.is_failure());
        assert_eq!(fail.failure.unwrap().kind, FailureKind::Timeout);
    }

    #[test]
    fn test_state_event_serialization() {
        let mut delta = StateMap::new();
        delta.insert("x".into(), json!(1));
        let e = Event::state("b", delta).with_invocation("inv-1");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["actions"]["state_delta"]["x"], 1);
        assert_eq!(v["invocation_id"], "inv-1");
        assert!(v.get("content").is_none());
    }
}
