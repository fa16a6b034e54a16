//! Typed call lifecycle events.

use serde::{Deserialize, Serialize};

use crate::ids::{CallId, MembershipId, PersonId};

/// Status carried by a membership record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    /// The person is in the call.
    Joined,
    /// The person has left the call.
    Left,
    /// Any transitional value (`notified`, `declined`, ...).
    Other(String),
}

impl MembershipStatus {
    /// Maps the wire value to a status.
    #[must_use]
    pub fn from_wire(status: &str) -> Self {
        match status {
            "joined" => Self::Joined,
            "left" => Self::Left,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns true for `joined`.
    #[inline]
    #[must_use]
    pub fn is_joined(&self) -> bool {
        matches!(self, Self::Joined)
    }
}

/// A person's membership in a call changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    /// Who joined or changed status.
    pub person_id: PersonId,
    /// The call the membership belongs to.
    pub call_id: CallId,
    /// The membership (join session) itself.
    pub membership_id: MembershipId,
    /// New status of the membership.
    pub status: MembershipStatus,
}

/// A decoded record from the event stream.
///
/// Only `MembershipChanged` and `CallEnded` are forwarded to the
/// processor. `Unrecognized` records are logged and dropped by the
/// decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallEvent {
    /// A membership record.
    MembershipChanged(MembershipChange),
    /// A call resource reported `disconnected`.
    CallEnded {
        /// The call that ended.
        call_id: CallId,
    },
    /// Structurally valid record that is neither of the above.
    Unrecognized {
        /// Why the record was not classified.
        reason: String,
    },
}

impl CallEvent {
    /// Shorthand for a membership event.
    #[must_use]
    pub fn membership(
        person_id: impl Into<PersonId>,
        call_id: impl Into<CallId>,
        membership_id: impl Into<MembershipId>,
        status: MembershipStatus,
    ) -> Self {
        Self::MembershipChanged(MembershipChange {
            person_id: person_id.into(),
            call_id: call_id.into(),
            membership_id: membership_id.into(),
            status,
        })
    }

    /// Shorthand for a `joined` membership event.
    #[must_use]
    pub fn joined(
        person_id: impl Into<PersonId>,
        call_id: impl Into<CallId>,
        membership_id: impl Into<MembershipId>,
    ) -> Self {
        Self::membership(person_id, call_id, membership_id, MembershipStatus::Joined)
    }

    /// Shorthand for a call-ended event.
    #[must_use]
    pub fn ended(call_id: impl Into<CallId>) -> Self {
        Self::CallEnded {
            call_id: call_id.into(),
        }
    }

    /// Returns the call this event concerns, if any.
    #[must_use]
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            Self::MembershipChanged(change) => Some(&change.call_id),
            Self::CallEnded { call_id } => Some(call_id),
            Self::Unrecognized { .. } => None,
        }
    }

    /// Returns true unless the record was unrecognized.
    #[inline]
    #[must_use]
    pub fn is_relevant(&self) -> bool {
        !matches!(self, Self::Unrecognized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_wire() {
        assert_eq!(MembershipStatus::from_wire("joined"), MembershipStatus::Joined);
        assert_eq!(MembershipStatus::from_wire("left"), MembershipStatus::Left);
        assert_eq!(
            MembershipStatus::from_wire("notified"),
            MembershipStatus::Other("notified".to_string())
        );
    }

    #[test]
    fn test_call_id_accessor() {
        let ev = CallEvent::joined("p", "c1", "m");
        assert_eq!(ev.call_id().map(|c| c.as_str()), Some("c1"));
        assert_eq!(CallEvent::ended("c2").call_id().map(|c| c.as_str()), Some("c2"));

        let unknown = CallEvent::Unrecognized {
            reason: "x".to_string(),
        };
        assert!(unknown.call_id().is_none());
        assert!(!unknown.is_relevant());
    }
}
