//! The set of upstream feeds callwarden registers.
//!
//! | Resource | Event | Filter |
//! |----------|-------|--------|
//! | `callMemberships` | `created` | `status=joined&personId=<id>` (per monitored person) |
//! | `callMemberships` | `updated` | `status=joined&personId=<id>` (per monitored person) |
//! | `calls` | `updated` | `status=disconnected` |

use serde::{Deserialize, Serialize};
use warden_events::{PersonId, CALLS_RESOURCE, CALL_ENDED_STATUS, MEMBERSHIPS_RESOURCE};

/// Owner scope of organization-wide feeds.
pub const ORG_OWNED: &str = "org";

/// One upstream feed registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// Display name.
    pub name: String,
    /// Resource type.
    pub resource: String,
    /// Event type.
    pub event: String,
    /// Server-side filter.
    pub filter: String,
    /// Ownership scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
}

impl SubscriptionSpec {
    fn org(name: &str, resource: &str, event: &str, filter: String) -> Self {
        Self {
            name: name.to_string(),
            resource: resource.to_string(),
            event: event.to_string(),
            filter,
            owned_by: Some(ORG_OWNED.to_string()),
        }
    }
}

/// Feeds needed to watch `people`, membership feeds first.
#[must_use]
pub fn subscription_plan(people: &[PersonId]) -> Vec<SubscriptionSpec> {
    let mut plan = Vec::with_capacity(people.len() * 2 + 1);

    for event in ["created", "updated"] {
        for person in people {
            plan.push(SubscriptionSpec::org(
                "callwarden-joined",
                MEMBERSHIPS_RESOURCE,
                event,
                format!("status=joined&personId={person}"),
            ));
        }
    }

    plan.push(SubscriptionSpec::org(
        "callwarden-ended",
        CALLS_RESOURCE,
        "updated",
        format!("status={CALL_ENDED_STATUS}"),
    ));

    plan
}
