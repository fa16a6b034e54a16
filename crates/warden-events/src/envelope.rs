//! Two-stage record decoding.
//!
//! The relay delivers each webhook it received as an envelope whose
//! `body` field holds the original request body, usually as an escaped
//! JSON string:
//!
//! ```text
//! { "id": "...", "body": "{\"resource\":\"callMemberships\",\"data\":{...}}" }
//! ```
//!
//! The inner notification's `data` object carries the event fields
//! `id`, `callId`, `personId` and `status`.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DecodeError, Result};
use crate::event::{CallEvent, MembershipStatus};
use crate::ids::{CallId, MembershipId, PersonId};

/// Envelope field holding the escaped payload.
pub const PAYLOAD_FIELD: &str = "body";

/// Call status that marks the end of a call.
pub const CALL_ENDED_STATUS: &str = "disconnected";

/// Resource name of call records.
pub const CALLS_RESOURCE: &str = "calls";

/// Resource name of call membership records.
pub const MEMBERSHIPS_RESOURCE: &str = "callMemberships";

/// Webhook notification as posted by the platform.
#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    data: Option<EventBody>,
}

/// The `data` object of a notification.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    person_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Unwraps a relay envelope and classifies the inner notification.
///
/// # Errors
///
/// Returns an error when the envelope or its payload is not decodable.
/// A decodable record that is neither a membership change nor a call
/// end yields `Ok(CallEvent::Unrecognized { .. })`.
pub fn decode_envelope(envelope: &Value) -> Result<CallEvent> {
    let object = envelope.as_object().ok_or(DecodeError::NotAnObject)?;
    let payload = object.get(PAYLOAD_FIELD).ok_or(DecodeError::MissingPayload)?;

    let notification: Notification = match payload {
        // Normal case: the original body, escaped into a string.
        Value::String(escaped) => serde_json::from_str(escaped)?,
        Value::Object(_) => serde_json::from_value(payload.clone())?,
        Value::Null => return Err(DecodeError::MissingPayload),
        other => {
            return Err(DecodeError::MalformedPayload(format!(
                "payload is a {}",
                json_kind(other)
            )))
        }
    };

    Ok(classify(notification))
}

fn classify(notification: Notification) -> CallEvent {
    let Some(body) = notification.data else {
        return unrecognized("notification has no data");
    };
    let resource = notification.resource.as_deref();

    let is_call_record =
        resource == Some(CALLS_RESOURCE) || (resource.is_none() && body.person_id.is_none());

    match body.status.as_deref() {
        Some(CALL_ENDED_STATUS) if is_call_record => {
            // Call records carry the call in `id`; prefer `callId` if present.
            match body.call_id.or(body.id) {
                Some(call_id) => CallEvent::CallEnded {
                    call_id: CallId::new(call_id),
                },
                None => unrecognized("call record without an id"),
            }
        }
        Some(status) => {
            if is_call_record {
                return unrecognized(format!("call status {status} is not tracked"));
            }
            match (body.person_id, body.call_id, body.id) {
                (Some(person_id), Some(call_id), Some(membership_id)) => {
                    CallEvent::membership(
                        PersonId::new(person_id),
                        CallId::new(call_id),
                        MembershipId::new(membership_id),
                        MembershipStatus::from_wire(status),
                    )
                }
                _ => unrecognized("membership record missing id, callId or personId"),
            }
        }
        None => unrecognized("record has no status"),
    }
}

fn unrecognized(reason: impl Into<String>) -> CallEvent {
    CallEvent::Unrecognized {
        reason: reason.into(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
