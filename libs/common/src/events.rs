//! Wire event model shared by the realtime hub and its producers.
//!
//! Every WebSocket frame carries exactly one [`Envelope`]: a `type` tag drawn
//! from the fixed [`EventKind`] catalog plus an optional JSON payload. The
//! hub treats payloads as opaque; the typed structs below exist so producers
//! build well-formed payloads instead of hand-rolled JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{OrgId, UserId};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The fixed catalog of envelope tags.
///
/// Inbound, only `ping` is acted on; every other tag (including ones this
/// version has never heard of, via the catch-all) is logged and ignored so
/// newer clients don't break older servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Notification,
    UserUpdate,
    Broadcast,
    Ping,
    Pong,
    CacheInvalidate,
    UsageAlert,
    SubscriptionUpdate,
    OrgUpdate,
    MemberUpdate,
    /// Forward-compatibility catch-all for unrecognized inbound tags.
    /// Never produced by the server.
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One wire frame: `{ "type": <tag>, "payload": <object-or-omitted> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    /// Build an envelope from a serializable payload.
    pub fn new(kind: EventKind, payload: impl Serialize) -> Self {
        Self {
            kind,
            payload: Some(serde_json::to_value(payload).unwrap_or_default()),
        }
    }

    /// Build a payload-less envelope (`ping` / `pong`).
    pub fn bare(kind: EventKind) -> Self {
        Self { kind, payload: None }
    }

    pub fn ping() -> Self {
        Self::bare(EventKind::Ping)
    }

    pub fn pong() -> Self {
        Self::bare(EventKind::Pong)
    }
}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

/// An in-app notification for one user (or all users when broadcast).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Optional deep link the client should navigate to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: None,
            link: None,
            sent_at: Utc::now(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Tells a client its cached copy of a user record is stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdatePayload {
    pub user_id: UserId,
}

/// Tells clients to drop the named query-cache keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInvalidatePayload {
    pub keys: Vec<String>,
}

/// Billing/usage threshold crossed for a metered resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageAlertPayload {
    pub metric: String,
    pub used: u64,
    pub limit: u64,
}

/// A subscription/plan change relevant to one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionUpdatePayload {
    pub plan: String,
    pub status: String,
}

/// Organization settings changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgUpdatePayload {
    pub org_id: OrgId,
}

/// A member joined, left, or changed role within an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberUpdatePayload {
    pub org_id: OrgId,
    pub user_id: UserId,
    /// "added", "removed", or "updated".
    pub change: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_shape() {
        let env = Envelope::new(
            EventKind::Notification,
            NotificationPayload::new("Invoice ready").with_body("March invoice is available"),
        );
        let json: Value = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "notification");
        assert_eq!(json["payload"]["title"], "Invoice ready");
        assert_eq!(json["payload"]["body"], "March invoice is available");
    }

    #[test]
    fn bare_envelope_omits_payload() {
        let json = serde_json::to_string(&Envelope::pong()).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn inbound_ping_parses() {
        let env: Envelope = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(env.kind, EventKind::Ping);
        assert!(env.payload.is_none());
    }

    #[test]
    fn unknown_inbound_tag_is_not_an_error() {
        let env: Envelope =
            serde_json::from_str(r#"{"type":"typing_start","payload":{"channel":"c1"}}"#).unwrap();
        assert_eq!(env.kind, EventKind::Unknown);
        assert!(env.payload.is_some());
    }

    #[test]
    fn catalog_tags_round_trip() {
        for (kind, tag) in [
            (EventKind::Notification, "notification"),
            (EventKind::UserUpdate, "user_update"),
            (EventKind::Broadcast, "broadcast"),
            (EventKind::Ping, "ping"),
            (EventKind::Pong, "pong"),
            (EventKind::CacheInvalidate, "cache_invalidate"),
            (EventKind::UsageAlert, "usage_alert"),
            (EventKind::SubscriptionUpdate, "subscription_update"),
            (EventKind::OrgUpdate, "org_update"),
            (EventKind::MemberUpdate, "member_update"),
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), tag);
            let parsed: EventKind = serde_json::from_value(Value::String(tag.into())).unwrap();
            assert_eq!(parsed, kind);
        }
    }
}
