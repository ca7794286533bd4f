//! Typed producer API over the hub.
//!
//! Producers (billing webhooks, admin actions, CRUD services) hold a clone of
//! [`Notifier`] in `AppState` and call these instead of building envelopes by
//! hand. Everything here is fire-and-forget: the hub is a best-effort side
//! channel, not a reliable RPC, and nothing is retried.

use std::sync::Arc;

use nimbus_common::events::{
    CacheInvalidatePayload, MemberUpdatePayload, NotificationPayload, OrgUpdatePayload,
    SubscriptionUpdatePayload, UsageAlertPayload, UserUpdatePayload,
};
use nimbus_common::{Envelope, EventKind, OrgId, UserId};

use super::hub::Hub;

#[derive(Clone)]
pub struct Notifier {
    hub: Arc<Hub>,
}

impl Notifier {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Deliver an in-app notification to one user.
    pub async fn notify_user(&self, user_id: UserId, payload: NotificationPayload) {
        self.hub
            .send_to_user(user_id, Envelope::new(EventKind::Notification, payload))
            .await;
    }

    /// Deliver an in-app notification to every connected user.
    pub async fn notify_all(&self, payload: NotificationPayload) {
        self.hub
            .broadcast(Envelope::new(EventKind::Broadcast, payload))
            .await;
    }

    /// Tell a user their own record changed and should be refetched.
    pub async fn user_updated(&self, user_id: UserId) {
        self.hub
            .send_to_user(
                user_id,
                Envelope::new(EventKind::UserUpdate, UserUpdatePayload { user_id }),
            )
            .await;
    }

    /// Tell every connected client to drop the named query-cache keys.
    pub async fn cache_invalidate(&self, keys: Vec<String>) {
        self.hub
            .broadcast(Envelope::new(
                EventKind::CacheInvalidate,
                CacheInvalidatePayload { keys },
            ))
            .await;
    }

    /// Usage threshold crossed for one user's metered resource.
    pub async fn usage_alert(&self, user_id: UserId, metric: impl Into<String>, used: u64, limit: u64) {
        self.hub
            .send_to_user(
                user_id,
                Envelope::new(
                    EventKind::UsageAlert,
                    UsageAlertPayload {
                        metric: metric.into(),
                        used,
                        limit,
                    },
                ),
            )
            .await;
    }

    /// A user's subscription/plan changed.
    pub async fn subscription_updated(
        &self,
        user_id: UserId,
        plan: impl Into<String>,
        status: impl Into<String>,
    ) {
        self.hub
            .send_to_user(
                user_id,
                Envelope::new(
                    EventKind::SubscriptionUpdate,
                    SubscriptionUpdatePayload {
                        plan: plan.into(),
                        status: status.into(),
                    },
                ),
            )
            .await;
    }

    /// Organization settings changed; tell every connected member.
    pub fn org_updated(&self, org_id: OrgId) {
        self.hub
            .broadcast_to_org(org_id, Envelope::new(EventKind::OrgUpdate, OrgUpdatePayload { org_id }));
    }

    /// A member joined, left, or changed role: re-index the member's org set
    /// on the hub and announce the change to the organization.
    pub fn membership_changed(
        &self,
        org_id: OrgId,
        user_id: UserId,
        change: impl Into<String>,
        new_org_ids: Vec<OrgId>,
    ) {
        self.hub.set_memberships(user_id, new_org_ids);
        self.hub.broadcast_to_org(
            org_id,
            Envelope::new(
                EventKind::MemberUpdate,
                MemberUpdatePayload {
                    org_id,
                    user_id,
                    change: change.into(),
                },
            ),
        );
    }

    // -- presence passthroughs ----------------------------------------------

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.hub.is_online(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.hub.connected_count()
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.hub.connected_users()
    }
}
