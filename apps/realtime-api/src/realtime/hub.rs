//! The connection hub: a single control loop owning the identity and
//! organization membership maps.
//!
//! All map mutation is serialized through the control loop's event channels
//! (register, unregister, dispatch) or happens under the same write lock
//! (membership replacement), so concurrent producers never observe the maps
//! in a torn state. Queries are snapshot-and-release reads that never hold
//! the lock across I/O.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use nimbus_common::{Envelope, OrgId, UserId};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::connection::Connection;

/// Buffered dispatch requests pending in front of the control loop.
const DISPATCH_BUFFER: usize = 256;

/// Buffered register/unregister requests.
const CONTROL_BUFFER: usize = 64;

/// Where a dispatch is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    User(UserId),
}

/// One routing request: an envelope plus its destination.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub target: Target,
    pub envelope: Envelope,
}

#[derive(Default)]
struct Registry {
    /// At most one live connection per identity.
    by_user: HashMap<UserId, Arc<Connection>>,
    /// Identities currently connected and members of each organization.
    /// Every entry here must also be a `by_user` key; empty sets are removed.
    by_org: HashMap<OrgId, HashSet<UserId>>,
}

impl Registry {
    fn index_orgs(&mut self, user_id: UserId, orgs: &BTreeSet<OrgId>) {
        for org in orgs {
            self.by_org.entry(*org).or_default().insert(user_id);
        }
    }

    fn deindex_orgs(&mut self, user_id: UserId, orgs: &BTreeSet<OrgId>) {
        for org in orgs {
            if let Some(members) = self.by_org.get_mut(org) {
                members.remove(&user_id);
                if members.is_empty() {
                    self.by_org.remove(org);
                }
            }
        }
    }
}

/// The single coordinating actor for all live connections.
///
/// The process holds exactly one instance behind `Arc` and hands references
/// to every producer; there is no global state.
pub struct Hub {
    registry: RwLock<Registry>,
    register_tx: mpsc::Sender<Arc<Connection>>,
    unregister_tx: mpsc::Sender<Arc<Connection>>,
    dispatch_tx: mpsc::Sender<Dispatch>,
    shutdown: CancellationToken,
}

impl Hub {
    /// Construct the hub and spawn its control loop on the current runtime.
    pub fn start() -> Arc<Self> {
        let (register_tx, register_rx) = mpsc::channel(CONTROL_BUFFER);
        let (unregister_tx, unregister_rx) = mpsc::channel(CONTROL_BUFFER);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(DISPATCH_BUFFER);

        let hub = Arc::new(Self {
            registry: RwLock::new(Registry::default()),
            register_tx,
            unregister_tx,
            dispatch_tx,
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(hub.clone().run(register_rx, unregister_rx, dispatch_rx));
        hub
    }

    async fn run(
        self: Arc<Self>,
        mut register_rx: mpsc::Receiver<Arc<Connection>>,
        mut unregister_rx: mpsc::Receiver<Arc<Connection>>,
        mut dispatch_rx: mpsc::Receiver<Dispatch>,
    ) {
        tracing::info!("realtime hub started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(conn) = register_rx.recv() => self.install(conn),
                Some(conn) = unregister_rx.recv() => self.remove(&conn),
                Some(dispatch) = dispatch_rx.recv() => self.route(dispatch),
            }
        }
        self.teardown();
        tracing::info!("realtime hub stopped");
    }

    // -- control loop internals (loop task only) ----------------------------

    fn install(&self, conn: Arc<Connection>) {
        let user_id = conn.user_id();
        let orgs = conn.orgs();
        let mut registry = self.registry.write();

        // Newest connection wins: evict any previous session for this
        // identity without raising an error.
        if let Some(old) = registry.by_user.remove(&user_id) {
            registry.deindex_orgs(user_id, &old.orgs());
            old.close();
            tracing::debug!(user_id, "replaced existing connection");
        }

        registry.index_orgs(user_id, &orgs);
        registry.by_user.insert(user_id, conn);
        tracing::info!(
            user_id,
            connected = registry.by_user.len(),
            "connection registered"
        );
    }

    fn remove(&self, conn: &Arc<Connection>) {
        let user_id = conn.user_id();
        let mut registry = self.registry.write();

        // Only the currently installed connection may remove the mapping; a
        // stale pump racing a newer registration is silently ignored.
        let installed = registry
            .by_user
            .get(&user_id)
            .is_some_and(|current| Arc::ptr_eq(current, conn));
        if !installed {
            return;
        }

        registry.by_user.remove(&user_id);
        registry.deindex_orgs(user_id, &conn.orgs());
        conn.close();
        tracing::info!(
            user_id,
            connected = registry.by_user.len(),
            "connection unregistered"
        );
    }

    fn route(&self, dispatch: Dispatch) {
        let targets: Vec<Arc<Connection>> = {
            let registry = self.registry.read();
            match dispatch.target {
                Target::All => registry.by_user.values().cloned().collect(),
                Target::User(user_id) => {
                    registry.by_user.get(&user_id).cloned().into_iter().collect()
                }
            }
        };
        for conn in targets {
            conn.try_enqueue(dispatch.envelope.clone());
        }
    }

    fn teardown(&self) {
        let mut registry = self.registry.write();
        for conn in registry.by_user.values() {
            conn.close();
        }
        registry.by_user.clear();
        registry.by_org.clear();
    }

    // -- producer API --------------------------------------------------------

    /// Submit a connection for registration. Completes once queued; the loop
    /// installs it shortly after.
    pub async fn register(&self, conn: Arc<Connection>) {
        if self.register_tx.send(conn).await.is_err() {
            tracing::debug!("register after hub stop, ignoring");
        }
    }

    /// Submit a connection for removal. Only removes the mapping if this
    /// exact connection is still the installed one.
    pub async fn unregister(&self, conn: &Arc<Connection>) {
        if self.unregister_tx.send(conn.clone()).await.is_err() {
            tracing::debug!("unregister after hub stop, ignoring");
        }
    }

    /// Queue an envelope for one user. Fire-and-forget: returns once queued,
    /// says nothing about delivery.
    pub async fn send_to_user(&self, user_id: UserId, envelope: Envelope) {
        self.dispatch(Dispatch {
            target: Target::User(user_id),
            envelope,
        })
        .await;
    }

    /// Queue an envelope for every connected identity.
    pub async fn broadcast(&self, envelope: Envelope) {
        self.dispatch(Dispatch {
            target: Target::All,
            envelope,
        })
        .await;
    }

    async fn dispatch(&self, dispatch: Dispatch) {
        if self.dispatch_tx.send(dispatch).await.is_err() {
            tracing::debug!("dispatch after hub stop, dropping");
        }
    }

    /// Replace the full org-membership set for a connected identity.
    /// Idempotent; a no-op when the identity is not connected.
    pub fn set_memberships(&self, user_id: UserId, org_ids: impl IntoIterator<Item = OrgId>) {
        let orgs: BTreeSet<OrgId> = org_ids.into_iter().collect();
        let mut registry = self.registry.write();
        let Some(conn) = registry.by_user.get(&user_id).cloned() else {
            return;
        };

        let previous = conn.orgs();
        let leaving: BTreeSet<OrgId> = previous.difference(&orgs).copied().collect();
        let joining: BTreeSet<OrgId> = orgs.difference(&previous).copied().collect();
        registry.deindex_orgs(user_id, &leaving);
        registry.index_orgs(user_id, &joining);
        conn.set_orgs(orgs);
    }

    /// Enqueue an envelope onto every connected member of one organization.
    /// The member set is snapshotted before sending so the lock is never held
    /// across the enqueue attempts.
    pub fn broadcast_to_org(&self, org_id: OrgId, envelope: Envelope) {
        let members: Vec<Arc<Connection>> = {
            let registry = self.registry.read();
            let Some(user_ids) = registry.by_org.get(&org_id) else {
                return;
            };
            user_ids
                .iter()
                .filter_map(|user_id| registry.by_user.get(user_id).cloned())
                .collect()
        };
        for conn in members {
            conn.try_enqueue(envelope.clone());
        }
    }

    // -- queries -------------------------------------------------------------

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.registry.read().by_user.contains_key(&user_id)
    }

    pub fn connected_count(&self) -> usize {
        self.registry.read().by_user.len()
    }

    /// Connected identities, sorted.
    pub fn connected_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.registry.read().by_user.keys().copied().collect();
        users.sort_unstable();
        users
    }

    pub fn org_user_count(&self, org_id: OrgId) -> usize {
        self.registry
            .read()
            .by_org
            .get(&org_id)
            .map_or(0, |members| members.len())
    }

    /// Organizations with at least one connected member, sorted.
    pub fn connected_org_ids(&self) -> Vec<OrgId> {
        let mut orgs: Vec<OrgId> = self.registry.read().by_org.keys().copied().collect();
        orgs.sort_unstable();
        orgs
    }

    /// Request shutdown: the loop closes every connection, clears both maps,
    /// and exits. Safe to call any number of times, before or after exit.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}
