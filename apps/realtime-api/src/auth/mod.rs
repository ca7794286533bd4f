//! Session verification seam.
//!
//! Token minting, password hashing, and membership lookups live in the auth
//! service; this crate only consumes a pre-authenticated identity plus its
//! organization memberships through the [`SessionAuth`] trait.

pub mod jwt;
pub mod middleware;

use async_trait::async_trait;
use nimbus_common::{OrgId, UserId};

/// An authenticated principal and its organization memberships, as asserted
/// by the external auth service at connect time.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub org_ids: Vec<OrgId>,
}

/// Validates session tokens presented on upgrade requests and REST calls.
#[async_trait]
pub trait SessionAuth: Send + Sync {
    /// Verify a token. The error string is safe to show to the client.
    async fn verify(&self, token: &str) -> Result<Session, &'static str>;
}
