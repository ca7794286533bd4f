//! HS256 session-token verification.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use nimbus_common::{OrgId, UserId};
use serde::{Deserialize, Serialize};

use super::{Session, SessionAuth};

/// Claims carried by a session token. Minted by the auth service.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the authenticated user id.
    pub sub: UserId,
    /// Organizations the user is a member of at mint time.
    #[serde(default)]
    pub orgs: Vec<OrgId>,
    /// Expiry, seconds since the epoch. `jsonwebtoken` enforces this.
    pub exp: i64,
}

/// Verifies HS256 session tokens with a shared secret.
pub struct JwtSessionAuth {
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtSessionAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl SessionAuth for JwtSessionAuth {
    async fn verify(&self, token: &str) -> Result<Session, &'static str> {
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(?e, "session token rejected");
                "Invalid or expired session token"
            })?;
        Ok(Session {
            user_id: data.claims.sub,
            org_ids: data.claims.orgs,
        })
    }
}
