use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::password::SecretHasher;
use super::token::{token_digest, TokenCodec, TokenKind};
use crate::config::AuthConfig;
use crate::db::{PrincipalStore, RenewalRecord, RenewalStore, Role};
use crate::error::{AppError, AuthError};

#[derive(Debug, Serialize)]
pub struct IssuedSession {
    pub access_token: String,
    pub renewal_token: String,
    pub role: Role,
    pub expires_in_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct RenewedAccess {
    pub access_token: String,
    pub role: Role,
    pub expires_in_seconds: i64,
    /// Present only when renewal tokens are rotated on use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_token: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub access_ttl: Duration,
    pub renewal_ttl: Duration,
    pub rotate_renewal_tokens: bool,
}

impl From<&AuthConfig> for SessionPolicy {
    fn from(config: &AuthConfig) -> Self {
        Self {
            access_ttl: Duration::seconds(config.access_ttl_secs),
            renewal_ttl: Duration::seconds(config.renewal_ttl_secs),
            rotate_renewal_tokens: config.rotate_renewal_tokens,
        }
    }
}

/// Login, renewal and revocation of sessions.
pub struct AuthService {
    principals: Arc<dyn PrincipalStore>,
    renewals: Arc<dyn RenewalStore>,
    codec: Arc<TokenCodec>,
    hasher: SecretHasher,
    policy: SessionPolicy,
    // Checked against when the identity is unknown, so both failure
    // branches do the same hashing work.
    decoy_hash: String,
}

impl AuthService {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        renewals: Arc<dyn RenewalStore>,
        codec: Arc<TokenCodec>,
        hasher: SecretHasher,
        policy: SessionPolicy,
    ) -> Result<Self, AppError> {
        let decoy_hash = hasher.hash(&Uuid::new_v4().to_string())?;
        Ok(Self {
            principals,
            renewals,
            codec,
            hasher,
            policy,
            decoy_hash,
        })
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }

    async fn check_secret(&self, secret: &str, stored: String) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        let secret = secret.to_owned();
        Ok(tokio::task::spawn_blocking(move || hasher.check(&secret, &stored)).await?)
    }

    pub async fn login(&self, identity: &str, secret: &str) -> Result<IssuedSession, AppError> {
        let principal = self.principals.find_by_identity(identity).await?;

        let stored = principal
            .as_ref()
            .map_or_else(|| self.decoy_hash.clone(), |p| p.secret_hash.clone());
        let secret_ok = self.check_secret(secret, stored).await?;

        let principal = match principal {
            Some(p) if secret_ok => p,
            Some(_) => {
                debug!("login rejected: secret mismatch");
                return Err(AuthError::InvalidCredentials.into());
            }
            None => {
                debug!("login rejected: unknown identity");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let access_token = self.codec.mint(
            principal.id,
            principal.role,
            TokenKind::Access,
            self.policy.access_ttl,
        )?;
        let renewal_token = self.codec.mint(
            principal.id,
            principal.role,
            TokenKind::Renewal,
            self.policy.renewal_ttl,
        )?;

        let now = self.codec.now();
        self.renewals
            .insert(&RenewalRecord {
                principal_id: principal.id,
                token_hash: token_digest(&renewal_token),
                expires_at: now + self.policy.renewal_ttl,
                created_at: now,
            })
            .await?;

        info!(principal = %principal.id, role = %principal.role, "session issued");
        Ok(IssuedSession {
            access_token,
            renewal_token,
            role: principal.role,
            expires_in_seconds: self.policy.access_ttl.num_seconds(),
        })
    }

    pub async fn renew(&self, renewal_bearer: &str) -> Result<RenewedAccess, AppError> {
        let token = self
            .codec
            .verify_kind(renewal_bearer, TokenKind::Renewal)
            .map_err(|e| {
                debug!(error = %e, "renewal token rejected");
                AuthError::Unauthenticated
            })?;

        let hash = token_digest(renewal_bearer);
        let now = self.codec.now();
        let live = self
            .renewals
            .find_live(token.subject, &hash, now)
            .await?
            .ok_or_else(|| {
                debug!(principal = %token.subject, "renewal record missing, revoked or expired");
                AuthError::Unauthenticated
            })?;

        let access_token = self.codec.mint(
            live.principal_id,
            live.role,
            TokenKind::Access,
            self.policy.access_ttl,
        )?;

        let renewal_token = if self.policy.rotate_renewal_tokens {
            let replacement = self.codec.mint(
                live.principal_id,
                live.role,
                TokenKind::Renewal,
                self.policy.renewal_ttl,
            )?;
            let record = RenewalRecord {
                principal_id: live.principal_id,
                token_hash: token_digest(&replacement),
                expires_at: now + self.policy.renewal_ttl,
                created_at: now,
            };
            if !self.renewals.rotate(live.principal_id, &hash, &record).await? {
                // Lost a race with a concurrent renewal or revocation.
                warn!(principal = %live.principal_id, "renewal token already consumed");
                return Err(AuthError::Unauthenticated.into());
            }
            Some(replacement)
        } else {
            None
        };

        Ok(RenewedAccess {
            access_token,
            role: live.role,
            expires_in_seconds: self.policy.access_ttl.num_seconds(),
            renewal_token,
        })
    }

    /// Revokes `renewal_bearer` on behalf of the access token's subject.
    /// Revoking something that is not there is not an error.
    pub async fn revoke(&self, access_bearer: &str, renewal_bearer: &str) -> Result<(), AppError> {
        let caller = self
            .codec
            .verify_kind(access_bearer, TokenKind::Access)
            .map_err(|e| {
                debug!(error = %e, "access token rejected on revoke");
                AuthError::Unauthenticated
            })?;

        let removed = self
            .renewals
            .delete(caller.subject, &token_digest(renewal_bearer))
            .await?;
        info!(principal = %caller.subject, removed, "renewal token revoked");
        Ok(())
    }
}
