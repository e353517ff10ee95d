use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "viewer" => Ok(Role::Viewer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A registered caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub identity: String,
    pub secret_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    pub fn new(identity: String, secret_hash: String, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            secret_hash,
            role,
            created_at: now,
        }
    }
}

/// A persisted renewal credential. Only the digest of the bearer is kept.
#[derive(Debug, Clone)]
pub struct RenewalRecord {
    pub principal_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RenewalRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A renewal record that is still usable, joined with its owner's current role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRenewal {
    pub principal_id: Uuid,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub client_key: String,
    pub endpoint: String,
}

impl RateKey {
    pub fn new(client_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateWindow {
    pub window_start: DateTime<Utc>,
    pub request_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLedgerEntry {
    pub amount: Decimal,
    pub description: String,
}
