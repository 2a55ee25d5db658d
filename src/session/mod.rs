pub mod manager;
pub mod scheduler;
pub mod store;

pub use manager::{SessionManager, SessionState};
pub use store::SessionStore;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a rental contract the portal account belongs to.
///
/// Fixed once the session is issued; the server decides, the client never
/// escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalRole {
    Tenant,
    Owner,
}

impl PortalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortalRole::Tenant => "tenant",
            PortalRole::Owner => "owner",
        }
    }
}

impl std::fmt::Display for PortalRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PortalRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tenant" => Ok(PortalRole::Tenant),
            "owner" => Ok(PortalRole::Owner),
            other => Err(format!("unknown portal role '{}', expected 'tenant' or 'owner'", other)),
        }
    }
}

/// Snapshot of the authenticated principal, taken at login time.
///
/// Refresh swaps tokens only; none of these fields ever change for the
/// lifetime of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalUser {
    pub contract_id: i64,
    pub role: PortalRole,
    pub email: String,
    pub name: String,
    pub agency_id: i64,
    pub property_id: i64,
    pub property_title: String,
}

/// An authenticated portal identity: principal snapshot plus the token pair.
///
/// Serialized as-is (camelCase, ISO-8601 expiry) both on the wire and in the
/// persisted session slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalSession {
    pub user: PortalUser,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl PortalSession {
    /// An expiry exactly equal to `now` counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// The instant the proactive refresh should run.
    pub fn refresh_due(&self, margin: Duration) -> DateTime<Utc> {
        self.expires_at - margin
    }
}
