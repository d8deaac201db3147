//! Identity types for the review engine.
//!
//! A session is either anonymous (identified by a persisted device
//! fingerprint) or authenticated (identified by a user id and carrying a
//! bearer token). The two regimes are mutually exclusive and every remote
//! call receives exactly one [`Identity`].

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Stable anonymous fingerprint of a browser profile / device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Account identifier issued by the external authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Bearer token for authenticated calls.
///
/// The secret is never printed by `Debug` and is shared, not copied, when
/// an [`Identity`] is cloned.
#[derive(Clone)]
pub struct BearerToken(Arc<SecretString>);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        let token: String = token.into();
        Self(Arc::new(SecretString::new(token.into())))
    }

    /// Expose the raw token for building an `Authorization` header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

/// Which identity regime a session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityRegime {
    Anonymous,
    Authenticated,
}

impl IdentityRegime {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

impl fmt::Display for IdentityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Authenticated => f.write_str("authenticated"),
        }
    }
}

/// The identity a remote call is made under.
#[derive(Debug, Clone)]
pub enum Identity {
    /// Device-identified session; requests carry the device header.
    Anonymous { device_id: DeviceId },
    /// User-identified session; requests carry a bearer token.
    Authenticated { user_id: UserId, token: BearerToken },
}

impl Identity {
    pub fn anonymous(device_id: DeviceId) -> Self {
        Self::Anonymous { device_id }
    }

    pub fn authenticated(user_id: UserId, token: BearerToken) -> Self {
        Self::Authenticated { user_id, token }
    }

    pub fn regime(&self) -> IdentityRegime {
        match self {
            Self::Anonymous { .. } => IdentityRegime::Anonymous,
            Self::Authenticated { .. } => IdentityRegime::Authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.regime().is_authenticated()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Authenticated { user_id, .. } => Some(user_id),
            Self::Anonymous { .. } => None,
        }
    }

    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            Self::Anonymous { device_id } => Some(device_id),
            Self::Authenticated { .. } => None,
        }
    }

    /// Key identifying the owner for per-identity bookkeeping, e.g.
    /// `device:dev-123` or `user:u-42`.
    pub fn owner_key(&self) -> String {
        match self {
            Self::Anonymous { device_id } => format!("device:{}", device_id),
            Self::Authenticated { user_id, .. } => format!("user:{}", user_id),
        }
    }
}

/// Read-only view of the external authentication session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthSnapshot {
    pub user_id: Option<UserId>,
    pub is_authenticated: bool,
}

impl AuthSnapshot {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            is_authenticated: true,
        }
    }

    pub fn regime(&self) -> IdentityRegime {
        if self.is_authenticated {
            IdentityRegime::Authenticated
        } else {
            IdentityRegime::Anonymous
        }
    }
}
