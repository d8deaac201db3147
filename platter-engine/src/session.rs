//! Resolves the [`Identity`] every remote call is made under.

use platter_core::{EngineError, EngineResult, Identity, IdentityRegime};
use std::sync::Arc;
use tracing::warn;

use crate::auth::AuthIdentity;
use crate::device::DeviceIdentityProvider;

/// An identity together with the auth epoch it was resolved in.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub identity: Identity,
    pub epoch: u64,
}

/// Combines the auth observer with the device identity.
pub struct Session {
    auth: Arc<AuthIdentity>,
    device: Arc<DeviceIdentityProvider>,
}

impl Session {
    pub fn new(auth: Arc<AuthIdentity>, device: Arc<DeviceIdentityProvider>) -> Self {
        Self { auth, device }
    }

    pub fn auth(&self) -> &Arc<AuthIdentity> {
        &self.auth
    }

    pub fn device(&self) -> &Arc<DeviceIdentityProvider> {
        &self.device
    }

    /// Read the auth state once and build the identity for one operation.
    pub fn current(&self) -> EngineResult<SessionIdentity> {
        let credentials = self.auth.credentials()?;
        let identity = match credentials.user {
            Some((user_id, token)) => Identity::authenticated(user_id, token),
            None => Identity::anonymous(self.device.get_or_create().id().clone()),
        };
        Ok(SessionIdentity {
            identity,
            epoch: credentials.epoch,
        })
    }

    pub fn identity(&self) -> EngineResult<Identity> {
        Ok(self.current()?.identity)
    }

    pub fn regime(&self) -> EngineResult<IdentityRegime> {
        Ok(self.auth.current()?.regime())
    }

    /// Whether no transition happened since `epoch` was read.
    pub fn is_current(&self, epoch: u64) -> EngineResult<bool> {
        Ok(self.auth.epoch()? == epoch)
    }

    /// Pass a remote result through, signing out first when it reports an
    /// expired session for an authenticated call.
    ///
    /// Only the session that made the call is ended. If the user signed out
    /// or someone else signed in while the request was in flight, the error
    /// is returned and the current session is left alone.
    pub fn observe<T>(&self, caller: &SessionIdentity, result: EngineResult<T>) -> EngineResult<T> {
        if let Err(EngineError::SessionExpired) = &result {
            if let Some(user_id) = caller.identity.user_id() {
                if let Err(err) = self.auth.expire_session_at(caller.epoch, user_id) {
                    warn!(error = %err, "could not sign out after session expiry");
                }
            }
        }
        result
    }
}
