//! Observer over the external authentication session.
//!
//! The engine never issues tokens. The host application reports logins and
//! logouts through [`AuthIdentity::set_session`] and
//! [`AuthIdentity::clear_session`]; the engine reads the current state and
//! reacts to [`AuthTransition`]s.

use platter_core::{
    AuthSnapshot, BearerToken, EngineResult, Listeners, StorageError, Subscription, UserId,
};
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// A change of user or identity regime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTransition {
    pub previous: AuthSnapshot,
    pub current: AuthSnapshot,
    /// Epoch after the transition.
    pub epoch: u64,
}

impl AuthTransition {
    /// Whether `is_authenticated` flipped.
    pub fn regime_flipped(&self) -> bool {
        self.previous.is_authenticated != self.current.is_authenticated
    }

    pub fn user_changed(&self) -> bool {
        self.previous.user_id != self.current.user_id
    }
}

/// Credentials read together with the epoch they belong to.
#[derive(Debug, Clone)]
pub(crate) struct Credentials {
    pub user: Option<(UserId, BearerToken)>,
    pub epoch: u64,
}

struct AuthState {
    snapshot: AuthSnapshot,
    token: Option<BearerToken>,
    epoch: u64,
}

/// Current authentication state plus change notifications.
///
/// The epoch increments on every transition. A token refresh for the same
/// user is not a transition.
pub struct AuthIdentity {
    state: RwLock<AuthState>,
    changes: Listeners<AuthTransition>,
    expiries: Listeners<UserId>,
}

impl AuthIdentity {
    /// Start anonymous.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AuthState {
                snapshot: AuthSnapshot::anonymous(),
                token: None,
                epoch: 0,
            }),
            changes: Listeners::new(),
            expiries: Listeners::new(),
        }
    }

    /// Start with an existing session, e.g. one restored by the host.
    pub fn signed_in(user_id: UserId, token: BearerToken) -> Self {
        let auth = Self::new();
        if let Ok(mut state) = auth.state.write() {
            state.snapshot = AuthSnapshot::authenticated(user_id);
            state.token = Some(token);
        }
        auth
    }

    pub fn current(&self) -> EngineResult<AuthSnapshot> {
        Ok(self.read()?.snapshot.clone())
    }

    pub fn epoch(&self) -> EngineResult<u64> {
        Ok(self.read()?.epoch)
    }

    pub fn is_authenticated(&self) -> EngineResult<bool> {
        Ok(self.read()?.snapshot.is_authenticated)
    }

    pub(crate) fn credentials(&self) -> EngineResult<Credentials> {
        let state = self.read()?;
        let user = match (&state.snapshot.user_id, &state.token) {
            (Some(user_id), Some(token)) if state.snapshot.is_authenticated => {
                Some((user_id.clone(), token.clone()))
            }
            _ => None,
        };
        Ok(Credentials {
            user,
            epoch: state.epoch,
        })
    }

    /// Record a login (or a token refresh for the signed-in user).
    pub fn set_session(&self, user_id: UserId, token: BearerToken) -> EngineResult<()> {
        let transition = {
            let mut state = self.write()?;
            let next = AuthSnapshot::authenticated(user_id);
            state.token = Some(token);
            if state.snapshot == next {
                debug!("bearer token refreshed");
                None
            } else {
                Some(self.advance(&mut state, next))
            }
        };
        self.publish(transition);
        Ok(())
    }

    /// Record a logout. A no-op when already anonymous.
    pub fn clear_session(&self) -> EngineResult<()> {
        let transition = {
            let mut state = self.write()?;
            state.token = None;
            if state.snapshot.is_authenticated {
                Some(self.advance(&mut state, AuthSnapshot::anonymous()))
            } else {
                None
            }
        };
        self.publish(transition);
        Ok(())
    }

    /// The server rejected the bearer token. Notifies the external logout
    /// hook, then transitions to anonymous. Returns `false` if no session
    /// was active.
    pub fn expire_session(&self) -> EngineResult<bool> {
        let (epoch, user_id) = {
            let state = self.read()?;
            (state.epoch, state.snapshot.user_id.clone())
        };
        match user_id {
            Some(user_id) => self.expire_session_at(epoch, &user_id),
            None => Ok(false),
        }
    }

    /// Expire the session of `user_id` only while it is still the one that
    /// was active at `epoch`. A rejection of an earlier session's token
    /// signs nobody out and returns `false`.
    pub fn expire_session_at(&self, epoch: u64, user_id: &UserId) -> EngineResult<bool> {
        let transition = {
            let mut state = self.write()?;
            let same_session = state.epoch == epoch
                && state.snapshot.is_authenticated
                && state.snapshot.user_id.as_ref() == Some(user_id);
            if !same_session {
                debug!(user_id = %user_id, epoch, current_epoch = state.epoch, "expiry for an earlier session ignored");
                return Ok(false);
            }
            state.token = None;
            self.advance(&mut state, AuthSnapshot::anonymous())
        };
        warn!(user_id = %user_id, "session expired, signing out");
        self.expiries.emit(user_id);
        self.publish(Some(transition));
        Ok(true)
    }

    /// Listen for transitions. Listeners run synchronously on the thread
    /// that changed the session, after the state is committed.
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthTransition) + Send + Sync + 'static,
    {
        self.changes.subscribe(listener)
    }

    /// Listen for server-side session expiry. This is where the host wires
    /// its logout flow.
    pub fn on_session_expired<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&UserId) + Send + Sync + 'static,
    {
        self.expiries.subscribe(listener)
    }

    fn advance(&self, state: &mut AuthState, next: AuthSnapshot) -> AuthTransition {
        state.epoch += 1;
        let previous = std::mem::replace(&mut state.snapshot, next);
        AuthTransition {
            previous,
            current: state.snapshot.clone(),
            epoch: state.epoch,
        }
    }

    fn publish(&self, transition: Option<AuthTransition>) {
        if let Some(transition) = transition {
            info!(
                from = %transition.previous.regime(),
                to = %transition.current.regime(),
                epoch = transition.epoch,
                "identity transition"
            );
            let notified = self.changes.emit(&transition);
            debug!(listeners = notified, "identity transition delivered");
        }
    }

    fn read(&self) -> EngineResult<std::sync::RwLockReadGuard<'_, AuthState>> {
        Ok(self.state.read().map_err(|_| StorageError::poisoned("auth identity"))?)
    }

    fn write(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, AuthState>> {
        Ok(self.state.write().map_err(|_| StorageError::poisoned("auth identity"))?)
    }
}

impl Default for AuthIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(auth: &AuthIdentity) -> (Arc<Mutex<Vec<AuthTransition>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = auth.on_change(move |t| sink.lock().unwrap().push(t.clone()));
        (seen, sub)
    }

    #[test]
    fn test_login_and_logout_publish_transitions() {
        let auth = AuthIdentity::new();
        let (seen, _sub) = recorder(&auth);

        auth.set_session(UserId::from("u-1"), BearerToken::new("t1")).unwrap();
        assert!(auth.is_authenticated().unwrap());
        assert_eq!(auth.epoch().unwrap(), 1);

        auth.clear_session().unwrap();
        assert!(!auth.is_authenticated().unwrap());
        assert_eq!(auth.epoch().unwrap(), 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].regime_flipped());
        assert_eq!(seen[1].previous.user_id, Some(UserId::from("u-1")));
    }

    #[test]
    fn test_token_refresh_is_silent() {
        let auth = AuthIdentity::new();
        auth.set_session(UserId::from("u-1"), BearerToken::new("t1")).unwrap();
        let (seen, _sub) = recorder(&auth);

        auth.set_session(UserId::from("u-1"), BearerToken::new("t2")).unwrap();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(auth.epoch().unwrap(), 1);
        let creds = auth.credentials().unwrap();
        assert_eq!(creds.user.map(|(_, t)| t.expose().to_string()), Some("t2".to_string()));
    }

    #[test]
    fn test_user_switch_is_a_transition() {
        let auth = AuthIdentity::signed_in(UserId::from("u-1"), BearerToken::new("t1"));
        let (seen, _sub) = recorder(&auth);
        auth.set_session(UserId::from("u-2"), BearerToken::new("t2")).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].regime_flipped());
        assert!(seen[0].user_changed());
    }

    #[test]
    fn test_logout_when_anonymous_is_noop() {
        let auth = AuthIdentity::new();
        let (seen, _sub) = recorder(&auth);
        auth.clear_session().unwrap();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(auth.epoch().unwrap(), 0);
    }

    #[test]
    fn test_expire_session_notifies_hook_then_signs_out() {
        let auth = AuthIdentity::signed_in(UserId::from("u-9"), BearerToken::new("t"));
        let expired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&expired);
        let _hook = auth.on_session_expired(move |u| sink.lock().unwrap().push(u.clone()));

        assert!(auth.expire_session().unwrap());
        assert!(!auth.is_authenticated().unwrap());
        assert_eq!(*expired.lock().unwrap(), vec![UserId::from("u-9")]);
        assert!(!auth.expire_session().unwrap());
    }

    #[test]
    fn test_expiry_from_earlier_session_is_ignored() {
        let auth = AuthIdentity::signed_in(UserId::from("u-1"), BearerToken::new("t1"));
        let stale_epoch = auth.epoch().unwrap();
        let expired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&expired);
        let _hook = auth.on_session_expired(move |u| sink.lock().unwrap().push(u.clone()));

        auth.clear_session().unwrap();
        auth.set_session(UserId::from("u-2"), BearerToken::new("t2")).unwrap();

        assert!(!auth.expire_session_at(stale_epoch, &UserId::from("u-1")).unwrap());
        // Right user, wrong epoch is still someone else's session.
        assert!(!auth.expire_session_at(stale_epoch, &UserId::from("u-2")).unwrap());
        assert_eq!(auth.current().unwrap().user_id, Some(UserId::from("u-2")));
        assert!(expired.lock().unwrap().is_empty());

        let epoch = auth.epoch().unwrap();
        assert!(auth.expire_session_at(epoch, &UserId::from("u-2")).unwrap());
        assert!(!auth.is_authenticated().unwrap());
        assert_eq!(*expired.lock().unwrap(), vec![UserId::from("u-2")]);
    }

    #[test]
    fn test_listener_can_read_state_during_emit() {
        let auth = Arc::new(AuthIdentity::new());
        let observed = Arc::new(Mutex::new(None));
        let (a, o) = (Arc::clone(&auth), Arc::clone(&observed));
        let _sub = auth.on_change(move |_| {
            *o.lock().unwrap() = Some(a.is_authenticated().unwrap());
        });
        auth.set_session(UserId::from("u-1"), BearerToken::new("t")).unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(true));
    }
}
