//! Purges identity-scoped state on login, logout and user switches.
//!
//! The bus listens to [`AuthIdentity::on_change`]. Listeners run
//! synchronously inside the call that changed the session, so by the time
//! `set_session` or `clear_session` returns every registered target has
//! been purged and no read can observe the previous identity's data.

use platter_cache::ResourceCache;
use platter_core::{CachedItem, EngineResult, StorageError, Subscription};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::auth::{AuthIdentity, AuthTransition};

/// State that belongs to one identity and must be dropped when it changes.
pub trait IdentityScoped: Send + Sync {
    /// Short label for logs.
    fn scope(&self) -> String;

    /// Drop everything attributable to `transition.previous`. Returns the
    /// number of entries dropped.
    fn purge(&self, transition: &AuthTransition) -> EngineResult<usize>;
}

impl<T: CachedItem> IdentityScoped for ResourceCache<T> {
    fn scope(&self) -> String {
        format!("{} {}", self.kind(), T::COLLECTION)
    }

    fn purge(&self, _transition: &AuthTransition) -> EngineResult<usize> {
        self.invalidate_all()
    }
}

type Targets = Arc<RwLock<Vec<Arc<dyn IdentityScoped>>>>;

pub struct IdentityTransitionBus {
    targets: Targets,
    transitions: Arc<AtomicU64>,
    _subscription: Subscription,
}

impl IdentityTransitionBus {
    /// Start listening to `auth`. Targets can be registered afterwards.
    pub fn attach(auth: &AuthIdentity) -> Self {
        let targets: Targets = Arc::new(RwLock::new(Vec::new()));
        let transitions = Arc::new(AtomicU64::new(0));
        let subscription = {
            let targets = Arc::clone(&targets);
            let transitions = Arc::clone(&transitions);
            auth.on_change(move |transition| {
                if !(transition.regime_flipped() || transition.user_changed()) {
                    return;
                }
                transitions.fetch_add(1, Ordering::SeqCst);
                purge_all(&targets, transition);
            })
        };
        Self {
            targets,
            transitions,
            _subscription: subscription,
        }
    }

    pub fn register(&self, target: Arc<dyn IdentityScoped>) -> EngineResult<()> {
        let mut targets = self.targets.write().map_err(|_| StorageError::poisoned("transition bus"))?;
        debug!(scope = %target.scope(), "registered identity-scoped target");
        targets.push(target);
        Ok(())
    }

    pub fn target_count(&self) -> usize {
        self.targets.read().map(|t| t.len()).unwrap_or_default()
    }

    /// Transitions handled since the bus was attached.
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::SeqCst)
    }
}

fn purge_all(targets: &Targets, transition: &AuthTransition) {
    let targets: Vec<Arc<dyn IdentityScoped>> = match targets.read() {
        Ok(targets) => targets.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    let mut dropped = 0;
    for target in &targets {
        match target.purge(transition) {
            Ok(n) => dropped += n,
            Err(err) => warn!(scope = %target.scope(), error = %err, "purge failed"),
        }
    }
    info!(
        epoch = transition.epoch,
        targets = targets.len(),
        dropped,
        "purged identity-scoped state"
    );
}
