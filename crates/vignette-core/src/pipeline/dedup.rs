//! In-flight request deduplication.
//!
//! At most one pipeline executes per cache key. The registry lock is the
//! single synchronization point for admission: probing the memory cache,
//! probing the registry, and becoming owner happen under one guard, so
//! two identical requests can never both start a pipeline.
//!
//! The owner publishes its terminal outcome over a `watch` channel;
//! waiters adopt it verbatim. A drop guard completes the registration as
//! cancelled if the owner disappears without publishing, so waiters are
//! never stranded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cache::MemoryCache;
use crate::error::{LoadError, LoadResult};
use crate::request::CacheKey;
use crate::types::DecodedImage;

/// Terminal outcome of a pipeline execution, shared with every waiter.
pub(crate) type TaskOutcome = LoadResult<Arc<DecodedImage>>;

type OutcomeSender = watch::Sender<Option<TaskOutcome>>;
type OutcomeReceiver = watch::Receiver<Option<TaskOutcome>>;
type Registrations = Arc<Mutex<HashMap<CacheKey, OutcomeSender>>>;

/// How an arriving request was admitted.
pub(crate) enum Admission {
    /// The cache already holds the finished artifact.
    Hit(Arc<DecodedImage>),
    /// This request owns the pipeline execution for its key.
    Owner(OwnerRegistration),
    /// Another request owns the execution; wait for its outcome.
    Waiter(OutcomeReceiver),
}

/// Registry of in-flight pipeline executions, keyed by cache key.
pub(crate) struct DedupRegistry {
    registrations: Registrations,
}

impl DedupRegistry {
    pub(crate) fn new() -> Self {
        Self {
            registrations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(
        registrations: &Registrations,
    ) -> std::sync::MutexGuard<'_, HashMap<CacheKey, OutcomeSender>> {
        match registrations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Admit a request: cache probe, registry probe, and owner insertion
    /// as one indivisible operation.
    pub(crate) fn admit(&self, key: &CacheKey, cache: &MemoryCache) -> Admission {
        let mut registrations = Self::lock(&self.registrations);

        if let Some(image) = cache.get(key) {
            return Admission::Hit(image);
        }
        if let Some(sender) = registrations.get(key) {
            return Admission::Waiter(sender.subscribe());
        }

        let (sender, _receiver) = watch::channel(None);
        registrations.insert(key.clone(), sender);
        Admission::Owner(OwnerRegistration {
            key: key.clone(),
            registrations: self.registrations.clone(),
            completed: false,
        })
    }

    /// Number of in-flight registrations.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        Self::lock(&self.registrations).len()
    }
}

/// Ownership of one in-flight registration.
///
/// The owner calls [`complete`](Self::complete) with its terminal
/// outcome; dropping without completing publishes `Cancelled` so waiters
/// always observe a terminal state.
pub(crate) struct OwnerRegistration {
    key: CacheKey,
    registrations: Registrations,
    completed: bool,
}

impl OwnerRegistration {
    /// Publish the owner's terminal outcome to all waiters and remove
    /// the registration.
    pub(crate) fn complete(mut self, outcome: TaskOutcome) {
        self.completed = true;
        Self::finish(&self.registrations, &self.key, outcome);
    }

    fn finish(registrations: &Registrations, key: &CacheKey, outcome: TaskOutcome) {
        let sender = DedupRegistry::lock(registrations).remove(key);
        if let Some(sender) = sender {
            // Send fails only when no waiter is subscribed; that is fine.
            let _ = sender.send(Some(outcome));
        }
    }
}

impl Drop for OwnerRegistration {
    fn drop(&mut self) {
        if !self.completed {
            Self::finish(&self.registrations, &self.key, Err(LoadError::Cancelled));
        }
    }
}

/// Wait until the owner reaches a terminal state and adopt its outcome.
///
/// Cancelling the waiter's own token detaches only this waiter; the
/// owner and other waiters are unaffected.
pub(crate) async fn wait_for_owner(
    mut receiver: OutcomeReceiver,
    cancel: &CancellationToken,
) -> TaskOutcome {
    loop {
        if let Some(outcome) = receiver.borrow().clone() {
            return outcome;
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(LoadError::Cancelled),
            changed = receiver.changed() => {
                if changed.is_err() {
                    // Sender vanished without publishing; the drop guard
                    // makes this unreachable in practice.
                    return Err(LoadError::Cancelled);
                }
            }
        }
    }
}
