use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OnceCell;

use crate::provision::ProvisionOutcome;

/// Topics this context has already provisioned (or started to).
///
/// A name enters the registry at most once and is never removed. Membership
/// means "provisioning was attempted", not "the topic exists"; the outcome of
/// the attempt is kept alongside. Nothing is persisted.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: Mutex<HashMap<String, Arc<OnceCell<ProvisionOutcome>>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<OnceCell<ProvisionOutcome>>>> {
        match self.topics.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("topic registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Record `name` as seen without a provisioning attempt.
    ///
    /// Returns `false` if the name was already present; its outcome is left untouched.
    pub fn mark_seen(&self, name: &str) -> bool {
        let mut guard = self.lock();
        if guard.contains_key(name) {
            return false;
        }
        let cell = OnceCell::new_with(Some(ProvisionOutcome::Assumed));
        guard.insert(name.to_string(), Arc::new(cell));
        true
    }

    /// Outcome of the attempt for `name`, `None` while unknown or in progress.
    pub fn outcome(&self, name: &str) -> Option<ProvisionOutcome> {
        let cell = self.lock().get(name).cloned()?;
        cell.get().cloned()
    }

    /// Run `attempt` for `name` unless this registry already ran one.
    ///
    /// The name is marked seen before `attempt` starts. Concurrent callers for
    /// the same name wait for the single in-flight attempt and share its
    /// outcome. The flag is `true` for the caller whose attempt actually ran.
    pub async fn provision_once<F, Fut>(&self, name: &str, attempt: F) -> (ProvisionOutcome, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProvisionOutcome>,
    {
        let cell = {
            let mut guard = self.lock();
            guard.entry(name.to_string()).or_default().clone()
        };

        let mut ran = false;
        let outcome = cell
            .get_or_init(|| {
                ran = true;
                attempt()
            })
            .await
            .clone();
        (outcome, ran)
    }

    /// Seen topic names, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
