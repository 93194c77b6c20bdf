use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use herald_api::error::BackendError;
use herald_api::schema::{RegistryConnector, SchemaDefinition, SchemaRegistry};

#[derive(Default)]
struct State {
    /// Canonical schema text -> id. Ids are global across subjects.
    ids: HashMap<String, u32>,
    /// Subject -> ids registered under it, oldest first.
    subjects: BTreeMap<String, Vec<u32>>,
}

struct Inner {
    state: Mutex<State>,
    reachable: AtomicBool,
    connections: AtomicUsize,
}

/// In-process schema registry. Clones share state.
///
/// Identical schemas (compared after JSON normalisation) always get the
/// same id, whichever subject they are registered under.
#[derive(Clone)]
pub struct MemorySchemaRegistry {
    inner: Arc<Inner>,
}

impl Default for MemorySchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySchemaRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                reachable: AtomicBool::new(true),
                connections: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    pub fn subjects(&self) -> Vec<String> {
        self.state().subjects.keys().cloned().collect()
    }

    /// Ids registered under `subject`, oldest first.
    pub fn versions(&self, subject: &str) -> Vec<u32> {
        self.state().subjects.get(subject).cloned().unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.inner.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::connection("memory schema registry is unreachable"))
        }
    }

    fn register_sync(&self, subject: &str, schema: &SchemaDefinition) -> Result<u32, BackendError> {
        self.check_reachable()?;
        let parsed: serde_json::Value = serde_json::from_str(schema.as_str())
            .map_err(|e| BackendError::schema(format!("invalid schema for subject '{subject}': {e}")))?;
        let canonical = parsed.to_string();

        let mut state = self.state();
        let next = state.ids.len() as u32 + 1;
        let id = *state.ids.entry(canonical).or_insert(next);
        let versions = state.subjects.entry(subject.to_string()).or_default();
        if !versions.contains(&id) {
            versions.push(id);
        }
        Ok(id)
    }
}

impl SchemaRegistry for MemorySchemaRegistry {
    fn register(
        &self,
        subject: &str,
        schema: &SchemaDefinition,
    ) -> Pin<Box<dyn Future<Output = Result<u32, BackendError>> + Send + '_>> {
        let result = self.register_sync(subject, schema);
        Box::pin(async move { result })
    }
}

impl RegistryConnector for MemorySchemaRegistry {
    fn connect(
        &self,
        _url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn SchemaRegistry>, BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.check_reachable()?;
            self.inner.connections.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(self.clone()) as Arc<dyn SchemaRegistry>)
        })
    }
}
