//! In-memory [`VersionedStore`] for tests
//!
//! Behaves like the API server for the parts kf relies on: objects are keyed
//! by namespace and name, every write bumps `resourceVersion`, and a replace
//! whose version doesn't match the stored one is rejected as a conflict.
//! Tests can also inject conflicts and failures, race a concurrent writer,
//! and read back the sequence of calls.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kube::Resource;
use serde::Serialize;

use crate::error::Verb;
use crate::lifecycle::VersionedStore;
use crate::{Error, Result};

type CreateHook<R> = Arc<dyn Fn(&mut R) + Send + Sync>;

/// Shared, ordered record of store calls, e.g. `"delete App dev/myapp"`.
///
/// One log can be shared by stores of different kinds to observe ordering
/// across a whole provisioning chain.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in call order
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Entries starting with `verb`, in call order
    pub fn of(&self, verb: &str) -> Vec<String> {
        let prefix = format!("{verb} ");
        self.lock()
            .iter()
            .filter(|e| e.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn push(&self, entry: String) {
        self.lock().push(entry);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct FakeState<R> {
    objects: BTreeMap<(String, String), R>,
    next_version: u64,
    pending_conflicts: u32,
    replace_attempts: u32,
    failures: Vec<(Verb, String)>,
}

/// In-memory, versioned object store
pub struct FakeStore<R> {
    state: Arc<Mutex<FakeState<R>>>,
    log: CallLog,
    on_create: Option<CreateHook<R>>,
}

impl<R> Clone for FakeStore<R> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            log: self.log.clone(),
            on_create: self.on_create.clone(),
        }
    }
}

impl<R> Default for FakeStore<R> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                objects: BTreeMap::new(),
                next_version: 1,
                pending_conflicts: 0,
                replace_attempts: 0,
                failures: Vec::new(),
            })),
            log: CallLog::new(),
            on_create: None,
        }
    }
}

impl<R> FakeStore<R>
where
    R: Resource<DynamicType = ()> + Clone + Serialize + Send + Sync + 'static,
{
    /// Create an empty store with its own call log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record calls into a shared log instead of a private one
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Run `hook` on every object as it is created, e.g. to mark it ready
    pub fn with_create_hook(mut self, hook: impl Fn(&mut R) + Send + Sync + 'static) -> Self {
        self.on_create = Some(Arc::new(hook));
        self
    }

    /// Call log of this store
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Seed an object, assigning it a fresh resourceVersion
    pub fn insert(&self, namespace: &str, mut obj: R) {
        let mut state = self.lock();
        let name = obj.meta().name.clone().unwrap_or_default();
        obj.meta_mut().namespace = Some(namespace.to_string());
        obj.meta_mut().resource_version = Some(state.bump());
        state.objects.insert((namespace.to_string(), name), obj);
    }

    /// Current stored copy of an object
    pub fn object(&self, namespace: &str, name: &str) -> Option<R> {
        self.lock().objects.get(&key(namespace, name)).cloned()
    }

    /// Serialized form of an object, for byte-for-byte comparisons
    pub fn snapshot(&self, namespace: &str, name: &str) -> Option<Vec<u8>> {
        self.object(namespace, name)
            .and_then(|obj| serde_json::to_vec(&obj).ok())
    }

    /// Names stored in `namespace`
    pub fn names(&self, namespace: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Reject the next `n` replace calls as conflicts without touching state
    pub fn inject_conflicts(&self, n: u32) {
        self.lock().pending_conflicts = n;
    }

    /// Fail every `verb` call on objects whose name starts with `prefix`
    /// with a server error. Matching by prefix lets tests target objects
    /// whose names are generated.
    pub fn fail_on(&self, verb: Verb, prefix: &str) {
        self.lock().failures.push((verb, prefix.to_string()));
    }

    /// Number of replace calls received, including rejected ones
    pub fn replace_attempts(&self) -> u32 {
        self.lock().replace_attempts
    }

    /// Apply `f` as another writer would, bumping the resourceVersion
    pub fn external_write(&self, namespace: &str, name: &str, f: impl FnOnce(&mut R)) {
        let mut state = self.lock();
        let version = state.bump();
        if let Some(obj) = state.objects.get_mut(&key(namespace, name)) {
            f(obj);
            obj.meta_mut().resource_version = Some(version);
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, verb: &str, namespace: &str, name: &str) {
        self.log
            .push(format!("{} {} {}/{}", verb, R::kind(&()), namespace, name));
    }

    fn injected_failure(&self, verb: Verb, name: &str) -> Option<Error> {
        let failing = self
            .lock()
            .failures
            .iter()
            .any(|(v, prefix)| *v == verb && name.starts_with(prefix.as_str()));
        failing.then(|| {
            Error::from(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: format!("injected {verb:?} failure for {name}"),
                reason: "InternalError".to_string(),
                code: 500,
            }))
        })
    }

    fn not_found(namespace: &str, name: &str) -> Error {
        Error::not_found(R::kind(&()), namespace, name)
    }
}

impl<R> FakeState<R> {
    fn bump(&mut self) -> String {
        let version = self.next_version;
        self.next_version += 1;
        version.to_string()
    }
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

#[async_trait]
impl<R> VersionedStore<R> for FakeStore<R>
where
    R: Resource<DynamicType = ()> + Clone + Serialize + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<R> {
        self.record("get", namespace, name);
        if let Some(e) = self.injected_failure(Verb::Get, name) {
            return Err(e);
        }
        self.object(namespace, name)
            .ok_or_else(|| Self::not_found(namespace, name))
    }

    async fn create(&self, namespace: &str, obj: &R) -> Result<R> {
        let name = obj.meta().name.clone().unwrap_or_default();
        self.record("create", namespace, &name);
        if let Some(e) = self.injected_failure(Verb::Create, &name) {
            return Err(e);
        }

        let mut state = self.lock();
        if state.objects.contains_key(&key(namespace, &name)) {
            return Err(Error::AlreadyExists {
                kind: R::kind(&()).to_string(),
                namespace: namespace.to_string(),
                name,
            });
        }

        let mut stored = obj.clone();
        if let Some(hook) = &self.on_create {
            hook(&mut stored);
        }
        stored.meta_mut().namespace = Some(namespace.to_string());
        stored.meta_mut().resource_version = Some(state.bump());
        state.objects.insert(key(namespace, &name), stored.clone());
        Ok(stored)
    }

    async fn replace(&self, namespace: &str, name: &str, obj: &R) -> Result<R> {
        self.record("replace", namespace, name);
        if let Some(e) = self.injected_failure(Verb::Replace, name) {
            return Err(e);
        }

        let mut state = self.lock();
        state.replace_attempts += 1;
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(Error::conflict(R::kind(&()), namespace, name));
        }

        let stored_version = state
            .objects
            .get(&key(namespace, name))
            .ok_or_else(|| Self::not_found(namespace, name))?
            .meta()
            .resource_version
            .clone();
        if stored_version != obj.meta().resource_version {
            return Err(Error::conflict(R::kind(&()), namespace, name));
        }

        let mut stored = obj.clone();
        stored.meta_mut().resource_version = Some(state.bump());
        state.objects.insert(key(namespace, name), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.record("delete", namespace, name);
        if let Some(e) = self.injected_failure(Verb::Delete, name) {
            return Err(e);
        }
        self.lock()
            .objects
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| Self::not_found(namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::App;

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let store = FakeStore::new();
        store.insert("dev", App::from_image("a", "nginx"));
        let stale = store.object("dev", "a").unwrap();

        store.external_write("dev", "a", |app: &mut App| app.spec.instances.stopped = true);

        let err = store.replace("dev", "a", &stale).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(store.object("dev", "a").unwrap().is_stopped());
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = FakeStore::new();
        store.create("dev", &App::from_image("a", "nginx")).await.unwrap();

        let err = store
            .create("dev", &App::from_image("a", "nginx"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn shared_log_records_calls_in_order() {
        let log = CallLog::new();
        let store = FakeStore::new().with_log(log.clone());
        store.create("dev", &App::from_image("a", "nginx")).await.unwrap();
        store.delete("dev", "a").await.unwrap();

        assert_eq!(log.entries(), vec!["create App dev/a", "delete App dev/a"]);
        assert_eq!(log.of("delete"), vec!["delete App dev/a"]);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_transport_errors() {
        let store = FakeStore::<App>::new();
        store.fail_on(Verb::Create, "a");

        let err = store
            .create("dev", &App::from_image("a", "nginx"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Kube { .. }));
        assert!(store.object("dev", "a").is_none());
    }
}
