//! Sync engine: registrations, push workers and remote listeners.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::error::SyncError;
use super::{MergeOutcome, PushHandle, PushOutcome, SyncEvent};
use crate::auth::{AuthEvent, AuthSession, User};
use crate::events::EventBus;
use crate::remote::{DocPath, RemoteDocument, RemoteError, RemoteStore, Subscription};
use crate::revision::{
    arbitrate, load_revision, save_revision, Arbitration, DeviceId, Revision,
};
use crate::store::{ChangeOrigin, LocalStore};

/// Called with the new collection value after a remote write was applied.
pub type UpdateHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// What an app registers for one namespace.
#[derive(Clone)]
pub struct AppRegistration {
    /// Local store key holding the collection.
    pub storage_key: String,
    /// Remote collection name under the user's document tree.
    pub collection: String,
    on_update: Option<UpdateHandler>,
}

impl AppRegistration {
    pub fn new(storage_key: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            storage_key: storage_key.into(),
            collection: collection.into(),
            on_update: None,
        }
    }

    pub fn on_update<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for AppRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRegistration")
            .field("storage_key", &self.storage_key)
            .field("collection", &self.collection)
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}

/// Engine state as seen by a debugging command.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot {
    pub user: Option<User>,
    pub device: DeviceId,
    pub namespaces: Vec<NamespaceSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceSnapshot {
    pub namespace: String,
    pub storage_key: String,
    pub collection: String,
    pub listening: bool,
    pub merged: bool,
    pub revision: Option<Revision>,
}

struct PushJob {
    doc: RemoteDocument,
    reply: oneshot::Sender<PushOutcome>,
}

/// Listener and push worker of an activated namespace. Dropping aborts both.
struct ActiveApp {
    listener: JoinHandle<()>,
    worker: JoinHandle<()>,
    pushes: mpsc::UnboundedSender<PushJob>,
}

impl Drop for ActiveApp {
    fn drop(&mut self) {
        self.listener.abort();
        self.worker.abort();
    }
}

struct AppSlot {
    registration: AppRegistration,
    active: Option<ActiveApp>,
}

#[derive(Default)]
struct EngineState {
    user: Option<User>,
    apps: HashMap<String, AppSlot>,
    /// Namespaces whose initial merge ran for the current sign-in.
    merged: HashSet<String>,
}

struct Inner {
    local: LocalStore,
    remote: Arc<dyn RemoteStore>,
    device: DeviceId,
    state: Mutex<EngineState>,
    /// Serializes revision read-modify-write between saves and remote applies.
    commit: Arc<Mutex<()>>,
    events: EventBus<SyncEvent>,
}

/// Keeps registered app collections in sync with a [`RemoteStore`].
///
/// Cloning is cheap; clones drive the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("device", &self.inner.device)
            .field("namespaces", &self.registered_namespaces())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Creates an engine over `local`, loading or creating the device ID.
    pub fn new(local: LocalStore, remote: Arc<dyn RemoteStore>) -> Result<Self, SyncError> {
        let device = DeviceId::load_or_create(&local)?;
        Ok(Self {
            inner: Arc::new(Inner {
                local,
                remote,
                device,
                state: Mutex::new(EngineState::default()),
                commit: Arc::new(Mutex::new(())),
                events: EventBus::new(),
            }),
        })
    }

    pub fn device(&self) -> DeviceId {
        self.inner.device
    }

    pub fn local_store(&self) -> &LocalStore {
        &self.inner.local
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state_or_recover().user.clone()
    }

    /// Registers (or re-registers) an app under `namespace`.
    ///
    /// Any listener from an earlier registration of the namespace is torn
    /// down first. With a user signed in the namespace is activated right
    /// away; otherwise it activates on the next sign-in.
    pub async fn register_app(
        &self,
        namespace: &str,
        registration: AppRegistration,
    ) -> Result<(), SyncError> {
        let signed_in = {
            let mut state = self.lock_state()?;
            let slot = AppSlot {
                registration,
                active: None,
            };
            if state.apps.insert(namespace.to_string(), slot).is_some() {
                tracing::debug!("Replaced sync registration for '{}'", namespace);
            }
            state.user.is_some()
        };
        self.inner.events.publish(SyncEvent::Registered {
            namespace: namespace.to_string(),
        });

        if signed_in {
            if let Err(e) = self.activate(namespace).await {
                self.report_failure(namespace, &e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Drops the registration for `namespace`. Returns false if there was none.
    pub fn unregister(&self, namespace: &str) -> bool {
        let mut state = self.state_or_recover();
        state.merged.remove(namespace);
        state.apps.remove(namespace).is_some()
    }

    pub fn registered_namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.state_or_recover().apps.keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    /// Saves `data` locally and queues a push.
    ///
    /// The local write and its new revision are committed before this
    /// returns; the push runs on the namespace's worker. Without a signed-in
    /// user the returned handle reports [`PushOutcome::Skipped`].
    pub fn save_app_data<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        data: &T,
    ) -> Result<PushHandle, SyncError> {
        let (storage_key, pushes) = {
            let state = self.lock_state()?;
            let slot = state
                .apps
                .get(namespace)
                .ok_or_else(|| SyncError::NotRegistered(namespace.to_string()))?;
            (
                slot.registration.storage_key.clone(),
                slot.active.as_ref().map(|active| active.pushes.clone()),
            )
        };

        let value = serde_json::to_value(data)
            .map_err(|e| SyncError::Serialize(storage_key.clone(), e.to_string()))?;
        let revision = {
            let _commit = self.inner.commit.lock().map_err(|_| SyncError::LockPoisoned)?;
            let previous = load_revision(&self.inner.local, &storage_key);
            let revision = Revision::next(previous.as_ref(), self.inner.device);
            self.inner.local.set(&storage_key, &value)?;
            save_revision(&self.inner.local, &storage_key, &revision, ChangeOrigin::Local)?;
            revision
        };
        tracing::debug!("Saved '{}' locally at {}", namespace, revision);

        let Some(pushes) = pushes else {
            return Ok(PushHandle::skipped());
        };
        let (reply, receiver) = oneshot::channel();
        let job = PushJob {
            doc: RemoteDocument {
                data: value,
                revision,
            },
            reply,
        };
        if pushes.send(job).is_err() {
            tracing::warn!("Push worker for '{}' is gone; save stays local", namespace);
            return Ok(PushHandle::skipped());
        }
        Ok(PushHandle::queued(receiver))
    }

    /// Applies a remote document to `namespace` as if its listener had
    /// received it.
    pub fn apply_remote(&self, namespace: &str, doc: &RemoteDocument) -> Result<Arbitration, SyncError> {
        let target = {
            let state = self.lock_state()?;
            let slot = state
                .apps
                .get(namespace)
                .ok_or_else(|| SyncError::NotRegistered(namespace.to_string()))?;
            self.listener_target(namespace, &slot.registration)
        };
        target.apply(doc)
    }

    /// Activates every registration for `user`.
    ///
    /// Signing in as the user already active is a no-op; a different user
    /// first drops the previous user's listeners.
    pub async fn handle_signed_in(&self, user: User) {
        let namespaces: Vec<String> = {
            let mut state = self.state_or_recover();
            if state.user.as_ref().is_some_and(|u| u.uid == user.uid) {
                return;
            }
            for slot in state.apps.values_mut() {
                slot.active = None;
            }
            state.merged.clear();
            tracing::info!("Sync active for {}", user.uid);
            state.user = Some(user);
            state.apps.keys().cloned().collect()
        };

        for namespace in namespaces {
            if let Err(e) = self.activate(&namespace).await {
                self.report_failure(&namespace, &e);
            }
        }
    }

    /// Stops all listeners and push workers and drops every registration.
    /// Local data is kept.
    pub fn handle_signed_out(&self) {
        let namespaces = {
            let mut state = self.state_or_recover();
            state.user = None;
            state.merged.clear();
            let count = state.apps.len();
            state.apps.clear();
            count
        };
        tracing::info!("Sync detached from {} app(s)", namespaces);
        self.inner.events.publish(SyncEvent::Detached { namespaces });
    }

    /// Follows `session` so sign-ins activate and sign-outs detach the engine.
    pub fn watch_auth(&self, session: &AuthSession) -> JoinHandle<()> {
        let mut events = session.subscribe();
        let initial = session.current_user();
        let engine = self.clone();
        tokio::spawn(async move {
            if let Some(user) = initial {
                engine.handle_signed_in(user).await;
            }
            loop {
                match events.recv().await {
                    Ok(AuthEvent::Resolved(Some(user))) | Ok(AuthEvent::SignedIn(user)) => {
                        engine.handle_signed_in(user).await;
                    }
                    Ok(AuthEvent::SignedOut) => engine.handle_signed_out(),
                    Ok(AuthEvent::Resolved(None)) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Sync missed {} auth event(s)", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn debug_snapshot(&self) -> SyncSnapshot {
        let state = self.state_or_recover();
        let mut namespaces: Vec<NamespaceSnapshot> = state
            .apps
            .iter()
            .map(|(namespace, slot)| NamespaceSnapshot {
                namespace: namespace.clone(),
                storage_key: slot.registration.storage_key.clone(),
                collection: slot.registration.collection.clone(),
                listening: slot.active.is_some(),
                merged: state.merged.contains(namespace),
                revision: load_revision(&self.inner.local, &slot.registration.storage_key),
            })
            .collect();
        namespaces.sort_by(|a, b| a.namespace.cmp(&b.namespace));
        SyncSnapshot {
            user: state.user.clone(),
            device: self.inner.device,
            namespaces,
        }
    }

    /// Subscribes, starts the workers and runs the initial merge if due.
    async fn activate(&self, namespace: &str) -> Result<(), SyncError> {
        let (registration, user) = {
            let state = self.lock_state()?;
            let user = state.user.clone().ok_or(SyncError::NotSignedIn)?;
            let slot = state
                .apps
                .get(namespace)
                .ok_or_else(|| SyncError::NotRegistered(namespace.to_string()))?;
            (slot.registration.clone(), user)
        };
        let path = DocPath::new(user.uid.clone(), registration.collection.clone());

        let subscription = self.inner.remote.subscribe(&path)?;
        let (pushes, jobs) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_push_worker(
            namespace.to_string(),
            path.clone(),
            self.inner.remote.clone(),
            self.inner.events.clone(),
            jobs,
        ));
        let listener = tokio::spawn(run_listener(
            self.listener_target(namespace, &registration),
            subscription,
        ));
        let active = ActiveApp {
            listener,
            worker,
            pushes: pushes.clone(),
        };

        let needs_merge = {
            let mut state = self.lock_state()?;
            let still_current = state.user.as_ref().is_some_and(|u| u.uid == user.uid);
            match state.apps.get_mut(namespace) {
                Some(slot) if still_current => slot.active = Some(active),
                // Signed out or unregistered meanwhile; dropping `active` stops it.
                _ => return Ok(()),
            }
            state.merged.insert(namespace.to_string())
        };
        tracing::debug!("Listening to {} for '{}'", path, namespace);

        if needs_merge {
            match self.initial_merge(namespace, &registration, &path, &pushes).await {
                Ok(outcome) => {
                    tracing::info!("Initial merge for '{}': {}", namespace, outcome);
                    self.inner.events.publish(SyncEvent::Merged {
                        namespace: namespace.to_string(),
                        outcome,
                    });
                }
                Err(e) => {
                    self.state_or_recover().merged.remove(namespace);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn initial_merge(
        &self,
        namespace: &str,
        registration: &AppRegistration,
        path: &DocPath,
        pushes: &mpsc::UnboundedSender<PushJob>,
    ) -> Result<MergeOutcome, SyncError> {
        let local = &self.inner.local;
        let key = registration.storage_key.as_str();
        let remote = self.inner.remote.read(path).await?;

        if let Some(doc) = remote.filter(|doc| !is_empty(&doc.data)) {
            {
                let _commit = self.inner.commit.lock().map_err(|_| SyncError::LockPoisoned)?;
                let current = load_revision(local, key);
                if current.is_some_and(|r| r.same_write(&doc.revision)) {
                    return Ok(MergeOutcome::InSync);
                }
                local.set_with_origin(key, &doc.data, ChangeOrigin::Remote)?;
                save_revision(local, key, &doc.revision, ChangeOrigin::Remote)?;
            }
            if let Some(handler) = &registration.on_update {
                handler(&doc.data);
            }
            return Ok(MergeOutcome::PulledRemote);
        }

        let data: Value = local.get(key);
        if is_empty(&data) {
            return Ok(MergeOutcome::Empty);
        }

        let revision = {
            let _commit = self.inner.commit.lock().map_err(|_| SyncError::LockPoisoned)?;
            match load_revision(local, key) {
                Some(revision) => revision,
                None => {
                    let revision = Revision::next(None, self.inner.device);
                    save_revision(local, key, &revision, ChangeOrigin::Local)?;
                    revision
                }
            }
        };
        let (reply, receiver) = oneshot::channel();
        pushes
            .send(PushJob {
                doc: RemoteDocument { data, revision },
                reply,
            })
            .map_err(|_| SyncError::NotRegistered(namespace.to_string()))?;
        match PushHandle::queued(receiver).outcome().await {
            PushOutcome::Pushed(_) => Ok(MergeOutcome::SeededRemote),
            PushOutcome::Failed(error) => Err(SyncError::Remote(RemoteError::Unavailable(error))),
            PushOutcome::Skipped => Ok(MergeOutcome::Empty),
        }
    }

    fn listener_target(&self, namespace: &str, registration: &AppRegistration) -> ListenerTarget {
        ListenerTarget {
            namespace: namespace.to_string(),
            storage_key: registration.storage_key.clone(),
            on_update: registration.on_update.clone(),
            local: self.inner.local.clone(),
            commit: self.inner.commit.clone(),
            events: self.inner.events.clone(),
        }
    }

    fn report_failure(&self, namespace: &str, error: &SyncError) {
        tracing::warn!("Sync for '{}' failed: {}", namespace, error);
        self.inner.events.publish(SyncEvent::Failed {
            namespace: namespace.to_string(),
            error: error.to_string(),
        });
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, EngineState>, SyncError> {
        self.inner.state.lock().map_err(|_| SyncError::LockPoisoned)
    }

    /// For paths that cannot fail: sign-out must always detach.
    fn state_or_recover(&self) -> MutexGuard<'_, EngineState> {
        match self.inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Everything a remote listener needs, detached from the engine.
struct ListenerTarget {
    namespace: String,
    storage_key: String,
    on_update: Option<UpdateHandler>,
    local: LocalStore,
    commit: Arc<Mutex<()>>,
    events: EventBus<SyncEvent>,
}

impl ListenerTarget {
    fn apply(&self, doc: &RemoteDocument) -> Result<Arbitration, SyncError> {
        let arbitration = {
            let _commit = self.commit.lock().map_err(|_| SyncError::LockPoisoned)?;
            let local_revision = load_revision(&self.local, &self.storage_key);
            let arbitration = arbitrate(local_revision.as_ref(), &doc.revision);
            if arbitration == Arbitration::Apply {
                self.local
                    .set_with_origin(&self.storage_key, &doc.data, ChangeOrigin::Remote)?;
                save_revision(&self.local, &self.storage_key, &doc.revision, ChangeOrigin::Remote)?;
            }
            arbitration
        };

        if arbitration == Arbitration::Apply {
            if let Some(handler) = &self.on_update {
                handler(&doc.data);
            }
            tracing::debug!("Applied remote {} to '{}'", doc.revision, self.namespace);
            self.events.publish(SyncEvent::RemoteApplied {
                namespace: self.namespace.clone(),
                revision: doc.revision,
            });
        } else {
            tracing::trace!("Ignored remote {} for '{}': {:?}", doc.revision, self.namespace, arbitration);
            self.events.publish(SyncEvent::RemoteIgnored {
                namespace: self.namespace.clone(),
                revision: doc.revision,
                reason: arbitration,
            });
        }
        Ok(arbitration)
    }
}

async fn run_listener(target: ListenerTarget, mut subscription: Subscription) {
    while let Some(doc) = subscription.next().await {
        if let Err(e) = target.apply(&doc) {
            tracing::warn!("Could not apply remote change to '{}': {}", target.namespace, e);
            target.events.publish(SyncEvent::Failed {
                namespace: target.namespace.clone(),
                error: e.to_string(),
            });
        }
    }
    tracing::debug!("Remote listener for '{}' ended", target.namespace);
}

async fn run_push_worker(
    namespace: String,
    path: DocPath,
    remote: Arc<dyn RemoteStore>,
    events: EventBus<SyncEvent>,
    mut jobs: mpsc::UnboundedReceiver<PushJob>,
) {
    while let Some(job) = jobs.recv().await {
        let revision = job.doc.revision;
        let outcome = match remote.write(&path, job.doc).await {
            Ok(()) => {
                tracing::debug!("Pushed '{}' at {}", namespace, revision);
                events.publish(SyncEvent::Pushed {
                    namespace: namespace.clone(),
                    revision,
                });
                PushOutcome::Pushed(revision)
            }
            Err(e) => {
                tracing::warn!("Push for '{}' failed, keeping local copy: {}", namespace, e);
                events.publish(SyncEvent::PushFailed {
                    namespace: namespace.clone(),
                    error: e.to_string(),
                });
                PushOutcome::Failed(e.to_string())
            }
        };
        // The caller may have dropped its handle.
        let _ = job.reply.send(outcome);
    }
}

/// Null, `[]` and `{}` count as "no data" for the initial merge.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use serde_json::json;
    use std::time::Duration;

    const NS: &str = "marioKart";
    const KEY: &str = "marioKartRaces";

    fn user(uid: &str) -> User {
        User {
            uid: uid.to_string(),
            email: None,
            display_name: None,
        }
    }

    fn engine(remote: &MemoryRemoteStore) -> SyncEngine {
        SyncEngine::new(LocalStore::in_memory(), Arc::new(remote.clone())).unwrap()
    }

    fn registration() -> AppRegistration {
        AppRegistration::new(KEY, NS)
    }

    async fn wait_for<F>(rx: &mut broadcast::Receiver<SyncEvent>, mut matches: F) -> SyncEvent
    where
        F: FnMut(&SyncEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = rx.recv().await.unwrap();
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_while_signed_out_stays_local() {
        let remote = MemoryRemoteStore::new();
        let engine = engine(&remote);
        engine.register_app(NS, registration()).await.unwrap();

        let handle = engine.save_app_data(NS, &json!([{"id": 1}])).unwrap();
        assert!(!handle.is_queued());
        assert_eq!(handle.outcome().await, PushOutcome::Skipped);

        let stored: Value = engine.local_store().get(KEY);
        assert_eq!(stored, json!([{"id": 1}]));
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_save_unregistered_namespace_fails() {
        let engine = engine(&MemoryRemoteStore::new());
        assert!(matches!(
            engine.save_app_data("nope", &json!([])),
            Err(SyncError::NotRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_local_data_seeds_empty_remote_once() {
        let remote = MemoryRemoteStore::new();
        let engine = engine(&remote);
        engine.local_store().set(KEY, &json!([{"id": 1}])).unwrap();
        let mut rx = engine.subscribe();

        engine.handle_signed_in(user("u1")).await;
        engine.register_app(NS, registration()).await.unwrap();

        let event = wait_for(&mut rx, |e| matches!(e, SyncEvent::Merged { .. })).await;
        assert_eq!(
            event,
            SyncEvent::Merged {
                namespace: NS.to_string(),
                outcome: MergeOutcome::SeededRemote
            }
        );
        let doc = remote.peek(&DocPath::new("u1", NS)).unwrap();
        assert_eq!(doc.data, json!([{"id": 1}]));
        assert_eq!(remote.write_count(), 1);

        // Re-registering must not merge (or write) again.
        engine.register_app(NS, registration()).await.unwrap();
        assert_eq!(remote.write_count(), 1);
    }

    #[tokio::test]
    async fn test_remote_data_overwrites_local_on_merge() {
        let remote = MemoryRemoteStore::new();
        let other = engine(&remote);
        other.handle_signed_in(user("u1")).await;
        other.register_app(NS, registration()).await.unwrap();
        other
            .save_app_data(NS, &json!(["remote"]))
            .unwrap()
            .outcome()
            .await;

        let engine = engine(&remote);
        engine.local_store().set(KEY, &json!(["local"])).unwrap();
        let updates = Arc::new(Mutex::new(Vec::new()));
        let seen = updates.clone();
        let registration = registration().on_update(move |value| {
            seen.lock().unwrap().push(value.clone());
        });

        engine.handle_signed_in(user("u1")).await;
        engine.register_app(NS, registration).await.unwrap();

        let stored: Value = engine.local_store().get(KEY);
        assert_eq!(stored, json!(["remote"]));
        assert_eq!(updates.lock().unwrap().as_slice(), &[json!(["remote"])]);
        assert_eq!(remote.write_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_both_sides_merges_nothing() {
        let remote = MemoryRemoteStore::new();
        let engine = engine(&remote);
        let mut rx = engine.subscribe();
        engine.handle_signed_in(user("u1")).await;
        engine.register_app(NS, registration()).await.unwrap();

        let event = wait_for(&mut rx, |e| matches!(e, SyncEvent::Merged { .. })).await;
        assert!(matches!(
            event,
            SyncEvent::Merged {
                outcome: MergeOutcome::Empty,
                ..
            }
        ));
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_each_save_pushes_once_in_order() {
        let remote = MemoryRemoteStore::new();
        let engine = engine(&remote);
        engine.handle_signed_in(user("u1")).await;
        engine.register_app(NS, registration()).await.unwrap();

        let first = engine.save_app_data(NS, &json!([1])).unwrap();
        let second = engine.save_app_data(NS, &json!([1, 2])).unwrap();

        assert!(matches!(first.outcome().await, PushOutcome::Pushed(r) if r.counter == 1));
        assert!(matches!(second.outcome().await, PushOutcome::Pushed(r) if r.counter == 2));
        assert_eq!(remote.write_count(), 2);
        assert_eq!(remote.peek(&DocPath::new("u1", NS)).unwrap().data, json!([1, 2]));
    }

    #[tokio::test]
    async fn test_remote_write_reaches_other_device() {
        let remote = MemoryRemoteStore::new();
        let phone = engine(&remote);
        let laptop = engine(&remote);
        for device in [&phone, &laptop] {
            device.handle_signed_in(user("u1")).await;
            device.register_app(NS, registration()).await.unwrap();
        }
        let mut rx = laptop.subscribe();

        phone.save_app_data(NS, &json!(["from phone"])).unwrap();

        wait_for(&mut rx, |e| matches!(e, SyncEvent::RemoteApplied { .. })).await;
        let stored: Value = laptop.local_store().get(KEY);
        assert_eq!(stored, json!(["from phone"]));
    }

    #[tokio::test]
    async fn test_own_echo_is_ignored() {
        let remote = MemoryRemoteStore::new();
        let engine = engine(&remote);
        engine.handle_signed_in(user("u1")).await;
        engine.register_app(NS, registration()).await.unwrap();
        let mut rx = engine.subscribe();

        engine.save_app_data(NS, &json!([1])).unwrap();

        let event = wait_for(&mut rx, |e| matches!(e, SyncEvent::RemoteIgnored { .. })).await;
        assert!(matches!(
            event,
            SyncEvent::RemoteIgnored {
                reason: Arbitration::AlreadyApplied,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_stale_remote_write_is_ignored() {
        let engine = engine(&MemoryRemoteStore::new());
        engine.register_app(NS, registration()).await.unwrap();
        engine.save_app_data(NS, &json!(["v1"])).unwrap();
        engine.save_app_data(NS, &json!(["v2"])).unwrap();

        let stale = RemoteDocument {
            data: json!(["old"]),
            revision: Revision::next(None, DeviceId::new()),
        };
        assert_eq!(engine.apply_remote(NS, &stale).unwrap(), Arbitration::Stale);
        let stored: Value = engine.local_store().get(KEY);
        assert_eq!(stored, json!(["v2"]));

        let newer = RemoteDocument {
            data: json!(["v3"]),
            revision: Revision {
                counter: 3,
                ..Revision::next(None, DeviceId::new())
            },
        };
        assert_eq!(engine.apply_remote(NS, &newer).unwrap(), Arbitration::Apply);
        let stored: Value = engine.local_store().get(KEY);
        assert_eq!(stored, json!(["v3"]));
    }

    #[tokio::test]
    async fn test_remote_apply_is_marked_remote_origin() {
        let engine = engine(&MemoryRemoteStore::new());
        engine.register_app(NS, registration()).await.unwrap();
        let mut store_events = engine.local_store().subscribe();

        let doc = RemoteDocument {
            data: json!(["x"]),
            revision: Revision::next(None, DeviceId::new()),
        };
        engine.apply_remote(NS, &doc).unwrap();

        let event = store_events.recv().await.unwrap();
        assert_eq!(event.key, KEY);
        assert_eq!(event.origin, ChangeOrigin::Remote);
    }

    #[tokio::test]
    async fn test_push_failure_keeps_local_write() {
        let remote = MemoryRemoteStore::new();
        let engine = engine(&remote);
        engine.handle_signed_in(user("u1")).await;
        engine.register_app(NS, registration()).await.unwrap();
        remote.set_offline(true);

        let outcome = engine.save_app_data(NS, &json!([1])).unwrap().outcome().await;

        assert!(matches!(outcome, PushOutcome::Failed(_)));
        let stored: Value = engine.local_store().get(KEY);
        assert_eq!(stored, json!([1]));

        // The next save pushes the latest snapshot.
        remote.set_offline(false);
        engine.save_app_data(NS, &json!([1, 2])).unwrap().outcome().await;
        assert_eq!(remote.peek(&DocPath::new("u1", NS)).unwrap().data, json!([1, 2]));
    }

    #[tokio::test]
    async fn test_sign_out_keeps_data_and_drops_registrations() {
        let remote = MemoryRemoteStore::new();
        let engine = engine(&remote);
        engine.handle_signed_in(user("u1")).await;
        engine.register_app(NS, registration()).await.unwrap();
        engine.save_app_data(NS, &json!([1])).unwrap().outcome().await;

        engine.handle_signed_out();

        assert!(engine.registered_namespaces().is_empty());
        assert!(engine.current_user().is_none());
        let stored: Value = engine.local_store().get(KEY);
        assert_eq!(stored, json!([1]));
    }

    #[tokio::test]
    async fn test_registration_waits_for_sign_in() {
        let remote = MemoryRemoteStore::new();
        let engine = engine(&remote);
        engine.local_store().set(KEY, &json!([1])).unwrap();
        engine.register_app(NS, registration()).await.unwrap();
        assert!(!engine.debug_snapshot().namespaces[0].listening);

        engine.handle_signed_in(user("u1")).await;

        let snapshot = engine.debug_snapshot();
        assert!(snapshot.namespaces[0].listening);
        assert!(snapshot.namespaces[0].merged);
        assert!(remote.peek(&DocPath::new("u1", NS)).is_some());
    }

    #[tokio::test]
    async fn test_watch_auth_follows_session() {
        use crate::auth::LocalAuthProvider;

        let remote = MemoryRemoteStore::new();
        let engine = engine(&remote);
        engine.register_app(NS, registration()).await.unwrap();
        let session = AuthSession::new(Arc::new(LocalAuthProvider::new(
            LocalStore::in_memory(),
            LocalStore::in_memory(),
        )));
        let mut rx = engine.subscribe();
        let watcher = engine.watch_auth(&session);

        session.initialize().await;
        session.sign_up("a@b.io", "secret1").await;
        wait_for(&mut rx, |e| matches!(e, SyncEvent::Merged { .. })).await;
        assert!(engine.current_user().is_some());

        session.sign_out().await;
        wait_for(&mut rx, |e| matches!(e, SyncEvent::Detached { .. })).await;
        assert!(engine.registered_namespaces().is_empty());
        watcher.abort();
    }

    #[test]
    fn test_is_empty() {
        assert!(is_empty(&Value::Null));
        assert!(is_empty(&json!([])));
        assert!(is_empty(&json!({})));
        assert!(!is_empty(&json!([0])));
        assert!(!is_empty(&json!("text")));
    }
}
