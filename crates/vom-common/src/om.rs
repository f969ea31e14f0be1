//! The object manager.
//!
//! Clients describe what they want through [`ObjectManager::write`]; the
//! manager singularizes each object, reconciles it and records it under the
//! client's key. Per-kind [`Listener`]s bridge the registries and the
//! engine for bulk population and replay, driven here in dependency order.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::{debug, info, warn};
use vom_hw::{Hw, Rc};

use crate::client_db::ClientDb;
use crate::inspect::CommandHandler;
use crate::object::{Dependency, Object};
use crate::singular_db::{Held, SingularDb};

/// Process-wide event handler for one object kind.
pub trait Listener: CommandHandler {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Discovers the kind's objects in the engine and commits each one
    /// under `client`.
    fn handle_populate(&self, client: &str, om: &ObjectManager) -> Rc;

    /// Re-enqueues the programmed state of every object of the kind.
    /// Must not flush; the manager flushes once for all kinds.
    fn handle_replay(&self);

    /// The kind's dependency tier.
    fn order(&self) -> Dependency;
}

/// Drives reconciliation, population and replay for every object kind.
pub struct ObjectManager {
    hw: Arc<Hw>,
    clients: Mutex<ClientDb>,
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl ObjectManager {
    /// Creates a manager programming through `hw`.
    pub fn new(hw: Arc<Hw>) -> Self {
        Self {
            hw,
            clients: Mutex::new(ClientDb::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    fn clients(&self) -> MutexGuard<'_, ClientDb> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The command queue.
    pub fn hw(&self) -> &Arc<Hw> {
        &self.hw
    }

    /// Registers a listener. Listeners run in ascending tier order; ties
    /// keep registration order.
    pub fn register_listener(&self, listener: Arc<dyn Listener>) {
        info!(
            "Registering listener {} (order {})",
            listener.name(),
            listener.order()
        );
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.push(listener);
        listeners.sort_by_key(|l| l.order());
    }

    /// Registered listeners, in the order they run.
    pub fn listeners(&self) -> Vec<Arc<dyn Listener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Makes `desired` part of `client`'s state and programs it.
    ///
    /// The canonical instance is reconciled towards `desired` and the queue
    /// flushed; the returned code is the flush outcome.
    pub fn write<T>(&self, client: &str, db: &Arc<SingularDb<T>>, desired: &T) -> Rc
    where
        T: Object + Clone,
    {
        let inst = db.find_or_add(desired.clone());
        inst.update(desired, &self.hw);

        let replaced = self.clients().insert(client, Box::new(inst));
        drop(replaced);

        let rc = self.hw.write();
        if !rc.is_ok() {
            warn!("write {} for {}: {}", desired, client, rc);
        }
        rc
    }

    /// Records `desired` for `client` without sending anything to the
    /// engine; its state is taken as already programmed.
    pub fn commit<T>(&self, client: &str, db: &Arc<SingularDb<T>>, desired: &T) -> Rc
    where
        T: Object + Clone,
    {
        self.hw.disable();
        let rc = self.write(client, db, desired);
        self.hw.enable();
        rc
    }

    /// Marks every object held by `client` as stale.
    pub fn mark(&self, client: &str) {
        self.clients().mark(client);
    }

    /// Drops `client`'s stale objects and flushes the resulting teardown.
    ///
    /// Returns the first failed delete, if any. Objects whose deletes fail
    /// are still evicted from their registry.
    pub fn sweep(&self, client: &str) -> Rc {
        let stale = self.clients().sweep(client);
        debug!("sweep {}: {} stale objects", client, stale.len());
        self.release_all(client, stale)
    }

    /// Drops every object held by `client` and flushes the teardown.
    ///
    /// Reports failed deletes the same way as [`sweep`](Self::sweep).
    pub fn remove(&self, client: &str) -> Rc {
        let objects = self.clients().remove(client);
        debug!("remove {}: {} objects", client, objects.len());
        self.release_all(client, objects)
    }

    fn release_all(&self, client: &str, objects: Vec<Box<dyn Held>>) -> Rc {
        let mut result = Rc::Ok;
        for object in objects {
            if let Some(rc) = object.release() {
                result = result.first_failure(rc);
            }
        }
        let result = result.first_failure(self.hw.write());
        if !result.is_ok() {
            warn!("teardown for {}: {}", client, result);
        }
        result
    }

    /// Number of objects held by `client`.
    pub fn client_len(&self, client: &str) -> usize {
        self.clients().len(client)
    }

    /// Returns the stale mark of an object held by `client`.
    pub fn is_stale(&self, client: &str, kind: &str, key: &str) -> Option<bool> {
        self.clients().is_stale(client, kind, key)
    }

    /// Populates every registry from the engine, lowest tier first, then
    /// marks everything discovered as stale for `client`.
    ///
    /// The client is expected to re-write what it wants and then
    /// [`sweep`](Self::sweep). Returns the first failure reported by a
    /// listener, or `Ok`.
    pub fn populate(&self, client: &str) -> Rc {
        let mut result = Rc::Ok;
        for listener in self.listeners() {
            debug!("populate: {} ({})", listener.name(), listener.order());
            let rc = listener.handle_populate(client, self);
            if !rc.is_ok() {
                warn!("populate: {} failed: {}", listener.name(), rc);
                result = result.first_failure(rc);
            }
        }
        self.mark(client);
        result
    }

    /// Replays every registry to the engine, lowest tier first, in a single
    /// flush.
    pub fn replay(&self) -> Rc {
        self.hw.enable();
        for listener in self.listeners() {
            debug!("replay: {} ({})", listener.name(), listener.order());
            listener.handle_replay();
        }
        self.hw.write()
    }

    /// Writes the objects held by `client` to `out`.
    pub fn dump(&self, client: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        self.clients().dump(client, out)
    }
}

impl fmt::Debug for ObjectManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectManager")
            .field("hw", &self.hw)
            .field("listeners", &self.listeners().len())
            .finish()
    }
}
