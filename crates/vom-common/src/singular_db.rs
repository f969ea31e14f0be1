//! Singleton registry of canonical objects.
//!
//! A [`SingularDb`] holds at most one instance per key. Prototypes are
//! turned into canonical instances by [`SingularDb::find_or_add`], which
//! hands out a [`Handle`]. When the last handle to an instance goes away
//! the registry sweeps the instance's engine state and evicts it, all under
//! its own lock, so a racing `find_or_add` either sees the live instance or
//! creates a fresh one. The instance is evicted even when its deletes fail;
//! [`Handle::release`] reports the sweep outcome so the caller can act on
//! what was left in the engine.
//!
//! # Example
//!
//! ```ignore
//! let db = SingularDb::new(hw);
//! let a = db.find_or_add(RouteDomain::new(5));
//! let b = db.find_or_add(RouteDomain::new(5));
//! assert!(Handle::ptr_eq(&a, &b));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};
use vom_hw::{Hw, Rc};

use crate::object::Object;

/// Registry of canonical instances of one object kind.
pub struct SingularDb<T: Object> {
    hw: Arc<Hw>,
    entries: RwLock<BTreeMap<T::Key, Arc<T>>>,
}

impl<T: Object> SingularDb<T> {
    /// Creates an empty registry whose objects program through `hw`.
    pub fn new(hw: Arc<Hw>) -> Arc<Self> {
        Arc::new(Self {
            hw,
            entries: RwLock::new(BTreeMap::new()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<T::Key, Arc<T>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<T::Key, Arc<T>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(self: &Arc<Self>, inner: Arc<T>) -> Handle<T> {
        Handle {
            db: Arc::clone(self),
            inner: Some(inner),
        }
    }

    /// The command queue objects in this registry program through.
    pub fn hw(&self) -> &Arc<Hw> {
        &self.hw
    }

    /// Returns the canonical instance for `key`, if any.
    ///
    /// **This never creates entries.**
    pub fn find(self: &Arc<Self>, key: &T::Key) -> Option<Handle<T>> {
        let inner = self.read().get(key).cloned();
        inner.map(|inner| self.handle(inner))
    }

    /// Returns the canonical instance for the prototype's key, inserting the
    /// prototype as that instance if none exists.
    pub fn find_or_add(self: &Arc<Self>, prototype: T) -> Handle<T> {
        let key = prototype.key();
        let inner = {
            let mut entries = self.write();
            let inner = entries.entry(key).or_insert_with(|| {
                debug!("{}: add {}", T::KIND, prototype);
                Arc::new(prototype)
            });
            Arc::clone(inner)
        };
        self.handle(inner)
    }

    /// Releases a handle.
    ///
    /// If it was the last handle, the instance is swept and evicted and the
    /// sweep outcome is returned. Otherwise this is a no-op apart from
    /// dropping the handle and `None` is returned: the instance stays
    /// canonical for the remaining holders.
    pub fn release(&self, handle: Handle<T>) -> Option<Rc> {
        debug_assert!(std::ptr::eq(self, Arc::as_ptr(&handle.db)));
        handle.release()
    }

    fn release_instance(&self, inst: Arc<T>) -> Option<Rc> {
        let mut entries = self.write();
        let key = inst.key();

        // The registry holds one reference and the caller another.
        let last = match entries.get(&key) {
            Some(canonical) if Arc::ptr_eq(canonical, &inst) => Arc::strong_count(&inst) == 2,
            _ => false,
        };
        if !last {
            drop(inst);
            return None;
        }

        let rc = inst.sweep(&self.hw);
        entries.remove(&key);
        if rc.is_ok() {
            debug!("{}: release {}", T::KIND, key);
        } else {
            warn!("{}: release {}: teardown failed: {}", T::KIND, inst, rc);
        }
        drop(inst);
        Some(rc)
    }

    /// Snapshot of every canonical instance, in key order.
    ///
    /// The snapshot holds handles, so instances stay alive while it does.
    pub fn iter(self: &Arc<Self>) -> std::vec::IntoIter<Handle<T>> {
        let inners: Vec<Arc<T>> = self.read().values().cloned().collect();
        inners
            .into_iter()
            .map(|inner| self.handle(inner))
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Keys of every canonical instance, in order.
    pub fn keys(&self) -> Vec<T::Key> {
        self.read().keys().cloned().collect()
    }

    /// Number of canonical instances.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Returns true if an instance exists for `key`.
    pub fn contains_key(&self, key: &T::Key) -> bool {
        self.read().contains_key(key)
    }

    /// Number of live handles to the instance for `key`.
    pub fn holders(&self, key: &T::Key) -> Option<usize> {
        self.read()
            .get(key)
            .map(|inner| Arc::strong_count(inner) - 1)
    }

    /// Re-enqueues the programmed state of every instance. Does not flush.
    pub fn replay(&self) {
        let entries = self.read();
        for inst in entries.values() {
            inst.replay(&self.hw);
        }
    }

    /// Writes every instance to `out`.
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let entries = self.read();
        for (key, inst) in entries.iter() {
            writeln!(out, "  key:{}", key)?;
            writeln!(out, "    {}", inst)?;
        }
        Ok(())
    }
}

impl<T: Object> fmt::Debug for SingularDb<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingularDb")
            .field("kind", &T::KIND)
            .field("len", &self.len())
            .finish()
    }
}

/// A live reference to a canonical instance.
///
/// Dropping the last handle sweeps and evicts the instance.
pub struct Handle<T: Object> {
    db: Arc<SingularDb<T>>,
    inner: Option<Arc<T>>,
}

impl<T: Object> Handle<T> {
    fn get(&self) -> &Arc<T> {
        match &self.inner {
            Some(inner) => inner,
            // Only `release` and `drop` take the instance, and both consume the handle.
            None => unreachable!("handle used after release"),
        }
    }

    /// Releases this handle; see [`SingularDb::release`].
    pub fn release(mut self) -> Option<Rc> {
        let inner = self.inner.take()?;
        self.db.release_instance(inner)
    }

    /// Number of live handles to this instance, this one included.
    pub fn holders(&self) -> usize {
        Arc::strong_count(self.get()) - 1
    }

    /// Returns true if both handles refer to the same instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(a.get(), b.get())
    }
}

impl<T: Object> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
    }
}

impl<T: Object> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            inner: self.inner.clone(),
        }
    }
}

impl<T: Object> Drop for Handle<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            self.db.release_instance(inner);
        }
    }
}

impl<T: Object> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        Handle::ptr_eq(self, other)
    }
}

impl<T: Object> Eq for Handle<T> {}

impl<T: Object> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.get().as_ref(), f)
    }
}

impl<T: Object> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.get())
    }
}

/// A type-erased handle, so one client can hold objects of many kinds.
pub trait Held: Send + Sync + fmt::Display {
    /// The object kind.
    fn kind(&self) -> &'static str;

    /// The object key, rendered.
    fn key_string(&self) -> String;

    /// Releases the handle, returning the sweep outcome if it was the last.
    fn release(self: Box<Self>) -> Option<Rc>;
}

impl<T: Object> Held for Handle<T> {
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn key_string(&self) -> String {
        self.key().to_string()
    }

    fn release(self: Box<Self>) -> Option<Rc> {
        Handle::release(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_hw, TestObject};
    use std::thread;

    #[test]
    fn test_find_never_creates() {
        let (_engine, hw) = test_hw();
        let db = SingularDb::<TestObject>::new(hw);

        assert!(db.find(&1).is_none());
        assert!(db.is_empty());
    }

    #[test]
    fn test_find_or_add_returns_existing() {
        let (_engine, hw) = test_hw();
        let db = SingularDb::new(hw);

        let a = db.find_or_add(TestObject::new(1));
        let b = db.find_or_add(TestObject::new(1));
        assert!(Handle::ptr_eq(&a, &b));
        assert_eq!(db.len(), 1);
        assert_eq!(db.holders(&1), Some(2));

        let found = db.find(&1).unwrap();
        assert_eq!(found, a);
        assert_eq!(a.holders(), 3);
    }

    #[test]
    fn test_concurrent_find_or_add_single_winner() {
        let (_engine, hw) = test_hw();
        let db = SingularDb::new(hw);

        let handles: Vec<Handle<TestObject>> = thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| s.spawn(|| db.find_or_add(TestObject::new(5))))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(db.len(), 1);
        assert!(handles.iter().all(|h| Handle::ptr_eq(h, &handles[0])));
        assert_eq!(db.holders(&5), Some(8));
    }

    #[test]
    fn test_release_is_noop_while_referenced() {
        let (_engine, hw) = test_hw();
        let db = SingularDb::new(hw);

        let a = db.find_or_add(TestObject::new(2));
        let b = a.clone();
        let sweeps = a.sweeps();

        assert_eq!(db.release(a), None);
        assert!(db.contains_key(&2));
        assert_eq!(sweeps.get(), 0);

        assert_eq!(db.release(b), Some(Rc::Ok));
        assert!(!db.contains_key(&2));
        assert_eq!(sweeps.get(), 1);
    }

    #[test]
    fn test_drop_of_last_handle_sweeps() {
        let (engine, hw) = test_hw();
        let db = SingularDb::new(Arc::clone(&hw));

        let obj = db.find_or_add(TestObject::new(3));
        obj.update(&TestObject::new(3), &hw);
        hw.write();
        assert!(obj.is_programmed());
        let sweeps = obj.sweeps();

        drop(obj);
        assert!(db.is_empty());
        assert_eq!(sweeps.get(), 1);
        assert!(engine.tables().is_empty());
    }

    #[test]
    fn test_release_reports_failed_teardown() {
        let (engine, hw) = test_hw();
        let db = SingularDb::new(Arc::clone(&hw));

        let obj = db.find_or_add(TestObject::new(8));
        obj.update(&TestObject::new(8), &hw);
        hw.write();
        engine.fail_table(8, -1);

        assert_eq!(obj.release(), Some(Rc::Invalid));
        assert!(db.is_empty());
        assert_eq!(engine.tables(), vec![(8, vom_hw::L3Proto::Ipv4)]);
    }

    #[test]
    fn test_iter_is_ordered_snapshot() {
        let (_engine, hw) = test_hw();
        let db = SingularDb::new(hw);

        let _c = db.find_or_add(TestObject::new(30));
        let _a = db.find_or_add(TestObject::new(10));
        let _b = db.find_or_add(TestObject::new(20));

        let keys: Vec<u32> = db.iter().map(|h| h.key()).collect();
        assert_eq!(keys, vec![10, 20, 30]);
        assert_eq!(db.keys(), vec![10, 20, 30]);

        // The snapshot's handles are gone; the originals keep the entries
        assert_eq!(db.len(), 3);
        assert_eq!(db.holders(&10), Some(1));
    }

    #[test]
    fn test_dump() {
        let (_engine, hw) = test_hw();
        let db = SingularDb::new(hw);
        let _a = db.find_or_add(TestObject::new(4));

        let mut out = String::new();
        db.dump(&mut out).unwrap();
        assert_eq!(out, "  key:4\n    test-object:[4 hw-item:[rc:no-op data:true]]\n");
    }
}
