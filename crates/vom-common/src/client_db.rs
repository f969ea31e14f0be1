//! Per-client record of the objects each client holds.
//!
//! A client (a configuration source, a population pass) holds handles to
//! the canonical objects it asked for. Entries carry a stale mark so a
//! client can mark everything, re-write what it still wants and sweep the
//! rest.

use std::collections::BTreeMap;
use std::fmt;

use crate::singular_db::Held;

/// Identifies a client of the object manager.
pub type ClientKey = String;

/// Identity of an object across kinds: (kind, rendered key).
type ObjectId = (&'static str, String);

struct ClientEntry {
    object: Box<dyn Held>,
    stale: bool,
}

/// Objects held by each client.
#[derive(Default)]
pub struct ClientDb {
    clients: BTreeMap<ClientKey, BTreeMap<ObjectId, ClientEntry>>,
}

impl ClientDb {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `object` for `client`, clearing any stale mark.
    ///
    /// Returns the handle previously recorded for the same object, which
    /// the caller should drop outside any lock.
    pub fn insert(&mut self, client: &str, object: Box<dyn Held>) -> Option<Box<dyn Held>> {
        let id = (object.kind(), object.key_string());
        self.clients
            .entry(client.to_string())
            .or_default()
            .insert(
                id,
                ClientEntry {
                    object,
                    stale: false,
                },
            )
            .map(|old| old.object)
    }

    /// Marks every object held by `client` as stale.
    pub fn mark(&mut self, client: &str) {
        if let Some(objects) = self.clients.get_mut(client) {
            for entry in objects.values_mut() {
                entry.stale = true;
            }
        }
    }

    /// Removes and returns the stale objects held by `client`.
    pub fn sweep(&mut self, client: &str) -> Vec<Box<dyn Held>> {
        let Some(objects) = self.clients.get_mut(client) else {
            return Vec::new();
        };
        let stale: Vec<ObjectId> = objects
            .iter()
            .filter(|(_, e)| e.stale)
            .map(|(id, _)| id.clone())
            .collect();
        stale
            .into_iter()
            .filter_map(|id| objects.remove(&id).map(|e| e.object))
            .collect()
    }

    /// Removes and returns every object held by `client`.
    pub fn remove(&mut self, client: &str) -> Vec<Box<dyn Held>> {
        self.clients
            .remove(client)
            .map(|objects| objects.into_values().map(|e| e.object).collect())
            .unwrap_or_default()
    }

    /// Number of objects held by `client`.
    pub fn len(&self, client: &str) -> usize {
        self.clients.get(client).map(|o| o.len()).unwrap_or(0)
    }

    /// Returns the stale mark of an object held by `client`.
    pub fn is_stale(&self, client: &str, kind: &str, key: &str) -> Option<bool> {
        self.clients
            .get(client)?
            .iter()
            .find(|((k, id), _)| *k == kind && id == key)
            .map(|(_, e)| e.stale)
    }

    /// Every known client.
    pub fn clients(&self) -> Vec<ClientKey> {
        self.clients.keys().cloned().collect()
    }

    /// Writes the objects held by `client` to `out`.
    pub fn dump(&self, client: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "client:{}", client)?;
        if let Some(objects) = self.clients.get(client) {
            for entry in objects.values() {
                let mark = if entry.stale { " (stale)" } else { "" };
                writeln!(out, "  {}{}", entry.object, mark)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::singular_db::SingularDb;
    use crate::testing::{test_hw, TestObject};

    #[test]
    fn test_insert_replaces_same_object() {
        let (_engine, hw) = test_hw();
        let db = SingularDb::new(hw);
        let mut clients = ClientDb::new();

        assert!(clients
            .insert("cfg", Box::new(db.find_or_add(TestObject::new(1))))
            .is_none());
        let old = clients.insert("cfg", Box::new(db.find_or_add(TestObject::new(1))));
        assert!(old.is_some());
        drop(old);

        assert_eq!(clients.len("cfg"), 1);
        assert_eq!(db.holders(&1), Some(1));
    }

    #[test]
    fn test_mark_and_sweep() {
        let (_engine, hw) = test_hw();
        let db = SingularDb::new(hw);
        let mut clients = ClientDb::new();

        clients.insert("cfg", Box::new(db.find_or_add(TestObject::new(1))));
        clients.insert("cfg", Box::new(db.find_or_add(TestObject::new(2))));
        clients.mark("cfg");
        assert_eq!(clients.is_stale("cfg", "test-object", "1"), Some(true));

        // Re-writing object 1 keeps it
        clients.insert("cfg", Box::new(db.find_or_add(TestObject::new(1))));
        assert_eq!(clients.is_stale("cfg", "test-object", "1"), Some(false));

        let swept = clients.sweep("cfg");
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].key_string(), "2");
        drop(swept);

        assert_eq!(db.keys(), vec![1]);
    }

    #[test]
    fn test_remove_and_dump() {
        let (_engine, hw) = test_hw();
        let db = SingularDb::new(hw);
        let mut clients = ClientDb::new();

        clients.insert("a", Box::new(db.find_or_add(TestObject::new(7))));
        let mut out = String::new();
        clients.dump("a", &mut out).unwrap();
        assert_eq!(
            out,
            "client:a\n  test-object:[7 hw-item:[rc:no-op data:true]]\n"
        );

        assert_eq!(clients.remove("a").len(), 1);
        assert!(clients.remove("a").is_empty());
        assert!(clients.clients().is_empty());
        assert!(db.is_empty());
    }
}
