//! In-memory forwarding engine.
//!
//! [`SimEngine`] answers the same requests a real engine would, keeping its
//! routing tables in memory. It backs the agent's simulation mode and the
//! tests: every request is recorded, failures can be injected per table,
//! and restarts or link drops can be simulated.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::api::{ApiReply, ApiRequest, IpTableAddDel, IpTableDetails, L3Proto, TableId, DEFAULT_TABLE};
use crate::connection::Connection;
use crate::rc::{HwError, HwResult};

/// Return value for deleting a table that does not exist.
pub const RETVAL_NO_SUCH_TABLE: i32 = -6;

#[derive(Debug)]
struct SimState {
    connected: bool,
    reachable: bool,
    tables: BTreeSet<(TableId, L3Proto)>,
    requests: Vec<ApiRequest>,
    failures: HashMap<TableId, i32>,
}

impl SimState {
    fn default_tables() -> BTreeSet<(TableId, L3Proto)> {
        L3Proto::ALL.iter().map(|p| (DEFAULT_TABLE, *p)).collect()
    }

    fn add_del(&mut self, req: &IpTableAddDel) -> i32 {
        if let Some(retval) = self.failures.get(&req.table_id) {
            return *retval;
        }
        let key = (req.table_id, req.proto);
        if req.is_add {
            self.tables.insert(key);
            0
        } else if self.tables.remove(&key) {
            0
        } else {
            RETVAL_NO_SUCH_TABLE
        }
    }

    fn dump(&self) -> Vec<IpTableDetails> {
        self.tables
            .iter()
            .map(|(table_id, proto)| IpTableDetails {
                table_id: *table_id,
                proto: *proto,
                name: format!("{}-VRF:{}", proto, table_id),
            })
            .collect()
    }
}

/// A simulated forwarding engine.
///
/// Clones share state, so a test can keep one handle while the command
/// queue owns another.
#[derive(Debug, Clone)]
pub struct SimEngine {
    state: Arc<Mutex<SimState>>,
}

impl SimEngine {
    /// Creates an engine holding the default table for both families.
    pub fn new() -> Self {
        Self::with_tables(SimState::default_tables())
    }

    /// Creates an engine with no tables at all.
    pub fn bare() -> Self {
        Self::with_tables(BTreeSet::new())
    }

    fn with_tables(tables: BTreeSet<(TableId, L3Proto)>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                connected: false,
                reachable: true,
                tables,
                requests: Vec::new(),
                failures: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a table directly, as if configured by another client.
    pub fn preload(&self, table_id: TableId, proto: L3Proto) {
        self.lock().tables.insert((table_id, proto));
    }

    /// Installs a table for both families.
    pub fn preload_table(&self, table_id: TableId) {
        for proto in L3Proto::ALL {
            self.preload(table_id, proto);
        }
    }

    /// Returns true if the engine holds the table for the family.
    pub fn has_table(&self, table_id: TableId, proto: L3Proto) -> bool {
        self.lock().tables.contains(&(table_id, proto))
    }

    /// Returns every table the engine holds.
    pub fn tables(&self) -> Vec<(TableId, L3Proto)> {
        self.lock().tables.iter().copied().collect()
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    /// Forgets the recorded requests.
    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Makes every add/del on `table_id` answer with `retval`.
    pub fn fail_table(&self, table_id: TableId, retval: i32) {
        self.lock().failures.insert(table_id, retval);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Simulates an engine restart: state is lost and clients are dropped.
    pub fn restart(&self) {
        let mut state = self.lock();
        debug!("sim: restart, dropping {} tables", state.tables.len());
        state.tables = SimState::default_tables();
        state.connected = false;
    }

    /// Simulates losing the link; reconnects fail until restored.
    pub fn drop_link(&self) {
        let mut state = self.lock();
        state.connected = false;
        state.reachable = false;
    }

    /// Restores the link after [`SimEngine::drop_link`].
    pub fn restore_link(&self) {
        self.lock().reachable = true;
    }
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for SimEngine {
    fn connect(&mut self) -> HwResult<()> {
        let mut state = self.lock();
        if !state.reachable {
            return Err(HwError::transport("engine unreachable"));
        }
        state.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.lock().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn execute(&mut self, request: &ApiRequest) -> HwResult<ApiReply> {
        let mut state = self.lock();
        if !state.connected {
            return Err(HwError::Disconnected);
        }
        state.requests.push(request.clone());

        let reply = match request {
            ApiRequest::ControlPing => ApiReply::Retval(0),
            ApiRequest::IpTableAddDel(req) => ApiReply::Retval(state.add_del(req)),
            ApiRequest::IpTableDump => ApiReply::IpTables(state.dump()),
        };
        Ok(reply)
    }
}
