//! The hardware command queue.
//!
//! Objects enqueue [`Cmd`]s as they reconcile; [`Hw::write`] flushes the
//! batch to the engine and blocks until every command has an outcome. The
//! queue is created once at startup and shared through an `Arc`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::api::ApiRequest;
use crate::cmd::{issue_retval, Cmd};
use crate::connection::Connection;
use crate::rc::{HwResult, Rc};

/// Counters for queue activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of flushes.
    pub writes: u64,
    /// Commands sent to the engine.
    pub issued: u64,
    /// Commands the engine acknowledged.
    pub succeeded: u64,
    /// Commands that failed.
    pub failed: u64,
    /// Commands completed without contacting the engine.
    pub suppressed: u64,
}

struct CmdQueue {
    pending: VecDeque<Box<dyn Cmd>>,
    conn: Box<dyn Connection>,
    enabled: bool,
    stats: QueueStats,
}

/// Batches programming operations and dispatches them to the engine.
pub struct Hw {
    inner: Mutex<CmdQueue>,
}

impl Hw {
    /// Creates a queue over the given connection. The queue starts enabled.
    pub fn new(conn: Box<dyn Connection>) -> Self {
        Self {
            inner: Mutex::new(CmdQueue {
                pending: VecDeque::new(),
                conn,
                enabled: true,
                stats: QueueStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CmdQueue> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a command to the batch.
    pub fn enqueue(&self, cmd: Box<dyn Cmd>) {
        debug!("enqueue: {}", cmd);
        self.lock().pending.push_back(cmd);
    }

    /// Number of commands waiting to be flushed.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Flushes every queued command, in order, and waits for the outcomes.
    ///
    /// Returns [`Rc::Ok`] if all commands succeeded, otherwise the outcome
    /// of the first failure. Individual outcomes are recorded by each
    /// command on its attribute.
    pub fn write(&self) -> Rc {
        let mut guard = self.lock();
        let queue = &mut *guard;
        queue.stats.writes += 1;

        let mut result = Rc::Ok;
        while let Some(mut cmd) = queue.pending.pop_front() {
            if !queue.enabled {
                cmd.succeeded();
                queue.stats.suppressed += 1;
                continue;
            }

            let rc = cmd.issue(queue.conn.as_mut());
            queue.stats.issued += 1;
            if rc.is_ok() {
                queue.stats.succeeded += 1;
                debug!("write: {} -> {}", cmd, rc);
            } else {
                queue.stats.failed += 1;
                warn!("write: {} -> {}", cmd, rc);
                result = result.first_failure(rc);
            }
        }
        result
    }

    /// Resumes sending commands to the engine.
    pub fn enable(&self) {
        self.lock().enabled = true;
    }

    /// Stops sending commands; flushed commands are marked succeeded.
    pub fn disable(&self) {
        self.lock().enabled = false;
    }

    /// Returns true if commands are sent to the engine.
    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Connects to the engine.
    pub fn connect(&self) -> HwResult<()> {
        let mut queue = self.lock();
        queue.conn.connect()?;
        info!("Connected to forwarding engine");
        Ok(())
    }

    /// Disconnects from the engine.
    pub fn disconnect(&self) {
        let mut queue = self.lock();
        queue.conn.disconnect();
        info!("Disconnected from forwarding engine");
    }

    /// Returns true while connected.
    pub fn is_connected(&self) -> bool {
        self.lock().conn.is_connected()
    }

    /// Checks that the engine is alive with a control ping.
    pub fn poll(&self) -> bool {
        let mut queue = self.lock();
        if !queue.conn.is_connected() {
            return false;
        }
        issue_retval(queue.conn.as_mut(), &ApiRequest::ControlPing).is_ok()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> QueueStats {
        self.lock().stats.clone()
    }
}

impl fmt::Debug for Hw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.lock();
        f.debug_struct("Hw")
            .field("pending", &queue.pending.len())
            .field("enabled", &queue.enabled)
            .field("stats", &queue.stats)
            .finish()
    }
}
