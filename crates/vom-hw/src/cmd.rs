//! Commands queued on the hardware layer.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::warn;

use crate::api::{ApiReply, ApiRequest};
use crate::connection::Connection;
use crate::rc::{HwError, Rc};

/// A programming operation waiting in the command queue.
///
/// Commands record their outcome on the hardware-backed attribute they
/// target, so the owning object observes it once the queue is flushed.
pub trait Cmd: Send + fmt::Display {
    /// Sends the command to the engine and records the outcome.
    fn issue(&mut self, conn: &mut dyn Connection) -> Rc;

    /// Records success without contacting the engine.
    ///
    /// Called for every command flushed while the queue is disabled, i.e.
    /// when the state is known to already exist in the engine.
    fn succeeded(&mut self);
}

/// Sends a request whose reply is a single return value.
pub fn issue_retval(conn: &mut dyn Connection, request: &ApiRequest) -> Rc {
    match conn.execute(request) {
        Ok(ApiReply::Retval(retval)) => Rc::from_retval(retval),
        Ok(_) => {
            let err = HwError::unexpected_reply(request.to_string());
            warn!("{}", err);
            err.rc()
        }
        Err(err) => {
            warn!("{}: {}", request, err);
            err.rc()
        }
    }
}

/// Result set of a dump command.
///
/// The command fills it when issued; the caller keeps a clone and reads the
/// records after the queue has been flushed.
pub struct Records<R> {
    inner: Arc<Mutex<Vec<R>>>,
}

impl<R> Records<R> {
    /// Creates an empty result set.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the records.
    pub fn fill(&self, records: Vec<R>) {
        *self.lock() = records;
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no records are held.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes and returns the records as a lazy sequence.
    pub fn take(&self) -> std::vec::IntoIter<R> {
        std::mem::take(&mut *self.lock()).into_iter()
    }
}

impl<R> Clone for Records<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> Default for Records<R> {
    fn default() -> Self {
        Self::new()
    }
}
