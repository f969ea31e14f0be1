//! Hardware-backed attributes.
//!
//! An [`HwItem`] pairs a value with the outcome of the last operation that
//! pushed it to the engine. Objects own their items; commands hold a shared
//! view of the same item so the queue can record the outcome in place.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::rc::Rc;

#[derive(Debug)]
struct ItemState<T> {
    data: T,
    rc: Rc,
}

/// A value tracked alongside whether it has been programmed.
///
/// Cloning produces an independent item with the same state, which is what
/// copying a prototype into the registry needs. Use [`HwItem::share`] to get
/// a view that observes and records outcomes on the same item.
///
/// # Example
///
/// ```
/// use vom_hw::{HwItem, Rc};
///
/// let item = HwItem::new(true);
/// assert_eq!(item.rc(), Rc::Noop);
///
/// let view = item.share();
/// view.set(Rc::Ok);
/// assert!(item.is_programmed());
///
/// let copy = item.clone();
/// copy.set(Rc::Invalid);
/// assert!(item.is_programmed());
/// ```
pub struct HwItem<T> {
    state: Arc<Mutex<ItemState<T>>>,
}

impl<T> HwItem<T> {
    /// Creates an item that has never been programmed.
    pub fn new(data: T) -> Self {
        Self::with_rc(data, Rc::Noop)
    }

    /// Creates an item with an explicit outcome code.
    pub fn with_rc(data: T, rc: Rc) -> Self {
        Self {
            state: Arc::new(Mutex::new(ItemState { data, rc })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ItemState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the outcome of the last operation.
    pub fn rc(&self) -> Rc {
        self.lock().rc
    }

    /// Records the outcome of an operation.
    pub fn set(&self, rc: Rc) {
        self.lock().rc = rc;
    }

    /// Returns true if the value is programmed in the engine.
    pub fn is_programmed(&self) -> bool {
        self.rc().is_ok()
    }

    /// Returns a view onto the same item.
    pub fn share(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> HwItem<T> {
    /// Returns a copy of the value.
    pub fn data(&self) -> T {
        self.lock().data.clone()
    }
}

impl<T: Clone> Clone for HwItem<T> {
    fn clone(&self) -> Self {
        let state = self.lock();
        Self::with_rc(state.data.clone(), state.rc)
    }
}

impl<T: fmt::Display> fmt::Display for HwItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        write!(f, "hw-item:[rc:{} data:{}]", state.rc, state.data)
    }
}

impl<T: fmt::Debug> fmt::Debug for HwItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("HwItem")
            .field("data", &state.data)
            .field("rc", &state.rc)
            .finish()
    }
}
