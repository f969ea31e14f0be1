//! Shared fixtures for unit tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vom_hw::cmd::issue_retval;
use vom_hw::{ApiRequest, Cmd, Connection, Hw, HwItem, IpTableAddDel, L3Proto, Rc, SimEngine};

use crate::object::Object;

/// A connected queue over an empty simulated engine.
pub(crate) fn test_hw() -> (SimEngine, Arc<Hw>) {
    let engine = SimEngine::bare();
    let hw = Arc::new(Hw::new(Box::new(engine.clone())));
    hw.connect().unwrap();
    (engine, hw)
}

#[derive(Clone, Default)]
pub(crate) struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct TableCmd {
    item: HwItem<bool>,
    id: u32,
    is_add: bool,
}

impl fmt::Display for TableCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "test-table:[{} add:{}]", self.id, self.is_add)
    }
}

impl Cmd for TableCmd {
    fn issue(&mut self, conn: &mut dyn Connection) -> Rc {
        let req = ApiRequest::IpTableAddDel(IpTableAddDel {
            table_id: self.id,
            proto: L3Proto::Ipv4,
            is_add: self.is_add,
        });
        let rc = issue_retval(conn, &req);
        self.item.set(match (rc, self.is_add) {
            (Rc::Ok, false) => Rc::Noop,
            (rc, _) => rc,
        });
        rc
    }

    fn succeeded(&mut self) {
        self.item.set(if self.is_add { Rc::Ok } else { Rc::Noop });
    }
}

/// One table in one family, with counters for sweeps and replays.
#[derive(Clone)]
pub(crate) struct TestObject {
    id: u32,
    item: HwItem<bool>,
    sweeps: Counter,
    replays: Counter,
}

impl TestObject {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            item: HwItem::new(true),
            sweeps: Counter::default(),
            replays: Counter::default(),
        }
    }

    pub(crate) fn is_programmed(&self) -> bool {
        self.item.is_programmed()
    }

    pub(crate) fn sweeps(&self) -> Counter {
        self.sweeps.clone()
    }

    pub(crate) fn replays(&self) -> Counter {
        self.replays.clone()
    }

    fn cmd(&self, is_add: bool) -> Box<dyn Cmd> {
        Box::new(TableCmd {
            item: self.item.share(),
            id: self.id,
            is_add,
        })
    }
}

impl fmt::Display for TestObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "test-object:[{} {}]", self.id, self.item)
    }
}

impl Object for TestObject {
    type Key = u32;
    const KIND: &'static str = "test-object";

    fn key(&self) -> u32 {
        self.id
    }

    fn update(&self, _desired: &Self, hw: &Hw) {
        if !self.item.is_programmed() {
            hw.enqueue(self.cmd(true));
        }
    }

    fn sweep(&self, hw: &Hw) -> Rc {
        self.sweeps.bump();
        if self.item.is_programmed() {
            hw.enqueue(self.cmd(false));
        }
        hw.write()
    }

    fn replay(&self, hw: &Hw) {
        self.replays.bump();
        if self.item.is_programmed() {
            hw.enqueue(self.cmd(true));
        }
    }
}
