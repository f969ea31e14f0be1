//! The route domain object and its registry.

use std::fmt;
use std::sync::Arc;

use vom_common::{Handle, Object, SingularDb};
use vom_hw::{Cmd, Hw, HwItem, L3Proto, Rc, TableId, DEFAULT_TABLE};

use super::cmds::{CreateCmd, DeleteCmd};

/// A routing table, programmed for both IPv4 and IPv6.
///
/// Two route domains are equal when they name the same table, whatever
/// their programming state.
#[derive(Clone)]
pub struct RouteDomain {
    table_id: TableId,
    hw_v4: HwItem<bool>,
    hw_v6: HwItem<bool>,
}

impl RouteDomain {
    /// Describes the desired table. Nothing is programmed until the
    /// domain is written through the object manager.
    pub fn new(table_id: TableId) -> Self {
        Self {
            table_id,
            hw_v4: HwItem::new(true),
            hw_v6: HwItem::new(true),
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Outcome of the last operation for one family.
    pub fn rc(&self, proto: L3Proto) -> Rc {
        self.item(proto).rc()
    }

    /// Returns true once both families are programmed.
    pub fn is_programmed(&self) -> bool {
        self.hw_v4.is_programmed() && self.hw_v6.is_programmed()
    }

    /// The canonical instance for this domain's table.
    pub fn singular(&self, domains: &RouteDomains) -> Handle<RouteDomain> {
        domains.find_or_add(self.clone())
    }

    /// Marks the families missing from `present` as not programmed.
    pub(crate) fn retain_families(&self, present: &[L3Proto]) {
        for proto in L3Proto::ALL {
            if !present.contains(&proto) {
                self.item(proto).set(Rc::Noop);
            }
        }
    }

    fn item(&self, proto: L3Proto) -> &HwItem<bool> {
        match proto {
            L3Proto::Ipv4 => &self.hw_v4,
            L3Proto::Ipv6 => &self.hw_v6,
        }
    }

    fn create(&self, proto: L3Proto) -> Box<dyn Cmd> {
        Box::new(CreateCmd::new(self.item(proto).share(), proto, self.table_id))
    }

    fn delete(&self, proto: L3Proto) -> Box<dyn Cmd> {
        Box::new(DeleteCmd::new(self.item(proto).share(), proto, self.table_id))
    }
}

impl PartialEq for RouteDomain {
    fn eq(&self, other: &Self) -> bool {
        self.table_id == other.table_id
    }
}

impl Eq for RouteDomain {}

impl fmt::Display for RouteDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "route-domain:[table-id:{} v4:{} v6:{}]",
            self.table_id, self.hw_v4, self.hw_v6
        )
    }
}

impl fmt::Debug for RouteDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDomain")
            .field("table_id", &self.table_id)
            .field("hw_v4", &self.hw_v4)
            .field("hw_v6", &self.hw_v6)
            .finish()
    }
}

impl Object for RouteDomain {
    type Key = TableId;
    const KIND: &'static str = "route-domain";

    fn key(&self) -> TableId {
        self.table_id
    }

    fn update(&self, _desired: &Self, hw: &Hw) {
        // Create whatever is not there yet
        for proto in L3Proto::ALL {
            if !self.item(proto).is_programmed() {
                hw.enqueue(self.create(proto));
            }
        }
    }

    fn sweep(&self, hw: &Hw) -> Rc {
        for proto in L3Proto::ALL {
            if self.item(proto).is_programmed() {
                hw.enqueue(self.delete(proto));
            }
        }
        hw.write()
    }

    fn replay(&self, hw: &Hw) {
        for proto in L3Proto::ALL {
            if self.item(proto).is_programmed() {
                hw.enqueue(self.create(proto));
            }
        }
    }
}

/// Registry of route domains.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone, Debug)]
pub struct RouteDomains {
    db: Arc<SingularDb<RouteDomain>>,
}

impl RouteDomains {
    /// Creates an empty registry programming through `hw`.
    pub fn new(hw: Arc<Hw>) -> Self {
        Self {
            db: SingularDb::new(hw),
        }
    }

    /// The underlying registry, for writes through the object manager.
    pub fn db(&self) -> &Arc<SingularDb<RouteDomain>> {
        &self.db
    }

    /// Returns the domain for `table_id`, if one exists.
    pub fn find(&self, table_id: TableId) -> Option<Handle<RouteDomain>> {
        self.db.find(&table_id)
    }

    /// Returns the canonical domain for the prototype's table, adding the
    /// prototype if there is none.
    pub fn find_or_add(&self, prototype: RouteDomain) -> Handle<RouteDomain> {
        self.db.find_or_add(prototype)
    }

    /// The domain for the default table.
    pub fn get_default(&self) -> Handle<RouteDomain> {
        self.find_or_add(RouteDomain::new(DEFAULT_TABLE))
    }

    /// Every domain, in table order.
    pub fn iter(&self) -> impl Iterator<Item = Handle<RouteDomain>> {
        self.db.iter()
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Writes every domain to `out`.
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.db.dump(out)
    }
}
