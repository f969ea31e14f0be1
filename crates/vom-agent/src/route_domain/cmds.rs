//! Engine commands for routing tables.

use std::fmt;

use log::warn;
use vom_hw::cmd::issue_retval;
use vom_hw::{
    ApiReply, ApiRequest, Cmd, Connection, HwError, HwItem, IpTableAddDel, IpTableDetails,
    L3Proto, Rc, Records, TableId,
};

fn add_del(table_id: TableId, proto: L3Proto, is_add: bool) -> ApiRequest {
    ApiRequest::IpTableAddDel(IpTableAddDel {
        table_id,
        proto,
        is_add,
    })
}

/// Creates the table for one address family.
pub struct CreateCmd {
    item: HwItem<bool>,
    proto: L3Proto,
    table_id: TableId,
}

impl CreateCmd {
    /// `item` should be a shared view of the owning domain's attribute.
    pub fn new(item: HwItem<bool>, proto: L3Proto, table_id: TableId) -> Self {
        Self {
            item,
            proto,
            table_id,
        }
    }
}

impl Cmd for CreateCmd {
    fn issue(&mut self, conn: &mut dyn Connection) -> Rc {
        let rc = issue_retval(conn, &add_del(self.table_id, self.proto, true));
        self.item.set(rc);
        rc
    }

    fn succeeded(&mut self) {
        self.item.set(Rc::Ok);
    }
}

impl fmt::Display for CreateCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ip-table-create:[table:{} proto:{} {}]",
            self.table_id, self.proto, self.item
        )
    }
}

/// Deletes the table for one address family.
///
/// On success the attribute goes back to unprogrammed. A failed delete
/// leaves it programmed, as the table is still in the engine.
pub struct DeleteCmd {
    item: HwItem<bool>,
    proto: L3Proto,
    table_id: TableId,
}

impl DeleteCmd {
    pub fn new(item: HwItem<bool>, proto: L3Proto, table_id: TableId) -> Self {
        Self {
            item,
            proto,
            table_id,
        }
    }
}

impl Cmd for DeleteCmd {
    fn issue(&mut self, conn: &mut dyn Connection) -> Rc {
        let rc = issue_retval(conn, &add_del(self.table_id, self.proto, false));
        if rc.is_ok() {
            self.item.set(Rc::Noop);
        }
        rc
    }

    fn succeeded(&mut self) {
        self.item.set(Rc::Noop);
    }
}

impl fmt::Display for DeleteCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ip-table-delete:[table:{} proto:{} {}]",
            self.table_id, self.proto, self.item
        )
    }
}

/// Lists every table in the engine.
///
/// The records are available from the [`Records`] passed in once the queue
/// has been flushed.
pub struct DumpCmd {
    records: Records<IpTableDetails>,
}

impl DumpCmd {
    pub fn new(records: Records<IpTableDetails>) -> Self {
        Self { records }
    }
}

impl Cmd for DumpCmd {
    fn issue(&mut self, conn: &mut dyn Connection) -> Rc {
        match conn.execute(&ApiRequest::IpTableDump) {
            Ok(ApiReply::IpTables(tables)) => {
                self.records.fill(tables);
                Rc::Ok
            }
            Ok(_) => {
                let err = HwError::unexpected_reply(ApiRequest::IpTableDump.to_string());
                warn!("{}", err);
                err.rc()
            }
            Err(err) => {
                warn!("ip-table-dump: {}", err);
                err.rc()
            }
        }
    }

    // A dump has no attribute to record against.
    fn succeeded(&mut self) {}
}

impl fmt::Display for DumpCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ip-table-dump")
    }
}
