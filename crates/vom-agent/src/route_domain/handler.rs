//! Population, replay and inspection for route domains.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use vom_common::{CommandHandler, Dependency, Inspect, InspectError, Listener, ObjectManager};
use vom_hw::{L3Proto, Rc, Records, TableId};

use super::cmds::DumpCmd;
use super::entity::{RouteDomain, RouteDomains};

/// Names the handler is reachable under in [`Inspect`].
pub const INSPECT_NAMES: [&str; 2] = ["rd", "route-domain"];

/// Process-wide event handler for route domains.
pub struct RouteDomainEventHandler {
    domains: RouteDomains,
}

impl RouteDomainEventHandler {
    /// Creates the handler and registers it with the object manager and the
    /// inspection registrar.
    pub fn register(
        domains: RouteDomains,
        om: &ObjectManager,
        inspect: &Inspect,
    ) -> Result<Arc<Self>, InspectError> {
        let handler = Arc::new(Self { domains });
        inspect.register_handler(&INSPECT_NAMES, "Route Domains", handler.clone())?;
        om.register_listener(handler.clone());
        Ok(handler)
    }
}

impl CommandHandler for RouteDomainEventHandler {
    fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.domains.dump(out)
    }
}

impl Listener for RouteDomainEventHandler {
    fn name(&self) -> &str {
        "route-domain"
    }

    fn handle_populate(&self, client: &str, om: &ObjectManager) -> Rc {
        let records = Records::new();
        let hw = om.hw();
        hw.enqueue(Box::new(DumpCmd::new(records.clone())));
        let rc = hw.write();
        if !rc.is_ok() {
            warn!("ip-table-dump failed: {}", rc);
            return rc;
        }

        // One record per table and family
        let mut present: BTreeMap<TableId, Vec<L3Proto>> = BTreeMap::new();
        for record in records.take() {
            debug!(
                "ip-table-dump: table {} {} ({})",
                record.table_id, record.proto, record.name
            );
            present.entry(record.table_id).or_default().push(record.proto);
        }

        for (table_id, protos) in present {
            // The table already exists; record it without sending anything.
            om.commit(client, self.domains.db(), &RouteDomain::new(table_id));
            if let Some(rd) = self.domains.find(table_id) {
                rd.retain_families(&protos);
            }
        }
        Rc::Ok
    }

    fn handle_replay(&self) {
        self.domains.db().replay();
    }

    fn order(&self) -> Dependency {
        Dependency::Table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vom_hw::{ApiRequest, Hw, L3Proto, SimEngine};

    fn setup(engine: &SimEngine) -> (ObjectManager, Inspect, RouteDomains) {
        let hw = Arc::new(Hw::new(Box::new(engine.clone())));
        hw.connect().unwrap();
        let om = ObjectManager::new(Arc::clone(&hw));
        let inspect = Inspect::new();
        let domains = RouteDomains::new(hw);
        RouteDomainEventHandler::register(domains.clone(), &om, &inspect).unwrap();
        (om, inspect, domains)
    }

    #[test]
    fn test_registers_everywhere() {
        let engine = SimEngine::bare();
        let (om, inspect, _domains) = setup(&engine);

        let listeners = om.listeners();
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].order(), Dependency::Table);

        let mut help = String::new();
        inspect.handle_input("help", &mut help).unwrap();
        assert!(help.contains("rd, route-domain"));
        assert!(help.contains("Route Domains"));
    }

    #[test]
    fn test_populate_registers_without_recreating() {
        let engine = SimEngine::bare();
        engine.preload_table(3);
        engine.preload_table(7);
        let (om, _inspect, domains) = setup(&engine);

        assert_eq!(om.populate("boot"), Rc::Ok);

        assert_eq!(engine.requests(), vec![ApiRequest::IpTableDump]);
        let ids: Vec<_> = domains.iter().map(|rd| rd.table_id()).collect();
        assert_eq!(ids, vec![3, 7]);
        assert!(domains.iter().all(|rd| rd.is_programmed()));
        assert_eq!(om.client_len("boot"), 2);
    }

    #[test]
    fn test_populate_failure_surfaces() {
        let engine = SimEngine::bare();
        let (om, _inspect, domains) = setup(&engine);
        om.hw().disconnect();

        assert_eq!(om.populate("boot"), Rc::Invalid);
        assert!(domains.is_empty());
    }

    #[test]
    fn test_show_through_inspect() {
        let engine = SimEngine::bare();
        engine.preload(4, L3Proto::Ipv4);
        let (om, inspect, _domains) = setup(&engine);
        om.populate("boot");

        let mut out = String::new();
        inspect.handle_input("rd", &mut out).unwrap();
        assert_eq!(
            out,
            "  key:4\n    route-domain:[table-id:4 v4:hw-item:[rc:ok data:true] v6:hw-item:[rc:no-op data:true]]\n"
        );
    }

    #[test]
    fn test_populate_keeps_only_reported_families() {
        let engine = SimEngine::bare();
        engine.preload(9, L3Proto::Ipv6);
        let (om, _inspect, domains) = setup(&engine);

        assert_eq!(om.populate("boot"), Rc::Ok);
        let rd = domains.find(9).unwrap();
        assert_eq!(rd.rc(L3Proto::Ipv4), Rc::Noop);
        assert_eq!(rd.rc(L3Proto::Ipv6), Rc::Ok);

        // Nothing to re-create for the missing family
        engine.clear_requests();
        assert_eq!(om.replay(), Rc::Ok);
        assert_eq!(
            engine.requests(),
            vec![ApiRequest::IpTableAddDel(vom_hw::IpTableAddDel {
                table_id: 9,
                proto: L3Proto::Ipv6,
                is_add: true,
            })]
        );

        // Wanting the table programs the missing family only
        engine.clear_requests();
        assert_eq!(om.write("cfg", domains.db(), &RouteDomain::new(9)), Rc::Ok);
        assert!(rd.is_programmed());
        assert_eq!(engine.requests().len(), 1);
        drop(rd);

        // Teardown deletes both families, and nothing that was never there
        assert_eq!(om.remove("boot"), Rc::Ok);
        assert_eq!(om.remove("cfg"), Rc::Ok);
        assert!(engine.tables().is_empty());
    }
}
