//! Agent implementation.
//!
//! The agent owns the command queue, the object manager, the inspection
//! registrar and every object registry. It:
//! - Connects to the engine and populates the registries on first contact
//! - Programs the configured route domains and sweeps anything else found
//! - Polls the engine and replays the registries after a reconnect
//! - Keeps resyncing on later polls until a sync succeeds

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use vom_common::{Inspect, InspectError, ObjectManager};
use vom_hw::{Connection, Hw, HwError, QueueStats, Rc, TableId, DEFAULT_TABLE};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::AgentConfig;
use crate::route_domain::{RouteDomain, RouteDomainEventHandler, RouteDomains};

/// Error type for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The engine could not be reached.
    #[error("Engine connection failed: {0}")]
    Connect(#[from] HwError),

    /// An inspection name clashed during startup.
    #[error("Inspect registration failed: {0}")]
    Inspect(#[from] InspectError),

    /// The engine rejected a programming operation.
    #[error("{action} failed: {rc}")]
    Programming { action: String, rc: Rc },

    #[error("Route domain {0} is not configured")]
    NotConfigured(TableId),

    #[error("The default route domain cannot be removed")]
    DefaultTable,
}

/// Counters for agent activity.
#[derive(Debug, Clone, Default)]
pub struct AgentStats {
    pub populates: u64,
    pub replays: u64,
    pub reconnects: u64,
    pub failed_polls: u64,
    pub route_domains_added: u64,
    pub route_domains_removed: u64,
}

/// Keeps the engine's routing tables in line with the configuration.
pub struct Agent {
    config: AgentConfig,
    hw: Arc<Hw>,
    om: ObjectManager,
    inspect: Inspect,
    route_domains: RouteDomains,
    /// Tables the agent wants programmed; always holds the default table.
    tables: BTreeSet<TableId>,
    populated: bool,
    /// False until a sync completes without failures.
    in_sync: bool,
    running: bool,
    stats: AgentStats,
}

impl Agent {
    /// Creates an agent talking to the engine over `conn`.
    ///
    /// Nothing is sent until [`init`](Self::init).
    pub fn new(config: AgentConfig, conn: Box<dyn Connection>) -> Result<Self, AgentError> {
        let hw = Arc::new(Hw::new(conn));
        let om = ObjectManager::new(Arc::clone(&hw));
        let inspect = Inspect::new();
        let route_domains = RouteDomains::new(Arc::clone(&hw));
        RouteDomainEventHandler::register(route_domains.clone(), &om, &inspect)?;

        let mut tables: BTreeSet<TableId> = config.route_domains.iter().copied().collect();
        tables.insert(DEFAULT_TABLE);

        Ok(Self {
            config,
            hw,
            om,
            inspect,
            route_domains,
            tables,
            populated: false,
            in_sync: false,
            running: false,
            stats: AgentStats::default(),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn hw(&self) -> &Arc<Hw> {
        &self.hw
    }

    pub fn om(&self) -> &ObjectManager {
        &self.om
    }

    pub fn inspect(&self) -> &Inspect {
        &self.inspect
    }

    pub fn route_domains(&self) -> &RouteDomains {
        &self.route_domains
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    /// Returns true once the registries have been populated from the engine.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Returns true if the last sync left the engine matching the
    /// configuration.
    pub fn is_in_sync(&self) -> bool {
        self.in_sync
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Tables the agent keeps programmed.
    pub fn configured_tables(&self) -> Vec<TableId> {
        self.tables.iter().copied().collect()
    }

    /// Connects and brings the engine in line with the configuration.
    pub fn init(&mut self) -> Result<(), AgentError> {
        info!(
            "Initializing agent for client {} with {} route domains",
            self.config.client,
            self.tables.len()
        );
        audit_log!(
            AuditRecord::new(AuditCategory::SystemLifecycle, "Agent", "init_start")
                .with_outcome(AuditOutcome::InProgress)
                .with_details(serde_json::json!({
                    "client": self.config.client,
                    "route_domains": self.configured_tables(),
                }))
        );

        if let Err(e) = self.hw.connect() {
            audit_log!(
                AuditRecord::new(AuditCategory::EngineOperation, "Agent", "connect")
                    .with_error(e.to_string())
            );
            return Err(e.into());
        }

        let rc = self.synchronise();
        if !rc.is_ok() {
            audit_log!(
                AuditRecord::new(AuditCategory::SystemLifecycle, "Agent", "init_end")
                    .with_error(format!("synchronisation failed: {}", rc))
            );
            return Err(AgentError::Programming {
                action: "init".to_string(),
                rc,
            });
        }

        audit_log!(
            AuditRecord::new(AuditCategory::SystemLifecycle, "Agent", "init_end")
                .with_outcome(AuditOutcome::Success)
                .with_details(serde_json::json!({
                    "route_domains": self.route_domains.len(),
                }))
        );
        Ok(())
    }

    /// Populates the registries the first time, replays them afterwards.
    pub fn resync(&mut self) -> Rc {
        if self.populated {
            let rc = self.om.replay();
            self.stats.replays += 1;
            self.audit_resync("replay", rc);
            return rc;
        }

        let rc = self.om.populate(&self.config.client);
        self.stats.populates += 1;
        if rc.is_ok() {
            self.populated = true;
        }
        self.audit_resync("populate", rc);
        rc
    }

    /// Resyncs, then writes the configuration so families that failed are
    /// retried. After a population, also sweeps whatever the engine held
    /// that is no longer wanted.
    fn synchronise(&mut self) -> Rc {
        let rc = if self.populated {
            self.resync().first_failure(self.program_configured())
        } else {
            let rc = self.resync();
            if rc.is_ok() {
                let rc = self.program_configured();
                rc.first_failure(self.sweep_stale())
            } else {
                rc
            }
        };
        self.in_sync = rc.is_ok();
        rc
    }

    /// Sweeps the client's stale objects.
    ///
    /// A failed delete leaves a table in the engine that no registry
    /// tracks any more, so the next sync populates again to find it.
    fn sweep_stale(&mut self) -> Rc {
        let rc = self.om.sweep(&self.config.client);
        if !rc.is_ok() {
            warn!("Teardown failed ({}), repopulating on next sync", rc);
            audit_log!(
                AuditRecord::new(AuditCategory::ErrorCondition, "Agent", "teardown")
                    .with_object_type("route-domain")
                    .with_error(format!("sweep for {} failed: {}", self.config.client, rc))
            );
            self.populated = false;
            self.in_sync = false;
        }
        rc
    }

    fn program_configured(&self) -> Rc {
        let mut result = Rc::Ok;
        for table_id in &self.tables {
            let rc = self.om.write(
                &self.config.client,
                self.route_domains.db(),
                &RouteDomain::new(*table_id),
            );
            result = result.first_failure(rc);
        }
        result
    }

    fn audit_resync(&self, action: &str, rc: Rc) {
        let record = AuditRecord::new(AuditCategory::Resync, "Agent", action).with_details(
            serde_json::json!({
                "route_domains": self.route_domains.len(),
                "rc": rc.to_string(),
            }),
        );
        if rc.is_ok() {
            audit_log!(record.with_outcome(AuditOutcome::Success));
        } else {
            audit_log!(record.with_error(format!("{} failed: {}", action, rc)));
        }
    }

    /// Adds a table to the configuration and programs it.
    ///
    /// The table stays configured if programming fails; adding it again
    /// retries the families that failed.
    pub fn add_route_domain(&mut self, table_id: TableId) -> Result<(), AgentError> {
        self.tables.insert(table_id);
        let rc = self.om.write(
            &self.config.client,
            self.route_domains.db(),
            &RouteDomain::new(table_id),
        );

        let record = AuditRecord::new(AuditCategory::ResourceCreate, "Agent", "add_route_domain")
            .with_object_id(table_id.to_string())
            .with_object_type("route-domain");
        if !rc.is_ok() {
            self.in_sync = false;
            audit_log!(record.with_error(rc.to_string()));
            return Err(AgentError::Programming {
                action: format!("add route-domain {}", table_id),
                rc,
            });
        }

        self.stats.route_domains_added += 1;
        audit_log!(record
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({
                "route_domains_added": self.stats.route_domains_added,
            })));
        Ok(())
    }

    /// Removes a table from the configuration.
    ///
    /// The table is deleted from the engine unless another client still
    /// holds it.
    pub fn remove_route_domain(&mut self, table_id: TableId) -> Result<(), AgentError> {
        if table_id == DEFAULT_TABLE {
            return Err(AgentError::DefaultTable);
        }
        if !self.tables.remove(&table_id) {
            return Err(AgentError::NotConfigured(table_id));
        }

        self.om.mark(&self.config.client);
        let rc = self.program_configured();
        let rc = rc.first_failure(self.sweep_stale());

        let record = AuditRecord::new(AuditCategory::ResourceDelete, "Agent", "remove_route_domain")
            .with_object_id(table_id.to_string())
            .with_object_type("route-domain");
        if !rc.is_ok() {
            audit_log!(record.with_error(rc.to_string()));
            return Err(AgentError::Programming {
                action: format!("remove route-domain {}", table_id),
                rc,
            });
        }

        self.stats.route_domains_removed += 1;
        audit_log!(record.with_outcome(AuditOutcome::Success));
        Ok(())
    }

    /// Checks the engine is alive, reconnecting and resyncing if not.
    /// Resyncs a live engine too while an earlier sync has failures left.
    ///
    /// Returns true if the engine is reachable and in sync afterwards.
    pub fn poll(&mut self) -> bool {
        if self.hw.poll() {
            if self.in_sync {
                debug!("poll: engine alive");
                return true;
            }
            info!("Engine out of sync, resyncing");
            return self.synchronise().is_ok();
        }

        self.stats.failed_polls += 1;
        self.in_sync = false;
        warn!("Engine not responding, reconnecting");
        self.hw.disconnect();

        if let Err(e) = self.hw.connect() {
            audit_log!(
                AuditRecord::new(AuditCategory::EngineOperation, "Agent", "reconnect")
                    .with_error(e.to_string())
            );
            return false;
        }

        self.stats.reconnects += 1;
        audit_log!(
            AuditRecord::new(AuditCategory::EngineOperation, "Agent", "reconnect")
                .with_outcome(AuditOutcome::Success)
                .with_details(serde_json::json!({
                    "reconnects": self.stats.reconnects,
                }))
        );
        self.synchronise().is_ok()
    }

    /// Polls the engine every poll interval until `shutdown` fires or
    /// [`stop`](Self::stop) is called.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting agent poll loop");
        self.running = true;

        audit_log!(
            AuditRecord::new(AuditCategory::AdminAction, "Agent", "poll_loop_started")
                .with_outcome(AuditOutcome::Success)
                .with_details(serde_json::json!({
                    "poll_interval_ms": self.config.poll_interval_ms,
                }))
        );

        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.stop();
                    }
                }
            }
        }

        info!("Agent poll loop stopped");
        audit_log!(
            AuditRecord::new(AuditCategory::AdminAction, "Agent", "poll_loop_stopped")
                .with_outcome(AuditOutcome::Success)
        );
    }

    /// Stops the poll loop.
    pub fn stop(&mut self) {
        info!("Stopping agent");
        audit_log!(
            AuditRecord::new(AuditCategory::AdminAction, "Agent", "stop_requested")
                .with_outcome(AuditOutcome::Success)
        );
        self.running = false;
    }

    /// Runs an inspection command and returns its output.
    pub fn show(&self, command: &str) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.inspect.handle_input(command, &mut out);
        out
    }

    /// Dumps agent state for debugging.
    pub fn dump(&self) -> Vec<String> {
        let QueueStats {
            writes,
            issued,
            succeeded,
            failed,
            suppressed,
        } = self.hw.stats();

        let mut lines = vec![
            format!("Agent running: {}", self.running),
            format!("  connected: {}", self.hw.is_connected()),
            format!("  populated: {}", self.populated),
            format!("  in sync: {}", self.in_sync),
            format!("  route domains: {}", self.route_domains.len()),
            format!(
                "  queue: writes={} issued={} succeeded={} failed={} suppressed={}",
                writes, issued, succeeded, failed, suppressed
            ),
        ];

        let mut clients = String::new();
        let _ = self.om.dump(&self.config.client, &mut clients);
        lines.extend(clients.lines().map(|l| format!("  {}", l)));
        lines
    }
}

impl Drop for Agent {
    /// Leaves the engine as programmed: objects released on the way out
    /// are forgotten without being deleted.
    fn drop(&mut self) {
        self.hw.disable();
        self.hw.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use vom_hw::{L3Proto, SimEngine};

    fn agent(engine: &SimEngine, tables: Vec<TableId>) -> Agent {
        let config = AgentConfig {
            route_domains: tables,
            poll_interval_ms: 10,
            ..AgentConfig::default()
        };
        Agent::new(config, Box::new(engine.clone())).unwrap()
    }

    #[test]
    fn test_init_programs_configuration() {
        let engine = SimEngine::new();
        let mut agent = agent(&engine, vec![5]);

        agent.init().unwrap();

        assert!(agent.is_populated());
        assert_eq!(agent.configured_tables(), vec![0, 5]);
        assert!(engine.has_table(5, L3Proto::Ipv4));
        assert!(engine.has_table(5, L3Proto::Ipv6));
        assert_eq!(agent.stats().populates, 1);
    }

    #[test]
    fn test_init_sweeps_unconfigured_tables() {
        let engine = SimEngine::new();
        engine.preload_table(9);
        let mut agent = agent(&engine, vec![]);

        agent.init().unwrap();

        assert!(!engine.has_table(9, L3Proto::Ipv4));
        assert!(agent.route_domains().find(9).is_none());
        assert_eq!(engine.tables().len(), 2);
    }

    #[test]
    fn test_init_fails_when_unreachable() {
        let engine = SimEngine::new();
        engine.drop_link();
        let mut agent = agent(&engine, vec![]);

        assert!(matches!(agent.init(), Err(AgentError::Connect(_))));
        assert!(!agent.is_populated());
    }

    #[test]
    fn test_add_and_remove() {
        let engine = SimEngine::new();
        let mut agent = agent(&engine, vec![]);
        agent.init().unwrap();

        agent.add_route_domain(12).unwrap();
        assert!(engine.has_table(12, L3Proto::Ipv6));

        agent.remove_route_domain(12).unwrap();
        assert!(!engine.has_table(12, L3Proto::Ipv6));
        assert!(agent.route_domains().find(12).is_none());
        assert_eq!(agent.stats().route_domains_removed, 1);

        assert!(matches!(
            agent.remove_route_domain(12),
            Err(AgentError::NotConfigured(12))
        ));
        assert!(matches!(
            agent.remove_route_domain(DEFAULT_TABLE),
            Err(AgentError::DefaultTable)
        ));
    }

    #[test]
    fn test_add_failure_reported() {
        let engine = SimEngine::new();
        let mut agent = agent(&engine, vec![]);
        agent.init().unwrap();
        engine.fail_table(3, -1);

        let err = agent.add_route_domain(3).unwrap_err();
        assert!(matches!(err, AgentError::Programming { rc: Rc::Invalid, .. }));

        engine.clear_failures();
        agent.add_route_domain(3).unwrap();
        assert!(engine.has_table(3, L3Proto::Ipv4));
    }

    #[test]
    fn test_poll_replays_after_restart() {
        let engine = SimEngine::new();
        let mut agent = agent(&engine, vec![4]);
        agent.init().unwrap();

        engine.restart();
        assert!(!engine.has_table(4, L3Proto::Ipv4));

        assert!(agent.poll());
        assert!(engine.has_table(4, L3Proto::Ipv4));
        assert!(engine.has_table(4, L3Proto::Ipv6));
        assert_eq!(agent.stats().reconnects, 1);
        assert_eq!(agent.stats().replays, 1);
    }

    #[test]
    fn test_poll_retries_failed_replay() {
        let engine = SimEngine::new();
        let mut agent = agent(&engine, vec![4]);
        agent.init().unwrap();

        engine.restart();
        engine.fail_table(4, -1);
        assert!(!agent.poll());
        assert!(!agent.is_in_sync());
        assert_eq!(
            agent.route_domains().find(4).map(|rd| rd.rc(L3Proto::Ipv4)),
            Some(Rc::Invalid)
        );

        // The link is fine now; the next poll programs what replay missed
        engine.clear_failures();
        assert!(agent.poll());
        assert!(agent.is_in_sync());
        assert!(engine.has_table(4, L3Proto::Ipv4));
        assert!(engine.has_table(4, L3Proto::Ipv6));
        assert!(agent.poll());
        assert_eq!(agent.stats().reconnects, 1);
    }

    #[test]
    fn test_remove_reports_failed_delete() {
        let engine = SimEngine::new();
        let mut agent = agent(&engine, vec![6]);
        agent.init().unwrap();
        engine.fail_table(6, -1);

        let err = agent.remove_route_domain(6).unwrap_err();
        assert!(matches!(err, AgentError::Programming { rc: Rc::Invalid, .. }));
        assert_eq!(agent.stats().route_domains_removed, 0);
        assert!(engine.has_table(6, L3Proto::Ipv4));
        assert!(!agent.is_in_sync());

        // The next poll finds the leftover table and deletes it
        engine.clear_failures();
        assert!(agent.poll());
        assert!(!engine.has_table(6, L3Proto::Ipv4));
        assert!(!engine.has_table(6, L3Proto::Ipv6));
        assert!(agent.route_domains().find(6).is_none());
        assert_eq!(agent.stats().populates, 2);
    }

    #[test]
    fn test_poll_unreachable() {
        let engine = SimEngine::new();
        let mut agent = agent(&engine, vec![]);
        agent.init().unwrap();

        engine.drop_link();
        assert!(!agent.poll());
        assert_eq!(agent.stats().failed_polls, 1);

        engine.restore_link();
        assert!(agent.poll());
    }

    #[test]
    fn test_show_and_dump() {
        let engine = SimEngine::new();
        let mut agent = agent(&engine, vec![]);
        agent.init().unwrap();

        assert!(agent.show("rd").contains("route-domain:[table-id:0"));
        assert!(agent.show("bogus").starts_with("unknown command: bogus"));

        let lines = agent.dump();
        assert_eq!(lines[0], "Agent running: false");
        assert!(lines.iter().any(|l| l == "  route domains: 1"));
        assert!(lines.iter().any(|l| l == "  client:vom-agent"));
    }

    #[test]
    fn test_drop_leaves_engine_programmed() {
        let engine = SimEngine::new();
        let mut agent = agent(&engine, vec![6]);
        agent.init().unwrap();

        drop(agent);
        assert!(engine.has_table(6, L3Proto::Ipv4));
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let engine = SimEngine::new();
        let mut agent = agent(&engine, vec![]);
        agent.init().unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            agent.run(rx).await;
            agent
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let agent = handle.await.unwrap();
        assert!(!agent.is_running());
        assert!(engine
            .requests()
            .iter()
            .any(|r| *r == vom_hw::ApiRequest::ControlPing));
    }
}
