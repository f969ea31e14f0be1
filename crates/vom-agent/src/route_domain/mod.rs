//! Route domains: one routing table per address family in the engine.
//!
//! # Architecture
//!
//! ```text
//! RouteDomain (prototype)
//!      │ singular()
//!      ▼
//! RouteDomains ──> SingularDb<RouteDomain> ──> Hw ──> engine
//!      ▲
//!      │ populate / replay / show
//! RouteDomainEventHandler (registered with ObjectManager + Inspect)
//! ```
//!
//! A domain is keyed by its table id. Writing it creates the IPv4 and IPv6
//! tables that are not yet programmed; dropping the last handle deletes
//! the ones that are.

mod cmds;
mod entity;
mod handler;

pub use cmds::{CreateCmd, DeleteCmd, DumpCmd};
pub use entity::{RouteDomain, RouteDomains};
pub use handler::{RouteDomainEventHandler, INSPECT_NAMES};
