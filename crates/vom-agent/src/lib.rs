//! VOM Agent - keeps a forwarding engine's routing tables in sync
//!
//! The agent drives a packet-forwarding engine through the object model:
//! it describes the routing tables it wants as [`route_domain::RouteDomain`]
//! objects and lets the object manager converge the engine towards them.
//!
//! # Architecture
//!
//! ```text
//! [config file / CLI] ──> [Agent] ──> [ObjectManager] ──> [Hw queue] ──> [engine]
//!                            │               │
//!                            │               └── listeners (populate / replay)
//!                            └── poll loop (ping, reconnect, replay)
//! ```
//!
//! # Key Components
//!
//! - [`daemon::Agent`]: Startup, poll loop and reconnect handling
//! - [`route_domain`]: The route domain object, its commands and event handler
//! - [`config::AgentConfig`]: JSON configuration
//! - [`audit`]: Structured audit records and logging setup

pub mod audit;
pub mod config;
pub mod daemon;
pub mod route_domain;
