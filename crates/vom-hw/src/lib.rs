//! Hardware layer of the VPP object model.
//!
//! This crate owns everything that sits between a desired-state object and
//! the forwarding engine:
//!
//! - [`rc`]: Outcome codes recorded for every programming operation
//! - [`item`]: Hardware-backed attributes (a value plus its outcome code)
//! - [`api`]: Typed engine requests and replies
//! - [`connection`]: The transport seam to the engine
//! - [`sim`]: An in-memory engine used for simulation mode and tests
//! - [`cmd`]: The command trait queued by objects
//! - [`queue`]: The batching command queue ([`Hw`])
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vom_hw::{Hw, Rc, SimEngine};
//!
//! let engine = SimEngine::new();
//! let hw = Arc::new(Hw::new(Box::new(engine.clone())));
//! hw.connect().unwrap();
//!
//! // Nothing queued, so the flush trivially succeeds
//! assert_eq!(hw.write(), Rc::Ok);
//! ```

pub mod api;
pub mod cmd;
pub mod connection;
pub mod item;
pub mod queue;
pub mod rc;
pub mod sim;

pub use api::{ApiReply, ApiRequest, IpTableAddDel, IpTableDetails, L3Proto, TableId, DEFAULT_TABLE};
pub use cmd::{Cmd, Records};
pub use connection::Connection;
pub use item::HwItem;
pub use queue::{Hw, QueueStats};
pub use rc::{HwError, HwResult, Rc};
pub use sim::SimEngine;
