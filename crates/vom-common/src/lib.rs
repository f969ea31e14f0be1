//! Object model core for driving the forwarding engine.
//!
//! This crate provides the pieces every object kind shares:
//!
//! - [`Object`]: Trait implemented by each desired-state object kind
//! - [`SingularDb`]: Registry holding one canonical instance per key
//! - [`ObjectManager`]: Per-client writes, mark/sweep, population and replay
//! - [`Listener`]: Per-kind event handler driven by the object manager
//! - [`Inspect`]: Registrar mapping operator commands to listings
//!
//! # Architecture
//!
//! 1. A client builds a prototype object describing desired state
//! 2. The object manager singularizes it through the kind's registry
//! 3. The canonical instance enqueues commands on the hardware queue
//! 4. The queue is flushed and outcomes land on the instance's attributes
//! 5. When the last holder lets go, the instance tears its state down
//!
//! On startup the listeners populate the registries from the engine; on a
//! reconnect they replay what the registries already hold.

mod client_db;
mod inspect;
mod object;
mod om;
mod singular_db;

#[cfg(test)]
mod testing;

pub use client_db::{ClientDb, ClientKey};
pub use inspect::{CommandHandler, Inspect, InspectError};
pub use object::{Dependency, Object};
pub use om::{Listener, ObjectManager};
pub use singular_db::{Handle, Held, SingularDb};
