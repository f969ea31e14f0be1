//! The agent daemon: connection lifecycle, population, replay and the poll loop.

mod agent;

pub use agent::{Agent, AgentError, AgentStats};
