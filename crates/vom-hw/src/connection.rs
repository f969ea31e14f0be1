//! Transport seam to the forwarding engine.

use crate::api::{ApiReply, ApiRequest};
use crate::rc::HwResult;

/// A connection to the forwarding engine.
///
/// Implementations own the wire encoding and the socket. `execute` is
/// synchronous: it returns once the engine has answered the request.
pub trait Connection: Send {
    /// Establishes the connection.
    fn connect(&mut self) -> HwResult<()>;

    /// Tears the connection down. Safe to call when already disconnected.
    fn disconnect(&mut self);

    /// Returns true while connected.
    fn is_connected(&self) -> bool;

    /// Sends one request and waits for its reply.
    fn execute(&mut self, request: &ApiRequest) -> HwResult<ApiReply>;
}
