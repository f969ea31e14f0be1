//! Typed engine requests and replies.
//!
//! The encoding of these messages onto the wire belongs to the transport;
//! this module only fixes their shape so commands and connections agree.

use std::fmt;

/// Routing table identifier.
pub type TableId = u32;

/// The table every engine starts with.
pub const DEFAULT_TABLE: TableId = 0;

/// Layer 3 address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum L3Proto {
    Ipv4,
    Ipv6,
}

impl L3Proto {
    /// Both families, in programming order.
    pub const ALL: [L3Proto; 2] = [L3Proto::Ipv4, L3Proto::Ipv6];

    /// Returns true for IPv6.
    pub fn is_ipv6(&self) -> bool {
        *self == L3Proto::Ipv6
    }
}

impl fmt::Display for L3Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            L3Proto::Ipv4 => write!(f, "ipv4"),
            L3Proto::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// Adds or removes a routing table for one address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpTableAddDel {
    pub table_id: TableId,
    pub proto: L3Proto,
    pub is_add: bool,
}

/// One record of an IP table dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpTableDetails {
    pub table_id: TableId,
    pub proto: L3Proto,
    pub name: String,
}

/// A request sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    /// Liveness probe.
    ControlPing,
    IpTableAddDel(IpTableAddDel),
    /// List every routing table.
    IpTableDump,
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiRequest::ControlPing => write!(f, "control-ping"),
            ApiRequest::IpTableAddDel(req) => write!(
                f,
                "ip-table-{}:[table:{} proto:{}]",
                if req.is_add { "add" } else { "del" },
                req.table_id,
                req.proto
            ),
            ApiRequest::IpTableDump => write!(f, "ip-table-dump"),
        }
    }
}

/// A reply received from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiReply {
    /// Return value of a single operation; 0 is success.
    Retval(i32),
    /// Records produced by [`ApiRequest::IpTableDump`].
    IpTables(Vec<IpTableDetails>),
}
