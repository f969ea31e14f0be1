//! The object trait and dependency tiers.

use std::fmt;

use vom_hw::{Hw, Rc};

/// Ordering tier of an object kind.
///
/// Kinds in a lower tier are populated and replayed before kinds in a
/// higher tier, so objects are never programmed before what they refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependency {
    /// Global configuration with no prerequisites.
    Global,
    /// Routing tables.
    Table,
    /// Physical and software interfaces.
    Interface,
    BondInterface,
    BondBinding,
    /// Interfaces layered on other interfaces (sub-interfaces, tunnels).
    VirtualInterface,
    /// Bridge domains.
    ForwardingDomain,
    /// Bindings of interfaces to tables or domains.
    Binding,
    Tunnel,
    /// Entries inside tables and domains (routes, neighbours, ...).
    Entry,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dependency::Global => "global",
            Dependency::Table => "table",
            Dependency::Interface => "interface",
            Dependency::BondInterface => "bond-interface",
            Dependency::BondBinding => "bond-binding",
            Dependency::VirtualInterface => "virtual-interface",
            Dependency::ForwardingDomain => "forwarding-domain",
            Dependency::Binding => "binding",
            Dependency::Tunnel => "tunnel",
            Dependency::Entry => "entry",
        };
        write!(f, "{}", s)
    }
}

/// A desired-state object that can be programmed into the engine.
///
/// Implementations are cheap to construct as prototypes; only the instance
/// returned by the registry is canonical. All methods take `&self`, with
/// programmed state kept in hardware-backed attributes.
pub trait Object: Send + Sync + fmt::Display + 'static {
    /// Key identifying the canonical instance. Equality of objects is
    /// equality of keys.
    type Key: Ord + Clone + fmt::Display + Send + Sync + 'static;

    /// Short kind name, used when objects of several kinds share a listing.
    const KIND: &'static str;

    /// Returns the registry key.
    fn key(&self) -> Self::Key;

    /// Enqueues whatever is needed to converge the engine to `desired`.
    fn update(&self, desired: &Self, hw: &Hw);

    /// Enqueues the removal of everything programmed and flushes.
    ///
    /// Returns the flush outcome; a failed delete leaves its attribute
    /// programmed.
    fn sweep(&self, hw: &Hw) -> Rc;

    /// Re-enqueues the creation of everything programmed, without flushing.
    fn replay(&self, hw: &Hw);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_order() {
        assert!(Dependency::Global < Dependency::Table);
        assert!(Dependency::Table < Dependency::Interface);
        assert!(Dependency::Binding < Dependency::Entry);

        let mut tiers = vec![Dependency::Entry, Dependency::Table, Dependency::Interface];
        tiers.sort();
        assert_eq!(
            tiers,
            vec![Dependency::Table, Dependency::Interface, Dependency::Entry]
        );
    }

    #[test]
    fn test_dependency_display() {
        assert_eq!(Dependency::Table.to_string(), "table");
        assert_eq!(Dependency::VirtualInterface.to_string(), "virtual-interface");
    }
}
