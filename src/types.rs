//! Data structures used throughout the peerwatch daemon.
//!
//! The snapshot types are a narrow view of the control plane's endpoint
//! objects: only the fields the extractor looks at are kept.  Node
//! descriptors are what ends up in the published nodes file, and their
//! `Display` impls are the on-disk encoding.

use std::fmt;

/// A "something changed" signal from the change watcher.
///
/// Deliberately carries no payload: every change triggers a full re-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change;

/// All endpoint records of a namespace at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSnapshot {
    pub records: Vec<EndpointRecord>,
}

/// One named endpoint record, backing the service of the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointRecord {
    pub name: String,
    pub subsets: Vec<Subset>,
}

/// A group of addresses sharing readiness and ports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subset {
    /// Addresses passing the readiness check.
    pub ready: Vec<String>,
    /// Addresses failing the readiness check.  Disjoint from `ready`.
    pub not_ready: Vec<String>,
    pub ports: Vec<PortEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    /// Kept for logs and debugging; extraction matches on `number` only.
    pub name: Option<String>,
    pub number: i32,
}

impl PortEntry {
    pub fn new(name: Option<&str>, number: i32) -> Self {
        Self {
            name: name.map(str::to_string),
            number,
        }
    }
}

/// One entry of the nodes file.
///
/// Renders as `host:peer_port:api_port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeDescriptor {
    pub host: String,
    pub peer_port: u16,
    pub api_port: u16,
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.peer_port, self.api_port)
    }
}

/// Node descriptors in discovery order.
///
/// `to_string()` yields the nodes file content: descriptors joined by a
/// single comma, no trailing separator, empty string for no nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeList(pub Vec<NodeDescriptor>);

impl NodeList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeDescriptor> {
        self.0.iter()
    }
}

impl fmt::Display for NodeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

impl FromIterator<NodeDescriptor> for NodeList {
    fn from_iter<I: IntoIterator<Item = NodeDescriptor>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
