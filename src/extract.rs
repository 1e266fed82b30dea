//! Turns an endpoint snapshot into the node list for one service.

use std::collections::HashSet;

use crate::types::{EndpointSnapshot, NodeDescriptor, NodeList};

/// Collects the nodes backing `service` from `snapshot`.
///
/// Only the record named exactly `service` is looked at.  Within each of
/// its subsets the ready addresses are used, or the not-ready ones when no
/// address is ready.  An address yields one node per port whose number is
/// `api_port`; every other port (e.g. a metrics exporter sidecar) is
/// skipped.  The peer port is never discovered, `peer_port` is copied into
/// every node.  A node already emitted (same host, same ports) is not
/// repeated, so the first occurrence fixes its position.
pub fn extract(
    snapshot: &EndpointSnapshot,
    service: &str,
    peer_port: u16,
    api_port: u16,
) -> NodeList {
    let mut nodes = Vec::new();
    let mut seen = HashSet::new();

    for record in snapshot.records.iter().filter(|r| r.name == service) {
        for subset in &record.subsets {
            let addresses = if subset.ready.is_empty() {
                &subset.not_ready
            } else {
                &subset.ready
            };

            for address in addresses {
                for port in &subset.ports {
                    if port.number != i32::from(api_port) {
                        continue;
                    }
                    let node = NodeDescriptor {
                        host: address.clone(),
                        peer_port,
                        api_port,
                    };
                    if seen.insert(node.clone()) {
                        nodes.push(node);
                    }
                }
            }
        }
    }

    NodeList(nodes)
}
