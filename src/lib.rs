//! Publishes the endpoints of a Kubernetes service as a peer nodes file.
//!
//! - **`control_plane`**: list and watch access to `Endpoints` objects.
//! - **`extract`**: picks the target service's nodes out of a snapshot.
//! - **`publish`**: replaces the nodes file on disk.
//! - **`reconcile`**: the loop tying the three together, one cycle per change.

pub mod config;
pub mod control_plane;
pub mod error;
pub mod extract;
pub mod publish;
pub mod reconcile;
pub mod types;
