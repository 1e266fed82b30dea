use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{Change, EndpointSnapshot};

pub mod k8s;
pub use k8s::KubeControlPlane;

/// The cluster API the reconciliation loop reads endpoints from.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Lists every endpoint record of `namespace`.
    async fn list(&self, namespace: &str) -> Result<EndpointSnapshot>;

    /// Subscribes to endpoint changes in `namespace`.
    ///
    /// One [`Change`] is delivered per upstream event, whatever the event
    /// was about.  The channel closes when the upstream stream ends; there
    /// is no reconnect.
    async fn watch(&self, namespace: &str) -> Result<mpsc::Receiver<Change>>;
}
