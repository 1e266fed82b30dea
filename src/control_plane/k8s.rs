use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::stream::StreamExt;
use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset, Endpoints};
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use super::ControlPlane;
use crate::error::{Error, Result};
use crate::types::{Change, EndpointRecord, EndpointSnapshot, PortEntry, Subset};

/// Pending change signals before the watch stream is back-pressured.
const CHANGE_BUFFER: usize = 16;

/// Reads `Endpoints` objects through the Kubernetes API.
///
/// Holds no client when startup credential resolution failed; every call
/// then fails with [`Error::ClientUnavailable`].
pub struct KubeControlPlane {
    client: Option<Client>,
}

impl KubeControlPlane {
    /// Builds a client from the named kubeconfig, falling back to the
    /// in-cluster service account when the file does not exist.  Failures
    /// are logged and leave the control plane without a client.
    pub async fn connect(kubeconfig: &str) -> Self {
        match Self::build_client(kubeconfig).await {
            Ok(client) => Self {
                client: Some(client),
            },
            Err(e) => {
                error!("{}", e);
                Self::unavailable()
            }
        }
    }

    pub fn unavailable() -> Self {
        Self { client: None }
    }

    async fn build_client(kubeconfig: &str) -> Result<Client> {
        let home = dirs::home_dir();
        let config = match kubeconfig_path(kubeconfig, home.as_deref()) {
            Some(path) if path.exists() => {
                info!("Using kubeconfig {}", path.display());
                let kubeconfig = Kubeconfig::read_from(&path).map_err(|source| {
                    Error::Kubeconfig {
                        path: path.clone(),
                        source,
                    }
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|source| Error::Kubeconfig { path, source })?
            }
            _ => {
                info!("No kubeconfig found, falling back to in-cluster config");
                Config::incluster()?
            }
        };
        Client::try_from(config).map_err(Error::Client)
    }

    fn endpoints(&self, namespace: &str) -> Result<Api<Endpoints>> {
        let client = self.client.clone().ok_or(Error::ClientUnavailable)?;
        Ok(Api::namespaced(client, namespace))
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn list(&self, namespace: &str) -> Result<EndpointSnapshot> {
        let list = self
            .endpoints(namespace)?
            .list(&ListParams::default())
            .await
            .map_err(|source| Error::List {
                namespace: namespace.to_string(),
                source,
            })?;
        Ok(snapshot_from(list.items))
    }

    async fn watch(&self, namespace: &str) -> Result<mpsc::Receiver<Change>> {
        // "0" makes the server replay current objects as ADDED events, so
        // the first reconciliation happens right away.
        let params = WatchParams::default().disable_bookmarks();
        let stream = self
            .endpoints(namespace)?
            .watch(&params, "0")
            .await
            .map_err(|source| Error::Watch {
                namespace: namespace.to_string(),
                source,
            })?;

        let (change_tx, change_rx) = mpsc::channel(CHANGE_BUFFER);
        let namespace = namespace.to_string();
        tokio::spawn(async move {
            let mut stream = stream.boxed();
            info!("Listening for endpoints events in namespace {}...", namespace);
            while let Some(event) = stream.next().await {
                match event {
                    Ok(event) => {
                        log_event(&namespace, &event);
                        if change_tx.send(Change).await.is_err() {
                            debug!("Change receiver dropped, closing endpoints watch");
                            return;
                        }
                    }
                    Err(e) => {
                        error!("Error in endpoints watch stream: {}", e);
                        break;
                    }
                }
            }
            warn!("Endpoints watch for namespace {} ended", namespace);
        });

        Ok(change_rx)
    }
}

fn log_event(namespace: &str, event: &WatchEvent<Endpoints>) {
    let (action, name) = match event {
        WatchEvent::Added(e) => ("added", e.metadata.name.as_deref()),
        WatchEvent::Modified(e) => ("modified", e.metadata.name.as_deref()),
        WatchEvent::Deleted(e) => ("deleted", e.metadata.name.as_deref()),
        WatchEvent::Bookmark(_) => ("bookmark", None),
        WatchEvent::Error(e) => {
            warn!("Endpoints watch error event: {} ({})", e.message, e.code);
            return;
        }
    };
    debug!(
        "Endpoints {}: {}/{}",
        action,
        namespace,
        name.unwrap_or_default()
    );
}

/// Resolves a kubeconfig name to `~/.kube/<name>`.  Absolute paths are
/// used as given.
fn kubeconfig_path(name: &str, home: Option<&Path>) -> Option<PathBuf> {
    let name = Path::new(name);
    if name.is_absolute() {
        return Some(name.to_path_buf());
    }
    home.map(|h| h.join(".kube").join(name))
}

fn snapshot_from(items: Vec<Endpoints>) -> EndpointSnapshot {
    let records = items
        .into_iter()
        .map(|e| EndpointRecord {
            name: e.metadata.name.unwrap_or_default(),
            subsets: e
                .subsets
                .unwrap_or_default()
                .into_iter()
                .map(subset_from)
                .collect(),
        })
        .collect();
    EndpointSnapshot { records }
}

fn subset_from(subset: EndpointSubset) -> Subset {
    fn ips(addresses: Option<Vec<EndpointAddress>>) -> Vec<String> {
        addresses
            .unwrap_or_default()
            .into_iter()
            .map(|a| a.ip)
            .collect()
    }

    Subset {
        ready: ips(subset.addresses),
        not_ready: ips(subset.not_ready_addresses),
        ports: subset
            .ports
            .unwrap_or_default()
            .into_iter()
            .map(|p| PortEntry {
                name: p.name,
                number: p.port,
            })
            .collect(),
    }
}
