use std::io;
use std::path::PathBuf;

use kube::config::{InClusterError, KubeconfigError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Client construction failed at startup; every control-plane call
    /// reports this instead of reaching the API server.
    #[error("kubernetes client is not available")]
    ClientUnavailable,
    #[error("failed to build config from kubeconfig {path}: {source}")]
    Kubeconfig {
        path: PathBuf,
        source: KubeconfigError,
    },
    #[error("failed to build in-cluster config: {0}")]
    InCluster(#[from] InClusterError),
    #[error("failed to create kubernetes client: {0}")]
    Client(#[source] kube::Error),
    #[error("failed to list endpoints in namespace {namespace}: {source}")]
    List {
        namespace: String,
        source: kube::Error,
    },
    #[error("failed to create endpoints watcher in namespace {namespace}: {source}")]
    Watch {
        namespace: String,
        source: kube::Error,
    },
    #[error("failed to write nodes file {path}: {source}")]
    Publish { path: PathBuf, source: io::Error },
}
