//! Reconciliation loop.
//!
//! Every change signal from the watcher triggers one reconciliation: the
//! namespace's endpoints are listed in full, the target service's nodes are
//! extracted, and the nodes file is replaced.  Signals are handled one at a
//! time in arrival order; a failed step is logged and the loop waits for the
//! next signal, which doubles as the retry.

use log::{error, info, warn};

use crate::config::Config;
use crate::control_plane::ControlPlane;
use crate::error::Result;
use crate::extract::extract;
use crate::publish::publish;
use crate::types::NodeList;

/// Everything a reconciliation needs, built once at startup.
pub struct Context<C> {
    pub config: Config,
    pub control_plane: C,
}

/// How [`run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The watch could not be opened; nothing was reconciled.
    SubscribeFailed,
    /// The change stream closed after `reconciliations` cycles.
    StreamClosed { reconciliations: u64 },
}

/// Subscribes to changes and reconciles once per change until the stream
/// closes.  Never reconnects.
pub async fn run<C: ControlPlane>(ctx: &Context<C>) -> Outcome {
    let namespace = &ctx.config.namespace;
    let mut changes = match ctx.control_plane.watch(namespace).await {
        Ok(rx) => rx,
        Err(e) => {
            error!("{}", e);
            return Outcome::SubscribeFailed;
        }
    };
    info!(
        "Watching endpoints for service {}/{}",
        namespace, ctx.config.service
    );

    let mut reconciliations = 0;
    while changes.recv().await.is_some() {
        reconciliations += 1;
        if let Err(e) = reconcile(ctx).await {
            error!("{}", e);
        }
    }

    warn!(
        "Endpoints watch closed after {} reconciliations; {} will no longer be updated",
        reconciliations,
        ctx.config.nodes_file.display()
    );
    Outcome::StreamClosed { reconciliations }
}

/// One list → extract → format → publish cycle.
///
/// A failed list leaves the nodes file untouched.
pub async fn reconcile<C: ControlPlane>(ctx: &Context<C>) -> Result<NodeList> {
    let config = &ctx.config;
    let snapshot = ctx.control_plane.list(&config.namespace).await?;
    let nodes = extract(&snapshot, &config.service, config.peer_port, config.api_port);
    let content = nodes.to_string();

    publish(&config.nodes_file, &content)?;

    if !nodes.is_empty() {
        info!("New {} node configuration: {}", nodes.len(), content);
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{Change, EndpointRecord, EndpointSnapshot, PortEntry, Subset};

    use std::collections::VecDeque;
    use std::fs;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::mpsc;

    /// Serves scripted list results and a change channel fed by the test.
    struct FakeControlPlane {
        lists: Mutex<VecDeque<Result<EndpointSnapshot>>>,
        changes: Mutex<Option<mpsc::Receiver<Change>>>,
        listed: Mutex<Vec<String>>,
    }

    impl FakeControlPlane {
        fn new(lists: Vec<Result<EndpointSnapshot>>) -> (Self, mpsc::Sender<Change>) {
            let (tx, rx) = mpsc::channel(16);
            let fake = Self {
                lists: Mutex::new(lists.into()),
                changes: Mutex::new(Some(rx)),
                listed: Mutex::new(Vec::new()),
            };
            (fake, tx)
        }

        fn without_watch(lists: Vec<Result<EndpointSnapshot>>) -> Self {
            Self {
                lists: Mutex::new(lists.into()),
                changes: Mutex::new(None),
                listed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ControlPlane for FakeControlPlane {
        async fn list(&self, namespace: &str) -> Result<EndpointSnapshot> {
            self.listed.lock().unwrap().push(namespace.to_string());
            self.lists
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(EndpointSnapshot::default()))
        }

        async fn watch(&self, _namespace: &str) -> Result<mpsc::Receiver<Change>> {
            self.changes
                .lock()
                .unwrap()
                .take()
                .ok_or(Error::ClientUnavailable)
        }
    }

    fn snapshot(ready: &[&str], not_ready: &[&str], ports: &[i32]) -> EndpointSnapshot {
        EndpointSnapshot {
            records: vec![EndpointRecord {
                name: "typesense-svc".into(),
                subsets: vec![Subset {
                    ready: ready.iter().map(|s| s.to_string()).collect(),
                    not_ready: not_ready.iter().map(|s| s.to_string()).collect(),
                    ports: ports.iter().map(|p| PortEntry::new(None, *p)).collect(),
                }],
            }],
        }
    }

    fn context(control_plane: FakeControlPlane) -> (Context<FakeControlPlane>, TempDir) {
        let dir = tempdir().unwrap();
        let config = Config {
            nodes_file: dir.path().join("nodes"),
            ..Config::default()
        };
        (
            Context {
                config,
                control_plane,
            },
            dir,
        )
    }

    fn nodes_file(ctx: &Context<FakeControlPlane>) -> String {
        fs::read_to_string(&ctx.config.nodes_file).unwrap()
    }

    #[tokio::test]
    async fn sidecar_port_is_excluded_from_published_file() {
        let fake = FakeControlPlane::without_watch(vec![Ok(snapshot(
            &["10.0.0.4"],
            &[],
            &[8108, 9000],
        ))]);
        let (ctx, _dir) = context(fake);

        reconcile(&ctx).await.unwrap();

        assert_eq!(nodes_file(&ctx), "10.0.0.4:8107:8108");
    }

    #[tokio::test]
    async fn not_ready_addresses_are_published_when_none_ready() {
        let fake =
            FakeControlPlane::without_watch(vec![Ok(snapshot(&[], &["10.0.0.9"], &[8108]))]);
        let (ctx, _dir) = context(fake);

        let nodes = reconcile(&ctx).await.unwrap();

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes_file(&ctx), "10.0.0.9:8107:8108");
    }

    #[tokio::test]
    async fn list_failure_keeps_previous_file() {
        let fake = FakeControlPlane::without_watch(vec![
            Ok(snapshot(&["10.0.0.4", "10.0.0.9"], &[], &[8108])),
            Err(Error::ClientUnavailable),
        ]);
        let (ctx, _dir) = context(fake);

        reconcile(&ctx).await.unwrap();
        let err = reconcile(&ctx).await.unwrap_err();

        assert!(matches!(err, Error::ClientUnavailable));
        assert_eq!(nodes_file(&ctx), "10.0.0.4:8107:8108,10.0.0.9:8107:8108");
    }

    #[tokio::test]
    async fn first_failed_list_creates_no_file() {
        let fake = FakeControlPlane::without_watch(vec![Err(Error::ClientUnavailable)]);
        let (ctx, _dir) = context(fake);

        assert!(reconcile(&ctx).await.is_err());
        assert!(!ctx.config.nodes_file.exists());
    }

    #[tokio::test]
    async fn lists_the_configured_namespace() {
        let fake = FakeControlPlane::without_watch(vec![]);
        let (mut ctx, _dir) = context(fake);
        ctx.config.namespace = "search".into();

        reconcile(&ctx).await.unwrap();

        assert_eq!(*ctx.control_plane.listed.lock().unwrap(), vec!["search"]);
        assert_eq!(nodes_file(&ctx), "");
    }

    #[tokio::test]
    async fn reconciles_once_per_change_until_stream_closes() {
        let (fake, changes) = FakeControlPlane::new(vec![
            Ok(snapshot(&["10.0.0.4"], &[], &[8108])),
            Err(Error::ClientUnavailable),
            Ok(snapshot(&["10.0.0.4", "10.0.0.9"], &[], &[8108, 9000])),
        ]);
        let (ctx, _dir) = context(fake);

        for _ in 0..3 {
            changes.send(Change).await.unwrap();
        }
        drop(changes);

        let outcome = run(&ctx).await;

        assert_eq!(outcome, Outcome::StreamClosed { reconciliations: 3 });
        assert_eq!(ctx.control_plane.listed.lock().unwrap().len(), 3);
        assert_eq!(nodes_file(&ctx), "10.0.0.4:8107:8108,10.0.0.9:8107:8108");
    }

    #[tokio::test]
    async fn failed_list_mid_loop_keeps_last_good_file() {
        let (fake, changes) = FakeControlPlane::new(vec![
            Ok(snapshot(&["10.0.0.4"], &[], &[8108])),
            Err(Error::ClientUnavailable),
        ]);
        let (ctx, _dir) = context(fake);

        changes.send(Change).await.unwrap();
        changes.send(Change).await.unwrap();
        drop(changes);

        assert_eq!(run(&ctx).await, Outcome::StreamClosed { reconciliations: 2 });
        assert_eq!(nodes_file(&ctx), "10.0.0.4:8107:8108");
    }

    #[tokio::test]
    async fn publish_failure_does_not_stop_the_loop() {
        let (fake, changes) = FakeControlPlane::new(vec![
            Ok(snapshot(&["10.0.0.4"], &[], &[8108])),
            Ok(snapshot(&["10.0.0.9"], &[], &[8108])),
        ]);
        let (mut ctx, dir) = context(fake);
        ctx.config.nodes_file = dir.path().join("absent").join("nodes");

        changes.send(Change).await.unwrap();
        changes.send(Change).await.unwrap();
        drop(changes);

        assert_eq!(run(&ctx).await, Outcome::StreamClosed { reconciliations: 2 });
        assert_eq!(ctx.control_plane.listed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn subscribe_failure_reconciles_nothing() {
        let fake =
            FakeControlPlane::without_watch(vec![Ok(snapshot(&["10.0.0.4"], &[], &[8108]))]);
        let (ctx, _dir) = context(fake);

        assert_eq!(run(&ctx).await, Outcome::SubscribeFailed);
        assert!(ctx.control_plane.listed.lock().unwrap().is_empty());
        assert!(!ctx.config.nodes_file.exists());
    }
}
