use std::path::PathBuf;

use clap::Parser;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Kubeconfig file name under `~/.kube`, or an absolute path.  When it
    /// does not exist the in-cluster config is used.
    pub kubeconfig: String,
    pub namespace: String,
    pub service: String,
    pub nodes_file: PathBuf,
    pub peer_port: u16,
    pub api_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kubeconfig: "config".into(),
            namespace: "typesense".into(),
            service: "typesense-svc".into(),
            nodes_file: "/usr/share/typesense/nodes".into(),
            peer_port: 8107,
            api_port: 8108,
        }
    }
}

/// Command-line overrides.  Only flags given explicitly take part in the merge.
#[derive(Parser, Debug, Clone, Default, Serialize)]
#[command(
    name = "peerwatch",
    about = "Publishes the endpoints of a Kubernetes service as a peer nodes file",
    version
)]
pub struct Cli {
    /// Kubeconfig file in ~/.kube to work with
    #[arg(long, value_name = "NAME")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,

    /// Namespace the service is installed within
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name of the service to use the endpoints of
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Location of the file to write node information to
    #[arg(long, value_name = "PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes_file: Option<PathBuf>,

    /// Port on which the peering service listens
    #[arg(long, value_name = "PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_port: Option<u16>,

    /// Port on which the API service listens
    #[arg(long, value_name = "PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_port: Option<u16>,
}

impl Config {
    /// Defaults, then `peerwatch.toml`, `peerwatch.json`, `PEERWATCH_*`
    /// environment variables and finally the command line.
    pub fn figment(cli: &Cli) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("peerwatch.toml"))
            .merge(Json::file("peerwatch.json"))
            .merge(Env::prefixed("PEERWATCH_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let config: Config = Self::figment(cli)
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults with only the command line applied.  Used when the
    /// layered sources cannot be read.  A zero port flag falls back to the
    /// default port.
    pub fn from_cli(cli: &Cli) -> Self {
        let defaults = Config::default();
        let port = |flag: Option<u16>, default: u16, name: &str| match flag {
            Some(0) => {
                warn!("Invalid {}: 0, using {}", name, default);
                default
            }
            Some(port) => port,
            None => default,
        };
        let config = Self {
            peer_port: port(cli.peer_port, defaults.peer_port, "peer_port"),
            api_port: port(cli.api_port, defaults.api_port, "api_port"),
            kubeconfig: cli.kubeconfig.clone().unwrap_or(defaults.kubeconfig),
            namespace: cli.namespace.clone().unwrap_or(defaults.namespace),
            service: cli.service.clone().unwrap_or(defaults.service),
            nodes_file: cli.nodes_file.clone().unwrap_or(defaults.nodes_file),
        };
        debug_assert!(config.validate().is_ok());
        config
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.peer_port == 0 {
            anyhow::bail!("Invalid peer_port: 0");
        }
        if self.api_port == 0 {
            anyhow::bail!("Invalid api_port: 0");
        }
        Ok(())
    }
}
