#![deny(unsafe_code)]

//! yggctl: command-line control plane for a local Yggdrasil daemon.
//!
//! Results are printed to stdout as JSON. Failures are printed to stderr
//! and mapped to a sysexits-style exit code by error class.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use yggctl_config::{ConfigError, ControlConfig};
use yggctl_core::build_info::LONG_VERSION;
use yggctl_core::{ControlError, ControlPlane, ErrorClass, candidates_from_feed};

/// Manage a locally running Yggdrasil mesh daemon.
#[derive(Parser)]
#[command(name = "yggctl", version, long_version = LONG_VERSION, about, long_about = None)]
struct Cli {
    /// Path to yggctl's own configuration file.
    #[arg(short, long, default_value = "yggctl.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether the daemon's admin channel is reachable.
    Status,

    /// Show this node's address, key, coordinates and subnet.
    #[command(name = "self")]
    SelfInfo,

    /// List currently connected peers.
    Peers,

    /// Dial a peer now.
    AddPeer {
        uri: String,
        /// Also save the peer to the daemon config.
        #[arg(long)]
        persist: bool,
    },

    /// Disconnect the peer on a switch port for this session.
    RemovePeer { port: u64 },

    /// Remove a peer from the daemon config and reload.
    ForgetPeer { uri: String },

    /// Add public peers from a region → URIs JSON feed.
    Bootstrap {
        /// JSON file mapping region names to lists of peer URIs.
        #[arg(long)]
        feed: PathBuf,
        /// How many peers to select (defaults to bootstrap.target_count).
        #[arg(long)]
        count: Option<usize>,
    },

    /// Advertise or withdraw this node as a gateway for all IPv6 traffic.
    ExitNode {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Print a peering URI other nodes can use to reach this one.
    Invite {
        /// Listen port to advertise (defaults to daemon.peering_port).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    Enable,
    Disable,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let class = e.downcast_ref::<ControlError>().map(ControlError::class);
            let report = serde_json::json!({
                "error": format!("{e:#}"),
                "class": class,
            });
            eprintln!("{report}");
            if e.downcast_ref::<ConfigError>().is_some() {
                return ExitCode::from(EX_CONFIG);
            }
            ExitCode::from(exit_code(class))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config).await?;
    let plane = ControlPlane::new(config).context("invalid configuration")?;
    debug!(endpoint = %plane.admin().transport().endpoint(), "Control plane ready");

    match cli.command {
        Commands::Status => print_json(&plane.status().await),
        Commands::SelfInfo => print_json(&plane.node_info().await?),
        Commands::Peers => print_json(&plane.peers().await?),
        Commands::AddPeer { uri, persist } => print_json(&plane.add_peer(&uri, persist).await?),
        Commands::RemovePeer { port } => {
            plane.remove_peer(port).await?;
            print_json(&serde_json::json!({ "removed_port": port }))
        }
        Commands::ForgetPeer { uri } => print_json(&plane.forget_peer(&uri).await?),
        Commands::Bootstrap { feed, count } => {
            let candidates = candidates_from_feed(&read_feed(&feed).await?);
            info!(candidates = candidates.len(), "Loaded candidate feed");
            let outcome = match count {
                Some(n) => plane.bootstrap_with_target(&candidates, n).await?,
                None => plane.bootstrap(&candidates).await?,
            };
            print_json(&outcome)
        }
        Commands::ExitNode { state } => {
            let enabled = matches!(state, Toggle::Enable);
            print_json(&plane.set_exit_node(enabled).await?)
        }
        Commands::Invite { port } => print_json(&plane.invite(port).await?),
        Commands::Config { show } => cmd_config(plane.config(), &cli.config, show),
    }
}

fn cmd_config(config: &ControlConfig, config_path: &Path, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

/// File (if present), then environment overrides.
async fn load_config(path: &Path) -> Result<ControlConfig> {
    let mut config = if path.exists() {
        ControlConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?
    } else {
        debug!(path = %path.display(), "Config file not found, using defaults");
        ControlConfig::default()
    };
    config.apply_env_overrides()?;
    Ok(config)
}

async fn read_feed(path: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read feed {}", path.display()))?;
    parse_feed(&raw).with_context(|| format!("invalid feed {}", path.display()))
}

fn parse_feed(raw: &str) -> Result<BTreeMap<String, Vec<String>>> {
    Ok(serde_json::from_str(raw)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// sysexits(3) EX_CONFIG, for an unusable yggctl.toml or override.
const EX_CONFIG: u8 = 78;

/// sysexits(3) codes: 69 unavailable, 70 internal, 65 bad input, 1 otherwise.
fn exit_code(class: Option<ErrorClass>) -> u8 {
    match class {
        Some(ErrorClass::Unavailable) => 69,
        Some(ErrorClass::Internal) => 70,
        Some(ErrorClass::ClientCorrectable) => 65,
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use yggctl_test_utils::config::ConfigDir;
    use yggctl_test_utils::daemon::FakeDaemon;

    /// Writes a yggctl.toml pointing at `endpoint` and `dir`, with a process
    /// name nothing on the host will match.
    fn tool_config(home: &TempDir, endpoint: &str, dir: &ConfigDir) -> PathBuf {
        let path = home.path().join("yggctl.toml");
        let body = format!(
            "[daemon]\nadmin_endpoint = {:?}\nconfig_path = {:?}\nprocess_name = \"yggctl-test-absent-daemon\"\nrpc_timeout_ms = 300\n",
            endpoint,
            dir.config_path().display().to_string(),
        );
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_subcommands() {
        let cli = Cli::try_parse_from(["yggctl", "-vv", "add-peer", "tcp://a:9001", "--persist"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::AddPeer { ref uri, persist: true } if uri == "tcp://a:9001"
        ));

        let cli = Cli::try_parse_from(["yggctl", "exit-node", "disable"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::ExitNode {
                state: Toggle::Disable
            }
        ));

        let cli = Cli::try_parse_from(["yggctl", "self"]).unwrap();
        assert!(matches!(cli.command, Commands::SelfInfo));

        assert!(Cli::try_parse_from(["yggctl", "exit-node", "maybe"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(Some(ErrorClass::Unavailable)), 69);
        assert_eq!(exit_code(Some(ErrorClass::Internal)), 70);
        assert_eq!(exit_code(Some(ErrorClass::ClientCorrectable)), 65);
        assert_eq!(exit_code(None), 1);
    }

    #[test]
    fn test_parse_feed() {
        let feed = parse_feed(
            r#"{"Germany": ["tcp://de1:9001"], "United States": ["tcp://us1:9001", "tls://us2:443"]}"#,
        )
        .unwrap();
        assert_eq!(feed["United States"].len(), 2);
        assert_eq!(candidates_from_feed(&feed).len(), 3);

        assert!(parse_feed(r#"["tcp://a:9001"]"#).is_err());
    }

    #[tokio::test]
    async fn test_load_config_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(config.bootstrap.target_count, 3);
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("yggctl.toml");
        tokio::fs::write(&path, "[bootstrap]\ntarget_count = 5\n")
            .await
            .unwrap();
        let config = load_config(&path).await.unwrap();
        assert_eq!(config.bootstrap.target_count, 5);
    }

    #[test_log::test(tokio::test)]
    async fn test_run_exit_node_enable() {
        let home = TempDir::new().unwrap();
        let dir = ConfigDir::new();
        let config = tool_config(&home, "unix:///nonexistent/yggdrasil.sock", &dir);

        let cli = Cli::try_parse_from([
            "yggctl",
            "-c",
            config.to_str().unwrap(),
            "exit-node",
            "enable",
        ])
        .unwrap();
        run(cli).await.unwrap();

        let saved = dir.read_document();
        assert!(saved.tunnel_routing.enabled);
        assert!(saved.tunnel_routing.ipv6_destinations.contains("::/0"));
    }

    #[test_log::test(tokio::test)]
    async fn test_run_reports_unavailable_class() {
        let home = TempDir::new().unwrap();
        let dir = ConfigDir::new();
        let config = tool_config(&home, "unix:///nonexistent/yggdrasil.sock", &dir);

        let cli = Cli::try_parse_from(["yggctl", "-c", config.to_str().unwrap(), "self"]).unwrap();
        let err = run(cli).await.unwrap_err();
        let class = err.downcast_ref::<ControlError>().map(ControlError::class);
        assert_eq!(class, Some(ErrorClass::Unavailable));
    }

    #[test_log::test(tokio::test)]
    async fn test_run_peers_against_fake_daemon() {
        let daemon = FakeDaemon::builder()
            .result("getPeers", serde_json::json!({ "peers": [] }))
            .start()
            .await;
        let home = TempDir::new().unwrap();
        let dir = ConfigDir::new();
        let config = tool_config(&home, &daemon.endpoint(), &dir);

        let cli = Cli::try_parse_from(["yggctl", "-c", config.to_str().unwrap(), "peers"]).unwrap();
        run(cli).await.unwrap();
        assert_eq!(daemon.methods(), vec!["getPeers"]);
    }
}
