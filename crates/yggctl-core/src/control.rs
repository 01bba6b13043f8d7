//! Control-plane façade: the operations a presentation layer (CLI, HTTP
//! adapter) maps onto, one method per operation.
//!
//! Reads go to the [`AdminClient`]. Mutations go through the config store
//! and then the reload orchestrator, serialized by a per-instance lock so
//! two mutations issued through the same `ControlPlane` never interleave
//! their read-modify-write cycles.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use yggctl_config::{ConfigError, ConfigStore, ControlConfig, StoreError};

use crate::admin::{AdminClient, AdminError, NodeInfo, PeerRecord};
use crate::bootstrap::{
    BootstrapError, BootstrapOutcome, CandidatePeer, PeerBootstrap, RegionPreference,
};
use crate::build_info::BuildInfo;
use crate::exit_route::{ExitRouteManager, ExitRouteOutcome};
use crate::reload::ReloadOrchestrator;
use crate::rpc::{RpcError, RpcTransport};

/// How a presentation layer should surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The daemon cannot be reached right now.
    Unavailable,
    /// Something is wrong on this host (config, permissions, protocol).
    Internal,
    /// The caller can fix the request and retry.
    ClientCorrectable,
}

/// Errors surfaced by control-plane operations.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

impl ControlError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ControlError::Admin(AdminError::Rpc(
                RpcError::ChannelUnavailable { .. } | RpcError::Timeout { .. },
            )) => ErrorClass::Unavailable,
            ControlError::Admin(_) => ErrorClass::Internal,
            ControlError::Store(_) => ErrorClass::Internal,
            ControlError::Bootstrap(BootstrapError::NoCandidatesAvailable) => {
                ErrorClass::ClientCorrectable
            }
            ControlError::Bootstrap(BootstrapError::Store(_)) => ErrorClass::Internal,
        }
    }
}

/// Result of the status probe.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub backend_version: String,
    pub admin_endpoint: String,
    pub channel_reachable: bool,
    pub config_path: String,
}

/// A shareable peering URI for this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invite {
    pub address: String,
    pub peering_uri: String,
}

/// Outcome of a single-peer change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerUpdate {
    pub uri: String,
    /// Whether the persisted config was modified.
    pub config_changed: bool,
    /// `None` when no reload was attempted.
    pub reload_success: Option<bool>,
}

pub struct ControlPlane {
    config: ControlConfig,
    admin: AdminClient,
    store: ConfigStore,
    reloader: ReloadOrchestrator,
    bootstrap: PeerBootstrap,
    exit_route: ExitRouteManager,
    mutation_lock: Arc<Mutex<()>>,
}

impl ControlPlane {
    /// Build a control plane with the default reload strategies.
    pub fn new(config: ControlConfig) -> Result<Self, ConfigError> {
        let reloader = ReloadOrchestrator::new(config.daemon.process_name.clone());
        Self::with_reloader(config, reloader)
    }

    /// Build a control plane with a custom reload orchestrator.
    pub fn with_reloader(
        config: ControlConfig,
        reloader: ReloadOrchestrator,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let transport = RpcTransport::new(config.admin_endpoint()?).with_timeout(config.rpc_timeout());
        let store = ConfigStore::new(config.config_path());
        let preference = RegionPreference::new(&config.bootstrap.preferred_regions);

        Ok(Self {
            admin: AdminClient::new(transport),
            bootstrap: PeerBootstrap::new(store.clone(), reloader.clone(), preference),
            exit_route: ExitRouteManager::new(store.clone(), reloader.clone()),
            store,
            reloader,
            config,
            mutation_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn admin(&self) -> &AdminClient {
        &self.admin
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Is the admin channel reachable? Never fails.
    pub async fn status(&self) -> StatusReport {
        StatusReport {
            backend_version: BuildInfo::current().to_string(),
            admin_endpoint: self.admin.transport().endpoint().to_string(),
            channel_reachable: self.admin.transport().probe().await,
            config_path: self.store.path().display().to_string(),
        }
    }

    pub async fn node_info(&self) -> Result<NodeInfo, ControlError> {
        Ok(self.admin.get_self().await?)
    }

    pub async fn peers(&self) -> Result<Vec<PeerRecord>, ControlError> {
        Ok(self.admin.get_peers().await?)
    }

    /// Bootstrap with the configured target count.
    pub async fn bootstrap(
        &self,
        candidates: &[CandidatePeer],
    ) -> Result<BootstrapOutcome, ControlError> {
        self.bootstrap_with_target(candidates, self.config.bootstrap.target_count)
            .await
    }

    pub async fn bootstrap_with_target(
        &self,
        candidates: &[CandidatePeer],
        target_count: usize,
    ) -> Result<BootstrapOutcome, ControlError> {
        let _guard = self.mutation_lock.lock().await;
        Ok(self.bootstrap.bootstrap(candidates, target_count).await?)
    }

    pub async fn set_exit_node(&self, enabled: bool) -> Result<ExitRouteOutcome, ControlError> {
        let _guard = self.mutation_lock.lock().await;
        Ok(self.exit_route.set_exit_node(enabled).await?)
    }

    /// Dial a peer now and, if `persist` is set, keep it across restarts.
    ///
    /// The daemon already holds the live session, so no reload is sent.
    pub async fn add_peer(&self, uri: &str, persist: bool) -> Result<PeerUpdate, ControlError> {
        self.admin.add_peer(uri).await?;

        let config_changed = if persist {
            let _guard = self.mutation_lock.lock().await;
            let mut doc = self.store.load().await?;
            let changed = !doc.merge_peers([uri]).is_empty();
            if changed {
                self.store.save(&doc).await?;
            }
            changed
        } else {
            false
        };

        info!(uri, persist, config_changed, "Peer added");
        Ok(PeerUpdate {
            uri: uri.to_string(),
            config_changed,
            reload_success: None,
        })
    }

    /// Disconnect a live peer by switch port. The persisted config is untouched.
    pub async fn remove_peer(&self, port: u64) -> Result<(), ControlError> {
        self.admin.remove_peer(port).await?;
        info!(port, "Peer removed from live session");
        Ok(())
    }

    /// Drop a peer URI from the persisted config and reload the daemon.
    pub async fn forget_peer(&self, uri: &str) -> Result<PeerUpdate, ControlError> {
        let _guard = self.mutation_lock.lock().await;
        let mut doc = self.store.load().await?;
        if !doc.remove_peer(uri) {
            return Ok(PeerUpdate {
                uri: uri.to_string(),
                config_changed: false,
                reload_success: None,
            });
        }
        self.store.save(&doc).await?;
        let reload_success = self.reloader.reload().await;

        info!(uri, reload_success, "Peer removed from config");
        Ok(PeerUpdate {
            uri: uri.to_string(),
            config_changed: true,
            reload_success: Some(reload_success),
        })
    }

    /// Peering URI other nodes can use to reach this one. `port` defaults
    /// to the configured peering port.
    pub async fn invite(&self, port: Option<u16>) -> Result<Invite, ControlError> {
        let node = self.admin.get_self().await?;
        let port = port.unwrap_or(self.config.daemon.peering_port);
        Ok(Invite {
            peering_uri: peering_uri(&node.address, port),
            address: node.address,
        })
    }
}

fn peering_uri(address: &str, port: u16) -> String {
    format!("tcp://[{address}]:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_peering_uri() {
        assert_eq!(peering_uri("200:1234::1", 9001), "tcp://[200:1234::1]:9001");
    }

    #[test]
    fn test_error_classes() {
        let unavailable = ControlError::Admin(AdminError::Rpc(RpcError::ChannelUnavailable {
            endpoint: "unix:///x".into(),
            reason: "socket not found".into(),
        }));
        assert_eq!(unavailable.class(), ErrorClass::Unavailable);

        let timeout = ControlError::Admin(AdminError::Rpc(RpcError::Timeout {
            method: "getSelf".into(),
            timeout: Duration::from_secs(5),
        }));
        assert_eq!(timeout.class(), ErrorClass::Unavailable);

        let remote = ControlError::Admin(AdminError::Rpc(RpcError::Remote {
            method: "addPeer".into(),
            message: "bad uri".into(),
        }));
        assert_eq!(remote.class(), ErrorClass::Internal);

        let corrupt = ControlError::Store(StoreError::ConfigCorrupt {
            path: PathBuf::from("/etc/yggdrasil.conf"),
            reason: "bad".into(),
        });
        assert_eq!(corrupt.class(), ErrorClass::Internal);

        let denied = ControlError::Bootstrap(BootstrapError::Store(StoreError::PersistDenied {
            path: PathBuf::from("/etc/yggdrasil.conf"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }));
        assert_eq!(denied.class(), ErrorClass::Internal);

        let empty = ControlError::Bootstrap(BootstrapError::NoCandidatesAvailable);
        assert_eq!(empty.class(), ErrorClass::ClientCorrectable);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = ControlConfig::default();
        config.daemon.admin_endpoint = "ftp://nope".into();
        assert!(ControlPlane::new(config).is_err());
    }
}
