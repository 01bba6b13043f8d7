//! Exit-route manager: advertise (or stop advertising) this node as a
//! gateway for all IPv6 traffic.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use yggctl_config::{ConfigStore, StoreError};

use crate::reload::ReloadOrchestrator;

/// State of gateway routing after a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitRouteOutcome {
    pub enabled: bool,
    pub advertised_routes: BTreeSet<String>,
    pub reload_success: bool,
}

#[derive(Debug, Clone)]
pub struct ExitRouteManager {
    store: ConfigStore,
    reloader: ReloadOrchestrator,
}

impl ExitRouteManager {
    pub fn new(store: ConfigStore, reloader: ReloadOrchestrator) -> Self {
        Self { store, reloader }
    }

    /// Enable or disable the exit route, persist, and reload.
    ///
    /// Disabling only withdraws `::/0`; routing stays on while any other
    /// configured route remains.
    pub async fn set_exit_node(&self, enabled: bool) -> Result<ExitRouteOutcome, StoreError> {
        let mut doc = self.store.load().await?;
        if enabled {
            doc.tunnel_routing.enable_exit();
        } else {
            doc.tunnel_routing.disable_exit();
        }
        self.store.save(&doc).await?;

        let reload_success = self.reloader.reload().await;
        let routing = &doc.tunnel_routing;
        info!(
            requested = enabled,
            enabled = routing.enabled,
            reload_success,
            "Exit route updated"
        );

        Ok(ExitRouteOutcome {
            enabled: routing.enabled,
            advertised_routes: routing.advertised_routes(),
            reload_success,
        })
    }
}
