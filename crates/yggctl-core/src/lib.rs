#![deny(unsafe_code)]

//! yggctl core: a control plane for a locally running Yggdrasil daemon.
//!
//! Reads go over the daemon's admin socket. Mutations edit the daemon's
//! on-disk config and then ask the running process to reload it. Nothing
//! here keeps state between calls; the config file and the daemon are the
//! sources of truth.

/// Typed admin operations (`getSelf`, `getPeers`, `addPeer`, `removePeer`).
pub mod admin;
/// Public peer selection and persistence.
pub mod bootstrap;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// The façade a CLI or HTTP adapter calls into.
pub mod control;
/// Gateway (`::/0`) route toggling.
pub mod exit_route;
/// Daemon process discovery and SIGHUP delivery.
pub mod reload;
/// Line-delimited JSON request/response exchange over the admin socket.
pub mod rpc;

pub use admin::{AdminClient, AdminError, NodeInfo, PeerRecord};
pub use bootstrap::{
    BootstrapError, BootstrapOutcome, CandidatePeer, PeerBootstrap, RegionPreference,
    candidates_from_feed,
};
pub use build_info::BuildInfo;
pub use control::{ControlError, ControlPlane, ErrorClass, Invite, PeerUpdate, StatusReport};
pub use exit_route::{ExitRouteManager, ExitRouteOutcome};
pub use reload::{
    HangupSignaller, PgrepFinder, ProcTableFinder, ProcessEntry, ProcessFinder, ProcessSignaller,
    ReloadError, ReloadOrchestrator,
};
pub use rpc::{RpcError, RpcTransport};
