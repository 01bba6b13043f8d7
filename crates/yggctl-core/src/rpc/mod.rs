//! Admin RPC: line-delimited JSON over the daemon's admin channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   unix:// or tcp://   ┌──────────────────┐
//! │ AdminClient  │──────────────────────▶│  mesh daemon     │
//! │ RpcTransport │  one JSON line each   │  admin listener  │
//! └──────────────┘       direction       └──────────────────┘
//! ```
//!
//! [`frame`] knows the wire shapes, [`transport`] knows how to move one
//! request and one response over a fresh connection. Neither knows any
//! specific admin method.

pub mod frame;
pub mod transport;

pub use frame::{AdminRequest, AdminResponse, FrameError, PROTOCOL_VERSION};
pub use transport::{RpcError, RpcTransport};
