//! The daemon's persisted configuration document.
//!
//! Only the parts the control plane edits are typed: `Peers`,
//! `TunnelRouting`, and `AdminListen`. Every other key (keys, listen
//! addresses, multicast settings, ...) is carried through untouched in
//! [`ConfigDocument::extra`] so a load/save cycle never drops settings.
//!
//! All helpers here are pure in-memory edits. Persistence lives in
//! [`crate::store`].

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::endpoint::DEFAULT_ADMIN_ENDPOINT;

/// The route advertised when this node acts as an exit for all IPv6 traffic.
pub const ALL_IPV6_ROUTE: &str = "::/0";

/// Error returned when a document matches neither accepted format.
#[derive(Debug, thiserror::Error)]
#[error("not valid JSON ({json}) and not valid TOML ({toml})")]
pub struct DocumentParseError {
    pub json: String,
    pub toml: String,
}

/// The daemon's full configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Peer URIs in dial-priority order. Unique.
    #[serde(rename = "Peers", default, deserialize_with = "null_as_default")]
    pub peers: Vec<String>,

    /// Gateway routing settings.
    #[serde(rename = "TunnelRouting", default, deserialize_with = "null_as_default")]
    pub tunnel_routing: TunnelRouting,

    /// Location of the admin channel, as the daemon itself reads it.
    #[serde(rename = "AdminListen", default = "default_admin_listen")]
    pub admin_listen: String,

    /// Settings the control plane does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `TunnelRouting` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunnelRouting {
    #[serde(rename = "Enable", default, deserialize_with = "null_as_default")]
    pub enabled: bool,

    #[serde(rename = "IPv6Destinations", default, deserialize_with = "null_as_default")]
    pub ipv6_destinations: BTreeSet<String>,

    #[serde(rename = "IPv6Sources", default, deserialize_with = "null_as_default")]
    pub ipv6_sources: BTreeSet<String>,

    #[serde(rename = "IPv4Destinations", default, deserialize_with = "null_as_default")]
    pub ipv4_destinations: BTreeSet<String>,

    #[serde(rename = "IPv4Sources", default, deserialize_with = "null_as_default")]
    pub ipv4_sources: BTreeSet<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_admin_listen() -> String {
    DEFAULT_ADMIN_ENDPOINT.to_string()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            tunnel_routing: TunnelRouting::default(),
            admin_listen: default_admin_listen(),
            extra: Map::new(),
        }
    }
}

impl ConfigDocument {
    /// Parse a document from text.
    ///
    /// JSON is tried first (strict, then with `#` and `//` comments
    /// removed), then TOML. Duplicate peers are collapsed and the routing
    /// invariant is re-established on the result.
    pub fn parse(text: &str) -> Result<Self, DocumentParseError> {
        let mut doc = match serde_json::from_str::<ConfigDocument>(text) {
            Ok(doc) => doc,
            Err(json_err) => match serde_json::from_str::<ConfigDocument>(&strip_comments(text)) {
                Ok(doc) => doc,
                Err(_) => toml::from_str::<ConfigDocument>(text).map_err(|toml_err| {
                    DocumentParseError {
                        json: json_err.to_string(),
                        toml: toml_err.to_string(),
                    }
                })?,
            },
        };
        doc.normalize();
        Ok(doc)
    }

    /// Serialize to the canonical on-disk form (pretty JSON, trailing newline).
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    /// Collapse duplicate peers (first occurrence wins) and make sure
    /// routing is not left enabled with no routes.
    pub fn normalize(&mut self) {
        let before = self.peers.len();
        let mut seen = BTreeSet::new();
        self.peers.retain(|uri| seen.insert(uri.clone()));
        if self.peers.len() != before {
            tracing::debug!(
                dropped = before - self.peers.len(),
                "Collapsed duplicate peer entries"
            );
        }
        self.tunnel_routing.enforce_invariant();
    }

    /// Append every URI not already present, preserving the given order.
    ///
    /// Returns the URIs that were actually appended.
    pub fn merge_peers<I, S>(&mut self, uris: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        for uri in uris {
            let uri = uri.as_ref();
            if !self.peers.iter().any(|p| p == uri) {
                self.peers.push(uri.to_string());
                added.push(uri.to_string());
            }
        }
        added
    }

    /// Remove a peer URI. Returns `true` if it was present.
    pub fn remove_peer(&mut self, uri: &str) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p != uri);
        self.peers.len() != before
    }
}

impl TunnelRouting {
    /// Whether any of the four route sets has an entry.
    pub fn has_routes(&self) -> bool {
        !(self.ipv6_destinations.is_empty()
            && self.ipv6_sources.is_empty()
            && self.ipv4_destinations.is_empty()
            && self.ipv4_sources.is_empty())
    }

    /// Turn on exit routing and advertise the all-addresses IPv6 route.
    ///
    /// Idempotent.
    pub fn enable_exit(&mut self) {
        self.enabled = true;
        self.ipv6_destinations.insert(ALL_IPV6_ROUTE.to_string());
    }

    /// Withdraw the all-addresses IPv6 route.
    ///
    /// Routing stays enabled while any other route remains.
    pub fn disable_exit(&mut self) {
        self.ipv6_destinations.remove(ALL_IPV6_ROUTE);
        self.enforce_invariant();
    }

    /// Routes this node advertises as a destination gateway.
    pub fn advertised_routes(&self) -> BTreeSet<String> {
        self.ipv6_destinations
            .iter()
            .chain(self.ipv4_destinations.iter())
            .cloned()
            .collect()
    }

    fn enforce_invariant(&mut self) {
        if self.enabled && !self.has_routes() {
            self.enabled = false;
        }
    }
}

/// Remove `#` and `//` line comments that sit outside string literals.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        let starts_comment = c == '#' || (c == '/' && chars.peek() == Some(&'/'));
        if starts_comment {
            for skipped in chars.by_ref() {
                if skipped == '\n' {
                    out.push('\n');
                    break;
                }
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    out
}
