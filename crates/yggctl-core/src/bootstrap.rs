//! Peer bootstrap: pick public peers and persist them.
//!
//! Selection prefers candidates tagged with a preferred region and draws
//! uniformly at random so repeated bootstraps spread load across the public
//! pool. The chosen URIs are merged into the daemon config without
//! duplicating existing entries, saved, and the daemon is asked to reload.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use yggctl_config::{ConfigStore, StoreError};

use crate::reload::ReloadOrchestrator;

/// A potential public peer from the external feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePeer {
    pub uri: String,
    pub region: String,
}

impl CandidatePeer {
    pub fn new(uri: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            region: region.into(),
        }
    }
}

/// Flatten a region → URIs feed into candidates, in region then list order.
pub fn candidates_from_feed(feed: &BTreeMap<String, Vec<String>>) -> Vec<CandidatePeer> {
    feed.iter()
        .flat_map(|(region, uris)| uris.iter().map(move |uri| CandidatePeer::new(uri, region)))
        .collect()
}

/// Result of a bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapOutcome {
    /// URIs appended to the config, in selection order.
    pub added: Vec<String>,
    /// Peer count in the saved config.
    pub total_after: usize,
    pub reload_success: bool,
}

/// Errors from a bootstrap run.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("no candidate peers available")]
    NoCandidatesAvailable,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Case-insensitive set of preferred region tags.
#[derive(Debug, Clone, Default)]
pub struct RegionPreference {
    tags: BTreeSet<String>,
}

impl RegionPreference {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tags: tags
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    pub fn matches(&self, region: &str) -> bool {
        self.tags.contains(&region.trim().to_lowercase())
    }
}

/// Choose up to `target` distinct URIs.
///
/// Preferred-region candidates are drawn first. If they cannot fill
/// `target` (including when there are none), the remaining slots are drawn
/// from the other candidates.
pub fn select_peers<R: Rng + ?Sized>(
    candidates: &[CandidatePeer],
    preference: &RegionPreference,
    target: usize,
    rng: &mut R,
) -> Result<Vec<String>, BootstrapError> {
    if candidates.is_empty() {
        return Err(BootstrapError::NoCandidatesAvailable);
    }

    let mut preferred: Vec<&str> = Vec::new();
    let mut others: Vec<&str> = Vec::new();
    for candidate in candidates {
        let uri = candidate.uri.as_str();
        if preference.matches(&candidate.region) {
            if !preferred.contains(&uri) {
                preferred.push(uri);
            }
        } else if !others.contains(&uri) {
            others.push(uri);
        }
    }
    others.retain(|uri| !preferred.contains(uri));

    let mut selected: Vec<String> = preferred
        .choose_multiple(rng, target)
        .map(|uri| uri.to_string())
        .collect();

    let shortfall = target - selected.len();
    if shortfall > 0 {
        debug!(
            preferred = preferred.len(),
            shortfall, "Not enough preferred-region peers, drawing from all regions"
        );
        selected.extend(others.choose_multiple(rng, shortfall).map(|uri| uri.to_string()));
    }

    Ok(selected)
}

/// Merges randomly selected public peers into the daemon config.
#[derive(Debug, Clone)]
pub struct PeerBootstrap {
    store: ConfigStore,
    reloader: ReloadOrchestrator,
    preference: RegionPreference,
}

impl PeerBootstrap {
    pub fn new(store: ConfigStore, reloader: ReloadOrchestrator, preference: RegionPreference) -> Self {
        Self {
            store,
            reloader,
            preference,
        }
    }

    /// Select up to `target_count` candidates, persist the new ones, reload.
    pub async fn bootstrap(
        &self,
        candidates: &[CandidatePeer],
        target_count: usize,
    ) -> Result<BootstrapOutcome, BootstrapError> {
        let selected = select_peers(
            candidates,
            &self.preference,
            target_count,
            &mut StdRng::from_entropy(),
        )?;

        let mut doc = self.store.load().await?;
        let added = doc.merge_peers(&selected);
        if added.is_empty() {
            debug!(selected = selected.len(), "All selected peers already configured");
        }
        self.store.save(&doc).await?;

        let reload_success = self.reloader.reload().await;
        info!(
            added = added.len(),
            total = doc.peers.len(),
            reload_success,
            "Bootstrap complete"
        );

        Ok(BootstrapOutcome {
            added,
            total_after: doc.peers.len(),
            reload_success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn preference() -> RegionPreference {
        RegionPreference::new(["us", "de", "United States", "Germany"])
    }

    #[test]
    fn test_region_match_is_case_insensitive() {
        let pref = preference();
        assert!(pref.matches("US"));
        assert!(pref.matches("united states"));
        assert!(pref.matches(" Germany "));
        assert!(!pref.matches("jp"));
    }

    #[test]
    fn test_empty_candidates() {
        let result = select_peers(&[], &preference(), 3, &mut rng());
        assert!(matches!(result, Err(BootstrapError::NoCandidatesAvailable)));
    }

    #[test]
    fn test_prefers_region_when_enough() {
        let candidates = vec![
            CandidatePeer::new("tcp://us1:1", "us"),
            CandidatePeer::new("tcp://us2:1", "us"),
            CandidatePeer::new("tcp://de1:1", "de"),
            CandidatePeer::new("tcp://jp1:1", "jp"),
        ];
        for seed in 0..20 {
            let picked = select_peers(&candidates, &preference(), 3, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            assert_eq!(picked.len(), 3);
            assert!(!picked.contains(&"tcp://jp1:1".to_string()));
        }
    }

    #[test]
    fn test_tops_up_from_other_regions() {
        let candidates = vec![
            CandidatePeer::new("tcp://a:9001", "us"),
            CandidatePeer::new("tcp://b:9001", "de"),
            CandidatePeer::new("tcp://c:9001", "jp"),
        ];
        let mut picked = select_peers(&candidates, &preference(), 3, &mut rng()).unwrap();
        assert_eq!(picked.len(), 3);
        assert_eq!(picked[2], "tcp://c:9001");
        picked.sort();
        assert_eq!(picked, vec!["tcp://a:9001", "tcp://b:9001", "tcp://c:9001"]);
    }

    #[test]
    fn test_global_fallback_when_no_region_matches() {
        let candidates = vec![
            CandidatePeer::new("tcp://jp1:1", "jp"),
            CandidatePeer::new("tcp://au1:1", "au"),
        ];
        let picked = select_peers(&candidates, &preference(), 3, &mut rng()).unwrap();
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_selection_is_distinct() {
        let candidates = vec![
            CandidatePeer::new("tcp://a:1", "us"),
            CandidatePeer::new("tcp://a:1", "de"),
            CandidatePeer::new("tcp://a:1", "jp"),
            CandidatePeer::new("tcp://b:1", "jp"),
        ];
        let mut picked = select_peers(&candidates, &preference(), 3, &mut rng()).unwrap();
        picked.sort();
        assert_eq!(picked, vec!["tcp://a:1", "tcp://b:1"]);
    }

    #[test]
    fn test_selection_varies_across_draws() {
        let candidates: Vec<CandidatePeer> = (0..20)
            .map(|i| CandidatePeer::new(format!("tcp://peer{i}:9001"), "us"))
            .collect();
        let draws: BTreeSet<Vec<String>> = (0..10)
            .map(|seed| {
                let mut picked =
                    select_peers(&candidates, &preference(), 3, &mut StdRng::seed_from_u64(seed))
                        .unwrap();
                picked.sort();
                picked
            })
            .collect();
        assert!(draws.len() > 1);
    }

    #[test]
    fn test_candidates_from_feed() {
        let mut feed = BTreeMap::new();
        feed.insert(
            "United States".to_string(),
            vec!["tcp://peer1.us:9001".to_string(), "tcp://peer2.us:9001".to_string()],
        );
        feed.insert("Germany".to_string(), vec!["tcp://peer1.de:9001".to_string()]);

        let candidates = candidates_from_feed(&feed);
        assert_eq!(
            candidates,
            vec![
                CandidatePeer::new("tcp://peer1.de:9001", "Germany"),
                CandidatePeer::new("tcp://peer1.us:9001", "United States"),
                CandidatePeer::new("tcp://peer2.us:9001", "United States"),
            ]
        );
    }
}
