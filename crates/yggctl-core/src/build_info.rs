//! Build metadata embedded by `build.rs`, surfaced by the status probe and
//! `yggctl --version`.

use serde::Serialize;

/// Crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short commit hash, suffixed with `-dirty` for uncommitted builds.
pub const GIT_COMMIT: &str = env!("YGGCTL_GIT_COMMIT");

pub const BUILD_PROFILE: &str = env!("YGGCTL_BUILD_PROFILE");

pub const TARGET: &str = env!("YGGCTL_TARGET");

/// `0.1.0 (abc1234, release, x86_64-unknown-linux-gnu)`, for `--version`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("YGGCTL_GIT_COMMIT"),
    ", ",
    env!("YGGCTL_BUILD_PROFILE"),
    ", ",
    env!("YGGCTL_TARGET"),
    ")"
);

/// Everything known about this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub profile: &'static str,
    pub target: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            version: VERSION,
            git_commit: GIT_COMMIT,
            profile: BUILD_PROFILE,
            target: TARGET,
        }
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, {}, {})",
            self.version, self.git_commit, self.profile, self.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_leads_with_version() {
        let rendered = BuildInfo::current().to_string();
        assert!(rendered.starts_with(VERSION));
        assert!(rendered.contains(GIT_COMMIT));
        assert!(rendered.contains(TARGET));
    }

    #[test]
    fn test_long_version_matches_display() {
        assert_eq!(LONG_VERSION, BuildInfo::current().to_string());
    }

    #[test]
    fn test_metadata_present() {
        let info = BuildInfo::current();
        assert!(!info.git_commit.is_empty());
        assert!(!info.profile.is_empty());
    }
}
