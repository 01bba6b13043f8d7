//! Configuration builders for tests.
//!
//! [`TestConfigBuilder`] builds [`ControlConfig`] values; [`ConfigDir`] owns
//! a temporary directory holding a daemon config file.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use yggctl_config::{ConfigDocument, ControlConfig};

/// Fluent builder for [`ControlConfig`] in tests.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .admin_endpoint(daemon.endpoint())
///     .config_path(dir.config_path())
///     .rpc_timeout_ms(200)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: ControlConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ControlConfig::default(),
        }
    }

    pub fn admin_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.daemon.admin_endpoint = endpoint.into();
        self
    }

    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.daemon.config_path = path.as_ref().display().to_string();
        self
    }

    pub fn process_name(mut self, name: &str) -> Self {
        self.config.daemon.process_name = name.to_string();
        self
    }

    pub fn rpc_timeout_ms(mut self, ms: u64) -> Self {
        self.config.daemon.rpc_timeout_ms = ms;
        self
    }

    pub fn peering_port(mut self, port: u16) -> Self {
        self.config.daemon.peering_port = port;
        self
    }

    pub fn target_count(mut self, n: usize) -> Self {
        self.config.bootstrap.target_count = n;
        self
    }

    pub fn preferred_regions(mut self, regions: &[&str]) -> Self {
        self.config.bootstrap.preferred_regions = regions.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn build(self) -> ControlConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A temp directory with a daemon config file path inside it.
///
/// The file is not created until [`write`](Self::write) or
/// [`write_document`](Self::write_document) is called.
pub struct ConfigDir {
    config_path: PathBuf,
    _temp_dir: TempDir,
}

impl ConfigDir {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("yggdrasil.conf");
        Self {
            config_path,
            _temp_dir: temp_dir,
        }
    }

    /// Start with the given raw file contents.
    pub fn with_contents(contents: &str) -> Self {
        let dir = Self::new();
        dir.write(contents);
        dir
    }

    /// Start with a canonical document listing `peers`.
    pub fn with_peers(peers: &[&str]) -> Self {
        let mut doc = ConfigDocument::default();
        doc.merge_peers(peers);
        let dir = Self::new();
        dir.write_document(&doc);
        dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    pub fn write(&self, contents: &str) {
        std::fs::write(&self.config_path, contents).expect("failed to write test config");
    }

    pub fn write_document(&self, doc: &ConfigDocument) {
        let json = doc.to_canonical_json().expect("failed to encode document");
        self.write(&json);
    }

    pub fn read(&self) -> String {
        std::fs::read_to_string(&self.config_path).expect("failed to read test config")
    }

    pub fn read_document(&self) -> ConfigDocument {
        ConfigDocument::parse(&self.read()).expect("saved config does not parse")
    }

    /// Parsed raw JSON, for asserting on keys the document type does not model.
    pub fn read_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.read()).expect("saved config is not JSON")
    }
}

impl Default for ConfigDir {
    fn default() -> Self {
        Self::new()
    }
}
