//! Client configuration
//!
//! A client is bound to one cluster and one app for its whole lifetime. The
//! cluster's meta servers are resolved from a server list string
//! (`"ip:port,ip:port"`); an empty or malformed list is a construction-time
//! error, never a runtime one.

use std::collections::BTreeMap;
use std::net::SocketAddrV4;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default per-operation timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default records per scan page
pub const DEFAULT_SCAN_BATCH_SIZE: u32 = 1000;

/// Resolved, immutable client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Logical cluster name
    pub cluster_name: String,
    /// Target app (table) name
    pub app_name: String,
    /// Meta servers responsible for partition discovery
    pub meta_servers: Vec<SocketAddrV4>,
    /// Timeout used by the convenience overloads
    pub default_timeout: Duration,
    /// Default scan page size
    pub scan_batch_size: u32,
}

impl ClientConfig {
    /// Resolve a configuration from a meta server list.
    pub fn new(
        cluster_name: impl Into<String>,
        app_name: impl Into<String>,
        server_list: &str,
    ) -> Result<Self, ConfigError> {
        let cluster_name = cluster_name.into();
        let meta_servers = parse_server_list(&cluster_name, server_list)?;
        let config = Self {
            cluster_name,
            app_name: app_name.into(),
            meta_servers,
            default_timeout: DEFAULT_TIMEOUT,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        };
        config.validate()?;
        Ok(config)
    }

    /// Local single-machine cluster with three meta servers.
    pub fn onebox(app_name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new("onebox", app_name, "127.0.0.1:34601,127.0.0.1:34602,127.0.0.1:34603")
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_scan_batch_size(mut self, batch_size: u32) -> Self {
        self.scan_batch_size = batch_size;
        self
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_name.is_empty() {
            return Err(ConfigError::Invalid("cluster_name must not be empty".into()));
        }
        if self.app_name.is_empty() {
            return Err(ConfigError::Invalid("app_name must not be empty".into()));
        }
        if self.meta_servers.is_empty() {
            return Err(ConfigError::NoMetaServers { cluster: self.cluster_name.clone() });
        }
        if self.default_timeout.is_zero() {
            return Err(ConfigError::Invalid("default_timeout must be > 0".into()));
        }
        if self.scan_batch_size == 0 {
            return Err(ConfigError::Invalid("scan_batch_size must be > 0".into()));
        }
        Ok(())
    }
}

/// Parse `"ip:port,ip:port"` into IPv4 socket addresses.
///
/// Blank entries are skipped; any other entry that is not `ip:port` fails.
pub fn parse_server_list(cluster: &str, server_list: &str) -> Result<Vec<SocketAddrV4>, ConfigError> {
    let mut servers = Vec::new();
    for entry in server_list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let addr = entry.parse::<SocketAddrV4>().map_err(|_| ConfigError::InvalidAddress {
            cluster: cluster.to_string(),
            address: entry.to_string(),
        })?;
        servers.push(addr);
    }
    if servers.is_empty() {
        return Err(ConfigError::NoMetaServers { cluster: cluster.to_string() });
    }
    Ok(servers)
}

/// Per-cluster entry in a directory file
#[derive(Debug, Clone, Deserialize)]
struct ClusterEntry {
    meta_servers: String,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    scan_batch_size: Option<u32>,
}

/// Cluster name -> meta server list, loaded from TOML:
///
/// ```toml
/// [clusters.onebox]
/// meta_servers = "127.0.0.1:34601,127.0.0.1:34602"
/// timeout_ms = 1000
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterDirectory {
    #[serde(default)]
    clusters: BTreeMap<String, ClusterEntry>,
}

impl ClusterDirectory {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Cluster names in the directory
    pub fn clusters(&self) -> impl Iterator<Item = &str> {
        self.clusters.keys().map(String::as_str)
    }

    /// Resolve `(cluster, app)` into a client configuration.
    pub fn resolve(&self, cluster_name: &str, app_name: &str) -> Result<ClientConfig, ConfigError> {
        let entry = self
            .clusters
            .get(cluster_name)
            .ok_or_else(|| ConfigError::UnknownCluster(cluster_name.to_string()))?;

        let mut config = ClientConfig::new(cluster_name, app_name, &entry.meta_servers)?;
        if let Some(ms) = entry.timeout_ms {
            config.default_timeout = Duration::from_millis(ms);
        }
        if let Some(batch_size) = entry.scan_batch_size {
            config.scan_batch_size = batch_size;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DIRECTORY: &str = r#"
[clusters.onebox]
meta_servers = "127.0.0.1:34601, 127.0.0.1:34602,"

[clusters.prod]
meta_servers = "10.0.0.1:34601"
timeout_ms = 250
scan_batch_size = 64

[clusters.broken]
meta_servers = "10.0.0.1"

[clusters.empty]
meta_servers = " , "
"#;

    #[test]
    fn test_onebox_valid() {
        let config = ClientConfig::onebox("temp").unwrap();
        assert_eq!(config.meta_servers.len(), 3);
        assert_eq!(config.default_timeout, DEFAULT_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_server_list_fatal() {
        assert!(matches!(ClientConfig::new("c", "app", ""), Err(ConfigError::NoMetaServers { .. })));
    }

    #[test]
    fn test_malformed_address_fatal() {
        let err = ClientConfig::new("c", "app", "127.0.0.1:1,localhost:2").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { address, .. } if address == "localhost:2"));
        assert!(matches!(
            ClientConfig::new("c", "app", "[::1]:34601"),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_empty_app_rejected() {
        assert!(matches!(ClientConfig::new("c", "", "127.0.0.1:1"), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_directory_resolve() {
        let dir = ClusterDirectory::from_toml_str(DIRECTORY).unwrap();
        let onebox = dir.resolve("onebox", "temp").unwrap();
        assert_eq!(onebox.meta_servers.len(), 2);
        assert_eq!(onebox.app_name, "temp");

        let prod = dir.resolve("prod", "users").unwrap();
        assert_eq!(prod.default_timeout, Duration::from_millis(250));
        assert_eq!(prod.scan_batch_size, 64);
    }

    #[test]
    fn test_directory_errors() {
        let dir = ClusterDirectory::from_toml_str(DIRECTORY).unwrap();
        assert!(matches!(dir.resolve("missing", "t"), Err(ConfigError::UnknownCluster(_))));
        assert!(matches!(dir.resolve("broken", "t"), Err(ConfigError::InvalidAddress { .. })));
        assert!(matches!(dir.resolve("empty", "t"), Err(ConfigError::NoMetaServers { .. })));
    }

    #[test]
    fn test_directory_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DIRECTORY.as_bytes()).unwrap();
        let dir = ClusterDirectory::load(file.path()).unwrap();
        assert_eq!(dir.clusters().count(), 4);
    }

    #[test]
    fn test_directory_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let result = ClusterDirectory::load(tmp.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_directory_parse_error() {
        assert!(matches!(ClusterDirectory::from_toml_str("[clusters"), Err(ConfigError::Parse(_))));
    }
}
