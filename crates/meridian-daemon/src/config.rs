//! Configuration file management.
//!
//! `config.toml` lives in the data directory. Every field has a default, so a
//! missing file or a partial one is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use meridian_negotiation::NegotiationConfig;
use meridian_types::{AccountAddress, GeoLocation, SignatureScheme};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "MERIDIAN_DATA_DIR";

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub negotiation: NegotiationSettings,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Socket this node serves RPC on. Empty = $data_dir/meridian.sock.
    #[serde(default)]
    pub listen_socket: String,
    /// Socket of an existing member to join through. Empty = start a new
    /// network with this node as its only member.
    #[serde(default)]
    pub seed_socket: String,
    /// Concurrent RPC connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Longest accepted request or frame line, in bytes.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

/// Identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Hex secret key file. Empty = $data_dir/node.key. Generated if absent.
    #[serde(default)]
    pub key_file: String,
    /// "schnorr_pallas_sha3" | "schnorr_pallas_poseidon".
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Latitude in arc-minutes, [-5400, 5400].
    #[serde(default)]
    pub lat_minutes: i32,
    /// Longitude in arc-minutes, [0, 10800].
    #[serde(default)]
    pub lon_minutes: i32,
    /// Address peers reach this node at.
    #[serde(default = "default_network_address")]
    pub network_address: String,
    #[serde(default = "default_p2p_port")]
    pub p2p_port: u16,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
}

/// Negotiation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationSettings {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_round_timeout")]
    pub round_timeout_secs: u64,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
    /// Stake a joiner must hold.
    #[serde(default)]
    pub min_stake: u64,
    #[serde(default = "default_max_clock_skew")]
    pub max_clock_skew_secs: u64,
}

/// Genesis ledger state and mempool limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    /// Pooled transactions held before new ones are refused.
    #[serde(default = "default_mempool_capacity")]
    pub mempool_capacity: usize,
}

/// One genesis account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// 64 hex characters.
    pub address: String,
    #[serde(default)]
    pub balance: u64,
    #[serde(default)]
    pub stake: u64,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

// Default value functions

fn default_max_connections() -> usize {
    64
}

fn default_max_line_bytes() -> usize {
    1024 * 1024
}

fn default_mempool_capacity() -> usize {
    10_000
}

fn default_scheme() -> String {
    "schnorr_pallas_sha3".to_string()
}

fn default_network_address() -> String {
    "127.0.0.1".to_string()
}

fn default_p2p_port() -> u16 {
    7400
}

fn default_rpc_port() -> u16 {
    7401
}

fn default_max_rounds() -> u32 {
    meridian_negotiation::DEFAULT_MAX_ROUNDS
}

fn default_round_timeout() -> u64 {
    10
}

fn default_session_timeout() -> u64 {
    60
}

fn default_max_clock_skew() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_socket: String::new(),
            seed_socket: String::new(),
            max_connections: default_max_connections(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            key_file: String::new(),
            scheme: default_scheme(),
            lat_minutes: 0,
            lon_minutes: 0,
            network_address: default_network_address(),
            p2p_port: default_p2p_port(),
            rpc_port: default_rpc_port(),
        }
    }
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            round_timeout_secs: default_round_timeout(),
            session_timeout_secs: default_session_timeout(),
            min_stake: 0,
            max_clock_skew_secs: default_max_clock_skew(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            allocations: Vec::new(),
            mempool_capacity: default_mempool_capacity(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: String::new(),
        }
    }
}

impl NegotiationSettings {
    pub fn to_config(&self) -> NegotiationConfig {
        NegotiationConfig {
            max_rounds: self.max_rounds,
            round_timeout: Duration::from_secs(self.round_timeout_secs),
            session_timeout: Duration::from_secs(self.session_timeout_secs),
            min_stake: self.min_stake,
            max_clock_skew: Duration::from_secs(self.max_clock_skew_secs),
        }
    }
}

impl IdentityConfig {
    pub fn signature_scheme(&self) -> anyhow::Result<SignatureScheme> {
        match self.scheme.as_str() {
            "schnorr_pallas_sha3" => Ok(SignatureScheme::SchnorrPallasSha3),
            "schnorr_pallas_poseidon" => Ok(SignatureScheme::SchnorrPallasPoseidon),
            other => anyhow::bail!("unknown signature scheme '{other}'"),
        }
    }

    pub fn geo_location(&self) -> anyhow::Result<GeoLocation> {
        Ok(GeoLocation::new(self.lat_minutes, self.lon_minutes)?)
    }
}

impl Allocation {
    pub fn account(&self) -> anyhow::Result<AccountAddress> {
        Ok(AccountAddress::from_hex(&self.address)?)
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.advanced.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.advanced.data_dir)
        }
    }

    pub fn listen_socket(&self) -> PathBuf {
        if self.network.listen_socket.is_empty() {
            self.data_dir().join("meridian.sock")
        } else {
            PathBuf::from(&self.network.listen_socket)
        }
    }

    pub fn seed_socket(&self) -> Option<PathBuf> {
        (!self.network.seed_socket.is_empty()).then(|| PathBuf::from(&self.network.seed_socket))
    }

    pub fn key_file(&self) -> PathBuf {
        if self.identity.key_file.is_empty() {
            self.data_dir().join("node.key")
        } else {
            PathBuf::from(&self.identity.key_file)
        }
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Meridian")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".meridian")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/meridian"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert!(config.seed_socket().is_none());
        assert_eq!(config.identity.scheme, "schnorr_pallas_sha3");
        assert_eq!(config.negotiation.max_rounds, 64);
        assert_eq!(config.advanced.log_level, "info");
        assert_eq!(config.negotiation.to_config(), NegotiationConfig::default());
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let _parsed: DaemonConfig = toml::from_str(&toml_str).expect("parse");
    }

    #[test]
    fn test_partial_file() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [network]
            seed_socket = "/run/seed.sock"

            [identity]
            lat_minutes = -120
            lon_minutes = 600

            [negotiation]
            min_stake = 10

            [[ledger.allocations]]
            address = "0101010101010101010101010101010101010101010101010101010101010101"
            balance = 1000
            stake = 50
            "#,
        )
        .expect("parse");

        assert_eq!(config.seed_socket(), Some(PathBuf::from("/run/seed.sock")));
        assert_eq!(config.negotiation.min_stake, 10);
        assert_eq!(config.negotiation.round_timeout_secs, 10);
        assert_eq!(config.ledger.mempool_capacity, 10_000);
        assert_eq!(config.network.max_line_bytes, 1024 * 1024);
        assert_eq!(config.identity.geo_location().expect("geo").lon_minutes, 600);
        let account = config.ledger.allocations[0].account().expect("address");
        assert_eq!(account, AccountAddress::from_bytes(&[1; 32]));
    }

    #[test]
    fn test_scheme_names() {
        let mut identity = IdentityConfig::default();
        assert_eq!(identity.signature_scheme().expect("sha3"), SignatureScheme::SchnorrPallasSha3);
        identity.scheme = "schnorr_pallas_poseidon".to_string();
        assert_eq!(
            identity.signature_scheme().expect("poseidon"),
            SignatureScheme::SchnorrPallasPoseidon
        );
        identity.scheme = "ed25519".to_string();
        assert!(identity.signature_scheme().is_err());
    }

    #[test]
    fn test_invalid_location_rejected() {
        let identity = IdentityConfig {
            lat_minutes: 6000,
            ..IdentityConfig::default()
        };
        assert!(identity.geo_location().is_err());
    }
}
