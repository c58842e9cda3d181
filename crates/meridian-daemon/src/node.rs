//! Node key material and self-description.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use tracing::info;
use zeroize::Zeroizing;

use meridian_crypto::provider::AccountKeypair;
use meridian_crypto::schnorr::{SecretKey, SECRET_KEY_LENGTH};
use meridian_types::{NodeIdentity, Ports, PROTOCOL_VERSION};

use crate::config::DaemonConfig;

/// Load the node key from `path`, generating and writing one if absent.
///
/// The file holds the secret key as hex on a single line.
pub fn load_or_generate_keypair(path: &Path, config: &DaemonConfig) -> anyhow::Result<AccountKeypair> {
    let scheme = config.identity.signature_scheme()?;

    if path.exists() {
        let text = Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("reading key file {}", path.display()))?,
        );
        let raw = Zeroizing::new(hex::decode(text.trim()).context("key file is not hex")?);
        let bytes: &[u8; SECRET_KEY_LENGTH] = raw
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("key file holds {} bytes, expected {SECRET_KEY_LENGTH}", raw.len()))?;
        let keypair = AccountKeypair::from_secret(scheme, SecretKey::from_bytes(bytes)?)?;
        info!(address = %keypair.address(), "loaded node key");
        return Ok(keypair);
    }

    let keypair = AccountKeypair::generate(scheme)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let encoded = Zeroizing::new(hex::encode(keypair.secret().to_bytes()));
    write_secret_file(path, encoded.as_bytes())
        .with_context(|| format!("writing key file {}", path.display()))?;
    info!(address = %keypair.address(), path = %path.display(), "generated node key");
    Ok(keypair)
}

/// Create `path` readable by the owner only and write `contents`.
///
/// The mode is set when the file is created, so the secret is never visible
/// to other users. An existing file is not overwritten.
fn write_secret_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// This node's identity as configured. The timestamp is refreshed on every
/// signature.
pub fn node_identity(config: &DaemonConfig, keypair: &AccountKeypair) -> anyhow::Result<NodeIdentity> {
    Ok(NodeIdentity {
        protocol_version: PROTOCOL_VERSION,
        account_address: keypair.address(),
        geo_location: config.identity.geo_location()?,
        network_address: config.identity.network_address.clone(),
        ports: Ports {
            p2p: config.identity.p2p_port,
            rpc: config.identity.rpc_port,
        },
        timestamp: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("meridian-node-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_key_generated_then_reloaded() {
        let path = temp_path("reload.key");
        let _ = std::fs::remove_file(&path);
        let config = DaemonConfig::default();

        let first = load_or_generate_keypair(&path, &config).expect("generate");
        let second = load_or_generate_keypair(&path, &config).expect("reload");
        assert_eq!(first.address(), second.address());

        std::fs::remove_file(&path).expect("cleanup");
    }

    #[cfg(unix)]
    #[test]
    fn test_generated_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_path("mode.key");
        let _ = std::fs::remove_file(&path);
        load_or_generate_keypair(&path, &DaemonConfig::default()).expect("generate");

        let perms = std::fs::metadata(&path).expect("metadata").permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
        std::fs::remove_file(&path).expect("cleanup");
    }

    #[test]
    fn test_secret_file_never_overwritten() {
        let path = temp_path("existing.key");
        std::fs::write(&path, "keep").expect("write");
        assert!(write_secret_file(&path, b"replace").is_err());
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "keep");
        std::fs::remove_file(&path).expect("cleanup");
    }

    #[test]
    fn test_bad_key_file_rejected() {
        let path = temp_path("bad.key");
        std::fs::write(&path, "abcd").expect("write");
        assert!(load_or_generate_keypair(&path, &DaemonConfig::default()).is_err());
        std::fs::remove_file(&path).expect("cleanup");
    }

    #[test]
    fn test_identity_from_config() {
        let mut config = DaemonConfig::default();
        config.identity.lat_minutes = 300;
        config.identity.lon_minutes = 900;
        let keypair = AccountKeypair::generate(meridian_types::SignatureScheme::SchnorrPallasSha3)
            .expect("keypair");
        let identity = node_identity(&config, &keypair).expect("identity");
        assert_eq!(identity.account_address, keypair.address());
        assert_eq!(identity.geo_location.lat_minutes, 300);
        assert_eq!(identity.ports.rpc, 7401);
    }
}
