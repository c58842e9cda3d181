//! Pluggable signature schemes.
//!
//! Every scheme implements [`SignatureProvider`]. The [`SchemeRegistry`] maps a
//! [`SignatureScheme`] code to its provider so verification can dispatch on the
//! scheme a peer declared.

use std::collections::HashMap;
use std::sync::Arc;

use meridian_types::{AccountAddress, SignatureScheme};

use crate::schnorr::{self, ChallengeHash, SecretKey};
use crate::{blake3, CryptoError, Result};

/// A signature algorithm behind a stable capability interface.
pub trait SignatureProvider: Send + Sync {
    fn scheme(&self) -> SignatureScheme;

    fn sign(&self, secret: &SecretKey, message: &[u8]) -> Result<Vec<u8>>;

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()>;
}

/// Schnorr over Pallas with a SHA3-512 challenge.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchnorrPallasSha3;

/// Schnorr over Pallas with a Poseidon challenge.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchnorrPallasPoseidon;

impl SignatureProvider for SchnorrPallasSha3 {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::SchnorrPallasSha3
    }

    fn sign(&self, secret: &SecretKey, message: &[u8]) -> Result<Vec<u8>> {
        schnorr::sign(secret, message, ChallengeHash::Sha3)
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        schnorr::verify(public_key, message, signature, ChallengeHash::Sha3)
    }
}

impl SignatureProvider for SchnorrPallasPoseidon {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::SchnorrPallasPoseidon
    }

    fn sign(&self, secret: &SecretKey, message: &[u8]) -> Result<Vec<u8>> {
        schnorr::sign(secret, message, ChallengeHash::Poseidon)
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        schnorr::verify(public_key, message, signature, ChallengeHash::Poseidon)
    }
}

/// Providers indexed by scheme.
#[derive(Clone, Default)]
pub struct SchemeRegistry {
    providers: HashMap<SignatureScheme, Arc<dyn SignatureProvider>>,
}

impl SchemeRegistry {
    /// A registry with no schemes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with both Pallas Schnorr schemes.
    pub fn with_default_schemes() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SchnorrPallasSha3));
        registry.register(Arc::new(SchnorrPallasPoseidon));
        registry
    }

    /// Register a provider, replacing any previous provider for its scheme.
    pub fn register(&mut self, provider: Arc<dyn SignatureProvider>) {
        self.providers.insert(provider.scheme(), provider);
    }

    pub fn get(&self, scheme: SignatureScheme) -> Option<Arc<dyn SignatureProvider>> {
        self.providers.get(&scheme).cloned()
    }

    pub fn supports(&self, scheme: SignatureScheme) -> bool {
        self.providers.contains_key(&scheme)
    }
}

impl std::fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<u32> = self.providers.keys().map(SignatureScheme::code).collect();
        schemes.sort_unstable();
        f.debug_struct("SchemeRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

/// Derive an account address from public key bytes.
///
/// `address = BLAKE3::hash(public_key)`
pub fn derive_address(public_key: &[u8]) -> AccountAddress {
    AccountAddress::from_bytes(&blake3::hash(public_key))
}

/// A node's signing identity: scheme, secret, public key and address.
#[derive(Clone, Debug)]
pub struct AccountKeypair {
    scheme: SignatureScheme,
    secret: SecretKey,
    public_key: [u8; schnorr::PUBLIC_KEY_LENGTH],
    address: AccountAddress,
}

impl AccountKeypair {
    /// Generate a fresh keypair for `scheme`.
    pub fn generate(scheme: SignatureScheme) -> Result<Self> {
        Self::from_secret(scheme, SecretKey::generate())
    }

    pub fn from_secret(scheme: SignatureScheme, secret: SecretKey) -> Result<Self> {
        if let SignatureScheme::Unrecognized(code) = scheme {
            return Err(CryptoError::UnsupportedScheme(format!("code {code}")));
        }
        let public_key = secret.public_key().to_bytes();
        let address = derive_address(&public_key);
        Ok(Self {
            scheme,
            secret,
            public_key,
            address,
        })
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_key
    }

    pub fn address(&self) -> AccountAddress {
        self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_dispatch() {
        let registry = SchemeRegistry::with_default_schemes();
        let keypair = AccountKeypair::generate(SignatureScheme::SchnorrPallasPoseidon)
            .expect("keypair");
        let provider = registry.get(keypair.scheme()).expect("provider");
        let sig = provider.sign(keypair.secret(), b"hello").expect("sign");
        provider
            .verify(keypair.public_key_bytes(), b"hello", &sig)
            .expect("verify");
    }

    #[test]
    fn test_unknown_scheme_not_registered() {
        let registry = SchemeRegistry::with_default_schemes();
        assert!(registry.get(SignatureScheme::Unrecognized(99)).is_none());
        assert!(!SchemeRegistry::empty().supports(SignatureScheme::SchnorrPallasSha3));
    }

    #[test]
    fn test_keypair_rejects_unknown_scheme() {
        assert!(AccountKeypair::generate(SignatureScheme::Unrecognized(5)).is_err());
    }

    #[test]
    fn test_address_is_hash_of_public_key() {
        let keypair = AccountKeypair::generate(SignatureScheme::SchnorrPallasSha3).expect("keypair");
        assert_eq!(
            keypair.address(),
            AccountAddress::from_bytes(&blake3::hash(keypair.public_key_bytes()))
        );
    }

    #[test]
    fn test_registry_debug_lists_codes() {
        let registry = SchemeRegistry::with_default_schemes();
        assert_eq!(format!("{registry:?}"), "SchemeRegistry { schemes: [1, 2] }");
    }
}
