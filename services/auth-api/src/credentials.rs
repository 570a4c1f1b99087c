//! Credential verification against a fixed allow-set.
//!
//! Keys are SHA-256 digests over a length-prefixed `(username, secret)`
//! encoding, so no two distinct pairs share a key and no plaintext secret is
//! kept in memory. Membership is checked in constant time over every entry.

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

/// Pairs accepted by the built-in allow-set.
const BUILTIN_CREDENTIALS: &[(&str, &str)] =
    &[("admin", "admin"), ("johnd", "foo"), ("janed", "ddd")];

static BUILTIN: Lazy<AllowedCredentialSet> =
    Lazy::new(|| AllowedCredentialSet::from_pairs(BUILTIN_CREDENTIALS.iter().copied()));

/// Opaque key derived from a username/secret pair.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CredentialKey([u8; 32]);

impl CredentialKey {
    /// Derive the key for a pair.
    #[must_use]
    pub fn derive(username: &str, secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((username.len() as u64).to_be_bytes());
        hasher.update(username.as_bytes());
        hasher.update(secret.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl std::fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialKey(..)")
    }
}

/// Immutable set of allowed credential keys.
#[derive(Debug, Clone, Default)]
pub struct AllowedCredentialSet {
    keys: Vec<CredentialKey>,
}

impl AllowedCredentialSet {
    /// Build a set from username/secret pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut keys: Vec<CredentialKey> = pairs
            .into_iter()
            .map(|(username, secret)| CredentialKey::derive(username, secret))
            .collect();
        keys.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        keys.dedup();
        Self { keys }
    }

    /// The process-wide built-in set.
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Constant-time membership test.
    #[must_use]
    pub fn contains(&self, key: &CredentialKey) -> bool {
        let found = self
            .keys
            .iter()
            .fold(Choice::from(0), |acc, candidate| acc | candidate.0[..].ct_eq(&key.0[..]));
        found.into()
    }

    /// Number of allowed pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set allows nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Checks submitted pairs against an [`AllowedCredentialSet`].
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    allowed: AllowedCredentialSet,
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        Self::new(AllowedCredentialSet::builtin().clone())
    }
}

impl CredentialVerifier {
    /// Verifier over the given set.
    #[must_use]
    pub const fn new(allowed: AllowedCredentialSet) -> Self {
        Self { allowed }
    }

    /// Whether `(username, secret)` is an allowed pair.
    #[must_use]
    pub fn verify(&self, username: &str, secret: &str) -> bool {
        self.allowed
            .contains(&CredentialKey::derive(username, secret))
    }
}
