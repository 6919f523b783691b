//! Credential generation

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;

#[cfg(test)]
use mockall::automock;

/// Number of random bytes in a generated credential (256 bits)
pub const SECRET_BYTES: usize = 32;

/// Source of new credential values
#[cfg_attr(test, automock)]
pub trait SecretGenerator: Send + Sync {
    /// Produce a fresh, cryptographically strong secret string
    fn random_secret(&self) -> String;
}

/// Generator drawing from the operating system CSPRNG
#[derive(Clone, Copy, Debug, Default)]
pub struct OsSecretGenerator;

impl SecretGenerator for OsSecretGenerator {
    fn random_secret(&self) -> String {
        let mut raw = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut raw);
        URL_SAFE_NO_PAD.encode(raw)
    }
}
