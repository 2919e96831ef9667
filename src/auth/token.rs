use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

use crate::error::{Error, Result};

const ARGON2_MEMORY: u32 = 64 * 1024; // 64KB
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "studytrack";
const LOOKUP_LENGTH: usize = 8;
const SECRET_BYTES: usize = 16;
const SECRET_LENGTH: usize = SECRET_BYTES * 2;

/// Issues session tokens and hashes secrets (tokens and passwords) with
/// Argon2id.
pub struct TokenGenerator {
    argon2: Argon2<'static>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .expect("invalid argon2 params");

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Generates a session token `studytrack_<lookup>_<secret>`.
    /// Returns (raw_token, lookup, hash)
    pub fn generate(&self) -> Result<(String, String, String)> {
        let lookup = generate_lookup();
        let secret = generate_secret();
        let raw_token = format!("{TOKEN_PREFIX}_{lookup}_{secret}");
        let hash = self.hash(&raw_token)?;
        Ok((raw_token, lookup, hash))
    }

    /// Hashes a secret into PHC string format.
    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("failed to hash secret: {e}")))?;
        Ok(hash.to_string())
    }

    /// Checks a secret against a stored hash. Hashes from other schemes
    /// (imported legacy credentials) never verify.
    pub fn verify(&self, secret: &str, hash: &str) -> Result<bool> {
        if !hash.starts_with("$argon2") {
            tracing::warn!("Stored credential uses an unsupported hash scheme; a reset is required");
            return Ok(false);
        }

        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::corrupt("credential store", format!("invalid hash: {e}")))?;

        match self.argon2.verify_password(secret.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify secret: {e}"))),
        }
    }
}

fn generate_lookup() -> String {
    let uuid = uuid::Uuid::new_v4();
    uuid.simple().to_string()[..LOOKUP_LENGTH].to_string()
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Splits a raw token into (lookup, secret).
pub fn parse_token(token: &str) -> Result<(String, String)> {
    let rest = token
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or(Error::InvalidTokenFormat)?;

    let (lookup, secret) = rest.split_once('_').ok_or(Error::InvalidTokenFormat)?;

    let is_hex = |s: &str| s.chars().all(|c| c.is_ascii_hexdigit());
    if lookup.len() != LOOKUP_LENGTH
        || secret.len() != SECRET_LENGTH
        || !is_hex(lookup)
        || !is_hex(secret)
    {
        return Err(Error::InvalidTokenFormat);
    }

    Ok((lookup.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation_format() {
        let generator = TokenGenerator::new();
        let (token, lookup, _hash) = generator.generate().unwrap();

        let parts: Vec<&str> = token.split('_').collect();
        assert_eq!(parts, vec!["studytrack", lookup.as_str(), parts[2]]);
        assert_eq!(lookup.len(), 8);
        assert_eq!(parts[2].len(), 32);
    }

    #[test]
    fn test_generated_token_parses_and_verifies() {
        let generator = TokenGenerator::new();
        let (token, lookup, hash) = generator.generate().unwrap();

        let (parsed_lookup, _) = parse_token(&token).unwrap();
        assert_eq!(parsed_lookup, lookup);
        assert!(generator.verify(&token, &hash).unwrap());
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_password_verification() {
        let generator = TokenGenerator::new();
        let hash = generator.hash("correct horse").unwrap();

        assert!(generator.verify("correct horse", &hash).unwrap());
        assert!(!generator.verify("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_parse_token_rejects_malformed() {
        for token in [
            "",
            "studytrack_1234abcd",
            "session_1234abcd_0123456789abcdef0123456789abcdef",
            "studytrack_1234abcd_0123",
            "studytrack_1234abcz_0123456789abcdef0123456789abcdef",
        ] {
            assert!(
                matches!(parse_token(token), Err(Error::InvalidTokenFormat)),
                "accepted {token:?}"
            );
        }
    }

    #[test]
    fn test_foreign_hash_scheme_never_verifies() {
        let generator = TokenGenerator::new();
        let bcrypt = "$2y$10$abcdefghijklmnopqrstuuJ0Wq3g3b5Dk3Ff8pJ3aY3p5oZ6w0fS";
        assert!(!generator.verify("secret", bcrypt).unwrap());
    }
}
