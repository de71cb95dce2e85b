//! Session credentials: join codes and salted password hashes rotated on every open.

use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

use crate::dao::models::SessionCredentials;

/// Characters of a join code; ambiguous glyphs are left out.
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const JOIN_CODE_LEN: usize = 6;
const PASSWORD_LEN: usize = 8;
const SALT_BYTES: usize = 16;

/// Plain-text credentials handed to the moderator once, with their stored form.
pub struct IssuedCredentials {
    /// Join code shared by every participant.
    pub join_code: String,
    /// Password for seated players.
    pub contestant_password: String,
    /// Password for displays and spectators.
    pub observer_password: String,
    /// Salted form persisted on the session.
    pub stored: SessionCredentials,
}

/// Generate a fresh join code, passwords and salt.
pub fn issue() -> IssuedCredentials {
    let mut rng = rand::rng();

    let join_code: String = (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect();
    let mut password = || -> String {
        (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LEN)
            .map(char::from)
            .collect()
    };
    let contestant_password = password();
    let observer_password = password();

    let salt_bytes: [u8; SALT_BYTES] = rng.random();
    let salt = hex::encode(salt_bytes);

    let stored = SessionCredentials {
        join_code: join_code.clone(),
        contestant_password_hash: hash_password(&salt, &contestant_password),
        observer_password_hash: hash_password(&salt, &observer_password),
        salt,
    };

    IssuedCredentials {
        join_code,
        contestant_password,
        observer_password,
        stored,
    }
}

/// Hex SHA-256 of `salt:password`.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `password` hashes to `expected` under `salt`.
pub fn verify_password(salt: &str, password: &str, expected: &str) -> bool {
    hash_password(salt, password) == expected
}

/// Whether a submitted join code matches, ignoring case and surrounding spaces.
pub fn join_code_matches(stored: &SessionCredentials, submitted: &str) -> bool {
    stored.join_code.eq_ignore_ascii_case(submitted.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_passwords_verify_against_their_own_hash_only() {
        let issued = issue();
        let stored = &issued.stored;

        assert_eq!(issued.join_code.len(), JOIN_CODE_LEN);
        assert!(verify_password(
            &stored.salt,
            &issued.contestant_password,
            &stored.contestant_password_hash
        ));
        assert!(!verify_password(
            &stored.salt,
            &issued.contestant_password,
            &stored.observer_password_hash
        ));
        assert!(!stored.contestant_password_hash.contains(&issued.contestant_password));
    }

    #[test]
    fn rotation_changes_everything() {
        let first = issue();
        let second = issue();
        assert_ne!(first.stored.salt, second.stored.salt);
        assert_ne!(
            first.stored.contestant_password_hash,
            second.stored.contestant_password_hash
        );
    }

    #[test]
    fn join_code_comparison_is_lenient() {
        let issued = issue();
        let lower = format!(" {} ", issued.join_code.to_lowercase());
        assert!(join_code_matches(&issued.stored, &lower));
    }
}
