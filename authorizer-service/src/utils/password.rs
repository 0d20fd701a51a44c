use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Plaintext password. `Debug` never prints the value.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Hash a password using Argon2
///
/// Uses Argon2id variant with secure default parameters.
/// Salt is automatically generated and included in the hash.
pub fn hash_password(password: &Password) -> Result<String, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a PHC-format hash in constant time.
pub fn verify_password(password: &Password, password_hash: &str) -> Result<(), anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .map_err(|_| anyhow::anyhow!("Password verification failed"))
}

/// Opaque password check consumed by the login flow.
pub trait CredentialVerifier: Send + Sync {
    /// True only when `plaintext` matches `hash`. Malformed hashes never match.
    fn verify(&self, hash: &str, plaintext: &str) -> bool;

    fn hash(&self, plaintext: &str) -> Result<String, anyhow::Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Credentials;

impl CredentialVerifier for Argon2Credentials {
    fn verify(&self, hash: &str, plaintext: &str) -> bool {
        verify_password(&Password::new(plaintext.to_string()), hash).is_ok()
    }

    fn hash(&self, plaintext: &str) -> Result<String, anyhow::Error> {
        hash_password(&Password::new(plaintext.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn test_verify_password_correct_and_incorrect() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(verify_password(&password, &hash).is_ok());
        assert!(verify_password(&Password::new("wrongPassword".to_string()), &hash).is_err());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash1 = hash_password(&password).expect("Failed to hash password");
        let hash2 = hash_password(&password).expect("Failed to hash password");

        // Random salt per hash
        assert_ne!(hash1, hash2);
        assert!(verify_password(&password, &hash1).is_ok());
        assert!(verify_password(&password, &hash2).is_ok());
    }

    #[test]
    fn test_argon2_credentials() {
        let credentials = Argon2Credentials;
        let hash = credentials.hash("correct horse").unwrap();

        assert!(credentials.verify(&hash, "correct horse"));
        assert!(!credentials.verify(&hash, "battery staple"));
        assert!(!credentials.verify("not-a-phc-string", "correct horse"));
    }

    #[test]
    fn test_debug_is_redacted() {
        let password = Password::new("hunter2".to_string());
        assert_eq!(format!("{:?}", password), "Password(***)");
    }
}
