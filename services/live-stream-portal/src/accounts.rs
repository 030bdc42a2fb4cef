//! Password hashing and the validation rules applied when an account is
//! created.
//!
//! Hashes are stored as `pbkdf2_sha256$<iterations>$<salt>$<hash>` with salt
//! and hash hex encoded. The iteration count is read back from the stored
//! value, so raising the configured count only affects new passwords.

use rand::RngCore;
use sha2::Sha256;

const ALGORITHM: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_NAME_LEN: usize = 150;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 8;

const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "12345678",
    "123456789",
    "1234567890",
    "qwerty123",
    "qwertyuiop",
    "iloveyou",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "welcome1",
    "letmein1",
    "trustno1",
    "superman",
    "abc12345",
    "passw0rd",
    "starwars",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Stored password hash is malformed.")]
    MalformedHash,
    #[error("Unsupported password hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

#[derive(Clone, Copy, Debug)]
pub struct PasswordHasher {
    iterations: u32,
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    /// Hash a password with a fresh random salt.
    pub fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        encode(self.iterations, &salt, password)
    }

    /// Check a password against a stored hash.
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool, PasswordError> {
        let mut parts = stored.split('$');
        let (Some(algorithm), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(PasswordError::MalformedHash);
        };
        if algorithm != ALGORITHM {
            return Err(PasswordError::UnsupportedAlgorithm(algorithm.into()));
        }
        let iterations: u32 = iterations
            .parse()
            .map_err(|_| PasswordError::MalformedHash)?;
        let salt = hex::decode(salt).map_err(|_| PasswordError::MalformedHash)?;
        let expected = hex::decode(expected).map_err(|_| PasswordError::MalformedHash)?;
        if expected.len() != HASH_LEN || iterations == 0 {
            return Err(PasswordError::MalformedHash);
        }

        let actual = derive(iterations, &salt, password);
        Ok(constant_time_eq(&actual, &expected))
    }

    /// Burn the same amount of work as a real verification. Used when the
    /// user does not exist so that response times do not reveal it.
    pub fn dummy_verify(&self, password: &str) {
        let _ = derive(self.iterations, &[0u8; SALT_LEN], password);
    }
}

fn derive(iterations: u32, salt: &[u8], password: &str) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

fn encode(iterations: u32, salt: &[u8], password: &str) -> String {
    let hash = derive(iterations, salt, password);
    format!(
        "{ALGORITHM}${iterations}${}${}",
        hex::encode(salt),
        hex::encode(hash)
    )
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Data submitted through the signup form.
#[derive(Debug, Default, Clone, serde::Deserialize, serde::Serialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password1: String,
    #[serde(default, skip_serializing)]
    pub password2: String,
}

impl SignupForm {
    /// Normalise whitespace in the non-password fields.
    pub fn trimmed(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        self.email = self.email.trim().to_string();
        self
    }

    /// Validate everything that can be checked without the database.
    /// Returns the list of user-facing error messages, empty if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(e) = validate_username(&self.username) {
            errors.push(e);
        }
        if self.first_name.chars().count() > MAX_NAME_LEN {
            errors.push(format!(
                "First name may have at most {MAX_NAME_LEN} characters."
            ));
        }
        if self.last_name.chars().count() > MAX_NAME_LEN {
            errors.push(format!(
                "Last name may have at most {MAX_NAME_LEN} characters."
            ));
        }
        if !self.email.is_empty() && !is_valid_email(&self.email) {
            errors.push("Enter a valid email address.".into());
        }
        if self.password1.is_empty() || self.password2.is_empty() {
            errors.push("Both password fields are required.".into());
        } else if self.password1 != self.password2 {
            errors.push("The two password fields didn't match.".into());
        } else {
            errors.extend(validate_password(&self.password1, &self.username));
        }

        errors
    }
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("A username is required.".into());
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(format!(
            "Usernames may have at most {MAX_USERNAME_LEN} characters."
        ));
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_');
    if !username.chars().all(allowed) {
        return Err(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ \
             characters."
                .into(),
        );
    }
    Ok(())
}

/// Password strength rules. Returns every rule that failed.
pub fn validate_password(password: &str, username: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."
        ));
    }
    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        errors.push("This password is too common.".into());
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.push("This password is entirely numeric.".into());
    }
    if username.chars().count() >= 3 && lowered.contains(&username.to_lowercase()) {
        errors.push("The password is too similar to the username.".into());
    }
    errors
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().count() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}
