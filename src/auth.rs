//! Login and bearer-token resolution.
//!
//! The first login for a username registers it; later logins must present the
//! same password. Every login issues a fresh token and retires the previous one.

use std::num::NonZeroU32;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

use crate::storage::models::{PasswordHash, User};
use crate::storage::{Database, DatabaseError};

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const TOKEN_LEN: usize = 32;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("No authorization header")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Failed to generate secure random bytes")]
    Crypto,
    #[error("Password hashing task failed: {0}")]
    Hashing(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub server_url: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    fn validate(&self) -> Result<(), AuthError> {
        if !is_valid_server_url(&self.server_url) {
            return Err(AuthError::Validation(
                "Please enter a valid server URL".into(),
            ));
        }
        if self.username.trim().is_empty() {
            return Err(AuthError::Validation("Username is required".into()));
        }
        if self.password.is_empty() {
            return Err(AuthError::Validation("Password is required".into()));
        }
        Ok(())
    }
}

/// Accepts `http(s)://host[...]` with a non-empty host.
fn is_valid_server_url(url: &str) -> bool {
    let rest = match url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
    {
        Some(rest) => rest,
        None => return false,
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = host.rsplit('@').next().unwrap_or("");
    !host.is_empty() && !host.starts_with(':') && !host.contains(char::is_whitespace)
}

pub struct Authenticator {
    db: Database,
    rng: SystemRandom,
}

impl Authenticator {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            rng: SystemRandom::new(),
        }
    }

    /// Verify (or register) a user and issue a new access token.
    ///
    /// Password hashing runs on the blocking pool.
    pub async fn login(&self, credentials: &Credentials) -> Result<(User, String), AuthError> {
        credentials.validate()?;
        let username = credentials.username.trim();

        let (user, registered) = match self.db.get_user_by_username(username)? {
            Some(user) => (user, false),
            None => {
                let user = User {
                    id: uuid::Uuid::new_v4().to_string(),
                    username: username.to_string(),
                    password: self.hash_password(&credentials.password).await?,
                    server_url: credentials.server_url.clone(),
                    access_token: None,
                    created_at: Utc::now(),
                };
                if self.db.create_user(&user)? {
                    tracing::info!(user_id = %user.id, username = %user.username, "Registered user");
                    (user, true)
                } else {
                    // Lost a race with a concurrent first login
                    let existing = self
                        .db
                        .get_user_by_username(username)?
                        .ok_or(AuthError::InvalidCredentials)?;
                    (existing, false)
                }
            }
        };

        if !registered && !verify_password(&user.password, &credentials.password).await? {
            tracing::debug!(username = %user.username, "Rejected login");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.generate_token()?;
        if !self.db.set_user_token(&user.id, &token)? {
            return Err(AuthError::InvalidCredentials);
        }

        let user = User {
            access_token: Some(token.clone()),
            ..user
        };
        Ok((user, token))
    }

    /// Resolve the user holding a bearer token.
    pub fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        self.db
            .get_user_by_token(token)?
            .ok_or(AuthError::InvalidToken)
    }

    async fn hash_password(&self, password: &str) -> Result<PasswordHash, AuthError> {
        let mut salt = vec![0u8; SALT_LEN];
        self.rng.fill(&mut salt).map_err(|_| AuthError::Crypto)?;
        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).ok_or(AuthError::Crypto)?;

        let password = password.to_owned();
        let (salt, hash) = tokio::task::spawn_blocking(move || {
            let mut hash = vec![0u8; HASH_LEN];
            pbkdf2::derive(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &mut hash);
            (salt, hash)
        })
        .await?;

        Ok(PasswordHash {
            iterations: PBKDF2_ITERATIONS,
            salt,
            hash,
        })
    }

    fn generate_token(&self) -> Result<String, AuthError> {
        let mut bytes = [0u8; TOKEN_LEN];
        self.rng.fill(&mut bytes).map_err(|_| AuthError::Crypto)?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

async fn verify_password(stored: &PasswordHash, attempt: &str) -> Result<bool, AuthError> {
    let Some(iterations) = NonZeroU32::new(stored.iterations) else {
        return Ok(false);
    };
    let stored = stored.clone();
    let attempt = attempt.to_owned();
    let matched = tokio::task::spawn_blocking(move || {
        pbkdf2::verify(
            PBKDF2_ALG,
            iterations,
            &stored.salt,
            attempt.as_bytes(),
            &stored.hash,
        )
        .is_ok()
    })
    .await?;
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> Authenticator {
        Authenticator::new(Database::in_memory().unwrap())
    }

    fn credentials(username: &str, password: &str) -> Credentials {
        Credentials {
            server_url: "https://dms.example.com".to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_login_registers_user() {
        let auth = authenticator();
        let (user, token) = auth.login(&credentials("alice", "secret")).await.unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.server_url, "https://dms.example.com");
        assert_eq!(user.access_token.as_deref(), Some(token.as_str()));
        assert_eq!(auth.authenticate(&token).unwrap().id, user.id);
    }

    #[tokio::test]
    async fn test_relogin_rotates_token() {
        let auth = authenticator();
        let (first_user, first) = auth.login(&credentials("alice", "secret")).await.unwrap();
        let (second_user, second) = auth.login(&credentials("alice", "secret")).await.unwrap();

        assert_eq!(first_user.id, second_user.id);
        assert_ne!(first, second);
        assert!(matches!(
            auth.authenticate(&first),
            Err(AuthError::InvalidToken)
        ));
        assert_eq!(auth.authenticate(&second).unwrap().id, first_user.id);
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let auth = authenticator();
        auth.login(&credentials("alice", "secret")).await.unwrap();
        assert!(matches!(
            auth.login(&credentials("alice", "guess")).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_login_keeps_runtime_responsive() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use std::time::{Duration, Instant};

        let auth = authenticator();
        let done = Arc::new(AtomicBool::new(false));
        let ticker = tokio::spawn({
            let done = Arc::clone(&done);
            async move {
                let mut worst = Duration::ZERO;
                let mut last = Instant::now();
                while !done.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    let now = Instant::now();
                    worst = worst.max(now - last);
                    last = now;
                }
                worst
            }
        });
        tokio::task::yield_now().await;

        let started = Instant::now();
        auth.login(&credentials("alice", "secret")).await.unwrap();
        auth.login(&credentials("alice", "secret")).await.unwrap();
        let elapsed = started.elapsed();

        done.store(true, Ordering::SeqCst);
        let worst_gap = ticker.await.unwrap();
        assert!(
            worst_gap * 2 < elapsed,
            "ticker stalled for {worst_gap:?} during {elapsed:?} of logins"
        );
    }

    #[test]
    fn test_unknown_token_rejected() {
        let auth = authenticator();
        assert!(matches!(
            auth.authenticate("not-a-token"),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(auth.authenticate(""), Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_login_validation_messages() {
        let auth = authenticator();

        let mut bad_url = credentials("alice", "secret");
        bad_url.server_url = "dms.example.com".to_string();
        let err = auth.login(&bad_url).await.unwrap_err();
        assert_eq!(err.to_string(), "Please enter a valid server URL");

        let err = auth.login(&credentials("  ", "secret")).await.unwrap_err();
        assert_eq!(err.to_string(), "Username is required");

        let err = auth.login(&credentials("alice", "")).await.unwrap_err();
        assert_eq!(err.to_string(), "Password is required");
    }

    #[test]
    fn test_server_url_validation() {
        assert!(is_valid_server_url("https://dms.example.com"));
        assert!(is_valid_server_url("http://localhost:8080/api"));
        assert!(!is_valid_server_url("https://"));
        assert!(!is_valid_server_url("ftp://dms.example.com"));
        assert!(!is_valid_server_url("https://:443"));
    }

    #[test]
    fn test_tokens_are_url_safe() {
        let auth = authenticator();
        let token = auth.generate_token().unwrap();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
