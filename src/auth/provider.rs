//! Authentication provider contract and its local implementation.
//!
//! [`LocalAuth`] keeps accounts in memory with Argon2 password hashes and
//! issues HS256-signed session tokens. Each token carries a `jti` so sign-out
//! and refresh can revoke it before it expires. A refreshed token stays valid
//! for a short grace period so requests already in flight with it still pass.

use crate::error::{DashboardError, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// An authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

/// A resolved session: who it belongs to and when it lapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: AuthUser,
    pub expires_at: DateTime<Utc>,
}

/// Sign-in, sign-up and session resolution.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Check credentials and open a new session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Register an account. The caller signs in separately.
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser>;

    /// Revoke a session token.
    async fn sign_out(&self, token: &str) -> Result<()>;

    /// Resolve a session token into its user.
    async fn get_user(&self, token: &str) -> Result<Session>;

    /// Exchange a valid token for a fresh one; the old token is revoked once
    /// the refresh grace period ends.
    async fn refresh(&self, token: &str) -> Result<Session>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    jti: String,
    iat: i64,
    exp: i64,
}

/// How long a refreshed token keeps working, in seconds.
pub const REFRESH_GRACE_SECS: i64 = 30;

#[derive(Debug, Clone, Copy)]
struct Revocation {
    /// Rejected from this instant on
    not_after: i64,
    /// Token expiry, after which the entry can be forgotten
    exp: i64,
}

struct Account {
    id: Uuid,
    email: String,
    password_hash: String,
}

/// In-process accounts with hashed passwords and signed tokens.
pub struct LocalAuth {
    accounts: RwLock<HashMap<String, Account>>,
    revoked: RwLock<HashMap<String, Revocation>>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    refresh_grace: Duration,
    hasher: Argon2<'static>,
}

impl LocalAuth {
    /// Create a provider signing tokens with `secret`, valid for `ttl`.
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;
        Self {
            accounts: RwLock::new(HashMap::new()),
            revoked: RwLock::new(HashMap::new()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            refresh_grace: Duration::seconds(REFRESH_GRACE_SECS),
            hasher: Argon2::default(),
        }
    }

    /// Use explicit Argon2id cost parameters (memory KiB, iterations, lanes).
    pub fn with_hash_params(mut self, m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| DashboardError::PasswordHash(e.to_string()))?;
        self.hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        Ok(self)
    }

    /// How long a token keeps working after it was refreshed.
    pub fn with_refresh_grace(mut self, grace: Duration) -> Self {
        self.refresh_grace = grace.max(Duration::zero());
        self
    }

    /// Number of registered accounts.
    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    fn issue(&self, user: AuthUser) -> Result<Session> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(Session {
            token,
            user,
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or(expires_at),
        })
    }

    async fn verify(&self, token: &str) -> Result<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims;
        let now = Utc::now().timestamp();
        match self.revoked.read().await.get(&claims.jti) {
            Some(revocation) if now >= revocation.not_after => Err(DashboardError::Unauthenticated),
            _ => Ok(claims),
        }
    }

    /// Reject `claims` from `not_after` on. An earlier revocation wins.
    async fn revoke(&self, claims: &Claims, not_after: i64) {
        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.write().await;
        revoked.retain(|_, revocation| revocation.exp >= now);
        revoked
            .entry(claims.jti.clone())
            .and_modify(|revocation| revocation.not_after = revocation.not_after.min(not_after))
            .or_insert(Revocation {
                not_after,
                exp: claims.exp,
            });
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let email = normalize_email(email);
        let (user, password_hash) = {
            let accounts = self.accounts.read().await;
            let account = accounts
                .get(&email)
                .ok_or(DashboardError::InvalidCredentials)?;
            (
                AuthUser {
                    id: account.id,
                    email: account.email.clone(),
                },
                account.password_hash.clone(),
            )
        };

        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let matches = tokio::task::spawn_blocking(move || -> Result<bool> {
            let parsed = PasswordHash::new(&password_hash)
                .map_err(|e| DashboardError::PasswordHash(e.to_string()))?;
            Ok(hasher.verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await
        .map_err(|e| DashboardError::PasswordHash(e.to_string()))??;

        if !matches {
            debug!("Password mismatch for {}", email);
            return Err(DashboardError::InvalidCredentials);
        }

        info!("User {} signed in", user.id);
        self.issue(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser> {
        let email = normalize_email(email);
        if self.accounts.read().await.contains_key(&email) {
            return Err(DashboardError::conflict("User already registered"));
        }

        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || -> Result<String> {
            let salt = SaltString::generate(&mut OsRng);
            hasher
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| DashboardError::PasswordHash(e.to_string()))
        })
        .await
        .map_err(|e| DashboardError::PasswordHash(e.to_string()))??;

        let mut accounts = self.accounts.write().await;
        // Re-check: another sign-up may have finished while hashing.
        if accounts.contains_key(&email) {
            return Err(DashboardError::conflict("User already registered"));
        }
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: email.clone(),
        };
        accounts.insert(
            email,
            Account {
                id: user.id,
                email: user.email.clone(),
                password_hash,
            },
        );
        info!("Registered user {}", user.id);
        Ok(user)
    }

    async fn sign_out(&self, token: &str) -> Result<()> {
        let claims = self.verify(token).await?;
        self.revoke(&claims, Utc::now().timestamp()).await;
        info!("User {} signed out", claims.sub);
        Ok(())
    }

    async fn get_user(&self, token: &str) -> Result<Session> {
        let claims = self.verify(token).await?;
        let id = Uuid::parse_str(&claims.sub).map_err(|_| DashboardError::Unauthenticated)?;
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(&claims.email)
            .filter(|account| account.id == id)
            .ok_or(DashboardError::Unauthenticated)?;

        Ok(Session {
            token: token.to_string(),
            user: AuthUser {
                id: account.id,
                email: account.email.clone(),
            },
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .ok_or(DashboardError::Unauthenticated)?,
        })
    }

    async fn refresh(&self, token: &str) -> Result<Session> {
        let current = self.get_user(token).await?;
        let claims = self.verify(token).await?;
        let grace_ends = (Utc::now() + self.refresh_grace).timestamp();
        self.revoke(&claims, grace_ends).await;
        debug!("Refreshed session for user {}", current.user.id);
        self.issue(current.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> LocalAuth {
        LocalAuth::new("test-secret", Duration::hours(1))
            .with_hash_params(8, 1, 1)
            .unwrap()
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let auth = provider();
        let user = auth.sign_up("Ana@Farm.ph", "secret1").await.unwrap();
        assert_eq!(user.email, "ana@farm.ph");

        let session = auth.sign_in("ana@farm.ph", "secret1").await.unwrap();
        assert_eq!(session.user, user);
        assert!(session.expires_at > Utc::now());

        let resolved = auth.get_user(&session.token).await.unwrap();
        assert_eq!(resolved.user.id, user.id);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user() {
        let auth = provider();
        auth.sign_up("ana@farm.ph", "secret1").await.unwrap();
        assert!(matches!(
            auth.sign_in("ana@farm.ph", "nope").await,
            Err(DashboardError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_in("ben@farm.ph", "secret1").await,
            Err(DashboardError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_is_conflict() {
        let auth = provider();
        auth.sign_up("ana@farm.ph", "secret1").await.unwrap();
        let err = auth.sign_up(" ANA@farm.ph", "other12").await.unwrap_err();
        assert!(matches!(err, DashboardError::Conflict(_)));
        assert_eq!(auth.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_sign_out_revokes_token() {
        let auth = provider();
        auth.sign_up("ana@farm.ph", "secret1").await.unwrap();
        let session = auth.sign_in("ana@farm.ph", "secret1").await.unwrap();
        auth.sign_out(&session.token).await.unwrap();
        assert!(auth.get_user(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let auth = provider();
        auth.sign_up("ana@farm.ph", "secret1").await.unwrap();
        let session = auth.sign_in("ana@farm.ph", "secret1").await.unwrap();
        let refreshed = auth.refresh(&session.token).await.unwrap();
        assert_ne!(refreshed.token, session.token);
        assert!(auth.get_user(&refreshed.token).await.is_ok());
        // Requests still carrying the old token pass during the grace period
        assert!(auth.get_user(&session.token).await.is_ok());

        let again = auth.refresh(&session.token).await.unwrap();
        assert!(auth.get_user(&again.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refreshed_token_rejected_after_grace() {
        let auth = provider().with_refresh_grace(Duration::zero());
        auth.sign_up("ana@farm.ph", "secret1").await.unwrap();
        let session = auth.sign_in("ana@farm.ph", "secret1").await.unwrap();
        let refreshed = auth.refresh(&session.token).await.unwrap();
        assert!(auth.get_user(&refreshed.token).await.is_ok());
        assert!(auth.get_user(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_sign_out_ends_grace_period() {
        let auth = provider();
        auth.sign_up("ana@farm.ph", "secret1").await.unwrap();
        let session = auth.sign_in("ana@farm.ph", "secret1").await.unwrap();
        auth.refresh(&session.token).await.unwrap();
        auth.sign_out(&session.token).await.unwrap();
        assert!(auth.get_user(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_foreign_and_expired_tokens_are_rejected() {
        let auth = provider();
        auth.sign_up("ana@farm.ph", "secret1").await.unwrap();
        let other = LocalAuth::new("other-secret", Duration::hours(1))
            .with_hash_params(8, 1, 1)
            .unwrap();
        other.sign_up("ana@farm.ph", "secret1").await.unwrap();
        let foreign = other.sign_in("ana@farm.ph", "secret1").await.unwrap();
        assert!(matches!(
            auth.get_user(&foreign.token).await,
            Err(DashboardError::Token(_))
        ));

        let expired = LocalAuth::new("test-secret", Duration::seconds(-10))
            .with_hash_params(8, 1, 1)
            .unwrap();
        expired.sign_up("ana@farm.ph", "secret1").await.unwrap();
        let session = expired.sign_in("ana@farm.ph", "secret1").await.unwrap();
        assert!(expired.get_user(&session.token).await.is_err());
        assert!(auth.get_user("not-a-token").await.is_err());
    }
}
