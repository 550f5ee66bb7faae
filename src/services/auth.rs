//! Access-key login and session tokens

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
};

/// Subject recorded in every session token
const SUBJECT: &str = "inventory";

/// JWT claims of a login session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    /// Unique session id, used for logout
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// Issued session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub claims: SessionClaims,
}

#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    revoked: Arc<Mutex<HashSet<String>>>,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            revoked: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Exchange the shared access key for a session token
    pub fn login(&self, key: &str) -> AppResult<Session> {
        if self.config.access_key.is_empty() {
            tracing::warn!("Login attempted but no access key is configured");
            return Err(AppError::Authentication("Login is disabled".to_string()));
        }
        if !keys_match(key, &self.config.access_key) {
            tracing::warn!("Login rejected: wrong access key");
            return Err(AppError::Authentication("Invalid access key".to_string()));
        }

        let now = Utc::now();
        let claims = SessionClaims {
            sub: SUBJECT.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(self.config.session_days)).timestamp(),
        };
        let token = claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        tracing::info!(session = %claims.jti, "Session opened");
        Ok(Session { token, claims })
    }

    /// Claims of a valid, unexpired and not revoked token
    pub fn verify(&self, token: &str) -> AppResult<SessionClaims> {
        let claims = SessionClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;
        if self.revoked().contains(&claims.jti) {
            return Err(AppError::Authentication("Session has been closed".to_string()));
        }
        Ok(claims)
    }

    pub fn is_authenticated(&self, token: &str) -> bool {
        self.verify(token).is_ok()
    }

    /// Revoke the session; later calls with the same token fail verification
    pub fn logout(&self, claims: &SessionClaims) {
        self.revoked().insert(claims.jti.clone());
        tracing::info!(session = %claims.jti, "Session closed");
    }

    fn revoked(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.revoked.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Compare without short-circuiting on the first differing byte
fn keys_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
