//! Token issuing for the split-bill services
//!
//! Access and refresh tokens are RS256 JWTs. The api service only holds the
//! public key; this service signs. Revoked refresh tokens are kept in Redis
//! until they would have expired anyway.

use anyhow::Result;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use uuid::Uuid;

use common::cache::RedisPool;

const DEFAULT_ACCESS_TOKEN_EXPIRY: u64 = 900;
const DEFAULT_REFRESH_TOKEN_EXPIRY: u64 = 604_800;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Private key for signing tokens
    pub private_key: String,
    /// Public key for verifying tokens
    pub public_key: String,
    /// Access token lifetime in seconds
    pub access_token_expiry: u64,
    /// Refresh token lifetime in seconds
    pub refresh_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_PRIVATE_KEY`: PEM private key, or a path to one
    /// - `JWT_PUBLIC_KEY`: PEM public key, or a path to one
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: seconds (default: 900)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: seconds (default: 604800)
    pub fn from_env() -> Result<Self> {
        let private_key = read_key("JWT_PRIVATE_KEY")?;
        let public_key = read_key("JWT_PUBLIC_KEY")?;
        let access_token_expiry = expiry_from_env("JWT_ACCESS_TOKEN_EXPIRY", DEFAULT_ACCESS_TOKEN_EXPIRY)?;
        let refresh_token_expiry =
            expiry_from_env("JWT_REFRESH_TOKEN_EXPIRY", DEFAULT_REFRESH_TOKEN_EXPIRY)?;

        Ok(JwtConfig {
            private_key,
            public_key,
            access_token_expiry,
            refresh_token_expiry,
        })
    }
}

/// Reads a PEM key from the variable itself or from the file it names
fn read_key(var: &str) -> Result<String> {
    let value =
        std::env::var(var).map_err(|_| anyhow::anyhow!("{} environment variable not set", var))?;

    if value.starts_with("-----BEGIN") {
        return Ok(value);
    }

    let pem = std::fs::read_to_string(&value)
        .or_else(|_| {
            let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
            path.push(&value);
            std::fs::read_to_string(path)
        })
        .map_err(|e| anyhow::anyhow!("Failed to read {} from {}: {}", var, value, e))?;

    Ok(pem.trim().to_string())
}

fn expiry_from_env(var: &str, default: u64) -> Result<u64> {
    match std::env::var(var) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be a number of seconds, got {:?}", var, raw))?;
            if secs == 0 {
                anyhow::bail!("{} must be greater than zero", var);
            }
            Ok(secs)
        }
        Err(_) => Ok(default),
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
}

impl Claims {
    /// Seconds until the token expires, zero once it has
    pub fn remaining_lifetime(&self) -> Result<u64> {
        Ok(self.exp.saturating_sub(now()?))
    }
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

fn now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
        .as_secs())
}

fn blacklist_key(token: &str) -> String {
    format!("blacklisted_token:{}", token)
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())?;
        let decoding_key = DecodingKey::from_rsa_pem(config.public_key.as_bytes())?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        Ok(JwtService {
            encoding_key,
            decoding_key,
            validation,
            config,
        })
    }

    fn issue(&self, user_id: Uuid, token_type: TokenType, lifetime: u64) -> Result<String> {
        let iat = now()?;
        let claims = Claims {
            sub: user_id,
            iat,
            exp: iat + lifetime,
            token_type,
        };

        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)?)
    }

    /// Generate an access token for a user
    pub fn generate_access_token(&self, user_id: Uuid) -> Result<String> {
        self.issue(user_id, TokenType::Access, self.config.access_token_expiry)
    }

    /// Generate a refresh token for a user
    pub fn generate_refresh_token(&self, user_id: Uuid) -> Result<String> {
        self.issue(user_id, TokenType::Refresh, self.config.refresh_token_expiry)
    }

    /// Validate a token's signature and expiry and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    /// Check if a token is blacklisted in Redis
    pub async fn is_token_blacklisted(&self, redis_pool: &RedisPool, token: &str) -> Result<bool> {
        redis_pool.exists(&blacklist_key(token)).await
    }

    /// Blacklist a token in Redis for `expiry` seconds
    pub async fn blacklist_token(&self, redis_pool: &RedisPool, token: &str, expiry: u64) -> Result<()> {
        redis_pool.set(&blacklist_key(token), "1", Some(expiry)).await
    }

    /// Get the access token expiry time
    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }

    /// Get the refresh token expiry time
    pub fn refresh_token_expiry(&self) -> u64 {
        self.config.refresh_token_expiry
    }

    /// Swap a refresh token for a new one
    ///
    /// The old token is blacklisted for the rest of its lifetime so it cannot
    /// be replayed.
    pub async fn rotate_refresh_token(
        &self,
        redis_pool: &RedisPool,
        user_id: Uuid,
        old_refresh_token: &str,
    ) -> Result<String> {
        let claims = self.validate_token(old_refresh_token)?;

        if claims.token_type != TokenType::Refresh {
            anyhow::bail!("Token is not a refresh token");
        }

        if claims.sub != user_id {
            anyhow::bail!("Token does not belong to user");
        }

        self.blacklist_token(redis_pool, old_refresh_token, claims.remaining_lifetime()?)
            .await?;
        info!("Rotated refresh token for user: {}", user_id);

        self.generate_refresh_token(user_id)
    }
}
