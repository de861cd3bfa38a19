//! Refresh-token sessions in Redis
//!
//! One live refresh token per user. Logging in elsewhere replaces it.

use anyhow::Result;
use tracing::info;
use uuid::Uuid;

use common::cache::RedisPool;

fn session_key(user_id: Uuid) -> String {
    format!("session:{}", user_id)
}

/// Session manager for handling user sessions in Redis
#[derive(Clone)]
pub struct SessionManager {
    redis_pool: RedisPool,
    ttl_seconds: u64,
}

impl SessionManager {
    /// Sessions live as long as the refresh token they hold
    pub fn new(redis_pool: RedisPool, ttl_seconds: u64) -> Self {
        Self {
            redis_pool,
            ttl_seconds,
        }
    }

    /// Store `refresh_token` as the user's current session
    pub async fn store(&self, user_id: Uuid, refresh_token: &str) -> Result<()> {
        info!("Storing session for user: {}", user_id);
        self.redis_pool
            .set(&session_key(user_id), refresh_token, Some(self.ttl_seconds))
            .await
    }

    /// Delete a session for a user
    pub async fn delete(&self, user_id: Uuid) -> Result<()> {
        info!("Deleting session for user: {}", user_id);
        self.redis_pool.delete(&session_key(user_id)).await
    }

    /// Whether `refresh_token` is the user's current session
    pub async fn is_valid(&self, user_id: Uuid, refresh_token: &str) -> Result<bool> {
        let stored = self.redis_pool.get(&session_key(user_id)).await?;
        Ok(stored.as_deref() == Some(refresh_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key() {
        let id = Uuid::nil();
        assert_eq!(
            session_key(id),
            "session:00000000-0000-0000-0000-000000000000"
        );
    }
}
