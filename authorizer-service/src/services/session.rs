use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::error::ServiceError;

/// Key-value cache with per-key time-to-live.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ServiceError>;
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError>;
    async fn delete(&self, key: &str) -> Result<(), ServiceError>;
    async fn health_check(&self) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct RedisSessionStore {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisSessionStore {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects on its own
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// In-memory session store honouring TTLs.
#[derive(Default)]
pub struct MockSessionStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MockSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries()
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries()
            .get(key)
            .map(|(_, expires_at)| expires_at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ServiceError> {
        self.entries()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let now = Instant::now();
        let mut entries = self.entries();
        let live = entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone());
        if live.is_none() {
            entries.remove(key);
        }
        Ok(live)
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        self.entries().remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

const USER_KEY_PREFIX: &str = "refresh:";
const TOKEN_KEY_PREFIX: &str = "rt:";

/// Refresh tokens, indexed both ways: `refresh:{user_id}` holds the user's
/// current token and `rt:{token}` points back at the user.
#[derive(Clone)]
pub struct RefreshSessions {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl RefreshSessions {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn user_key(user_id: Uuid) -> String {
        format!("{}{}", USER_KEY_PREFIX, user_id)
    }

    fn token_key(token: &str) -> String {
        format!("{}{}", TOKEN_KEY_PREFIX, token)
    }

    /// Make `token` the user's only refresh token.
    pub async fn store(&self, user_id: Uuid, token: &str) -> Result<(), ServiceError> {
        if let Some(previous) = self.current_token(user_id).await? {
            if previous != token {
                self.store.delete(&Self::token_key(&previous)).await?;
            }
        }

        self.store
            .set(&Self::user_key(user_id), token, self.ttl)
            .await?;
        self.store
            .set(&Self::token_key(token), &user_id.to_string(), self.ttl)
            .await?;
        Ok(())
    }

    pub async fn current_token(&self, user_id: Uuid) -> Result<Option<String>, ServiceError> {
        self.store.get(&Self::user_key(user_id)).await
    }

    /// The user a refresh token was issued to, if it is still the user's
    /// current token.
    pub async fn resolve(&self, token: &str) -> Result<Option<Uuid>, ServiceError> {
        let Some(raw) = self.store.get(&Self::token_key(token)).await? else {
            return Ok(None);
        };

        let Ok(user_id) = Uuid::parse_str(&raw) else {
            tracing::warn!("Discarding refresh mapping with malformed user id");
            self.store.delete(&Self::token_key(token)).await?;
            return Ok(None);
        };

        match self.current_token(user_id).await? {
            Some(current) if current == token => Ok(Some(user_id)),
            _ => {
                tracing::warn!(user_id = %user_id, "Rejected superseded refresh token");
                self.store.delete(&Self::token_key(token)).await?;
                Ok(None)
            }
        }
    }

    pub async fn revoke(&self, user_id: Uuid) -> Result<(), ServiceError> {
        if let Some(current) = self.current_token(user_id).await? {
            self.store.delete(&Self::token_key(&current)).await?;
        }
        self.store.delete(&Self::user_key(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions() -> (Arc<MockSessionStore>, RefreshSessions) {
        let store = Arc::new(MockSessionStore::new());
        let sessions = RefreshSessions::new(store.clone(), Duration::from_secs(7 * 24 * 3600));
        (store, sessions)
    }

    #[tokio::test]
    async fn test_store_indexes_both_directions() -> Result<(), anyhow::Error> {
        let (store, sessions) = sessions();
        let user_id = Uuid::now_v7();

        sessions.store(user_id, "token-a").await?;

        assert_eq!(
            store.get(&format!("refresh:{}", user_id)).await?.as_deref(),
            Some("token-a")
        );
        assert_eq!(
            store.get("rt:token-a").await?,
            Some(user_id.to_string())
        );
        assert!(store.ttl("rt:token-a").unwrap() > Duration::from_secs(6 * 24 * 3600));
        assert_eq!(sessions.resolve("token-a").await?, Some(user_id));
        Ok(())
    }

    #[tokio::test]
    async fn test_new_token_supersedes_previous() -> Result<(), anyhow::Error> {
        let (store, sessions) = sessions();
        let user_id = Uuid::now_v7();

        sessions.store(user_id, "token-a").await?;
        sessions.store(user_id, "token-b").await?;

        assert_eq!(sessions.resolve("token-a").await?, None);
        assert_eq!(sessions.resolve("token-b").await?, Some(user_id));
        assert_eq!(store.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_users_do_not_share_sessions() -> Result<(), anyhow::Error> {
        let (_, sessions) = sessions();
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();

        sessions.store(alice, "alice-token").await?;
        sessions.store(bob, "bob-token").await?;
        sessions.revoke(alice).await?;

        assert_eq!(sessions.resolve("alice-token").await?, None);
        assert_eq!(sessions.resolve("bob-token").await?, Some(bob));
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_entries_are_gone() -> Result<(), anyhow::Error> {
        let store = MockSessionStore::new();
        store.set("k", "v", Duration::from_millis(0)).await?;
        assert_eq!(store.get("k").await?, None);
        assert!(store.is_empty());
        Ok(())
    }
}
