use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use wechat_core::current_unix_timestamp;
use wechat_schema::{AccessToken, WeChatError};

/// Tokens this close to expiry are treated as already expired, so a caller
/// never receives a token the platform is about to invalidate mid-request.
pub const TOKEN_NEAR_EXPIRY_WINDOW_SECS: u64 = 10;

/// Expiry-aware persistence for the platform bearer token.
///
/// All reads and writes go through the external storage collaborator; a
/// cache-level mutex serializes the read-check-write sequence across
/// concurrent requests.
pub struct AccessTokenCache {
    storage: Arc<dyn crate::Storage>,
    lock: Mutex<()>,
}

impl AccessTokenCache {
    pub fn new(storage: Arc<dyn crate::Storage>) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    /// Returns the stored token, or `None` when absent, unreadable, or
    /// within the near-expiry window (fails closed).
    pub async fn get(&self, app_id: &str) -> Result<Option<AccessToken>, WeChatError> {
        let _guard = self.lock.lock().await;
        let keys = vec![app_id.to_string()];
        let entries = self.storage.read(&keys).await?;
        let token = entries
            .get(app_id)
            .and_then(|value| serde_json::from_value::<AccessToken>(value.clone()).ok());
        let now = current_unix_timestamp();
        Ok(token.filter(|token| {
            token.expire_time > now.saturating_add(TOKEN_NEAR_EXPIRY_WINDOW_SECS)
        }))
    }

    pub async fn save(&self, app_id: &str, token: &AccessToken) -> Result<(), WeChatError> {
        let _guard = self.lock.lock().await;
        let changes = HashMap::from([(app_id.to_string(), serde_json::to_value(token)?)]);
        self.storage.write(changes).await
    }

    pub async fn delete(&self, app_id: &str) -> Result<(), WeChatError> {
        let _guard = self.lock.lock().await;
        self.storage.delete(&[app_id.to_string()]).await
    }
}
