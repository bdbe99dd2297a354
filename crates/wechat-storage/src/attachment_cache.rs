use std::{collections::HashMap, sync::Arc};

use wechat_core::current_unix_timestamp;
use wechat_schema::{UploadMediaResult, WeChatError};

/// Persistence for upload results, keyed by content hash (plus a
/// temporariness suffix chosen by the caller).
///
/// `get` honors the derived expiry of temporary uploads: an expired hit is
/// indistinguishable from a miss, so callers re-upload in both cases.
pub struct AttachmentCache {
    storage: Arc<dyn crate::Storage>,
}

impl AttachmentCache {
    pub fn new(storage: Arc<dyn crate::Storage>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, key: &str) -> Result<Option<UploadMediaResult>, WeChatError> {
        let keys = vec![key.to_string()];
        let entries = self.storage.read(&keys).await?;
        let result = entries
            .get(key)
            .and_then(|value| serde_json::from_value::<UploadMediaResult>(value.clone()).ok());
        let now = current_unix_timestamp();
        match result {
            Some(result) if result.expired(now) => {
                tracing::debug!(key, "cached upload result expired, treating as miss");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    pub async fn save(&self, key: &str, result: &UploadMediaResult) -> Result<(), WeChatError> {
        let changes = HashMap::from([(key.to_string(), serde_json::to_value(result)?)]);
        self.storage.write(changes).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), WeChatError> {
        self.storage.delete(&[key.to_string()]).await
    }
}
