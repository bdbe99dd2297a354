use serde::{Deserialize, Serialize};

/// Retention window for temporary uploads before the platform discards them.
pub const TEMPORARY_MEDIA_RETENTION_SECS: u64 = 3 * 24 * 60 * 60;

/// Standard result envelope of every platform JSON response. A non-zero
/// `errcode` is the universal remote-error signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WeChatJsonResult {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

impl WeChatJsonResult {
    pub fn is_error(&self) -> bool {
        self.errcode != 0
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AccessTokenResult {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

/// Cached bearer token; owned exclusively by the access-token cache and
/// persisted through the storage collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessToken {
    pub app_id: String,
    pub token: String,
    pub secret: String,
    /// Unix seconds at which the remote token expires.
    pub expire_time: u64,
}

/// Result of a successful media upload, cached under a content-hash key.
///
/// Expiry is derived at read time from `created_at`, never stored as a
/// mutable flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadMediaResult {
    Temporary {
        media_id: String,
        media_type: String,
        thumb_media_id: Option<String>,
        /// Unix seconds reported by the platform at upload time.
        created_at: u64,
    },
    Persistent {
        media_id: String,
        url: Option<String>,
    },
}

impl UploadMediaResult {
    pub fn media_id(&self) -> &str {
        match self {
            Self::Temporary { media_id, .. } | Self::Persistent { media_id, .. } => media_id,
        }
    }

    /// Temporary uploads age out after the platform retention window;
    /// persistent uploads never expire.
    pub fn expired(&self, now_unix: u64) -> bool {
        match self {
            Self::Temporary { created_at, .. } => {
                created_at.saturating_add(TEMPORARY_MEDIA_RETENTION_SECS) <= now_unix
            }
            Self::Persistent { .. } => false,
        }
    }
}

/// Raw bytes plus naming metadata for one media upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentData {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl AttachmentData {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }
}

/// Graphic-article payload for the news upload endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct News {
    pub title: String,
    pub author: Option<String>,
    /// Short description shown in the article list.
    pub digest: Option<String>,
    /// Article body, HTML supported.
    pub content: Option<String>,
    pub content_source_url: String,
    /// "1" shows the cover picture in the article detail, "0" hides it.
    pub show_cover_pic: String,
    pub thumb_media_id: Option<String>,
    pub thumb_url: Option<String>,
}
