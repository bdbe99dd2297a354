use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use wechat_core::current_unix_timestamp;
use wechat_schema::{
    media_types, AccessToken, AccessTokenResult, AttachmentData, News, ResponseBody,
    ResponseHeader, ResponseMessage, UploadMediaResult, WeChatError, WeChatJsonResult,
};
use wechat_storage::{content_hash, AccessTokenCache, AttachmentCache, Storage};

/// Production API host; tests point the client at a mock server instead.
pub const DEFAULT_API_HOST: &str = "https://api.weixin.qq.com";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 30_000;

/// Maps a MIME content type onto the platform media category.
///
/// Matching is by substring so parameterized types such as
/// `audio/amr; rate=8000` still classify. Anything outside image, video, and
/// audio is rejected before any network traffic happens.
pub fn normalized_media_type(content_type: &str) -> Result<&'static str, WeChatError> {
    let lowered = content_type.to_ascii_lowercase();
    if lowered.contains("image") {
        Ok(media_types::IMAGE)
    } else if lowered.contains("video") {
        Ok(media_types::VIDEO)
    } else if lowered.contains("audio") || lowered.contains("voice") {
        Ok(media_types::VOICE)
    } else {
        Err(WeChatError::UnsupportedMediaType(content_type.to_string()))
    }
}

// Filename extension the upload endpoints expect for each media category.
fn media_file_extension(media_type: &str) -> &'static str {
    match media_type {
        media_types::VIDEO => ".mp4",
        media_types::VOICE => ".mp3",
        _ => ".jpg",
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

// Every API response carries the errcode/errmsg envelope; a missing envelope
// decodes as errcode 0.
fn ensure_api_success(value: &Value) -> Result<(), WeChatError> {
    let envelope: WeChatJsonResult = serde_json::from_value(value.clone())?;
    if envelope.is_error() {
        return Err(WeChatError::remote(envelope.errcode, envelope.errmsg));
    }
    Ok(())
}

fn map_transport_error(error: reqwest::Error, timeout_ms: u64) -> WeChatError {
    if error.is_timeout() {
        WeChatError::Timeout(timeout_ms)
    } else {
        WeChatError::Http(error)
    }
}

/// Client for the Official Account API.
///
/// Token refresh goes through a single mutex so concurrent requests trigger
/// at most one fetch; each upload holds a per-cache-key lock so identical
/// attachments are uploaded once and every other caller gets the cached
/// result.
pub struct WeChatClient {
    http: reqwest::Client,
    api_host: String,
    app_id: String,
    app_secret: String,
    request_timeout_ms: u64,
    upload_timeout_ms: u64,
    token_cache: AccessTokenCache,
    attachment_cache: AttachmentCache,
    token_refresh: Mutex<()>,
    upload_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WeChatClient {
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, WeChatError> {
        Self::with_api_host(DEFAULT_API_HOST, app_id, app_secret, storage)
    }

    pub fn with_api_host(
        api_host: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, WeChatError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("wechat-adapter"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            api_host: api_host.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
            token_cache: AccessTokenCache::new(storage.clone()),
            attachment_cache: AttachmentCache::new(storage),
            token_refresh: Mutex::new(()),
            upload_locks: StdMutex::new(HashMap::new()),
        })
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms.max(1);
        self
    }

    pub fn with_upload_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.upload_timeout_ms = timeout_ms.max(1);
        self
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    async fn request_value(
        &self,
        request: reqwest::RequestBuilder,
        timeout_ms: u64,
    ) -> Result<Value, WeChatError> {
        let response = request
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|error| map_transport_error(error, timeout_ms))?
            .error_for_status()?;
        response
            .json::<Value>()
            .await
            .map_err(|error| map_transport_error(error, timeout_ms))
    }

    /// Returns a valid bearer token, fetching a fresh one when the cached
    /// token is absent or about to expire.
    pub async fn get_access_token(&self) -> Result<String, WeChatError> {
        if let Some(token) = self.token_cache.get(&self.app_id).await? {
            return Ok(token.token);
        }

        let _refresh = self.token_refresh.lock().await;
        // Another caller may have refreshed while this one waited.
        if let Some(token) = self.token_cache.get(&self.app_id).await? {
            return Ok(token.token);
        }

        let url = format!(
            "{}/cgi-bin/token?grant_type=client_credential&appid={}&secret={}",
            self.api_host, self.app_id, self.app_secret
        );
        let value = self
            .request_value(self.http.get(&url), self.request_timeout_ms)
            .await?;
        let result: AccessTokenResult = serde_json::from_value(value)?;
        if result.errcode != 0 {
            return Err(WeChatError::remote(result.errcode, result.errmsg));
        }

        let token = AccessToken {
            app_id: self.app_id.clone(),
            token: result.access_token,
            secret: self.app_secret.clone(),
            expire_time: current_unix_timestamp().saturating_add(result.expires_in),
        };
        self.token_cache.save(&self.app_id, &token).await?;
        tracing::debug!(
            app_id = %self.app_id,
            expires_in = result.expires_in,
            "refreshed access token"
        );
        Ok(token.token)
    }

    fn upload_lock(&self, cache_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .upload_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(cache_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Callers clone the entry under the map mutex before awaiting it, so a
    // strong count of two (map entry + our clone) means nobody else is
    // waiting on this key and the entry can go.
    fn release_upload_lock(&self, cache_key: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self
            .upload_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if Arc::strong_count(lock) <= 2 {
            locks.remove(cache_key);
        }
    }

    #[cfg(test)]
    pub(crate) fn upload_lock_count(&self) -> usize {
        self.upload_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Uploads one attachment, deduplicated by content hash. Identical bytes
    /// uploaded with the same temporariness reuse the cached media id until
    /// it ages out.
    pub async fn upload_media(
        &self,
        attachment: &AttachmentData,
        temporary: bool,
    ) -> Result<UploadMediaResult, WeChatError> {
        let media_type = normalized_media_type(&attachment.content_type)?;
        let cache_key = format!("{}{}", content_hash(&attachment.data), temporary);
        let lock = self.upload_lock(&cache_key);
        let result = {
            let _guard = lock.lock().await;
            self.upload_media_locked(attachment, temporary, media_type, &cache_key)
                .await
        };
        self.release_upload_lock(&cache_key, &lock);
        result
    }

    async fn upload_media_locked(
        &self,
        attachment: &AttachmentData,
        temporary: bool,
        media_type: &'static str,
        cache_key: &str,
    ) -> Result<UploadMediaResult, WeChatError> {
        if let Some(hit) = self.attachment_cache.get(cache_key).await? {
            tracing::debug!(media_id = hit.media_id(), "media upload served from cache");
            return Ok(hit);
        }

        let access_token = self.get_access_token().await?;
        let url = if temporary {
            format!(
                "{}/cgi-bin/media/upload?access_token={}&type={}",
                self.api_host, access_token, media_type
            )
        } else {
            format!(
                "{}/cgi-bin/material/add_material?access_token={}&type={}",
                self.api_host, access_token, media_type
            )
        };

        let file_name = format!("{}{}", attachment.name, media_file_extension(media_type));
        let part = Part::bytes(attachment.data.clone()).file_name(file_name);
        let mut form = Form::new().part("media", part);
        if !temporary && media_type == media_types::VIDEO {
            // Persistent video uploads require a description form field.
            let description = json!({
                "title": attachment.name,
                "introduction": attachment.name,
            });
            form = form.text("description", description.to_string());
        }

        let value = self
            .request_value(self.http.post(&url).multipart(form), self.upload_timeout_ms)
            .await?;
        ensure_api_success(&value)?;

        let result = if temporary {
            UploadMediaResult::Temporary {
                media_id: string_field(&value, "media_id")
                    .or_else(|| string_field(&value, "thumb_media_id"))
                    .unwrap_or_default(),
                media_type: string_field(&value, "type")
                    .unwrap_or_else(|| media_type.to_string()),
                thumb_media_id: string_field(&value, "thumb_media_id"),
                created_at: value
                    .get("created_at")
                    .and_then(Value::as_u64)
                    .unwrap_or_else(current_unix_timestamp),
            }
        } else {
            UploadMediaResult::Persistent {
                media_id: string_field(&value, "media_id").unwrap_or_default(),
                url: string_field(&value, "url"),
            }
        };
        self.attachment_cache.save(cache_key, &result).await?;
        Ok(result)
    }

    /// Uploads a list of graphic articles as one news message.
    pub async fn upload_news(
        &self,
        articles: &[News],
        temporary: bool,
    ) -> Result<UploadMediaResult, WeChatError> {
        let payload = json!({ "articles": articles });
        let cache_key = format!("{}{}", content_hash(payload.to_string()), temporary);
        let lock = self.upload_lock(&cache_key);
        let result = {
            let _guard = lock.lock().await;
            self.upload_news_locked(&payload, temporary, &cache_key).await
        };
        self.release_upload_lock(&cache_key, &lock);
        result
    }

    async fn upload_news_locked(
        &self,
        payload: &Value,
        temporary: bool,
        cache_key: &str,
    ) -> Result<UploadMediaResult, WeChatError> {
        if let Some(hit) = self.attachment_cache.get(cache_key).await? {
            tracing::debug!(media_id = hit.media_id(), "news upload served from cache");
            return Ok(hit);
        }

        let access_token = self.get_access_token().await?;
        let path = if temporary {
            "/cgi-bin/media/uploadnews"
        } else {
            "/cgi-bin/material/add_news"
        };
        let url = format!("{}{}?access_token={}", self.api_host, path, access_token);
        let value = self
            .request_value(self.http.post(&url).json(payload), self.upload_timeout_ms)
            .await?;
        ensure_api_success(&value)?;

        let result = if temporary {
            UploadMediaResult::Temporary {
                media_id: string_field(&value, "media_id").unwrap_or_default(),
                media_type: string_field(&value, "type")
                    .unwrap_or_else(|| media_types::NEWS.to_string()),
                thumb_media_id: None,
                created_at: value
                    .get("created_at")
                    .and_then(Value::as_u64)
                    .unwrap_or_else(current_unix_timestamp),
            }
        } else {
            UploadMediaResult::Persistent {
                media_id: string_field(&value, "media_id").unwrap_or_default(),
                url: string_field(&value, "url"),
            }
        };
        self.attachment_cache.save(cache_key, &result).await?;
        Ok(result)
    }

    /// Uploads an image destined for a news article body. These always live
    /// on the permanent material endpoint and come back as a plain URL.
    ///
    /// Keyed by the bare content hash, apart from the suffixed keys regular
    /// uploads use: the same bytes pushed through [`Self::upload_media`]
    /// produce a different result shape and must not share a cache entry.
    pub async fn upload_news_image(
        &self,
        attachment: &AttachmentData,
    ) -> Result<UploadMediaResult, WeChatError> {
        let cache_key = content_hash(&attachment.data);
        let lock = self.upload_lock(&cache_key);
        let result = {
            let _guard = lock.lock().await;
            self.upload_news_image_locked(attachment, &cache_key).await
        };
        self.release_upload_lock(&cache_key, &lock);
        result
    }

    async fn upload_news_image_locked(
        &self,
        attachment: &AttachmentData,
        cache_key: &str,
    ) -> Result<UploadMediaResult, WeChatError> {
        if let Some(hit) = self.attachment_cache.get(cache_key).await? {
            return Ok(hit);
        }

        let access_token = self.get_access_token().await?;
        let url = format!(
            "{}/cgi-bin/media/uploadimg?access_token={}",
            self.api_host, access_token
        );
        let file_name = format!("{}.jpg", attachment.name);
        let part = Part::bytes(attachment.data.clone()).file_name(file_name);
        let form = Form::new().part("media", part);
        let value = self
            .request_value(self.http.post(&url).multipart(form), self.upload_timeout_ms)
            .await?;
        ensure_api_success(&value)?;

        let result = UploadMediaResult::Persistent {
            media_id: string_field(&value, "media_id").unwrap_or_default(),
            url: string_field(&value, "url"),
        };
        self.attachment_cache.save(cache_key, &result).await?;
        Ok(result)
    }

    /// Builds the authenticated download URL for a temporary media id.
    pub async fn get_media_url(&self, media_id: &str) -> Result<String, WeChatError> {
        let access_token = self.get_access_token().await?;
        Ok(format!(
            "{}/cgi-bin/media/get?access_token={}&media_id={}",
            self.api_host, access_token, media_id
        ))
    }

    /// Sends one prepared customer-service payload to the platform.
    pub async fn send_message_to_user(
        &self,
        payload: &Value,
    ) -> Result<WeChatJsonResult, WeChatError> {
        let access_token = self.get_access_token().await?;
        let url = format!(
            "{}/cgi-bin/message/custom/send?access_token={}",
            self.api_host, access_token
        );
        let value = self
            .request_value(self.http.post(&url).json(payload), self.request_timeout_ms)
            .await?;
        let result: WeChatJsonResult = serde_json::from_value(value)?;
        if result.is_error() {
            return Err(WeChatError::remote(result.errcode, result.errmsg));
        }
        Ok(result)
    }

    /// Sends one outbound message over the customer-service channel,
    /// optionally attributed to a named customer-service account.
    pub async fn send_response(
        &self,
        message: &ResponseMessage,
        customer_service_account: Option<&str>,
    ) -> Result<WeChatJsonResult, WeChatError> {
        let mut payload = message.to_send_payload();
        if let Some(account) = customer_service_account {
            payload["customservice"] = json!({ "kf_account": account });
        }
        self.send_message_to_user(&payload).await
    }

    pub async fn send_text(
        &self,
        open_id: &str,
        content: impl Into<String>,
        customer_service_account: Option<&str>,
    ) -> Result<WeChatJsonResult, WeChatError> {
        let body = ResponseBody::Text {
            content: content.into(),
        };
        self.send_response(&self.active_message(open_id, body), customer_service_account)
            .await
    }

    pub async fn send_image(
        &self,
        open_id: &str,
        media_id: impl Into<String>,
        customer_service_account: Option<&str>,
    ) -> Result<WeChatJsonResult, WeChatError> {
        let body = ResponseBody::Image {
            media_id: media_id.into(),
        };
        self.send_response(&self.active_message(open_id, body), customer_service_account)
            .await
    }

    pub async fn send_voice(
        &self,
        open_id: &str,
        media_id: impl Into<String>,
        customer_service_account: Option<&str>,
    ) -> Result<WeChatJsonResult, WeChatError> {
        let body = ResponseBody::Voice {
            media_id: media_id.into(),
        };
        self.send_response(&self.active_message(open_id, body), customer_service_account)
            .await
    }

    pub async fn send_video(
        &self,
        open_id: &str,
        video: wechat_schema::Video,
        customer_service_account: Option<&str>,
    ) -> Result<WeChatJsonResult, WeChatError> {
        self.send_response(
            &self.active_message(open_id, ResponseBody::Video(video)),
            customer_service_account,
        )
        .await
    }

    pub async fn send_music(
        &self,
        open_id: &str,
        music: wechat_schema::Music,
        customer_service_account: Option<&str>,
    ) -> Result<WeChatJsonResult, WeChatError> {
        self.send_response(
            &self.active_message(open_id, ResponseBody::Music(music)),
            customer_service_account,
        )
        .await
    }

    pub async fn send_news(
        &self,
        open_id: &str,
        articles: Vec<wechat_schema::Article>,
        customer_service_account: Option<&str>,
    ) -> Result<WeChatJsonResult, WeChatError> {
        self.send_response(
            &self.active_message(open_id, ResponseBody::News { articles }),
            customer_service_account,
        )
        .await
    }

    pub async fn send_mpnews(
        &self,
        open_id: &str,
        media_id: impl Into<String>,
        customer_service_account: Option<&str>,
    ) -> Result<WeChatJsonResult, WeChatError> {
        let body = ResponseBody::MpNews {
            media_id: media_id.into(),
        };
        self.send_response(&self.active_message(open_id, body), customer_service_account)
            .await
    }

    pub async fn send_message_menu(
        &self,
        open_id: &str,
        menu: wechat_schema::MessageMenu,
        customer_service_account: Option<&str>,
    ) -> Result<WeChatJsonResult, WeChatError> {
        self.send_response(
            &self.active_message(open_id, ResponseBody::MessageMenu(menu)),
            customer_service_account,
        )
        .await
    }

    fn active_message(&self, open_id: &str, body: ResponseBody) -> ResponseMessage {
        ResponseMessage {
            header: ResponseHeader {
                to_user: open_id.to_string(),
                from_user: String::new(),
                create_time: current_unix_timestamp(),
            },
            body,
        }
    }

    /// Plain GET for content hosted outside the platform API, for example
    /// attachment content URLs supplied by the bot.
    pub async fn fetch_external_bytes(&self, url: &str) -> Result<Vec<u8>, WeChatError> {
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_millis(self.request_timeout_ms))
            .send()
            .await
            .map_err(|error| map_transport_error(error, self.request_timeout_ms))?
            .error_for_status()?;
        let bytes = response
            .bytes()
            .await
            .map_err(|error| map_transport_error(error, self.request_timeout_ms))?;
        Ok(bytes.to_vec())
    }
}
