//! Wire schema for the WeChat Official Account server-to-server API.
//!
//! Typed representations of inbound request variants, outbound response
//! variants, JSON API results, upload results, and the secret material used
//! to verify and decrypt webhook payloads. Inbound messages arrive as XML and
//! are parsed through `serde-xml-rs`; outbound messages encode either as a
//! passive-reply XML document or as an active-send JSON payload.

mod error;
mod request;
mod response;
mod results;
mod secret;

pub use error::WeChatError;
pub use request::{
    parse_encrypted_envelope, parse_request_xml, RequestBody, RequestHeader, RequestMessage,
};
pub use response::{
    Article, MenuItem, MessageMenu, Music, ResponseBody, ResponseHeader, ResponseMessage, Video,
};
pub use results::{
    AccessToken, AccessTokenResult, AttachmentData, News, UploadMediaResult, WeChatJsonResult,
    TEMPORARY_MEDIA_RETENTION_SECS,
};
pub use secret::SecretInfo;

/// Media categories accepted by the upload endpoints.
pub mod media_types {
    pub const IMAGE: &str = "image";
    pub const VOICE: &str = "voice";
    pub const VIDEO: &str = "video";
    pub const AUDIO: &str = "audio";
    pub const THUMB: &str = "thumb";
    pub const NEWS: &str = "news";
}
