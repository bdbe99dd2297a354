use thiserror::Error;

#[derive(Debug, Error)]
/// Structured failure taxonomy shared by every WeChat bridge crate.
pub enum WeChatError {
    #[error("missing required verification input: {0}")]
    InvalidArgument(&'static str),
    #[error("invalid encoding AES key")]
    InvalidKey,
    #[error("signature verification failed")]
    AuthenticationFailed,
    #[error("decrypted app id does not match configured app id")]
    AppIdMismatch,
    #[error("wechat api error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("xml error: {0}")]
    Xml(#[from] serde_xml_rs::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl WeChatError {
    /// Builds a `Remote` error from the platform's errcode/errmsg pair.
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }
}
