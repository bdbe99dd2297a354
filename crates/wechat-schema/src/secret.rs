use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Secret material for one inbound webhook call, built from query parameters
/// and the configured channel credentials. Immutable per request.
pub struct SecretInfo {
    /// URL signature from the webhook query string.
    pub signature: String,
    /// Message-body signature (`msg_signature`) from the webhook query string.
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
    /// Shared verification token configured on the official account.
    pub token: String,
    /// 43-character base64-alphabet key; decodes (with one `=` appended) to
    /// the 32-byte AES key.
    pub encoding_aes_key: String,
    pub app_id: String,
}
