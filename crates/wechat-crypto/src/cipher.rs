use aes::Aes256;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD as BASE64};
use base64::{alphabet, Engine};
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use wechat_schema::{SecretInfo, WeChatError};

use crate::verification::verify_signature;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

// The platform pads to 32-byte blocks even though AES blocks are 16 bytes.
const PAD_BLOCK: usize = 32;
const RANDOM_PREFIX_LEN: usize = 16;

/// Appends PKCS#7 padding for the platform's 32-byte block size.
pub fn pkcs7_pad(mut data: Vec<u8>) -> Vec<u8> {
    let pad = PAD_BLOCK - data.len() % PAD_BLOCK;
    data.extend(std::iter::repeat(pad as u8).take(pad));
    data
}

/// Strips PKCS#7 padding. A pad byte outside 1..=32 is treated as zero
/// padding; malformed padding is tolerated rather than rejected.
pub fn pkcs7_unpad(data: &[u8]) -> &[u8] {
    let pad = data.last().copied().unwrap_or(0) as usize;
    let pad = if pad < 1 || pad > PAD_BLOCK { 0 } else { pad };
    &data[..data.len().saturating_sub(pad)]
}

// 43-char keys rarely have canonical trailing bits, so the strict decoder
// would reject valid keys.
const KEY_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Decodes the 43-character encoding key into the 32-byte AES key.
fn decode_aes_key(encoding_aes_key: &str) -> Result<[u8; 32], WeChatError> {
    if encoding_aes_key.len() != 43 {
        return Err(WeChatError::InvalidKey);
    }
    let decoded = KEY_BASE64
        .decode(format!("{encoding_aes_key}="))
        .map_err(|_| WeChatError::InvalidKey)?;
    decoded.try_into().map_err(|_| WeChatError::InvalidKey)
}

/// Authenticates and decrypts an inbound webhook payload.
///
/// Verifies `msg_signature` over the encrypted body, then decrypts with
/// AES-256-CBC (IV = first 16 key bytes) and parses the plaintext layout:
/// 16-byte random prefix | u32-be message length | message | app id.
pub fn decrypt_message(encrypted: &str, secret: &SecretInfo) -> Result<String, WeChatError> {
    let key = decode_aes_key(&secret.encoding_aes_key)?;
    let verified = verify_signature(
        &secret.msg_signature,
        &secret.timestamp,
        &secret.nonce,
        &secret.token,
        Some(encrypted),
    )?;
    if !verified {
        return Err(WeChatError::AuthenticationFailed);
    }

    let mut buffer = BASE64
        .decode(encrypted.trim())
        .map_err(|error| WeChatError::Crypto(format!("ciphertext is not valid base64: {error}")))?;
    let decryptor = Aes256CbcDec::new_from_slices(&key, &key[..16])
        .map_err(|error| WeChatError::Crypto(format!("invalid key/iv length: {error}")))?;
    let plaintext = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|error| WeChatError::Crypto(format!("aes decryption failed: {error}")))?;
    let plaintext = pkcs7_unpad(plaintext);

    if plaintext.len() < RANDOM_PREFIX_LEN + 4 {
        return Err(WeChatError::Crypto(
            "decrypted payload shorter than envelope header".to_string(),
        ));
    }
    let mut length_bytes = [0u8; 4];
    length_bytes.copy_from_slice(&plaintext[RANDOM_PREFIX_LEN..RANDOM_PREFIX_LEN + 4]);
    let message_len = u32::from_be_bytes(length_bytes) as usize;
    let message_start = RANDOM_PREFIX_LEN + 4;
    let message_end = message_start
        .checked_add(message_len)
        .filter(|end| *end <= plaintext.len())
        .ok_or_else(|| {
            WeChatError::Crypto("declared message length exceeds payload".to_string())
        })?;

    let message = String::from_utf8(plaintext[message_start..message_end].to_vec())
        .map_err(|error| WeChatError::Crypto(format!("message is not valid utf-8: {error}")))?;
    let app_id = String::from_utf8(plaintext[message_end..].to_vec())
        .map_err(|error| WeChatError::Crypto(format!("app id is not valid utf-8: {error}")))?;
    if app_id != secret.app_id {
        return Err(WeChatError::AppIdMismatch);
    }
    Ok(message)
}

/// Encrypts an outbound passive-reply payload; the exact inverse of
/// [`decrypt_message`]'s cipher step.
pub fn encrypt_message(plaintext: &str, secret: &SecretInfo) -> Result<String, WeChatError> {
    let key = decode_aes_key(&secret.encoding_aes_key)?;

    let mut envelope = vec![0u8; RANDOM_PREFIX_LEN];
    rand::thread_rng().fill_bytes(&mut envelope);
    envelope.extend_from_slice(&(plaintext.len() as u32).to_be_bytes());
    envelope.extend_from_slice(plaintext.as_bytes());
    envelope.extend_from_slice(secret.app_id.as_bytes());

    let mut buffer = pkcs7_pad(envelope);
    let length = buffer.len();
    let encryptor = Aes256CbcEnc::new_from_slices(&key, &key[..16])
        .map_err(|error| WeChatError::Crypto(format!("invalid key/iv length: {error}")))?;
    let ciphertext = encryptor
        .encrypt_padded_mut::<NoPadding>(&mut buffer, length)
        .map_err(|error| WeChatError::Crypto(format!("aes encryption failed: {error}")))?;
    Ok(BASE64.encode(ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::generate_signature;

    const ENCODING_KEY: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFG";
    const APP_ID: &str = "wx1234567890abcdef";

    fn secret_for(encrypted: &str, app_id: &str) -> SecretInfo {
        let timestamp = "1563268024".to_string();
        let nonce = "1744930484".to_string();
        let token = "bot-token".to_string();
        SecretInfo {
            signature: String::new(),
            msg_signature: generate_signature(&token, &timestamp, &nonce, Some(encrypted)),
            timestamp,
            nonce,
            token,
            encoding_aes_key: ENCODING_KEY.to_string(),
            app_id: app_id.to_string(),
        }
    }

    #[test]
    fn encrypt_then_decrypt_round_trips_byte_for_byte() {
        let plaintext = "<xml><Content><![CDATA[hello 你好]]></Content></xml>";
        let sealing_secret = secret_for("", APP_ID);
        let encrypted = encrypt_message(plaintext, &sealing_secret).expect("encrypt");
        let opening_secret = secret_for(&encrypted, APP_ID);
        let decrypted = decrypt_message(&encrypted, &opening_secret).expect("decrypt");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_rejects_foreign_app_id() {
        let sealing_secret = secret_for("", "wx_other_app");
        let encrypted = encrypt_message("<xml/>", &sealing_secret).expect("encrypt");
        let mut opening_secret = secret_for(&encrypted, APP_ID);
        opening_secret.msg_signature = generate_signature(
            &opening_secret.token,
            &opening_secret.timestamp,
            &opening_secret.nonce,
            Some(&encrypted),
        );
        assert!(matches!(
            decrypt_message(&encrypted, &opening_secret),
            Err(WeChatError::AppIdMismatch)
        ));
    }

    #[test]
    fn decrypt_rejects_bad_signature() {
        let sealing_secret = secret_for("", APP_ID);
        let encrypted = encrypt_message("<xml/>", &sealing_secret).expect("encrypt");
        let mut opening_secret = secret_for(&encrypted, APP_ID);
        opening_secret.msg_signature = "0".repeat(40);
        assert!(matches!(
            decrypt_message(&encrypted, &opening_secret),
            Err(WeChatError::AuthenticationFailed)
        ));
    }

    #[test]
    fn decrypt_rejects_malformed_key() {
        let mut secret = secret_for("payload", APP_ID);
        secret.encoding_aes_key = "short".to_string();
        assert!(matches!(
            decrypt_message("payload", &secret),
            Err(WeChatError::InvalidKey)
        ));
    }

    #[test]
    fn pad_then_unpad_round_trips() {
        for len in [0usize, 1, 15, 16, 31, 32, 33, 100] {
            let data = vec![7u8; len];
            let padded = pkcs7_pad(data.clone());
            assert_eq!(padded.len() % PAD_BLOCK, 0);
            assert_eq!(pkcs7_unpad(&padded), data.as_slice());
        }
    }

    #[test]
    fn unpad_tolerates_malformed_padding() {
        // Pad byte outside 1..=32 is treated as no padding at all.
        let data = vec![1, 2, 3, 200];
        assert_eq!(pkcs7_unpad(&data), data.as_slice());
        assert_eq!(pkcs7_unpad(&[]), &[] as &[u8]);
    }
}
