//! Signature verification and AES-CBC message cryptography for webhook
//! payloads.
//!
//! Signatures are SHA-1 over the lexicographically sorted inputs, compared as
//! lowercase hex, case-sensitively. Message bodies are AES-256-CBC with the
//! key derived from the 43-character encoding key and PKCS#7 padding handled
//! explicitly rather than by the cipher.

mod cipher;
mod verification;

pub use cipher::{decrypt_message, encrypt_message, pkcs7_pad, pkcs7_unpad};
pub use verification::{generate_signature, verify_signature};
