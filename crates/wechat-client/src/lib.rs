//! HTTP client for the WeChat Official Account server-to-server API.
//!
//! Wraps token acquisition, media and news uploads, and customer-service
//! sends. Every upload is deduplicated through the attachment cache under a
//! content-hash key, and token refresh is serialized so concurrent callers
//! trigger at most one fetch.

mod client;

pub use client::{normalized_media_type, WeChatClient, DEFAULT_API_HOST};
