//! Webhook adapter that drives the full inbound pipeline: verify, decrypt,
//! parse, map to an activity, invoke bot logic, and encode the replies either
//! as a passive XML response or as active customer-service sends.
//!
//! The HTTP server itself is a host concern; the host hands query parameters
//! and the raw body to [`WeChatAdapter::process`] and writes back whatever it
//! returns.

mod adapter;

pub use adapter::{BotHandler, WeChatAdapter, WeChatSettings, WebhookQuery};
