//! Conversion between WeChat wire messages and bot activities.
//!
//! Inbound requests become activities the bot logic understands; reply
//! activities fan out into one or more wire messages, uploading any media or
//! card imagery they reference along the way.

mod activity;
mod mapper;

pub use activity::{
    Activity, ActivityKind, Attachment, CardAction, CardImage, ChannelAccount,
    ConversationAccount, Entity, Fact, GeoCoordinates, HeroCard, MediaAttachment, MediaCard,
    MediaUrl, OAuthCard, ReceiptCard, ReceiptItem, SigninCard, SuggestedActions, ThumbnailCard,
    CHANNEL_ID,
};
pub use mapper::MessageMapper;

#[cfg(test)]
mod tests;
