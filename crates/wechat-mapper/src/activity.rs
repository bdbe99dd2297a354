/// Channel id stamped on every activity this adapter produces.
pub const CHANNEL_ID: &str = "wechat";

/// Message activities carry conversational content; event activities are
/// named notifications (subscribe, scans, menu clicks) with no body.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityKind {
    Message,
    Event { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAccount {
    pub id: String,
    pub name: String,
    pub role: String,
}

impl ChannelAccount {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "User".to_string(),
            role: "user".to_string(),
        }
    }

    pub fn bot(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "Bot".to_string(),
            role: "bot".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationAccount {
    pub id: String,
    pub is_group: bool,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoCoordinates {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Geo(GeoCoordinates),
}

/// One tappable action attached to a card or message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CardAction {
    pub title: String,
    pub display_text: Option<String>,
    pub text: Option<String>,
    pub value: Option<String>,
}

impl CardAction {
    /// Label shown to the user, preferring the most specific field.
    pub fn content(&self) -> &str {
        self.display_text
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or(&self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SuggestedActions {
    pub actions: Vec<CardAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CardImage {
    pub url: String,
    pub alt: Option<String>,
    pub tap: Option<CardAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaUrl {
    pub url: String,
    pub profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeroCard {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub text: Option<String>,
    pub images: Vec<CardImage>,
    pub buttons: Vec<CardAction>,
    pub tap: Option<CardAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThumbnailCard {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub text: Option<String>,
    pub images: Vec<CardImage>,
    pub buttons: Vec<CardAction>,
    pub tap: Option<CardAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SigninCard {
    pub text: Option<String>,
    pub buttons: Vec<CardAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OAuthCard {
    pub text: Option<String>,
    pub connection_name: Option<String>,
    pub buttons: Vec<CardAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fact {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiptItem {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub text: Option<String>,
    pub price: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiptCard {
    pub title: Option<String>,
    pub facts: Vec<Fact>,
    pub items: Vec<ReceiptItem>,
    pub tax: Option<String>,
    pub total: Option<String>,
    pub buttons: Vec<CardAction>,
}

/// Shared shape of the audio, video, and animation cards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaCard {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub text: Option<String>,
    pub image: Option<CardImage>,
    pub media: Vec<MediaUrl>,
    pub buttons: Vec<CardAction>,
}

/// Generic media attachment. `content` may hold a fetchable URL, an inline
/// `data:` URI, or plain text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaAttachment {
    pub name: Option<String>,
    pub content_type: String,
    pub content_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub content: Option<String>,
}

/// Everything a reply activity can attach; the mapper dispatches on this
/// exhaustively so a new card type cannot silently fall through.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    HeroCard(HeroCard),
    ThumbnailCard(ThumbnailCard),
    SigninCard(SigninCard),
    OAuthCard(OAuthCard),
    ReceiptCard(ReceiptCard),
    AudioCard(MediaCard),
    VideoCard(MediaCard),
    AnimationCard(MediaCard),
    Media(MediaAttachment),
}

/// The bot-side view of one message or event.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub kind: ActivityKind,
    pub id: String,
    pub channel_id: String,
    pub from: ChannelAccount,
    pub recipient: ChannelAccount,
    pub conversation: ConversationAccount,
    /// Unix seconds taken from the wire `CreateTime`.
    pub timestamp: i64,
    pub text: Option<String>,
    pub summary: Option<String>,
    /// Tapped menu item id, when the inbound text came from a message menu.
    pub value: Option<String>,
    pub suggested_actions: Option<SuggestedActions>,
    pub attachments: Vec<Attachment>,
    pub entities: Vec<Entity>,
}

impl Activity {
    pub fn new_message(
        id: impl Into<String>,
        from: ChannelAccount,
        recipient: ChannelAccount,
        timestamp: i64,
    ) -> Self {
        let conversation = ConversationAccount {
            id: from.id.clone(),
            is_group: false,
            name: None,
        };
        Self {
            kind: ActivityKind::Message,
            id: id.into(),
            channel_id: CHANNEL_ID.to_string(),
            from,
            recipient,
            conversation,
            timestamp,
            text: None,
            summary: None,
            value: None,
            suggested_actions: None,
            attachments: Vec::new(),
            entities: Vec::new(),
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(self.kind, ActivityKind::Message)
    }

    /// Builds a reply addressed back to this activity's sender, with the
    /// account roles swapped.
    pub fn create_reply(&self, text: impl Into<String>) -> Self {
        let mut reply = Self::new_message(
            uuid::Uuid::new_v4().to_string(),
            self.recipient.clone(),
            self.from.clone(),
            self.timestamp,
        );
        reply.conversation = self.conversation.clone();
        reply.text = Some(text.into());
        reply
    }
}
