use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use wechat_client::{normalized_media_type, WeChatClient};
use wechat_schema::{
    media_types, Article, AttachmentData, MenuItem, MessageMenu, Music, News, RequestBody,
    RequestMessage, ResponseBody, ResponseHeader, ResponseMessage, Video, WeChatError,
};

use crate::activity::{
    Activity, ActivityKind, Attachment, CardAction, ChannelAccount, ConversationAccount, Entity,
    GeoCoordinates, HeroCard, MediaAttachment, MediaCard, ReceiptCard, ThumbnailCard, CHANNEL_ID,
};

/// Converts inbound wire messages to activities and reply activities to wire
/// messages, uploading referenced media through the platform client.
///
/// A transport failure while producing any one response aborts the whole
/// outbound batch; nothing is sent partially mapped.
pub struct MessageMapper {
    client: Arc<WeChatClient>,
    upload_temporary_media: bool,
}

impl MessageMapper {
    pub fn new(client: Arc<WeChatClient>, upload_temporary_media: bool) -> Self {
        Self {
            client,
            upload_temporary_media,
        }
    }

    /// Maps one inbound request to the activity handed to bot logic.
    ///
    /// Voice and video requests resolve their media ids to fetchable URLs
    /// through the platform client, which requires a valid access token.
    pub async fn to_activity(&self, request: &RequestMessage) -> Result<Activity, WeChatError> {
        let mut activity = base_activity(request);
        match &request.body {
            RequestBody::Text {
                content,
                biz_msg_menu_id,
            } => {
                activity.text = Some(content.clone());
                activity.value = biz_msg_menu_id.clone();
            }
            RequestBody::Image { pic_url, .. } => {
                activity.attachments.push(Attachment::Media(MediaAttachment {
                    content_type: media_types::IMAGE.to_string(),
                    content_url: Some(pic_url.clone()),
                    ..MediaAttachment::default()
                }));
            }
            RequestBody::Voice {
                media_id,
                recognition,
                ..
            } => {
                activity.text = recognition.clone();
                let url = self.client.get_media_url(media_id).await?;
                activity.attachments.push(Attachment::Media(MediaAttachment {
                    content_type: media_types::VOICE.to_string(),
                    content_url: Some(url),
                    ..MediaAttachment::default()
                }));
            }
            RequestBody::Video {
                media_id,
                thumb_media_id,
            }
            | RequestBody::ShortVideo {
                media_id,
                thumb_media_id,
            } => {
                let url = self.client.get_media_url(media_id).await?;
                let thumbnail_url = self.client.get_media_url(thumb_media_id).await?;
                activity.attachments.push(Attachment::Media(MediaAttachment {
                    content_type: media_types::VIDEO.to_string(),
                    content_url: Some(url),
                    thumbnail_url: Some(thumbnail_url),
                    ..MediaAttachment::default()
                }));
            }
            RequestBody::Location {
                latitude,
                longitude,
                label,
                ..
            } => {
                activity.entities.push(Entity::Geo(GeoCoordinates {
                    name: label.clone(),
                    latitude: *latitude,
                    longitude: *longitude,
                }));
            }
            RequestBody::Link {
                title,
                description,
                url,
            } => {
                activity.text = Some(format!("{title}{url}"));
                activity.summary = Some(description.clone());
            }
            // Kind and name are set by base_activity.
            RequestBody::Event { .. } => {}
            RequestBody::Unknown { raw_xml } => {
                activity.text = Some(raw_xml.clone());
            }
        }
        Ok(activity)
    }

    /// Maps one reply activity to the ordered list of wire messages to send.
    pub async fn to_wechat_messages(
        &self,
        activity: &Activity,
    ) -> Result<Vec<ResponseMessage>, WeChatError> {
        let mut messages = Vec::new();
        if !activity.is_message() {
            tracing::debug!(id = %activity.id, "event activity has no wire representation");
            return Ok(messages);
        }

        if let Some(text) = activity.text.as_deref().filter(|text| !text.is_empty()) {
            messages.push(self.text_response(activity, text.to_string()));
        }
        if let Some(actions) = &activity.suggested_actions {
            messages.extend(self.card_action_responses(activity, &actions.actions));
        }
        for attachment in &activity.attachments {
            match attachment {
                Attachment::HeroCard(card) => {
                    messages.extend(self.hero_card_responses(activity, card).await?);
                }
                Attachment::ThumbnailCard(card) => {
                    messages.extend(self.thumbnail_card_responses(activity, card));
                }
                Attachment::SigninCard(card) => {
                    messages.extend(self.text_messages(activity, card.text.clone()));
                    messages.extend(self.card_action_responses(activity, &card.buttons));
                }
                Attachment::OAuthCard(card) => {
                    messages.extend(self.text_messages(activity, card.text.clone()));
                    messages.extend(self.card_action_responses(activity, &card.buttons));
                }
                Attachment::ReceiptCard(card) => {
                    messages.extend(self.receipt_card_responses(activity, card));
                }
                Attachment::AudioCard(card) => {
                    messages.extend(self.audio_card_responses(activity, card).await?);
                }
                Attachment::VideoCard(card) => {
                    messages.extend(self.video_card_responses(activity, card).await?);
                }
                Attachment::AnimationCard(card) => {
                    messages.extend(self.animation_card_responses(activity, card).await?);
                }
                Attachment::Media(media) => {
                    messages.extend(self.media_attachment_responses(activity, media).await?);
                }
            }
        }
        Ok(messages)
    }

    fn response(&self, activity: &Activity, body: ResponseBody) -> ResponseMessage {
        ResponseMessage {
            header: ResponseHeader {
                to_user: activity.recipient.id.clone(),
                from_user: activity.from.id.clone(),
                create_time: activity.timestamp.max(0) as u64,
            },
            body,
        }
    }

    fn text_response(&self, activity: &Activity, content: String) -> ResponseMessage {
        self.response(activity, ResponseBody::Text { content })
    }

    fn text_messages(&self, activity: &Activity, text: Option<String>) -> Vec<ResponseMessage> {
        match text.filter(|text| !text.is_empty()) {
            Some(text) => vec![self.text_response(activity, text)],
            None => Vec::new(),
        }
    }

    /// Splits card actions into a message menu (non-URL values) and a text
    /// response of anchor lines (URL values). The two kinds never mix.
    fn card_action_responses(
        &self,
        activity: &Activity,
        actions: &[CardAction],
    ) -> Vec<ResponseMessage> {
        let mut menu_items = Vec::new();
        let mut text: Option<String> = None;
        for action in actions {
            let label = action.content();
            match action.value.as_deref() {
                Some(value) if !is_url(value) => menu_items.push(MenuItem {
                    id: label.to_string(),
                    content: value.to_string(),
                }),
                value => {
                    let anchor = format!("<a href=\"{}\">{label}</a>", value.unwrap_or_default());
                    text = add_line(text, &anchor);
                }
            }
        }

        let mut messages = Vec::new();
        if !menu_items.is_empty() {
            messages.push(self.response(
                activity,
                ResponseBody::MessageMenu(MessageMenu::new(menu_items)),
            ));
        }
        messages.extend(self.text_messages(activity, text));
        messages
    }

    async fn hero_card_responses(
        &self,
        activity: &Activity,
        card: &HeroCard,
    ) -> Result<Vec<ResponseMessage>, WeChatError> {
        let news = self.news_from_hero_card(activity, card).await?;
        let upload = self
            .client
            .upload_news(&[news], self.upload_temporary_media)
            .await?;
        let mut messages = vec![self.response(
            activity,
            ResponseBody::MpNews {
                media_id: upload.media_id().to_string(),
            },
        )];
        messages.extend(self.card_action_responses(activity, &card.buttons));
        Ok(messages)
    }

    async fn news_from_hero_card(
        &self,
        activity: &Activity,
        card: &HeroCard,
    ) -> Result<News, WeChatError> {
        let Some(first_image) = card.images.first() else {
            return Err(WeChatError::Validation("image required for news".to_string()));
        };
        let mut news = News {
            title: card.title.clone().unwrap_or_default(),
            author: Some(activity.from.name.clone()),
            digest: card.subtitle.clone(),
            content: card.text.clone(),
            content_source_url: card
                .tap
                .as_ref()
                .and_then(|tap| tap.value.clone())
                .unwrap_or_else(|| first_image.url.clone()),
            show_cover_pic: "0".to_string(),
            thumb_media_id: None,
            thumb_url: None,
        };
        for image in &card.images {
            let response = self
                .media_content_response(
                    activity,
                    image.alt.as_deref(),
                    &image.url,
                    media_types::IMAGE,
                )
                .await?;
            if let ResponseBody::Image { media_id } = &response.body {
                news.thumb_media_id = Some(media_id.clone());
            }
            news.thumb_url = Some(image.url.clone());
        }
        Ok(news)
    }

    fn thumbnail_card_responses(
        &self,
        activity: &Activity,
        card: &ThumbnailCard,
    ) -> Vec<ResponseMessage> {
        let mut description = card.subtitle.clone();
        if let Some(text) = card.text.as_deref() {
            description = add_line(description, text);
        }
        let article = Article {
            title: card.title.clone().unwrap_or_default(),
            description: description.unwrap_or_default(),
            url: card
                .tap
                .as_ref()
                .and_then(|tap| tap.value.clone())
                .unwrap_or_default(),
            pic_url: card
                .images
                .first()
                .map(|image| image.url.clone())
                .unwrap_or_default(),
        };
        let mut messages = vec![self.response(
            activity,
            ResponseBody::News {
                articles: vec![article],
            },
        )];
        messages.extend(self.card_action_responses(activity, &card.buttons));
        messages
    }

    fn receipt_card_responses(
        &self,
        activity: &Activity,
        card: &ReceiptCard,
    ) -> Vec<ResponseMessage> {
        let mut body = card.title.clone();
        for fact in &card.facts {
            body = add_line(body, &format!("{}: {}", fact.key, fact.value));
        }
        for item in &card.items {
            body = add_line(
                body,
                &format!(
                    "{}: {}",
                    item.title.as_deref().unwrap_or_default(),
                    item.price.as_deref().unwrap_or_default()
                ),
            );
            if let Some(subtitle) = item.subtitle.as_deref() {
                body = add_line(body, subtitle);
            }
            if let Some(text) = item.text.as_deref() {
                body = add_line(body, text);
            }
        }
        if let Some(tax) = card.tax.as_deref() {
            body = add_line(body, &format!("Tax: {tax}"));
        }
        if let Some(total) = card.total.as_deref() {
            body = add_line(body, &format!("Total: {total}"));
        }
        let mut messages = self.text_messages(activity, body);
        messages.extend(self.card_action_responses(activity, &card.buttons));
        messages
    }

    async fn audio_card_responses(
        &self,
        activity: &Activity,
        card: &MediaCard,
    ) -> Result<Vec<ResponseMessage>, WeChatError> {
        let mut description = card.subtitle.clone();
        if let Some(text) = card.text.as_deref() {
            description = add_line(description, text);
        }
        let media_url = card
            .media
            .first()
            .map(|media| media.url.clone())
            .unwrap_or_default();
        let mut music = Music {
            title: card.title.clone(),
            description,
            music_url: media_url.clone(),
            hq_music_url: media_url,
            thumb_media_id: None,
        };
        if let Some(image) = &card.image {
            let response = self
                .media_content_response(
                    activity,
                    image.alt.as_deref(),
                    &image.url,
                    media_types::IMAGE,
                )
                .await?;
            if let ResponseBody::Image { media_id } = &response.body {
                music.thumb_media_id = Some(media_id.clone());
            }
        }
        let mut messages = vec![self.response(activity, ResponseBody::Music(music))];
        messages.extend(self.card_action_responses(activity, &card.buttons));
        Ok(messages)
    }

    async fn video_card_responses(
        &self,
        activity: &Activity,
        card: &MediaCard,
    ) -> Result<Vec<ResponseMessage>, WeChatError> {
        let mut description = card.subtitle.clone();
        if let Some(text) = card.text.as_deref() {
            description = add_line(description, text);
        }
        let media_url = card
            .media
            .first()
            .map(|media| media.url.clone())
            .unwrap_or_default();
        let uploaded = self
            .media_content_response(
                activity,
                card.title.as_deref(),
                &media_url,
                media_types::VIDEO,
            )
            .await?;
        let media_id = match &uploaded.body {
            ResponseBody::Video(video) => video.media_id.clone(),
            _ => String::new(),
        };
        let video = Video {
            media_id,
            title: card.title.clone(),
            description,
            thumb_media_id: None,
        };
        let mut messages = vec![self.response(activity, ResponseBody::Video(video))];
        messages.extend(self.card_action_responses(activity, &card.buttons));
        Ok(messages)
    }

    async fn animation_card_responses(
        &self,
        activity: &Activity,
        card: &MediaCard,
    ) -> Result<Vec<ResponseMessage>, WeChatError> {
        let mut body = card.title.clone();
        if let Some(subtitle) = card.subtitle.as_deref() {
            body = add_line(body, subtitle);
        }
        if let Some(text) = card.text.as_deref() {
            body = add_line(body, text);
        }
        let mut messages = self.text_messages(activity, body);
        if let Some(image) = &card.image {
            messages.push(
                self.media_content_response(
                    activity,
                    image.alt.as_deref(),
                    &image.url,
                    media_types::IMAGE,
                )
                .await?,
            );
        }
        // Animation frames upload as still images.
        for media in &card.media {
            messages.push(
                self.media_content_response(
                    activity,
                    media.profile.as_deref(),
                    &media.url,
                    media_types::IMAGE,
                )
                .await?,
            );
        }
        messages.extend(self.card_action_responses(activity, &card.buttons));
        Ok(messages)
    }

    async fn media_attachment_responses(
        &self,
        activity: &Activity,
        media: &MediaAttachment,
    ) -> Result<Vec<ResponseMessage>, WeChatError> {
        let mut messages = Vec::new();
        if let Some(thumbnail_url) = media.thumbnail_url.as_deref() {
            messages.push(
                self.media_content_response(
                    activity,
                    media.name.as_deref(),
                    thumbnail_url,
                    &media.content_type,
                )
                .await?,
            );
        }
        if let Some(content_url) = media.content_url.as_deref() {
            messages.push(
                self.media_content_response(
                    activity,
                    media.name.as_deref(),
                    content_url,
                    &media.content_type,
                )
                .await?,
            );
        }
        if let Some(content) = media.content.as_deref() {
            if is_url(content) || content.starts_with("data:") {
                messages.push(
                    self.media_content_response(
                        activity,
                        media.name.as_deref(),
                        content,
                        &media.content_type,
                    )
                    .await?,
                );
            } else {
                messages.extend(self.text_messages(activity, Some(content.to_string())));
            }
        }
        Ok(messages)
    }

    /// Resolves media content to bytes, uploads it, and emits the matching
    /// media response.
    async fn media_content_response(
        &self,
        activity: &Activity,
        name: Option<&str>,
        content: &str,
        content_type: &str,
    ) -> Result<ResponseMessage, WeChatError> {
        let attachment = self.resolve_attachment_data(name, content, content_type).await?;
        let upload = self
            .client
            .upload_media(&attachment, self.upload_temporary_media)
            .await?;
        let body = match normalized_media_type(&attachment.content_type)? {
            media_types::IMAGE => ResponseBody::Image {
                media_id: upload.media_id().to_string(),
            },
            media_types::VIDEO => ResponseBody::Video(Video {
                media_id: upload.media_id().to_string(),
                ..Video::default()
            }),
            _ => ResponseBody::Voice {
                media_id: upload.media_id().to_string(),
            },
        };
        Ok(self.response(activity, body))
    }

    async fn resolve_attachment_data(
        &self,
        name: Option<&str>,
        content: &str,
        content_type: &str,
    ) -> Result<AttachmentData, WeChatError> {
        if content.is_empty() {
            return Err(WeChatError::Validation(
                "attachment content can not be empty".to_string(),
            ));
        }
        let name = name
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if is_url(content) {
            let data = self.client.fetch_external_bytes(content).await?;
            Ok(AttachmentData::new(name, content_type, data))
        } else {
            let (data, inline_type) = decode_inline_content(content)?;
            Ok(AttachmentData::new(
                name,
                inline_type.unwrap_or_else(|| content_type.to_string()),
                data,
            ))
        }
    }
}

/// Builds the activity skeleton shared by every request type. Events carry no
/// message id, so one is synthesized.
fn base_activity(request: &RequestMessage) -> Activity {
    let from = ChannelAccount::user(&request.header.from_user);
    let recipient = ChannelAccount::bot(&request.header.to_user);
    let conversation = ConversationAccount {
        id: request.header.from_user.clone(),
        is_group: false,
        name: None,
    };
    let (kind, id) = match &request.body {
        RequestBody::Event { event, .. } => (
            ActivityKind::Event {
                name: event.clone(),
            },
            uuid::Uuid::new_v4().to_string(),
        ),
        _ => (
            ActivityKind::Message,
            request
                .header
                .msg_id
                .map(|msg_id| msg_id.to_string())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        ),
    };
    Activity {
        kind,
        id,
        channel_id: CHANNEL_ID.to_string(),
        from,
        recipient,
        conversation,
        timestamp: request.header.create_time,
        text: None,
        summary: None,
        value: None,
        suggested_actions: None,
        attachments: Vec::new(),
        entities: Vec::new(),
    }
}

// A fetchable URL, as opposed to inline data or plain text.
pub(crate) fn is_url(content: &str) -> bool {
    !content.starts_with("data:")
        && (content.starts_with("http://") || content.starts_with("https://"))
}

/// Joins non-empty lines with the CRLF separator the platform renders.
fn add_line(text: Option<String>, addition: &str) -> Option<String> {
    if addition.is_empty() {
        return text;
    }
    match text.filter(|text| !text.is_empty()) {
        Some(existing) => Some(format!("{existing}\r\n{addition}")),
        None => Some(addition.to_string()),
    }
}

/// Decodes a `data:` URI (or bare base64 payload) into bytes plus the MIME
/// type embedded in the header, when present.
fn decode_inline_content(content: &str) -> Result<(Vec<u8>, Option<String>), WeChatError> {
    let mut content_type = None;
    if let Some(rest) = content.strip_prefix("data:") {
        if let Some(end) = rest.find(';') {
            content_type = Some(rest[..end].trim().to_string());
        }
    }
    let encoded = content
        .split_once("base64,")
        .map(|(_, payload)| payload.trim())
        .unwrap_or(content);
    let data = BASE64
        .decode(encoded)
        .map_err(|_| WeChatError::Validation("attachment content is not valid base64".to_string()))?;
    Ok((data, content_type))
}
