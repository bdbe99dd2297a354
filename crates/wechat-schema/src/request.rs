use serde::{Deserialize, Serialize};

use crate::WeChatError;

/// Fields shared by every inbound message; event pushes carry no `msg_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestHeader {
    /// Recipient account id (the official account).
    pub to_user: String,
    /// Sender OpenId.
    pub from_user: String,
    pub create_time: i64,
    pub msg_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
/// Inbound message variants, tagged by the wire `MsgType` discriminator.
pub enum RequestBody {
    Text {
        content: String,
        /// Set when the user tapped an item of a previously sent message menu.
        biz_msg_menu_id: Option<String>,
    },
    Image {
        media_id: String,
        pic_url: String,
    },
    Voice {
        media_id: String,
        format: Option<String>,
        /// Speech recognition result, present when the account enables it.
        recognition: Option<String>,
    },
    Video {
        media_id: String,
        thumb_media_id: String,
    },
    ShortVideo {
        media_id: String,
        thumb_media_id: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
        scale: Option<u32>,
        label: String,
    },
    Link {
        title: String,
        description: String,
        url: String,
    },
    Event {
        event: String,
        event_key: Option<String>,
    },
    /// Unrecognized `MsgType`; carries the raw XML body.
    Unknown {
        raw_xml: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One parsed inbound message.
pub struct RequestMessage {
    pub header: RequestHeader,
    pub body: RequestBody,
}

impl RequestMessage {
    /// Wire discriminator of this message.
    pub fn msg_type(&self) -> &'static str {
        match &self.body {
            RequestBody::Text { .. } => "text",
            RequestBody::Image { .. } => "image",
            RequestBody::Voice { .. } => "voice",
            RequestBody::Video { .. } => "video",
            RequestBody::ShortVideo { .. } => "shortvideo",
            RequestBody::Location { .. } => "location",
            RequestBody::Link { .. } => "link",
            RequestBody::Event { .. } => "event",
            RequestBody::Unknown { .. } => "unknown",
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self.body, RequestBody::Event { .. })
    }
}

/// Flat view of the inbound XML document; every optional field defaults so a
/// single struct covers all message types.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "xml")]
struct RequestDocument {
    #[serde(rename = "ToUserName")]
    to_user_name: String,
    #[serde(rename = "FromUserName", default)]
    from_user_name: Option<String>,
    #[serde(rename = "CreateTime", default)]
    create_time: Option<i64>,
    #[serde(rename = "MsgType", default)]
    msg_type: Option<String>,
    #[serde(rename = "MsgId", default)]
    msg_id: Option<i64>,
    #[serde(rename = "Content", default)]
    content: Option<String>,
    #[serde(rename = "bizmsgmenuid", default)]
    biz_msg_menu_id: Option<String>,
    #[serde(rename = "PicUrl", default)]
    pic_url: Option<String>,
    #[serde(rename = "MediaId", default)]
    media_id: Option<String>,
    #[serde(rename = "Format", default)]
    format: Option<String>,
    #[serde(rename = "Recognition", default)]
    recognition: Option<String>,
    #[serde(rename = "ThumbMediaId", default)]
    thumb_media_id: Option<String>,
    #[serde(rename = "Location_X", default)]
    location_x: Option<f64>,
    #[serde(rename = "Location_Y", default)]
    location_y: Option<f64>,
    #[serde(rename = "Scale", default)]
    scale: Option<u32>,
    #[serde(rename = "Label", default)]
    label: Option<String>,
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "Description", default)]
    description: Option<String>,
    #[serde(rename = "Url", default)]
    url: Option<String>,
    #[serde(rename = "Event", default)]
    event: Option<String>,
    #[serde(rename = "EventKey", default)]
    event_key: Option<String>,
}

fn missing(field: &'static str) -> WeChatError {
    WeChatError::Validation(format!("inbound message is missing {field}"))
}

/// Parses one inbound XML document into a typed request message.
///
/// Unrecognized `MsgType` values degrade to `RequestBody::Unknown` instead of
/// failing, so a new upstream message type cannot break the pipeline.
pub fn parse_request_xml(xml: &str) -> Result<RequestMessage, WeChatError> {
    let doc: RequestDocument = serde_xml_rs::from_str(xml)?;
    let header = RequestHeader {
        to_user: doc.to_user_name.clone(),
        from_user: doc.from_user_name.clone().unwrap_or_default(),
        create_time: doc.create_time.unwrap_or_default(),
        msg_id: doc.msg_id,
    };

    let body = match doc.msg_type.as_deref() {
        Some("text") => RequestBody::Text {
            content: doc.content.ok_or_else(|| missing("Content"))?,
            biz_msg_menu_id: doc.biz_msg_menu_id,
        },
        Some("image") => RequestBody::Image {
            media_id: doc.media_id.ok_or_else(|| missing("MediaId"))?,
            pic_url: doc.pic_url.ok_or_else(|| missing("PicUrl"))?,
        },
        Some("voice") => RequestBody::Voice {
            media_id: doc.media_id.ok_or_else(|| missing("MediaId"))?,
            format: doc.format,
            recognition: doc.recognition,
        },
        Some("video") => RequestBody::Video {
            media_id: doc.media_id.ok_or_else(|| missing("MediaId"))?,
            thumb_media_id: doc.thumb_media_id.ok_or_else(|| missing("ThumbMediaId"))?,
        },
        Some("shortvideo") => RequestBody::ShortVideo {
            media_id: doc.media_id.ok_or_else(|| missing("MediaId"))?,
            thumb_media_id: doc.thumb_media_id.ok_or_else(|| missing("ThumbMediaId"))?,
        },
        Some("location") => RequestBody::Location {
            latitude: doc.location_x.ok_or_else(|| missing("Location_X"))?,
            longitude: doc.location_y.ok_or_else(|| missing("Location_Y"))?,
            scale: doc.scale,
            label: doc.label.unwrap_or_default(),
        },
        Some("link") => RequestBody::Link {
            title: doc.title.unwrap_or_default(),
            description: doc.description.unwrap_or_default(),
            url: doc.url.ok_or_else(|| missing("Url"))?,
        },
        Some("event") => RequestBody::Event {
            event: doc.event.ok_or_else(|| missing("Event"))?,
            event_key: doc.event_key,
        },
        _ => RequestBody::Unknown {
            raw_xml: xml.to_string(),
        },
    };

    Ok(RequestMessage { header, body })
}

/// Extracts the `Encrypt` element from an encrypted-mode webhook body.
pub fn parse_encrypted_envelope(xml: &str) -> Result<String, WeChatError> {
    #[derive(Deserialize)]
    #[serde(rename = "xml")]
    struct Envelope {
        #[serde(rename = "Encrypt")]
        encrypt: String,
    }
    let envelope: Envelope = serde_xml_rs::from_str(xml)?;
    Ok(envelope.encrypt)
}
