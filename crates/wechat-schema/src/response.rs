use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Fields shared by every outbound message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Recipient OpenId.
    pub to_user: String,
    /// Sender account id (the official account).
    pub from_user: String,
    pub create_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Video {
    pub media_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumb_media_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Music {
    pub title: Option<String>,
    pub description: Option<String>,
    pub music_url: String,
    pub hq_music_url: String,
    pub thumb_media_id: Option<String>,
}

/// One entry of a news response; the remote API accepts at most 10 per
/// message and silently drops the rest, so producers keep lists short.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub url: String,
    #[serde(rename = "picurl")]
    pub pic_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenuItem {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MessageMenu {
    #[serde(rename = "head_content")]
    pub header_content: String,
    #[serde(rename = "list")]
    pub menu_items: Vec<MenuItem>,
    pub tail_content: String,
}

impl MessageMenu {
    pub fn new(menu_items: Vec<MenuItem>) -> Self {
        Self {
            header_content: String::new(),
            menu_items,
            tail_content: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
/// Outbound message variants, tagged by the wire `MsgType` discriminator.
pub enum ResponseBody {
    Text { content: String },
    Image { media_id: String },
    Voice { media_id: String },
    Video(Video),
    Music(Music),
    News { articles: Vec<Article> },
    MpNews { media_id: String },
    MessageMenu(MessageMenu),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One outbound message, ready to encode as passive XML or active JSON.
pub struct ResponseMessage {
    pub header: ResponseHeader,
    pub body: ResponseBody,
}

impl ResponseMessage {
    /// Wire discriminator of this message.
    pub fn msg_type(&self) -> &'static str {
        match &self.body {
            ResponseBody::Text { .. } => "text",
            ResponseBody::Image { .. } => "image",
            ResponseBody::Voice { .. } => "voice",
            ResponseBody::Video(_) => "video",
            ResponseBody::Music(_) => "music",
            ResponseBody::News { .. } => "news",
            ResponseBody::MpNews { .. } => "mpnews",
            ResponseBody::MessageMenu(_) => "msgmenu",
        }
    }

    /// JSON payload for the customer-service send endpoint (active mode).
    pub fn to_send_payload(&self) -> Value {
        let mut payload = json!({
            "touser": self.header.to_user,
            "msgtype": self.msg_type(),
        });
        let detail = match &self.body {
            ResponseBody::Text { content } => json!({ "content": content }),
            ResponseBody::Image { media_id } | ResponseBody::MpNews { media_id } => {
                json!({ "media_id": media_id })
            }
            ResponseBody::Voice { media_id } => json!({ "media_id": media_id }),
            ResponseBody::Video(video) => json!({
                "media_id": video.media_id,
                "thumb_media_id": video.thumb_media_id,
                "title": video.title,
                "description": video.description,
            }),
            ResponseBody::Music(music) => json!({
                "title": music.title,
                "description": music.description,
                "musicurl": music.music_url,
                "hqmusicurl": music.hq_music_url,
                "thumb_media_id": music.thumb_media_id,
            }),
            ResponseBody::News { articles } => json!({
                "articles": articles,
            }),
            ResponseBody::MessageMenu(menu) => {
                serde_json::to_value(menu).unwrap_or_else(|_| json!({}))
            }
        };
        payload[self.msg_type()] = detail;
        payload
    }

    /// Passive-reply XML for the synchronous webhook response, or `None` for
    /// message types the passive channel cannot carry (mpnews, msgmenu).
    pub fn to_reply_xml(&self) -> Option<String> {
        let mut xml = String::from("<xml>");
        push_element(&mut xml, "ToUserName", &self.header.to_user);
        push_element(&mut xml, "FromUserName", &self.header.from_user);
        xml.push_str(&format!(
            "<CreateTime>{}</CreateTime>",
            self.header.create_time
        ));
        push_element(&mut xml, "MsgType", self.msg_type());
        match &self.body {
            ResponseBody::Text { content } => push_element(&mut xml, "Content", content),
            ResponseBody::Image { media_id } => {
                xml.push_str("<Image>");
                push_element(&mut xml, "MediaId", media_id);
                xml.push_str("</Image>");
            }
            ResponseBody::Voice { media_id } => {
                xml.push_str("<Voice>");
                push_element(&mut xml, "MediaId", media_id);
                xml.push_str("</Voice>");
            }
            ResponseBody::Video(video) => {
                xml.push_str("<Video>");
                push_element(&mut xml, "MediaId", &video.media_id);
                push_element(&mut xml, "Title", video.title.as_deref().unwrap_or(""));
                push_element(
                    &mut xml,
                    "Description",
                    video.description.as_deref().unwrap_or(""),
                );
                xml.push_str("</Video>");
            }
            ResponseBody::Music(music) => {
                xml.push_str("<Music>");
                push_element(&mut xml, "Title", music.title.as_deref().unwrap_or(""));
                push_element(
                    &mut xml,
                    "Description",
                    music.description.as_deref().unwrap_or(""),
                );
                push_element(&mut xml, "MusicUrl", &music.music_url);
                push_element(&mut xml, "HQMusicUrl", &music.hq_music_url);
                push_element(
                    &mut xml,
                    "ThumbMediaId",
                    music.thumb_media_id.as_deref().unwrap_or(""),
                );
                xml.push_str("</Music>");
            }
            ResponseBody::News { articles } => {
                xml.push_str(&format!("<ArticleCount>{}</ArticleCount>", articles.len()));
                xml.push_str("<Articles>");
                for article in articles {
                    xml.push_str("<item>");
                    push_element(&mut xml, "Title", &article.title);
                    push_element(&mut xml, "Description", &article.description);
                    push_element(&mut xml, "PicUrl", &article.pic_url);
                    push_element(&mut xml, "Url", &article.url);
                    xml.push_str("</item>");
                }
                xml.push_str("</Articles>");
            }
            ResponseBody::MpNews { .. } | ResponseBody::MessageMenu(_) => return None,
        }
        xml.push_str("</xml>");
        Some(xml)
    }
}

fn push_element(xml: &mut String, name: &str, value: &str) {
    xml.push('<');
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&cdata(value));
    xml.push_str("</");
    xml.push_str(name);
    xml.push('>');
}

// CDATA sections cannot contain the literal "]]>"; split it across sections.
fn cdata(value: &str) -> String {
    format!("<![CDATA[{}]]>", value.replace("]]>", "]]]]><![CDATA[>"))
}
