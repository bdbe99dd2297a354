use std::sync::Arc;

use httpmock::prelude::*;
use serde_json::json;

use wechat_client::WeChatClient;
use wechat_core::current_unix_timestamp;
use wechat_schema::{
    AccessToken, RequestBody, RequestHeader, RequestMessage, ResponseBody, WeChatError,
};
use wechat_storage::{MemoryStorage, Storage};

use crate::{
    Activity, ActivityKind, Attachment, CardAction, CardImage, ChannelAccount, Entity, HeroCard,
    MediaAttachment, MessageMapper, ReceiptCard, SuggestedActions,
};

const APP_ID: &str = "wx1";

async fn mapper_for(server: &MockServer) -> MessageMapper {
    let storage = MemoryStorage::new_shared();
    let token = AccessToken {
        app_id: APP_ID.to_string(),
        token: "TOKEN".to_string(),
        secret: "s3cret".to_string(),
        expire_time: current_unix_timestamp() + 7_200,
    };
    storage
        .write(std::collections::HashMap::from([(
            APP_ID.to_string(),
            serde_json::to_value(&token).expect("token json"),
        )]))
        .await
        .expect("seed token");
    let client = WeChatClient::with_api_host(
        server.base_url(),
        APP_ID,
        "s3cret",
        storage as Arc<dyn Storage>,
    )
    .expect("client");
    MessageMapper::new(Arc::new(client), true)
}

fn inbound(body: RequestBody) -> RequestMessage {
    RequestMessage {
        header: RequestHeader {
            to_user: "gh_x".to_string(),
            from_user: "u1".to_string(),
            create_time: 1234,
            msg_id: Some(1),
        },
        body,
    }
}

fn reply_activity() -> Activity {
    Activity::new_message(
        "r1",
        ChannelAccount::bot("gh_x"),
        ChannelAccount::user("u1"),
        1234,
    )
}

#[tokio::test]
async fn text_request_round_trips_through_both_directions() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let request = inbound(RequestBody::Text {
        content: "hi".to_string(),
        biz_msg_menu_id: None,
    });
    let activity = mapper.to_activity(&request).await.expect("activity");
    assert_eq!(activity.text.as_deref(), Some("hi"));
    assert_eq!(activity.id, "1");
    assert_eq!(activity.from.id, "u1");
    assert_eq!(activity.recipient.id, "gh_x");
    assert_eq!(activity.conversation.id, "u1");
    assert!(activity.is_message());

    let mut reply = reply_activity();
    reply.text = Some("hello".to_string());
    let messages = mapper.to_wechat_messages(&reply).await.expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].body,
        ResponseBody::Text {
            content: "hello".to_string(),
        }
    );
    assert_eq!(messages[0].header.to_user, "u1");
    assert_eq!(messages[0].header.from_user, "gh_x");
}

#[tokio::test]
async fn menu_tap_carries_the_menu_item_id() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let request = inbound(RequestBody::Text {
        content: "go".to_string(),
        biz_msg_menu_id: Some("item-7".to_string()),
    });
    let activity = mapper.to_activity(&request).await.expect("activity");
    assert_eq!(activity.value.as_deref(), Some("item-7"));
}

#[tokio::test]
async fn image_request_becomes_image_attachment() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let request = inbound(RequestBody::Image {
        media_id: "m1".to_string(),
        pic_url: "http://cdn/pic.jpg".to_string(),
    });
    let activity = mapper.to_activity(&request).await.expect("activity");
    assert_eq!(
        activity.attachments,
        vec![Attachment::Media(MediaAttachment {
            content_type: "image".to_string(),
            content_url: Some("http://cdn/pic.jpg".to_string()),
            ..MediaAttachment::default()
        })]
    );
}

#[tokio::test]
async fn voice_request_resolves_media_url_and_keeps_recognition() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let request = inbound(RequestBody::Voice {
        media_id: "v9".to_string(),
        format: Some("amr".to_string()),
        recognition: Some("turn on the lights".to_string()),
    });
    let activity = mapper.to_activity(&request).await.expect("activity");
    assert_eq!(activity.text.as_deref(), Some("turn on the lights"));
    let Attachment::Media(media) = &activity.attachments[0] else {
        panic!("expected media attachment");
    };
    let url = media.content_url.as_deref().expect("url");
    assert!(url.contains("/cgi-bin/media/get"));
    assert!(url.contains("media_id=v9"));
    assert!(url.contains("access_token=TOKEN"));
}

#[tokio::test]
async fn video_request_resolves_both_media_urls() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let request = inbound(RequestBody::Video {
        media_id: "vid".to_string(),
        thumb_media_id: "thumb".to_string(),
    });
    let activity = mapper.to_activity(&request).await.expect("activity");
    let Attachment::Media(media) = &activity.attachments[0] else {
        panic!("expected media attachment");
    };
    assert!(media.content_url.as_deref().expect("url").contains("media_id=vid"));
    assert!(media
        .thumbnail_url
        .as_deref()
        .expect("thumbnail")
        .contains("media_id=thumb"));
}

#[tokio::test]
async fn location_request_becomes_geo_entity() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let request = inbound(RequestBody::Location {
        latitude: 39.9,
        longitude: 116.4,
        scale: Some(15),
        label: "Beijing".to_string(),
    });
    let activity = mapper.to_activity(&request).await.expect("activity");
    let Entity::Geo(geo) = &activity.entities[0];
    assert_eq!(geo.name, "Beijing");
    assert_eq!(geo.latitude, 39.9);
    assert_eq!(geo.longitude, 116.4);
}

#[tokio::test]
async fn link_request_concatenates_title_and_url() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let request = inbound(RequestBody::Link {
        title: "Read this".to_string(),
        description: "summary".to_string(),
        url: "http://x".to_string(),
    });
    let activity = mapper.to_activity(&request).await.expect("activity");
    assert_eq!(activity.text.as_deref(), Some("Read thishttp://x"));
    assert_eq!(activity.summary.as_deref(), Some("summary"));
}

#[tokio::test]
async fn event_request_synthesizes_an_id_and_maps_to_nothing_outbound() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let mut request = inbound(RequestBody::Event {
        event: "subscribe".to_string(),
        event_key: None,
    });
    request.header.msg_id = None;
    let activity = mapper.to_activity(&request).await.expect("activity");
    assert_eq!(
        activity.kind,
        ActivityKind::Event {
            name: "subscribe".to_string(),
        }
    );
    assert!(!activity.id.is_empty());

    let messages = mapper.to_wechat_messages(&activity).await.expect("messages");
    assert!(messages.is_empty());
}

#[tokio::test]
async fn suggested_actions_split_into_menu_and_anchor_text() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let mut reply = reply_activity();
    reply.suggested_actions = Some(SuggestedActions {
        actions: vec![
            CardAction {
                title: "A".to_string(),
                value: Some("http://x".to_string()),
                ..CardAction::default()
            },
            CardAction {
                title: "B".to_string(),
                value: Some("go".to_string()),
                ..CardAction::default()
            },
        ],
    });
    let messages = mapper.to_wechat_messages(&reply).await.expect("messages");
    assert_eq!(messages.len(), 2);
    let ResponseBody::MessageMenu(menu) = &messages[0].body else {
        panic!("expected menu first");
    };
    assert_eq!(menu.menu_items.len(), 1);
    assert_eq!(menu.menu_items[0].id, "B");
    assert_eq!(menu.menu_items[0].content, "go");
    let ResponseBody::Text { content } = &messages[1].body else {
        panic!("expected text second");
    };
    assert_eq!(content, "<a href=\"http://x\">A</a>");
}

#[tokio::test]
async fn hero_card_without_images_fails_validation() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let mut reply = reply_activity();
    reply.attachments.push(Attachment::HeroCard(HeroCard {
        title: Some("News".to_string()),
        ..HeroCard::default()
    }));
    let error = mapper
        .to_wechat_messages(&reply)
        .await
        .expect_err("must fail");
    match error {
        WeChatError::Validation(message) => assert_eq!(message, "image required for news"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn hero_card_uploads_news_and_emits_mpnews() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/hosted/cover.png");
        then.status(200).body(&[1u8, 2, 3][..]);
    });
    let image_upload = server.mock(|when, then| {
        when.method(POST)
            .path("/cgi-bin/media/upload")
            .query_param("type", "image");
        then.status(200).json_body(json!({
            "type": "image",
            "media_id": "THUMB_1",
            "created_at": current_unix_timestamp(),
        }));
    });
    let news_upload = server.mock(|when, then| {
        when.method(POST)
            .path("/cgi-bin/media/uploadnews")
            .body_includes("\"thumb_media_id\":\"THUMB_1\"");
        then.status(200).json_body(json!({
            "type": "news",
            "media_id": "NEWS_1",
            "created_at": current_unix_timestamp(),
        }));
    });
    let mapper = mapper_for(&server).await;

    let mut reply = reply_activity();
    reply.attachments.push(Attachment::HeroCard(HeroCard {
        title: Some("Headline".to_string()),
        subtitle: Some("sub".to_string()),
        text: Some("body".to_string()),
        images: vec![CardImage {
            url: format!("{}/hosted/cover.png", server.base_url()),
            alt: Some("cover".to_string()),
            tap: None,
        }],
        ..HeroCard::default()
    }));
    let messages = mapper.to_wechat_messages(&reply).await.expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].body,
        ResponseBody::MpNews {
            media_id: "NEWS_1".to_string(),
        }
    );
    assert_eq!(image_upload.hits(), 1);
    assert_eq!(news_upload.hits(), 1);
}

#[tokio::test]
async fn generic_media_attachment_uploads_and_preserves_order() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/hosted/photo.png");
        then.status(200).body(&[7u8, 8, 9][..]);
    });
    server.mock(|when, then| {
        when.method(POST).path("/cgi-bin/media/upload");
        then.status(200).json_body(json!({
            "type": "image",
            "media_id": "IMG_1",
            "created_at": current_unix_timestamp(),
        }));
    });
    let mapper = mapper_for(&server).await;

    let mut reply = reply_activity();
    reply.text = Some("caption".to_string());
    reply.attachments.push(Attachment::Media(MediaAttachment {
        name: Some("photo".to_string()),
        content_type: "image/png".to_string(),
        content_url: Some(format!("{}/hosted/photo.png", server.base_url())),
        ..MediaAttachment::default()
    }));
    let messages = mapper.to_wechat_messages(&reply).await.expect("messages");
    assert_eq!(messages.len(), 2);
    assert!(matches!(messages[0].body, ResponseBody::Text { .. }));
    assert_eq!(
        messages[1].body,
        ResponseBody::Image {
            media_id: "IMG_1".to_string(),
        }
    );
}

#[tokio::test]
async fn inline_data_uri_attachment_is_decoded_and_uploaded() {
    let server = MockServer::start();
    let upload = server.mock(|when, then| {
        when.method(POST).path("/cgi-bin/media/upload");
        then.status(200).json_body(json!({
            "type": "image",
            "media_id": "IMG_2",
            "created_at": current_unix_timestamp(),
        }));
    });
    let mapper = mapper_for(&server).await;

    let mut reply = reply_activity();
    reply.attachments.push(Attachment::Media(MediaAttachment {
        content_type: "image/png".to_string(),
        content: Some("data:image/png;base64,AQID".to_string()),
        ..MediaAttachment::default()
    }));
    let messages = mapper.to_wechat_messages(&reply).await.expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].body,
        ResponseBody::Image {
            media_id: "IMG_2".to_string(),
        }
    );
    assert_eq!(upload.hits(), 1);
}

#[tokio::test]
async fn plain_text_attachment_content_downgrades_to_text() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let mut reply = reply_activity();
    reply.attachments.push(Attachment::Media(MediaAttachment {
        content_type: "text/plain".to_string(),
        content: Some("just words".to_string()),
        ..MediaAttachment::default()
    }));
    let messages = mapper.to_wechat_messages(&reply).await.expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].body,
        ResponseBody::Text {
            content: "just words".to_string(),
        }
    );
}

#[tokio::test]
async fn upload_failure_aborts_the_outbound_batch() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/hosted/one.png");
        then.status(200).body(&[1u8][..]);
    });
    let upload = server.mock(|when, then| {
        when.method(POST).path("/cgi-bin/media/upload");
        then.status(200)
            .json_body(json!({"errcode": 45009, "errmsg": "api freq out of limit"}));
    });
    let mapper = mapper_for(&server).await;

    let mut reply = reply_activity();
    for name in ["one", "two"] {
        reply.attachments.push(Attachment::Media(MediaAttachment {
            name: Some(name.to_string()),
            content_type: "image/png".to_string(),
            content_url: Some(format!("{}/hosted/one.png", server.base_url())),
            ..MediaAttachment::default()
        }));
    }
    let error = mapper
        .to_wechat_messages(&reply)
        .await
        .expect_err("must fail");
    assert!(matches!(error, WeChatError::Remote { code: 45009, .. }));
    // Fail fast: the second attachment is never attempted.
    assert_eq!(upload.hits(), 1);
}

#[tokio::test]
async fn unsupported_attachment_mime_type_fails() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let mut reply = reply_activity();
    reply.attachments.push(Attachment::Media(MediaAttachment {
        content_type: "application/pdf".to_string(),
        content: Some("data:application/pdf;base64,AQID".to_string()),
        ..MediaAttachment::default()
    }));
    let error = mapper
        .to_wechat_messages(&reply)
        .await
        .expect_err("must fail");
    assert!(matches!(error, WeChatError::UnsupportedMediaType(_)));
}

#[tokio::test]
async fn receipt_card_flattens_into_text_lines() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let mut reply = reply_activity();
    reply.attachments.push(Attachment::ReceiptCard(ReceiptCard {
        title: Some("Order".to_string()),
        facts: vec![crate::Fact {
            key: "Order id".to_string(),
            value: "42".to_string(),
        }],
        items: vec![crate::ReceiptItem {
            title: Some("Widget".to_string()),
            price: Some("$9".to_string()),
            ..crate::ReceiptItem::default()
        }],
        tax: Some("$1".to_string()),
        total: Some("$10".to_string()),
        ..ReceiptCard::default()
    }));
    let messages = mapper.to_wechat_messages(&reply).await.expect("messages");
    assert_eq!(messages.len(), 1);
    let ResponseBody::Text { content } = &messages[0].body else {
        panic!("expected text");
    };
    assert_eq!(
        content,
        "Order\r\nOrder id: 42\r\nWidget: $9\r\nTax: $1\r\nTotal: $10"
    );
}

#[tokio::test]
async fn create_reply_swaps_accounts() {
    let server = MockServer::start();
    let mapper = mapper_for(&server).await;

    let request = inbound(RequestBody::Text {
        content: "hi".to_string(),
        biz_msg_menu_id: None,
    });
    let activity = mapper.to_activity(&request).await.expect("activity");
    let reply = activity.create_reply("hello");
    assert_eq!(reply.from.id, "gh_x");
    assert_eq!(reply.recipient.id, "u1");
    assert_eq!(reply.text.as_deref(), Some("hello"));
    assert!(reply.is_message());
}
