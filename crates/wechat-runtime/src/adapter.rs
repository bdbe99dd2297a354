use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use wechat_client::WeChatClient;
use wechat_crypto::{decrypt_message, encrypt_message, generate_signature, verify_signature};
use wechat_mapper::{Activity, MessageMapper};
use wechat_schema::{
    parse_encrypted_envelope, parse_request_xml, RequestMessage, ResponseMessage, SecretInfo,
    WeChatError,
};
use wechat_storage::Storage;

/// Static configuration of one official account.
#[derive(Debug, Clone)]
pub struct WeChatSettings {
    pub app_id: String,
    pub app_secret: String,
    /// Webhook verification token configured in the account console.
    pub token: String,
    /// 43-character encoding key; `None` runs the webhook in plaintext mode.
    pub encoding_aes_key: Option<String>,
    pub upload_temporary_media: bool,
    /// Passive mode answers the webhook call synchronously; active mode
    /// pushes replies through the customer-service send endpoint.
    pub passive_response_mode: bool,
}

/// Query parameters of one webhook call, as parsed by the host HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct WebhookQuery {
    pub signature: String,
    pub msg_signature: Option<String>,
    pub timestamp: String,
    pub nonce: String,
    pub echostr: Option<String>,
    pub openid: Option<String>,
}

/// The bot-logic seam: one inbound activity in, reply activities out.
#[async_trait]
pub trait BotHandler: Send + Sync {
    async fn on_activity(&self, activity: Activity) -> Result<Vec<Activity>>;
}

/// Channel adapter for one official account.
///
/// Authentication and decryption failures abort before any bot logic runs;
/// the host should map a [`WeChatError::AuthenticationFailed`] in the error
/// chain to an unauthorized response.
pub struct WeChatAdapter {
    settings: WeChatSettings,
    client: Arc<WeChatClient>,
    mapper: MessageMapper,
}

impl WeChatAdapter {
    pub fn new(settings: WeChatSettings, storage: Arc<dyn Storage>) -> Result<Self> {
        let client = WeChatClient::new(&settings.app_id, &settings.app_secret, storage)
            .context("failed to create platform client")?;
        Ok(Self::from_client(settings, Arc::new(client)))
    }

    /// Like [`WeChatAdapter::new`] with the API host overridden; used by
    /// tests to point at a local server.
    pub fn with_api_host(
        api_host: &str,
        settings: WeChatSettings,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let client = WeChatClient::with_api_host(
            api_host,
            &settings.app_id,
            &settings.app_secret,
            storage,
        )
        .context("failed to create platform client")?;
        Ok(Self::from_client(settings, Arc::new(client)))
    }

    fn from_client(settings: WeChatSettings, client: Arc<WeChatClient>) -> Self {
        let mapper = MessageMapper::new(client.clone(), settings.upload_temporary_media);
        Self {
            settings,
            client,
            mapper,
        }
    }

    pub fn client(&self) -> &Arc<WeChatClient> {
        &self.client
    }

    /// Answers the endpoint-verification handshake by echoing `echostr` after
    /// checking the URL signature.
    pub fn verify_echo(&self, query: &WebhookQuery) -> Result<String> {
        let verified = verify_signature(
            &query.signature,
            &query.timestamp,
            &query.nonce,
            &self.settings.token,
            None,
        )?;
        if !verified {
            return Err(WeChatError::AuthenticationFailed.into());
        }
        query
            .echostr
            .clone()
            .context("handshake request carried no echostr")
    }

    /// Runs the full pipeline for one webhook call.
    ///
    /// Returns the XML body to answer with in passive mode, or `None` after
    /// pushing every reply through the send endpoint in active mode.
    pub async fn process(
        &self,
        query: &WebhookQuery,
        body: &str,
        bot: &dyn BotHandler,
    ) -> Result<Option<String>> {
        let request = self.decode_request(query, body)?;
        tracing::debug!(
            msg_type = request.msg_type(),
            from = %request.header.from_user,
            "inbound message accepted"
        );

        let activity = self.mapper.to_activity(&request).await?;
        let replies = bot
            .on_activity(activity)
            .await
            .context("bot handler failed")?;

        let mut responses = Vec::new();
        for reply in &replies {
            responses.extend(self.mapper.to_wechat_messages(reply).await?);
        }

        if self.settings.passive_response_mode {
            self.encode_passive_reply(query, &responses)
        } else {
            for response in &responses {
                self.client.send_response(response, None).await?;
            }
            Ok(None)
        }
    }

    fn decode_request(&self, query: &WebhookQuery, body: &str) -> Result<RequestMessage> {
        match &self.settings.encoding_aes_key {
            Some(encoding_aes_key) => {
                let encrypted = parse_encrypted_envelope(body)?;
                let secret = self.secret_info(query, encoding_aes_key);
                let plaintext = decrypt_message(&encrypted, &secret)?;
                Ok(parse_request_xml(&plaintext)?)
            }
            None => {
                let verified = verify_signature(
                    &query.signature,
                    &query.timestamp,
                    &query.nonce,
                    &self.settings.token,
                    None,
                )?;
                if !verified {
                    return Err(WeChatError::AuthenticationFailed.into());
                }
                Ok(parse_request_xml(body)?)
            }
        }
    }

    /// Encodes the first passively-encodable response as the synchronous
    /// webhook answer, encrypting it when the account runs in secure mode.
    fn encode_passive_reply(
        &self,
        query: &WebhookQuery,
        responses: &[ResponseMessage],
    ) -> Result<Option<String>> {
        let Some(reply_xml) = responses
            .iter()
            .find_map(|response| response.to_reply_xml())
        else {
            return Ok(None);
        };
        if responses.len() > 1 {
            tracing::debug!(
                dropped = responses.len() - 1,
                "passive mode carries a single reply, dropping the rest"
            );
        }

        match &self.settings.encoding_aes_key {
            Some(encoding_aes_key) => {
                let secret = self.secret_info(query, encoding_aes_key);
                let ciphertext = encrypt_message(&reply_xml, &secret)?;
                let signature = generate_signature(
                    &self.settings.token,
                    &query.timestamp,
                    &query.nonce,
                    Some(&ciphertext),
                );
                Ok(Some(format!(
                    "<xml><Encrypt><![CDATA[{ciphertext}]]></Encrypt>\
                     <MsgSignature><![CDATA[{signature}]]></MsgSignature>\
                     <TimeStamp>{}</TimeStamp>\
                     <Nonce><![CDATA[{}]]></Nonce></xml>",
                    query.timestamp, query.nonce
                )))
            }
            None => Ok(Some(reply_xml)),
        }
    }

    fn secret_info(&self, query: &WebhookQuery, encoding_aes_key: &str) -> SecretInfo {
        SecretInfo {
            signature: query.signature.clone(),
            msg_signature: query.msg_signature.clone().unwrap_or_default(),
            timestamp: query.timestamp.clone(),
            nonce: query.nonce.clone(),
            token: self.settings.token.clone(),
            encoding_aes_key: encoding_aes_key.to_string(),
            app_id: self.settings.app_id.clone(),
        }
    }
}
