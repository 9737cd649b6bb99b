//! Transport seam for the two external endpoints.
//!
//! Components talk to [`IngestTransport`]; [`HttpTransport`] is the reqwest
//! implementation used in production.

use crate::channel::ChannelId;
use crate::config::{ChannelPlacement, EndpointConfig};
use crate::error::{IngestError, IngestResult};
use crate::protocol::{
    classify_failure, parse_ack_results, AckId, AckQuery, AckResults, SendResponse, ACK_PATH,
    CHANNEL_HEADER, CHANNEL_QUERY_PARAM, EVENT_PATH,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// The ingestion and acknowledgment endpoints as abstract operations.
///
/// Implementations perform exactly one request per call; retries belong to
/// the caller.
#[async_trait]
pub trait IngestTransport: Send + Sync {
    /// Post one event on a channel and return its ack id.
    async fn send_event(&self, channel: &ChannelId, event: &Value) -> IngestResult<AckId>;

    /// Query the durability status of a batch of ack ids on a channel.
    async fn query_acks(&self, channel: &ChannelId, ack_ids: &[AckId]) -> IngestResult<AckResults>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: Client,
    event_url: Url,
    ack_url: Url,
    authorization: String,
    channel_placement: ChannelPlacement,
}

impl HttpTransport {
    /// Create a transport for the configured endpoint.
    pub fn new(config: &EndpointConfig) -> IngestResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| IngestError::Config(format!("invalid base URL: {}", e)))?;
        let event_url = base
            .join(EVENT_PATH)
            .map_err(|e| IngestError::Config(format!("invalid event URL: {}", e)))?;
        let ack_url = base
            .join(ACK_PATH)
            .map_err(|e| IngestError::Config(format!("invalid ack URL: {}", e)))?;

        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            event_url,
            ack_url,
            authorization: format!("{} {}", config.auth_scheme, config.token),
            channel_placement: config.channel_placement,
        })
    }

    fn with_channel_query(url: &Url, channel: &ChannelId) -> Url {
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair(CHANNEL_QUERY_PARAM, &channel.to_string());
        url
    }

    async fn read_success_body(
        response: reqwest::Response,
        channel: &ChannelId,
    ) -> IngestResult<String> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body, channel));
        }
        Ok(body)
    }
}

#[async_trait]
impl IngestTransport for HttpTransport {
    async fn send_event(&self, channel: &ChannelId, event: &Value) -> IngestResult<AckId> {
        let url = match self.channel_placement {
            ChannelPlacement::Header => self.event_url.clone(),
            ChannelPlacement::Query => Self::with_channel_query(&self.event_url, channel),
        };

        let mut request = self
            .client
            .post(url)
            .header("Authorization", &self.authorization)
            .json(event);
        if self.channel_placement == ChannelPlacement::Header {
            request = request.header(CHANNEL_HEADER, channel.to_string());
        }

        let response = request.send().await?;
        let body = Self::read_success_body(response, channel).await?;
        let ack_id = SendResponse::parse_ack_id(&body)?;

        debug!(channel = %channel, ack_id = %ack_id, "Event accepted");
        Ok(ack_id)
    }

    async fn query_acks(&self, channel: &ChannelId, ack_ids: &[AckId]) -> IngestResult<AckResults> {
        let url = Self::with_channel_query(&self.ack_url, channel);
        let query = AckQuery {
            acks: ack_ids.to_vec(),
        };

        let response = self
            .client
            .post(url)
            .header("Authorization", &self.authorization)
            .header(CHANNEL_HEADER, channel.to_string())
            .json(&query)
            .send()
            .await?;
        let body = Self::read_success_body(response, channel).await?;
        parse_ack_results(&body)
    }
}
