//! Wire types for the ingestion and acknowledgment endpoints.
//!
//! # Ingestion
//!
//! ```text
//! POST /services/collector/event
//! X-Splunk-Request-Channel: <uuid>          (or ?channel=<uuid>)
//! {"event": {...}, "fields": {"delivery_id": "...", "attempt": "1", ...}}
//!
//! 200 {"text": "Success", "code": 0, "ackId": 7}
//! ```
//!
//! # Acknowledgment
//!
//! ```text
//! POST /services/collector/ack?channel=<uuid>
//! {"acks": [5, 6, 7]}
//!
//! 200 {"acks": {"5": true, "6": false, "7": true}}
//! ```
//!
//! Ids missing from the ack response are indeterminate, not false.

use crate::channel::ChannelId;
use crate::error::IngestError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// Path of the ingestion endpoint.
pub const EVENT_PATH: &str = "/services/collector/event";

/// Path of the acknowledgment endpoint.
pub const ACK_PATH: &str = "/services/collector/ack";

/// Header carrying the channel id.
pub const CHANNEL_HEADER: &str = "X-Splunk-Request-Channel";

/// Query parameter carrying the channel id.
pub const CHANNEL_QUERY_PARAM: &str = "channel";

// Service status codes carried in error bodies.
const CODE_TOKEN_DISABLED: i64 = 1;
const CODE_TOKEN_REQUIRED: i64 = 2;
const CODE_INVALID_AUTHORIZATION: i64 = 3;
const CODE_INVALID_TOKEN: i64 = 4;
const CODE_SERVER_BUSY: i64 = 9;
const CODE_CHANNEL_MISSING: i64 = 10;
const CODE_CHANNEL_INVALID: i64 = 11;

/// Channel-scoped delivery handle number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AckId(pub u64);

impl fmt::Display for AckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-side identity of one submitted payload, stable across resends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryId(Uuid);

impl DeliveryId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// An event as submitted by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    /// Event body.
    pub event: Value,
    /// Event time in epoch seconds.
    pub time: Option<f64>,
    pub host: Option<String>,
    pub source: Option<String>,
    pub sourcetype: Option<String>,
    pub index: Option<String>,
    /// Extra indexed fields.
    pub fields: Map<String, Value>,
}

impl EventPayload {
    /// Wrap an event body with no metadata.
    pub fn new(event: impl Into<Value>) -> Self {
        Self {
            event: event.into(),
            time: None,
            host: None,
            source: None,
            sourcetype: None,
            index: None,
            fields: Map::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_sourcetype(mut self, sourcetype: impl Into<String>) -> Self {
        self.sourcetype = Some(sourcetype.into());
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Serialize the event with its idempotency marker merged into `fields`.
    ///
    /// Marker keys overwrite caller fields of the same name.
    pub fn to_wire(&self, marker: &IdempotencyMarker) -> Value {
        let mut fields = self.fields.clone();
        marker.write_into(&mut fields);

        let envelope = EventEnvelope {
            event: &self.event,
            time: self.time,
            host: self.host.as_deref(),
            source: self.source.as_deref(),
            sourcetype: self.sourcetype.as_deref(),
            index: self.index.as_deref(),
            fields,
        };
        // Serializing borrowed JSON values and strings cannot fail.
        serde_json::to_value(envelope).unwrap_or(Value::Null)
    }
}

/// Tags every send so downstream consumers can detect duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyMarker {
    pub delivery_id: DeliveryId,
    pub attempt: u32,
    pub first_submitted_at: DateTime<Utc>,
}

impl IdempotencyMarker {
    fn write_into(&self, fields: &mut Map<String, Value>) {
        fields.insert(
            "delivery_id".to_string(),
            Value::String(self.delivery_id.to_string()),
        );
        fields.insert(
            "attempt".to_string(),
            Value::String(self.attempt.to_string()),
        );
        fields.insert(
            "first_submitted_at".to_string(),
            Value::String(
                self.first_submitted_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        );
    }
}

#[derive(Serialize)]
struct EventEnvelope<'a> {
    event: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sourcetype: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<&'a str>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    fields: Map<String, Value>,
}

/// Response body of a successful ingestion request.
#[derive(Debug, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, rename = "ackId")]
    pub ack_id: Option<u64>,
}

impl SendResponse {
    /// Extract the ack id, treating its absence as a protocol error.
    pub fn parse_ack_id(body: &str) -> Result<AckId, IngestError> {
        let response: SendResponse = serde_json::from_str(body)
            .map_err(|e| IngestError::Protocol(format!("unparseable ingestion response: {}", e)))?;
        response.ack_id.map(AckId).ok_or_else(|| {
            IngestError::Protocol(format!(
                "ingestion response without ackId (code {:?}, text {:?})",
                response.code, response.text
            ))
        })
    }
}

/// Request body of an acknowledgment query.
#[derive(Debug, Serialize)]
pub struct AckQuery {
    pub acks: Vec<AckId>,
}

/// Response body of an acknowledgment query.
#[derive(Debug, Deserialize)]
struct AckResponse {
    acks: HashMap<String, bool>,
}

/// Per-id durability status from one poll.
pub type AckResults = HashMap<AckId, bool>;

/// Parse an acknowledgment response. Keys that are not ack ids are dropped.
pub fn parse_ack_results(body: &str) -> Result<AckResults, IngestError> {
    let response: AckResponse = serde_json::from_str(body)
        .map_err(|e| IngestError::Protocol(format!("unparseable ack response: {}", e)))?;

    let mut results = AckResults::with_capacity(response.acks.len());
    for (key, acked) in response.acks {
        match key.parse::<u64>() {
            Ok(id) => {
                results.insert(AckId(id), acked);
            }
            Err(_) => warn!(key = %key, "Ignoring non-numeric ack id in response"),
        }
    }
    Ok(results)
}

/// Service error body.
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    code: Option<i64>,
}

/// Map a non-success response onto the error taxonomy.
pub fn classify_failure(status: u16, body: &str, channel: &ChannelId) -> IngestError {
    let parsed: Option<ServiceErrorBody> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|b| b.code);
    let message = parsed
        .and_then(|b| b.text)
        .unwrap_or_else(|| body.trim().to_string());

    match (status, code) {
        (401 | 403, _)
        | (
            _,
            Some(
                CODE_TOKEN_DISABLED
                | CODE_TOKEN_REQUIRED
                | CODE_INVALID_AUTHORIZATION
                | CODE_INVALID_TOKEN,
            ),
        ) => IngestError::Auth { status, message },
        (_, Some(CODE_CHANNEL_MISSING | CODE_CHANNEL_INVALID)) | (404, _) => {
            IngestError::ChannelInvalid {
                channel: *channel,
                message,
            }
        }
        (_, Some(CODE_SERVER_BUSY)) | (429, _) | (500..=599, _) => {
            IngestError::Transport(format!("HTTP {}: {}", status, message))
        }
        _ => IngestError::Rejected { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(attempt: u32) -> IdempotencyMarker {
        IdempotencyMarker {
            delivery_id: DeliveryId::new_random(),
            attempt,
            first_submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_to_wire_merges_marker_into_fields() {
        let payload = EventPayload::new(serde_json::json!({"message": "hello"}))
            .with_sourcetype("_json")
            .with_field("team", "ingest")
            .with_field("attempt", "caller value");
        let marker = marker(2);

        let wire = payload.to_wire(&marker);
        assert_eq!(wire["event"]["message"], "hello");
        assert_eq!(wire["sourcetype"], "_json");
        assert_eq!(wire["fields"]["team"], "ingest");
        assert_eq!(wire["fields"]["attempt"], "2");
        assert_eq!(
            wire["fields"]["delivery_id"],
            marker.delivery_id.to_string().as_str()
        );
        assert!(wire.get("index").is_none());
    }

    #[test]
    fn test_parse_ack_id() {
        let id = SendResponse::parse_ack_id(r#"{"text":"Success","code":0,"ackId":7}"#).unwrap();
        assert_eq!(id, AckId(7));

        let err = SendResponse::parse_ack_id(r#"{"text":"Success","code":0}"#).unwrap_err();
        assert!(matches!(err, IngestError::Protocol(_)));

        let err = SendResponse::parse_ack_id("<html>").unwrap_err();
        assert!(matches!(err, IngestError::Protocol(_)));
    }

    #[test]
    fn test_parse_ack_results() {
        let results =
            parse_ack_results(r#"{"acks":{"0":true,"1":false,"bogus":true}}"#).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results.get(&AckId(0)), Some(&true));
        assert_eq!(results.get(&AckId(1)), Some(&false));

        assert!(parse_ack_results(r#"{"text":"ok"}"#).is_err());
    }

    #[test]
    fn test_ack_query_serializes_ids_as_numbers() {
        let query = AckQuery {
            acks: vec![AckId(1), AckId(2)],
        };
        assert_eq!(serde_json::to_string(&query).unwrap(), r#"{"acks":[1,2]}"#);
    }

    #[test]
    fn test_classify_failure() {
        let channel = ChannelId::new_random();

        assert!(matches!(
            classify_failure(401, r#"{"text":"Invalid token","code":4}"#, &channel),
            IngestError::Auth { status: 401, .. }
        ));
        assert!(matches!(
            classify_failure(403, "forbidden", &channel),
            IngestError::Auth { .. }
        ));
        match classify_failure(400, r#"{"text":"Invalid data channel","code":11}"#, &channel) {
            IngestError::ChannelInvalid { channel: c, message } => {
                assert_eq!(c, channel);
                assert_eq!(message, "Invalid data channel");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            classify_failure(503, r#"{"text":"Server is busy","code":9}"#, &channel),
            IngestError::Transport(_)
        ));
        assert!(matches!(
            classify_failure(400, r#"{"text":"Incorrect index","code":7}"#, &channel),
            IngestError::Rejected { status: 400, .. }
        ));
    }
}
