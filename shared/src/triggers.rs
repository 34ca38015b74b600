//! Decoding of the Lambda payloads that can start a sync.

use serde_json::Value;
use tracing::debug;

use crate::models::SyncRequest;
use crate::{Error, Result};

/// One SQS record.
#[derive(Debug, Clone, PartialEq)]
pub struct SqsMessage {
    pub message_id: String,
    pub receive_count: u32,
    pub body: String,
    pub request: SyncRequest,
}

/// What invoked the function.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Sqs(Vec<SqsMessage>),
    Scheduled,
    Http(Option<SyncRequest>),
    Manual,
}

impl Trigger {
    pub fn from_event(event: &Value) -> Result<Self> {
        if is_sqs_event(event) {
            return Ok(Trigger::Sqs(decode_sqs_records(event)?));
        }
        if event.get("detail-type").and_then(Value::as_str) == Some("Scheduled Event") {
            return Ok(Trigger::Scheduled);
        }
        if event["requestContext"]["http"].is_object() {
            let base64 = event["isBase64Encoded"].as_bool().unwrap_or(false);
            let request = event["body"]
                .as_str()
                .filter(|_| !base64)
                .and_then(|body| serde_json::from_str::<SyncRequest>(body).ok());
            return Ok(Trigger::Http(request));
        }
        Ok(Trigger::Manual)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Trigger::Sqs(_) => "sqs",
            Trigger::Scheduled => "scheduled",
            Trigger::Http(_) => "http",
            Trigger::Manual => "manual",
        }
    }

    /// Sync requests carried by the payload.
    pub fn requests(&self) -> Vec<&SyncRequest> {
        match self {
            Trigger::Sqs(messages) => messages.iter().map(|m| &m.request).collect(),
            Trigger::Http(Some(request)) => vec![request],
            _ => Vec::new(),
        }
    }
}

pub fn is_sqs_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sqs")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

/// Decode every SQS record. Bodies that are not a `SyncRequest` count as `source = "sqs"`.
pub fn decode_sqs_records(event: &Value) -> Result<Vec<SqsMessage>> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Validation("SQS event must include Records array".to_string()))?;

    let mut messages = Vec::with_capacity(records.len());
    for record in records {
        let body = record
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("SQS record body must be a string".to_string()))?;

        let request = serde_json::from_str::<SyncRequest>(body).unwrap_or_else(|_| {
            debug!("SQS body is not a sync request, treating as plain notification");
            SyncRequest::new("sqs")
        });

        messages.push(SqsMessage {
            message_id: record["messageId"].as_str().unwrap_or_default().to_string(),
            receive_count: record["attributes"]["ApproximateReceiveCount"]
                .as_str()
                .and_then(|count| count.parse().ok())
                .unwrap_or(0),
            body: body.to_string(),
            request,
        });
    }

    Ok(messages)
}
