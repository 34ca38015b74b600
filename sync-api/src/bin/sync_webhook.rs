//! Sync Webhook Lambda - Handles POST /sync.
//!
//! Accepts a sync request from an external system (e.g. a Checkfront
//! webhook), validates it and queues it for the sync worker.

use async_trait::async_trait;
use chrono::Utc;
use lambda_http::http::Method;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::config::required_var;
use shared::http::{error_response, from_error, json_response, ApiResponse};
use shared::{parse_body, SyncRequest};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

fn default_source() -> String {
    "webhook".to_string()
}

/// Webhook request body. Every field is optional.
#[derive(Debug, Deserialize, Validate)]
struct TriggerRequest {
    #[serde(default = "default_source")]
    #[validate(length(min = 1, max = 64))]
    source: String,
    timestamp: Option<Value>,
    data: Option<Value>,
}

impl Default for TriggerRequest {
    fn default() -> Self {
        Self {
            source: default_source(),
            timestamp: None,
            data: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct TriggerAccepted {
    message_id: String,
    request_id: String,
}

/// Queue the worker reads sync requests from.
#[async_trait]
trait SyncQueue: Send + Sync {
    /// Returns the queue's message id.
    async fn enqueue(&self, request: &SyncRequest) -> shared::Result<String>;
}

struct SqsQueue {
    sqs_client: aws_sdk_sqs::Client,
    queue_url: String,
}

#[async_trait]
impl SyncQueue for SqsQueue {
    async fn enqueue(&self, request: &SyncRequest) -> shared::Result<String> {
        let output = self
            .sqs_client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(serde_json::to_string(request)?)
            .send()
            .await
            .map_err(|e| shared::Error::Aws(format!("Failed to send sync request: {}", e)))?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }
}

/// Application state shared across requests.
struct AppState {
    queue: Box<dyn SyncQueue>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        Ok(Self {
            queue: Box::new(SqsQueue {
                sqs_client: aws_sdk_sqs::Client::new(&config),
                queue_url: required_var("SYNC_QUEUE_URL")?,
            }),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    if !event.uri().path().ends_with("/sync") {
        return error_response(404, "Not found");
    }
    if event.method() != Method::POST {
        return error_response(405, "Method not allowed");
    }

    let request: TriggerRequest = parse_body!(event.body());
    if let Err(e) = request.validate() {
        return from_error(&shared::Error::from(e));
    }

    let request_id = Uuid::new_v4().to_string();
    info!(
        source = %request.source,
        request_id = %request_id,
        sent_at = ?request.timestamp,
        has_data = request.data.is_some(),
        "Queueing sync request"
    );
    let sync_request = SyncRequest {
        source: request.source,
        requested_at: Some(Utc::now()),
        request_id: Some(request_id.clone()),
    };

    match state.queue.enqueue(&sync_request).await {
        Ok(message_id) => json_response(
            202,
            &ApiResponse::success(TriggerAccepted {
                message_id,
                request_id,
            }),
        ),
        Err(e) => {
            error!("Failed to queue sync request: {}", e);
            error_response(500, "Failed to queue sync request")
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::logging::init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
