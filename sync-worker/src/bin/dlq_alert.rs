//! DLQ Alert Lambda - Raises an SNS alert for every sync request that kept failing.

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use shared::config::required_var;
use shared::triggers::decode_sqs_records;
use shared::SqsMessage;
use std::sync::Arc;
use tracing::{error, info, warn};

const ALERT_SUBJECT: &str = "Camp sync failed";

#[derive(Debug, Serialize)]
struct AlertResponse {
    alerts_sent: usize,
    failures: usize,
}

struct AppState {
    sns_client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        Ok(Self {
            sns_client: aws_sdk_sns::Client::new(&config),
            topic_arn: required_var("ALERT_TOPIC_ARN")?,
        })
    }
}

fn alert_message(message: &SqsMessage) -> String {
    format!(
        "A camp sync request failed after {} attempts and was moved to the dead-letter queue.\n\n\
         Message ID: {}\n\
         Requested by: {}\n\
         Body:\n{}",
        message.receive_count, message.message_id, message.request.source, message.body
    )
}

async fn handler(state: Arc<AppState>, event: LambdaEvent<Value>) -> Result<AlertResponse, Error> {
    let messages = decode_sqs_records(&event.payload)?;
    info!("Processing {} dead-lettered sync requests", messages.len());

    let mut response = AlertResponse {
        alerts_sent: 0,
        failures: 0,
    };

    for message in &messages {
        let result = state
            .sns_client
            .publish()
            .topic_arn(&state.topic_arn)
            .subject(ALERT_SUBJECT)
            .message(alert_message(message))
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(message_id = %message.message_id, "Alert published");
                response.alerts_sent += 1;
            }
            Err(e) => {
                error!(message_id = %message.message_id, "Failed to publish to SNS: {}", e);
                response.failures += 1;
            }
        }
    }

    if response.failures > 0 {
        // Leave the batch on the queue so the alert is retried
        warn!("{} alerts could not be published", response.failures);
        return Err(format!("Failed to publish {} alerts", response.failures).into());
    }

    Ok(response)
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
