//! Camp Sync Lambda - Reconciles HipCamp and Checkfront bookings into Google Calendar.
//!
//! Invoked by the sync queue, an EventBridge schedule, or directly. Several
//! queued requests in one batch are served by a single run. A fatal error is
//! returned to the runtime so SQS retries the batch and finally dead-letters it.

use chrono::Utc;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use shared::{run_sync, Config, CredentialSource, SourceCounts, SyncReport, Trigger};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Sync response
#[derive(Debug, Serialize)]
struct SyncResponse {
    status_code: u16,
    run_id: String,
    trigger: &'static str,
    events: SourceCounts,
    calendars: Vec<SyncReport>,
}

/// Application state
struct AppState {
    config: Config,
    credentials: CredentialSource,
    http_client: reqwest::Client,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let credentials = CredentialSource::from_config(&config).await;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            config,
            credentials,
            http_client,
        })
    }
}

fn log_trigger(trigger: &Trigger) {
    let requests = trigger.requests();
    if requests.len() > 1 {
        info!("Coalescing {} sync requests into one run", requests.len());
    }
    for request in requests {
        info!(
            source = %request.source,
            request_id = request.request_id.as_deref().unwrap_or("-"),
            "Sync requested"
        );
    }
}

async fn handler(state: Arc<AppState>, event: LambdaEvent<Value>) -> Result<SyncResponse, Error> {
    let run_id = Uuid::new_v4().to_string();
    let trigger = Trigger::from_event(&event.payload)?;
    let span = info_span!("camp_sync", run_id = %run_id, trigger = trigger.name());

    async move {
        info!("Starting camp sync");
        log_trigger(&trigger);

        let credentials = state.credentials.load(&state.config).await?;
        let summary = match run_sync(&state.http_client, &state.config, &credentials, Utc::now()).await {
            Ok(summary) => summary,
            Err(e) => {
                error!("Sync failed: {}", e);
                return Err(e.into());
            }
        };

        let errors: usize = summary.calendars.iter().map(|c| c.errors.len()).sum();
        info!(
            "Camp sync complete: {} calendars, {} errors",
            summary.calendars.len(),
            errors
        );

        Ok::<_, Error>(SyncResponse {
            status_code: 200,
            run_id,
            trigger: trigger.name(),
            events: summary.events,
            calendars: summary.calendars,
        })
    }
    .instrument(span)
    .await
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape() {
        let response = SyncResponse {
            status_code: 200,
            run_id: "run-1".into(),
            trigger: "scheduled",
            events: SourceCounts {
                google: 4,
                hipcamp: 2,
                checkfront: 3,
            },
            calendars: vec![SyncReport {
                calendar: "DBR Camping".into(),
                created: 1,
                ..Default::default()
            }],
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status_code"], 200);
        assert_eq!(value["events"]["hipcamp"], 2);
        assert_eq!(value["calendars"][0]["created"], 1);
        assert_eq!(value["calendars"][0]["errors"], serde_json::json!([]));
    }
}
