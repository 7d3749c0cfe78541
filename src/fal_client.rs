use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::error::PipelineError;

/// fal.ai queue client: submit a job, poll its status, fetch the result.
#[derive(Debug, Clone)]
pub struct FalClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    poll_interval: Duration,
    max_wait: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueSubmission {
    pub request_id: String,
    pub status_url: Option<String>,
    pub response_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueStatus {
    pub status: String, // "IN_QUEUE", "IN_PROGRESS", "COMPLETED"
    pub queue_position: Option<u32>,
    #[serde(default)]
    pub logs: Option<Vec<QueueLog>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueLog {
    pub message: String,
}

impl FalClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://queue.fal.run".to_string(),
            poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(600),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Upper bound on how long one job may run before it is treated as failed.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn require_key(&self) -> Result<&str, PipelineError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| PipelineError::Configuration("FAL_KEY is not configured".to_string()))
    }

    /// Runs `model` with `input` to completion and returns the raw result payload.
    pub async fn subscribe(&self, model: &str, input: &Value) -> Result<Value, PipelineError> {
        let api_key = self.require_key()?;
        let started = Instant::now();

        // Step 1: Submit
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, model))
            .header("Authorization", format!("Key {}", api_key))
            .timeout(Duration::from_secs(60))
            .json(input)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Generation(format!(
                "fal.ai submit error ({}): {}",
                status,
                provider_message(&error_text)
            )));
        }

        let submission: QueueSubmission = response.json().await?;
        tracing::info!("🎨 fal.ai job {} queued on {}", submission.request_id, model);

        let status_url = submission.status_url.clone().unwrap_or_else(|| {
            format!("{}/{}/requests/{}/status", self.base_url, model, submission.request_id)
        });
        let response_url = submission.response_url.clone().unwrap_or_else(|| {
            format!("{}/{}/requests/{}", self.base_url, model, submission.request_id)
        });

        // Step 2: Poll until the job leaves the queue
        loop {
            if started.elapsed() > self.max_wait {
                return Err(PipelineError::Generation(format!(
                    "fal.ai job {} exceeded the maximum execution time of {}s",
                    submission.request_id,
                    self.max_wait.as_secs()
                )));
            }

            let status = self.get_status(api_key, &status_url).await?;
            match status.status.as_str() {
                "COMPLETED" => break,
                "IN_QUEUE" => {
                    tracing::debug!(
                        "fal.ai job {} in queue (position {:?})",
                        submission.request_id,
                        status.queue_position
                    );
                }
                "IN_PROGRESS" => {
                    if let Some(last) = status.logs.as_ref().and_then(|logs| logs.last()) {
                        tracing::debug!("fal.ai job {}: {}", submission.request_id, last.message);
                    }
                }
                other => {
                    return Err(PipelineError::Generation(format!(
                        "fal.ai job {} ended with status {}",
                        submission.request_id, other
                    )));
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        // Step 3: Fetch the result
        let response = self
            .client
            .get(&response_url)
            .header("Authorization", format!("Key {}", api_key))
            .timeout(Duration::from_secs(60))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PipelineError::Generation(format!(
                "fal.ai error ({}): {}",
                status,
                provider_message(&body)
            )));
        }

        tracing::info!(
            "✅ fal.ai job {} finished in {:.1}s",
            submission.request_id,
            started.elapsed().as_secs_f64()
        );
        tracing::debug!("fal.ai result: {}", body);

        serde_json::from_str(&body)
            .map_err(|e| PipelineError::Generation(format!("Failed to parse fal.ai result: {}", e)))
    }

    async fn get_status(&self, api_key: &str, status_url: &str) -> Result<QueueStatus, PipelineError> {
        let response = self
            .client
            .get(status_url)
            .query(&[("logs", "1")])
            .header("Authorization", format!("Key {}", api_key))
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Generation(format!(
                "fal.ai status error ({}): {}",
                status,
                provider_message(&error_text)
            )));
        }

        Ok(response.json().await?)
    }
}

/// Pulls the human-readable message out of a fal.ai error body when there is one.
pub fn provider_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        ["detail", "message", "error"].iter().find_map(|key| match value.get(*key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other @ (Value::Array(_) | Value::Object(_))) => Some(other.to_string()),
            _ => None,
        })
    });
    message.unwrap_or_else(|| body.trim().to_string())
}
