//! Batch speech synthesis against the Vbee REST API.
//!
//! A job is submitted with a POST, then its status is polled until the
//! service reports an audio link, which is downloaded to disk. Polling is
//! bounded by [`PollPolicy`] and ends with a typed [`TtsError`] instead of
//! looping forever. [`synthesize_batch`] runs independent jobs with a fixed
//! number of workers.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};

pub const API_KEY_ENV: &str = "VBEE_API_KEY";

// ---------------------------------------------------------------------------
// TtsError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("TTS request timed out")]
    Timeout,

    #[error("unexpected TTS response: {0}")]
    Parse(String),

    /// The submit call answered without `result.request_id`.
    #[error("request id not found in response: {0}")]
    MissingRequestId(String),

    #[error("text-to-speech conversion failed for request {request_id}")]
    JobFailed { request_id: String },

    #[error("request {request_id} still pending after {attempts} status checks ({elapsed:?})")]
    TimedOut {
        request_id: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("failed to download the audio file: status code {status}")]
    Download { status: u16 },

    #[error("no API key: set tts.api_key or VBEE_API_KEY")]
    MissingApiKey,

    #[error("no voice codes configured")]
    NoVoices,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TtsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TtsError::Timeout
        } else {
            TtsError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    Linear { step_ms: u64 },
    Exponential { factor: f64 },
}

/// Bounds for waiting on a submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Wait before the first status check, per input character.
    pub initial_wait_per_char_ms: u64,
    pub interval_ms: u64,
    pub max_interval_ms: u64,
    pub max_attempts: u32,
    /// Upper bound for the polling phase, after the initial wait.
    pub timeout_secs: u64,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_wait_per_char_ms: 25,
            interval_ms: 1000,
            max_interval_ms: 8000,
            max_attempts: 20,
            timeout_secs: 60,
            backoff: Backoff::Fixed,
        }
    }
}

impl PollPolicy {
    pub fn initial_wait(&self, text_chars: usize) -> Duration {
        Duration::from_millis(self.initial_wait_per_char_ms.saturating_mul(text_chars as u64))
    }

    /// Delay before status check number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = match &self.backoff {
            Backoff::Fixed => self.interval_ms,
            Backoff::Linear { step_ms } => self
                .interval_ms
                .saturating_add(step_ms.saturating_mul(attempt as u64)),
            Backoff::Exponential { factor } => {
                let scaled = self.interval_ms as f64 * factor.max(1.0).powi(attempt as i32);
                scaled.min(u64::MAX as f64) as u64
            }
        };
        Duration::from_millis(ms.min(self.max_interval_ms.max(self.interval_ms)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub base_url: String,
    /// Falls back to the `VBEE_API_KEY` environment variable when unset.
    pub api_key: Option<String>,
    pub app_id: String,
    pub callback_url: String,
    /// Rotated over the input lines.
    pub voice_codes: Vec<String>,
    pub speed_rate: f32,
    pub audio_type: String,
    pub bitrate: u32,
    pub sample_rate: u32,
    pub request_timeout_secs: u64,
    pub workers: usize,
    pub poll: PollPolicy,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://vbee.vn/api/v1".into(),
            api_key: None,
            app_id: "20aead61-13a3-4e2c-a0d8-096231eb3cc7".into(),
            callback_url: "https://mydomain/callback".into(),
            voice_codes: [
                "hn_female_ngochuyen_fast_news_48k-thg",
                "hn_male_phuthang_news65dt_44k-fhg",
                "hn_male_manhdung_news_48k-fhg",
                "hn_male_thanhlong_talk_48k-fhg",
                "hn_female_maiphuong_vdts_48k-fhg",
                "sg_female_tuongvy_call_44k-fhg",
                "sg_female_lantrinh_vdts_48k-fhg",
                "sg_male_trungkien_vdts_48k-fhg",
                "sg_male_minhhoang_full_48k-fhg",
                "sg_female_thaotrinh_full_48k-fhg",
                "hue_male_duyphuong_full_48k-fhg",
                "hue_female_huonggiang_full_48k-fhg",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            speed_rate: 1.0,
            audio_type: "wav".into(),
            bitrate: 128,
            sample_rate: 22050,
            request_timeout_secs: 10,
            workers: 4,
            poll: PollPolicy::default(),
        }
    }
}

impl TtsConfig {
    pub fn resolve_api_key(&self) -> Result<String, TtsError> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
            .ok_or(TtsError::MissingApiKey)
    }
}

// ---------------------------------------------------------------------------
// SynthesisApi
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TtsJob {
    pub text: String,
    pub voice_code: String,
    pub speed_rate: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Success { audio_link: String },
    Failed,
}

/// Remote synthesis service: submit a job, query it, fetch the result.
#[async_trait]
pub trait SynthesisApi: Send + Sync {
    /// Returns the request id.
    async fn submit(&self, job: &TtsJob) -> Result<String, TtsError>;
    async fn status(&self, request_id: &str) -> Result<JobStatus, TtsError>;
    async fn download(&self, url: &str) -> Result<Vec<u8>, TtsError>;
}

// ---------------------------------------------------------------------------
// VbeeClient
// ---------------------------------------------------------------------------

pub struct VbeeClient {
    client: reqwest::Client,
    config: TtsConfig,
    api_key: String,
}

impl VbeeClient {
    pub fn from_config(config: &TtsConfig) -> Result<Self, TtsError> {
        let api_key = config.resolve_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn submit_payload(&self, job: &TtsJob) -> serde_json::Value {
        serde_json::json!({
            "app_id":        self.config.app_id,
            "response_type": "indirect",
            "callback_url":  self.config.callback_url,
            "input_text":    job.text,
            "voice_code":    job.voice_code,
            "audio_type":    self.config.audio_type,
            "bitrate":       self.config.bitrate,
            "speed_rate":    job.speed_rate,
            "sample_rate":   self.config.sample_rate,
        })
    }
}

fn parse_request_id(json: &serde_json::Value) -> Result<String, TtsError> {
    json["result"]["request_id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| TtsError::MissingRequestId(json.to_string()))
}

/// Missing status fields count as still pending.
fn parse_status(json: &serde_json::Value) -> Result<JobStatus, TtsError> {
    let result = &json["result"];
    match result["status"].as_str() {
        Some("SUCCESS") => {
            let audio_link = result["audio_link"]
                .as_str()
                .ok_or_else(|| TtsError::Parse(format!("SUCCESS without audio_link: {json}")))?;
            Ok(JobStatus::Success {
                audio_link: audio_link.to_string(),
            })
        }
        Some("FAILED") => Ok(JobStatus::Failed),
        _ => Ok(JobStatus::Pending),
    }
}

#[async_trait]
impl SynthesisApi for VbeeClient {
    async fn submit(&self, job: &TtsJob) -> Result<String, TtsError> {
        let url = format!("{}/tts", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.submit_payload(job))
            .send()
            .await?;
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TtsError::Parse(e.to_string()))?;
        parse_request_id(&json)
    }

    async fn status(&self, request_id: &str) -> Result<JobStatus, TtsError> {
        let url = format!("{}/tts/{}", self.config.base_url, request_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TtsError::Parse(e.to_string()))?;
        parse_status(&json)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, TtsError> {
        let response = self.client.get(url).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(TtsError::Download {
                status: response.status().as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Polling and batch driver
// ---------------------------------------------------------------------------

/// Waits for `request_id` to finish and returns its audio link.
pub async fn wait_for_audio(
    api: &dyn SynthesisApi,
    request_id: &str,
    text_chars: usize,
    policy: &PollPolicy,
) -> Result<String, TtsError> {
    let initial = policy.initial_wait(text_chars);
    log::debug!("waiting {:?} before polling request {}", initial, request_id);
    tokio::time::sleep(initial).await;

    let started = Instant::now();
    let deadline = started + policy.timeout();
    let mut attempts = 0;
    while attempts < policy.max_attempts {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(policy.delay_for(attempts).min(remaining)).await;

        // No status call once the deadline has passed, and none that outlives it.
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        attempts += 1;
        let status = match tokio::time::timeout(remaining, api.status(request_id)).await {
            Ok(status) => status?,
            Err(_) => break,
        };
        match status {
            JobStatus::Success { audio_link } => return Ok(audio_link),
            JobStatus::Failed => {
                return Err(TtsError::JobFailed {
                    request_id: request_id.to_string(),
                })
            }
            JobStatus::Pending => {}
        }
    }

    Err(TtsError::TimedOut {
        request_id: request_id.to_string(),
        attempts,
        elapsed: started.elapsed(),
    })
}

/// Submit, wait, download, write to `output`.
pub async fn synthesize_one(
    api: &dyn SynthesisApi,
    job: &TtsJob,
    policy: &PollPolicy,
    output: &Path,
) -> Result<(), TtsError> {
    let request_id = api.submit(job).await?;
    let audio_link = wait_for_audio(api, &request_id, job.text.chars().count(), policy).await?;
    let bytes = api.download(&audio_link).await?;
    tokio::fs::write(output, bytes).await?;
    log::info!("Audio saved successfully at {}", output.display());
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub fn output_path(output_dir: &Path, index: usize) -> PathBuf {
    output_dir.join(format!("audio{}.wav", index + 1))
}

/// Synthesizes every non-empty line into `audio<n>.wav` (1-based line number).
///
/// At most `config.workers` jobs are in flight. A failed job is logged and
/// counted; the rest of the batch continues.
pub async fn synthesize_batch(
    api: Arc<dyn SynthesisApi>,
    texts: &[String],
    config: &TtsConfig,
    output_dir: &Path,
) -> Result<BatchReport, TtsError> {
    if config.voice_codes.is_empty() {
        return Err(TtsError::NoVoices);
    }
    tokio::fs::create_dir_all(output_dir).await?;

    let total = texts.len();
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut tasks = JoinSet::new();
    let mut report = BatchReport::default();

    for (index, text) in texts.iter().enumerate() {
        let text = text.trim();
        if text.is_empty() {
            report.skipped += 1;
            continue;
        }

        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| TtsError::Request(e.to_string()))?;

        let job = TtsJob {
            text: text.to_string(),
            voice_code: config.voice_codes[index % config.voice_codes.len()].clone(),
            speed_rate: config.speed_rate,
        };
        let api = Arc::clone(&api);
        let policy = config.poll.clone();
        let output = output_path(output_dir, index);

        log::info!("Processing {}/{}: {}", index + 1, total, job.text);
        tasks.spawn(async move {
            let _permit = permit;
            let result = synthesize_one(api.as_ref(), &job, &policy, &output).await;
            (index, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(()))) => report.succeeded += 1,
            Ok((index, Err(e))) => {
                log::error!("Failed to process text {}: {}", index + 1, e);
                report.failed += 1;
            }
            Err(e) => {
                log::error!("synthesis task panicked: {}", e);
                report.failed += 1;
            }
        }
    }

    log::info!(
        "synthesis finished: {} succeeded, {} failed, {} skipped",
        report.succeeded,
        report.failed,
        report.skipped
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
