//! Inference service access.
//!
//! [`InferenceClient`] is the seam the pipeline talks to; [`OctoAiClient`] speaks the
//! OctoAI async job protocol over HTTP.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{bearer_header, Config};
use crate::error::{OctoshopError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sampler {
    #[serde(rename = "K_EULER_ANCESTRAL")]
    KEulerAncestral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Photographic,
}

/// Body of one `/generate` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub batch: u32,
    pub strength: f64,
    pub steps: u32,
    pub sampler: Sampler,
    /// Base64 PNG.
    pub image: String,
    pub faceswap: bool,
    pub style: Style,
    pub octoai: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            batch: 1,
            strength: 0.33,
            steps: 20,
            sampler: Sampler::KEulerAncestral,
            image: image.into(),
            faceswap: true,
            style: Style::Photographic,
            octoai: false,
        }
    }
}

/// One outstanding job. `index` is its position in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub index: usize,
    pub response_id: String,
    pub poll_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerationResult {
    pub images: Vec<String>,
    pub story: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Queues a job and returns without waiting for it.
    async fn submit(&self, index: usize, request: &GenerationRequest) -> Result<JobHandle>;

    async fn is_ready(&self, job: &JobHandle) -> Result<bool>;

    async fn fetch_result(&self, job: &JobHandle) -> Result<GenerationResult>;
}

#[derive(Debug, Deserialize)]
struct AsyncAccepted {
    response_id: String,
    poll_url: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
    #[serde(default)]
    response_url: Option<String>,
}

#[derive(Clone)]
pub struct OctoAiClient {
    http: reqwest::Client,
    endpoint_url: String,
}

impl OctoAiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer_header(&config.token)?);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint_url: config.endpoint_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_status(&self, job: &JobHandle) -> Result<JobStatus> {
        let response = self.http.get(&job.poll_url).send().await?;
        parse_json(response).await
    }
}

/// Turns non-2xx replies into tiered errors, otherwise decodes the body.
async fn parse_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(OctoshopError::from_status(status, body));
    }
    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl InferenceClient for OctoAiClient {
    async fn submit(&self, index: usize, request: &GenerationRequest) -> Result<JobHandle> {
        let url = format!("{}/generate", self.endpoint_url);
        debug!(index, %url, "submitting generation job");

        let response = self
            .http
            .post(&url)
            .header("X-OctoAI-Async", "1")
            .json(request)
            .send()
            .await?;
        let accepted: AsyncAccepted = parse_json(response).await?;

        info!(index, response_id = %accepted.response_id, "job queued");
        Ok(JobHandle {
            index,
            response_id: accepted.response_id,
            poll_url: accepted.poll_url,
        })
    }

    async fn is_ready(&self, job: &JobHandle) -> Result<bool> {
        let status = self.get_status(job).await?;
        match status.status.as_str() {
            "completed" => Ok(true),
            "failed" => Err(OctoshopError::Server {
                status: reqwest::StatusCode::OK,
                body: format!("job {} failed", job.response_id),
            }),
            _ => Ok(false),
        }
    }

    async fn fetch_result(&self, job: &JobHandle) -> Result<GenerationResult> {
        let status = self.get_status(job).await?;
        let response_url = match (status.status.as_str(), status.response_url) {
            ("completed", Some(url)) => url,
            (other, _) => {
                return Err(OctoshopError::InvalidResponse(format!(
                    "job {} has no result (status {other})",
                    job.response_id
                )))
            }
        };

        let response = self.http.get(&response_url).send().await?;
        parse_json(response).await
    }
}
