use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::client::InferenceClient;
use crate::config::Config;
use crate::error::{ErrorTier, Result};
use crate::normalize::{normalize, CropPolicy};
use crate::poll::{await_all, ProgressSink};
use crate::render::{collect, show_all, ResultSink};
use crate::submit::submit;

/// Where one run's output goes: progress, results, and the final outcome.
pub trait Presenter: ProgressSink + ResultSink {
    fn completed(&self, elapsed: Duration);

    /// Replaces the progress indicator with a static failure message.
    fn failed(&self, message: &'static str);
}

/// One upload-to-results flow, configured once per deployment.
#[derive(Clone)]
pub struct Octoshop {
    client: Arc<dyn InferenceClient>,
    crop_policy: CropPolicy,
    num_images: usize,
    poll_interval: Duration,
}

impl Octoshop {
    pub fn new(client: Arc<dyn InferenceClient>, config: &Config) -> Self {
        Self {
            client,
            crop_policy: config.crop_policy,
            num_images: config.num_images,
            poll_interval: config.poll_interval,
        }
    }

    /// Runs the whole flow. Every failure ends in exactly one `failed` call.
    pub async fn run<P>(&self, upload: Vec<u8>, prompt: &str, presenter: &P) -> Result<usize>
    where
        P: Presenter + ?Sized,
    {
        match self.process(upload, prompt, presenter).await {
            Ok(count) => Ok(count),
            Err(e) => {
                let tier: ErrorTier = e.tier();
                error!(error = %e, ?tier, "octoshop run failed");
                presenter.failed(tier.user_message());
                Err(e)
            }
        }
    }

    async fn process<P>(&self, upload: Vec<u8>, prompt: &str, presenter: &P) -> Result<usize>
    where
        P: Presenter + ?Sized,
    {
        let start = Instant::now();
        let policy = self.crop_policy;
        let img = tokio::task::spawn_blocking(move || normalize(&upload, policy)).await??;

        let client = self.client.as_ref();
        let handles = submit(client, &img, prompt, self.num_images).await?;
        await_all(client, &handles, self.poll_interval, presenter).await?;
        let elapsed = start.elapsed();

        // Everything is fetched and decoded before the first result or the timing is shown.
        let rendered = collect(client, &handles).await?;
        info!(
            count = rendered.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "octoshop run finished"
        );
        presenter.completed(elapsed);
        Ok(show_all(rendered, presenter))
    }
}
