//! Test doubles shared by the unit tests.

use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageOutputFormat};

use crate::client::{GenerationRequest, GenerationResult, InferenceClient, JobHandle};
use crate::error::{OctoshopError, Result};
use crate::pipeline::Presenter;
use crate::poll::{Progress, ProgressSink};
use crate::render::{RenderedResult, ResultSink};
use crate::submit::encode_png_base64;

#[derive(Default)]
struct Script {
    requests: Vec<GenerationRequest>,
    checks: Vec<usize>,
    ready: Vec<bool>,
    completion_order: Vec<usize>,
    fetch_order: Vec<usize>,
}

/// In-memory inference service. Job `i` turns ready on its `ready_after[i]`-th check.
pub struct ScriptedClient {
    ready_after: Vec<usize>,
    fail_submit_at: Option<usize>,
    fail_ready_at: Option<usize>,
    bad_image_at: Option<usize>,
    float_image_at: Option<usize>,
    state: Mutex<Script>,
}

impl ScriptedClient {
    pub fn new(ready_after: Vec<usize>) -> Self {
        Self {
            ready_after,
            fail_submit_at: None,
            fail_ready_at: None,
            bad_image_at: None,
            float_image_at: None,
            state: Mutex::new(Script::default()),
        }
    }

    pub fn fail_submit_at(mut self, index: usize) -> Self {
        self.fail_submit_at = Some(index);
        self
    }

    pub fn fail_ready_at(mut self, index: usize) -> Self {
        self.fail_ready_at = Some(index);
        self
    }

    pub fn bad_image_at(mut self, index: usize) -> Self {
        self.bad_image_at = Some(index);
        self
    }

    /// Job `index` returns a base64 OpenEXR image that decodes but cannot be written as PNG.
    pub fn float_image_at(mut self, index: usize) -> Self {
        self.float_image_at = Some(index);
        self
    }

    pub async fn submit_all(&self, count: usize) -> Vec<JobHandle> {
        let request = GenerationRequest::new("test", "");
        let mut handles = Vec::new();
        for index in 0..count {
            handles.push(self.submit(index, &request).await.unwrap());
        }
        handles
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn submitted_image(&self) -> Option<DynamicImage> {
        let request = self.requests().into_iter().next()?;
        let bytes = general_purpose::STANDARD.decode(request.image).ok()?;
        image::load_from_memory(&bytes).ok()
    }

    pub fn ready_flags(&self) -> Vec<bool> {
        self.state.lock().unwrap().ready.clone()
    }

    pub fn check_counts(&self) -> Vec<usize> {
        self.state.lock().unwrap().checks.clone()
    }

    pub fn completion_order(&self) -> Vec<usize> {
        self.state.lock().unwrap().completion_order.clone()
    }

    pub fn fetch_order(&self) -> Vec<usize> {
        self.state.lock().unwrap().fetch_order.clone()
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn submit(&self, index: usize, request: &GenerationRequest) -> Result<JobHandle> {
        if self.fail_submit_at == Some(index) {
            return Err(OctoshopError::Client {
                status: reqwest::StatusCode::UNPROCESSABLE_ENTITY,
                body: "rejected".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        state.checks.push(0);
        state.ready.push(false);
        Ok(JobHandle {
            index,
            response_id: format!("job-{index}"),
            poll_url: format!("scripted://job-{index}"),
        })
    }

    async fn is_ready(&self, job: &JobHandle) -> Result<bool> {
        if self.fail_ready_at == Some(job.index) {
            return Err(OctoshopError::Server {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: "boom".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.checks[job.index] += 1;
        let ready = state.checks[job.index] >= self.ready_after[job.index];
        if ready && !state.ready[job.index] {
            state.ready[job.index] = true;
            state.completion_order.push(job.index);
        }
        Ok(ready)
    }

    async fn fetch_result(&self, job: &JobHandle) -> Result<GenerationResult> {
        self.state.lock().unwrap().fetch_order.push(job.index);
        let image = if self.bad_image_at == Some(job.index) {
            "***not base64***".to_string()
        } else if self.float_image_at == Some(job.index) {
            let mut bytes = Vec::new();
            DynamicImage::new_rgb32f(4, 4)
                .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::OpenExr)?;
            general_purpose::STANDARD.encode(&bytes)
        } else {
            encode_png_base64(&DynamicImage::new_rgb8(2, 2))?
        };
        Ok(GenerationResult {
            images: vec![image],
            story: format!("story {}", job.index),
            caption: None,
        })
    }
}

#[derive(Default)]
struct Recorded {
    progress: Vec<Progress>,
    shown: Vec<RenderedResult>,
    completed: Vec<Duration>,
    failures: Vec<&'static str>,
    timeline: Vec<&'static str>,
}

/// Presenter that keeps everything it is told.
#[derive(Default)]
pub struct RecordingSink {
    recorded: Mutex<Recorded>,
}

impl RecordingSink {
    pub fn percents(&self) -> Vec<u8> {
        let recorded = self.recorded.lock().unwrap();
        recorded.progress.iter().map(|p| p.percent).collect()
    }

    pub fn shown_indices(&self) -> Vec<usize> {
        let recorded = self.recorded.lock().unwrap();
        recorded.shown.iter().map(|r| r.index).collect()
    }

    pub fn shown_captions(&self) -> Vec<String> {
        let recorded = self.recorded.lock().unwrap();
        recorded.shown.iter().map(|r| r.caption.clone()).collect()
    }

    pub fn completed_once(&self) -> bool {
        self.recorded.lock().unwrap().completed.len() == 1
    }

    pub fn failures(&self) -> Vec<&'static str> {
        self.recorded.lock().unwrap().failures.clone()
    }

    /// Kinds of everything but progress, in arrival order.
    pub fn timeline(&self) -> Vec<&'static str> {
        self.recorded.lock().unwrap().timeline.clone()
    }
}

impl ProgressSink for RecordingSink {
    fn progress(&self, progress: Progress) {
        self.recorded.lock().unwrap().progress.push(progress);
    }
}

impl ResultSink for RecordingSink {
    fn show(&self, result: RenderedResult) {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.timeline.push("result");
        recorded.shown.push(result);
    }
}

impl Presenter for RecordingSink {
    fn completed(&self, elapsed: Duration) {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.timeline.push("done");
        recorded.completed.push(elapsed);
    }

    fn failed(&self, message: &'static str) {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.timeline.push("error");
        recorded.failures.push(message);
    }
}
