//! Fixed-interval polling of outstanding jobs.
//!
//! [`PollState`] holds the bookkeeping and has no side effects; [`await_all`] drives it
//! against an [`InferenceClient`] and reports progress to a [`ProgressSink`].

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::client::{InferenceClient, JobHandle};
use crate::error::Result;

pub const PROGRESS_CAP: u8 = 99;
pub const IN_PROGRESS_TEXT: &str = "OctoShopping in action...";
pub const SLOW_TEXT: &str = "OctoShopping is taking longer than usual, hang tight!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub percent: u8,
    pub text: &'static str,
}

pub trait ProgressSink: Send + Sync {
    fn progress(&self, progress: Progress);
}

#[derive(Debug, Clone)]
pub struct PollState {
    ready: Vec<bool>,
    percent: u8,
}

impl PollState {
    pub fn new(jobs: usize) -> Self {
        Self {
            ready: vec![false; jobs],
            percent: 0,
        }
    }

    /// Advances the estimate by one point, never past [`PROGRESS_CAP`].
    pub fn tick(&mut self) -> Progress {
        self.percent = (self.percent + 1).min(PROGRESS_CAP);
        self.progress()
    }

    pub fn progress(&self) -> Progress {
        let text = if self.percent >= PROGRESS_CAP {
            SLOW_TEXT
        } else {
            IN_PROGRESS_TEXT
        };
        Progress {
            percent: self.percent,
            text,
        }
    }

    pub fn mark_ready(&mut self, index: usize) {
        if let Some(slot) = self.ready.get_mut(index) {
            *slot = true;
        }
    }

    pub fn pending(&self) -> Vec<usize> {
        self.ready
            .iter()
            .enumerate()
            .filter(|(_, ready)| !**ready)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_done(&self) -> bool {
        self.ready.iter().all(|ready| *ready)
    }
}

/// Blocks until every job reports ready. There is no timeout; a failed readiness
/// check ends the wait with that error.
pub async fn await_all<S>(
    client: &dyn InferenceClient,
    handles: &[JobHandle],
    interval: Duration,
    sink: &S,
) -> Result<()>
where
    S: ProgressSink + ?Sized,
{
    let mut state = PollState::new(handles.len());

    while !state.is_done() {
        tokio::time::sleep(interval).await;
        sink.progress(state.tick());

        for index in state.pending() {
            if client.is_ready(&handles[index]).await? {
                debug!(index, response_id = %handles[index].response_id, "job ready");
                state.mark_ready(index);
            }
        }
    }

    info!(jobs = handles.len(), "all jobs ready");
    Ok(())
}
