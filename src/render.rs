use base64::{engine::general_purpose, Engine as _};
use image::DynamicImage;
use serde::Serialize;
use tracing::debug;

use crate::client::{GenerationResult, InferenceClient, JobHandle};
use crate::error::{OctoshopError, Result};
use crate::submit::encode_png_base64;

/// Results alternate between two columns on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Left,
    Right,
}

impl Column {
    pub fn for_index(index: usize) -> Self {
        if index % 2 == 0 {
            Column::Left
        } else {
            Column::Right
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedResult {
    pub index: usize,
    pub column: Column,
    pub image: DynamicImage,
    /// PNG data URL, ready for an `<img src>`.
    pub data_url: String,
    pub caption: String,
    pub description: Option<String>,
}

pub trait ResultSink: Send + Sync {
    fn show(&self, result: RenderedResult);
}

pub fn decode_result(index: usize, result: GenerationResult) -> Result<RenderedResult> {
    let encoded = result
        .images
        .into_iter()
        .next()
        .ok_or_else(|| OctoshopError::InvalidResponse(format!("job {index} returned no images")))?;
    let bytes = general_purpose::STANDARD.decode(encoded.trim())?;
    let image = image::load_from_memory(&bytes)?;
    let data_url = format!("data:image/png;base64,{}", encode_png_base64(&image)?);

    Ok(RenderedResult {
        index,
        column: Column::for_index(index),
        image,
        data_url,
        caption: result.story,
        description: result.caption,
    })
}

/// Fetches and decodes every result in submission order. Any failure here
/// happens before a single result is shown.
pub async fn collect(
    client: &dyn InferenceClient,
    handles: &[JobHandle],
) -> Result<Vec<RenderedResult>> {
    let mut rendered = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = client.fetch_result(handle).await?;
        rendered.push(decode_result(handle.index, result)?);
        debug!(index = handle.index, "decoded result");
    }
    Ok(rendered)
}

pub fn show_all<S>(rendered: Vec<RenderedResult>, sink: &S) -> usize
where
    S: ResultSink + ?Sized,
{
    let count = rendered.len();
    for result in rendered {
        sink.show(result);
    }
    count
}

/// [`collect`] then [`show_all`]: either every result reaches the sink or none does.
pub async fn render<S>(
    client: &dyn InferenceClient,
    handles: &[JobHandle],
    sink: &S,
) -> Result<usize>
where
    S: ResultSink + ?Sized,
{
    let rendered = collect(client, handles).await?;
    Ok(show_all(rendered, sink))
}
